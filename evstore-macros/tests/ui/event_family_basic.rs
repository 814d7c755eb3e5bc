use evstore_macros::event_family;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Opened {
    name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Renamed {
    to: String,
}

#[event_family]
#[derive(Debug)]
enum BankEvent {
    #[event(event_type = "bank.opened")]
    Opened(Opened),
    Renamed(Renamed),
}

fn main() {
    use evstore_domain::domain_event::EventFamily;
    assert_eq!(BankEvent::TYPE_NAMES, &["bank.opened", "BankEvent.Renamed"]);
}
