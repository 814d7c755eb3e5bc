use evstore_macros::event_family;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pinged {}

#[event_family(prefix = "Health")]
pub enum HealthEvent {
    Pinged(Pinged),
}

fn main() {
    use evstore_domain::domain_event::FamilyMember;
    let event = HealthEvent::from(Pinged {});
    assert!(Pinged::select(&event).is_some());
}
