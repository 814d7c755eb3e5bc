//! 集成测试共用：客户领域、注册表/管线构建与事件存储契约
#![allow(dead_code)]

pub mod contract;

use chrono::{DateTime, Utc};
use evstore_domain::aggregate::{
    Aggregate, AggregateCore, ChildEntity, EntityCollection, EntityCreation, EventDispatcher,
};
use evstore_domain::domain_event::AggregateId;
use evstore_domain::event_type::EventTypeRegistry;
use evstore_domain::migration::builtin::InsertBefore;
use evstore_domain::migration::{EventMigration, MigrationPipeline};
use evstore_domain::persist::StoredEvent;
use evstore_macros::event_family;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Created {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Renamed {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailChanged {
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressAdded {
    pub address_id: u32,
    pub street: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressMoved {
    pub address_id: u32,
    pub street: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audited {
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flagged {}

#[event_family(prefix = "Crm")]
pub enum CustomerEvent {
    Created(Created),
    Renamed(Renamed),
    EmailChanged(EmailChanged),
    AddressAdded(AddressAdded),
    AddressMoved(AddressMoved),
    Audited(Audited),
    Flagged(Flagged),
}

#[derive(Debug, Clone)]
pub struct Address {
    pub id: u32,
    pub street: String,
    pub moves: u32,
}

impl ChildEntity<CustomerEvent> for Address {
    type Id = u32;

    fn created_by(event: &CustomerEvent) -> Option<u32> {
        match event {
            CustomerEvent::AddressAdded(e) => Some(e.address_id),
            _ => None,
        }
    }

    fn target_of(event: &CustomerEvent) -> Option<u32> {
        match event {
            CustomerEvent::AddressMoved(e) => Some(e.address_id),
            _ => None,
        }
    }

    fn create(id: u32, _: EntityCreation) -> Self {
        Self {
            id,
            street: String::new(),
            moves: 0,
        }
    }

    fn event_dispatcher() -> &'static EventDispatcher<Self, CustomerEvent> {
        static DISPATCHER: OnceLock<EventDispatcher<Address, CustomerEvent>> = OnceLock::new();
        DISPATCHER.get_or_init(|| {
            EventDispatcher::<Address, CustomerEvent>::new()
                .on::<AddressAdded>(|a, e| a.street = e.street.clone())
                .on::<AddressMoved>(|a, e| {
                    a.street = e.street.clone();
                    a.moves += 1;
                })
        })
    }
}

/// 客户聚合：`Audited` 为迁移插入的审计事件，显式忽略；`Flagged` 无处理器
#[derive(Debug)]
pub struct Customer {
    core: AggregateCore<CustomerEvent>,
    pub name: String,
    pub email: Option<String>,
    pub addresses: EntityCollection<CustomerEvent, Address>,
    pub moves_seen: u32,
}

impl Aggregate for Customer {
    const TYPE: &'static str = "customer";
    type Event = CustomerEvent;

    fn with_core(core: AggregateCore<CustomerEvent>) -> Self {
        Self {
            core,
            name: String::new(),
            email: None,
            addresses: EntityCollection::new(),
            moves_seen: 0,
        }
    }

    fn core(&self) -> &AggregateCore<CustomerEvent> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AggregateCore<CustomerEvent> {
        &mut self.core
    }

    fn event_dispatcher() -> &'static EventDispatcher<Self, CustomerEvent> {
        static DISPATCHER: OnceLock<EventDispatcher<Customer, CustomerEvent>> = OnceLock::new();
        DISPATCHER.get_or_init(|| {
            EventDispatcher::<Customer, CustomerEvent>::new()
                .on::<Created>(|c, e| c.name = e.name.clone())
                .on::<Renamed>(|c, e| c.name = e.name.clone())
                .on::<EmailChanged>(|c, e| c.email = Some(e.email.clone()))
                .before::<AddressMoved>(|c, _| c.moves_seen += 1)
                .entities(|c| &mut c.addresses)
                .ignore::<Audited>()
        })
    }
}

pub const CREATED: &str = "Crm.Created";
pub const RENAMED: &str = "Crm.Renamed";
pub const AUDITED: &str = "Crm.Audited";

pub fn registry() -> Arc<EventTypeRegistry> {
    let mut registry = EventTypeRegistry::new();
    registry
        .register_family::<CustomerEvent>()
        .expect("customer family registers");
    Arc::new(registry)
}

pub fn plain_pipeline() -> MigrationPipeline {
    MigrationPipeline::empty(registry())
}

/// 每个 `Crm.Renamed` 之前插入一条 `Crm.Audited`
pub fn audit_pipeline() -> MigrationPipeline {
    let audit: Arc<dyn EventMigration> = Arc::new(InsertBefore::new(
        "audit-renames",
        RENAMED,
        AUDITED,
        |event: &StoredEvent| Ok(json!({ "note": format!("rename of {}", event.event_id()) })),
    ));
    MigrationPipeline::new(registry(), vec![audit]).expect("audit pipeline is valid")
}

pub fn event_at(
    aggregate_id: AggregateId,
    version: usize,
    event_type: &str,
    payload: Value,
    occurred_at: DateTime<Utc>,
) -> StoredEvent {
    StoredEvent::builder()
        .event_id(Uuid::new_v4())
        .event_type(event_type.into())
        .aggregate_id(aggregate_id)
        .aggregate_version(version.into())
        .occurred_at(occurred_at)
        .payload(payload)
        .build()
}

pub fn event(aggregate_id: AggregateId, version: usize, event_type: &str) -> StoredEvent {
    event_at(
        aggregate_id,
        version,
        event_type,
        json!({ "name": format!("v{version}") }),
        Utc::now(),
    )
}

pub fn types_of(events: &[StoredEvent]) -> Vec<&str> {
    events.iter().map(|e| e.event_type().as_str()).collect()
}

pub fn versions_of(events: &[StoredEvent]) -> Vec<usize> {
    events.iter().map(|e| e.aggregate_version().value()).collect()
}
