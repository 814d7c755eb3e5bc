//! 领域层统一错误定义
//!
//! 聚焦序列化/类型映射、事件迁移、事件存储与聚合重建的最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use crate::domain_event::AggregateId;
use crate::persist::StoredEvent;
use std::fmt;
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化/类型映射 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },
    #[error("corrupt payload: type={event_type}, reason={reason}")]
    CorruptPayload { event_type: String, reason: String },
    #[error("unresolved event type: {identifier}")]
    UnresolvedEventType { identifier: String },
    #[error("unmapped event type: {type_name}")]
    UnmappedEventType { type_name: String },
    #[error("duplicate event type mapping: identifier={identifier}, claimed_by={existing}, requested_by={requested}")]
    DuplicateEventTypeMapping {
        identifier: String,
        existing: String,
        requested: String,
    },

    // --- 事件迁移 ---
    #[error("{0}")]
    MigrationFailed(Box<MigrationFailure>),

    // --- 仓储/持久化 ---
    #[error("concurrency conflict: aggregate={aggregate_id}, expected_version={expected}, actual_version={actual}")]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate event id: {event_id}")]
    DuplicateEvent { event_id: uuid::Uuid },
    #[error("cannot save an aggregate without history: aggregate={aggregate_id}")]
    EmptyAggregateSave { aggregate_id: AggregateId },
    #[error("aggregate not found: {aggregate_id}")]
    AggregateNotFound { aggregate_id: AggregateId },
    #[error("database error: {reason}")]
    Database { reason: String },

    // --- 聚合重建 ---
    #[error("unhandled event during replay: aggregate={aggregate_type}, event={event_type}")]
    UnhandledEvent {
        aggregate_type: String,
        event_type: String,
    },
    #[error("version mismatch: aggregate={aggregate_id}, expected={expected}, found={found}")]
    VersionMismatch {
        aggregate_id: AggregateId,
        expected: usize,
        found: usize,
    },
    #[error("duplicate entity: {entity_id}")]
    DuplicateEntity { entity_id: String },
    #[error("entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },

    // --- 内部不变量 ---
    #[error("internal error: {reason}")]
    Internal { reason: String },

    // --- 配置 ---
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn database(reason: impl Into<String>) -> Self {
        DomainError::Database {
            reason: reason.into(),
        }
    }

    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        DomainError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// 调用方是否应当重新加载聚合后重试
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, DomainError::ConcurrencyConflict { .. })
    }
}

/// 迁移失败详情：失败的迁移、所属聚合与未经迁移的原始事件流
#[derive(Debug)]
pub struct MigrationFailure {
    pub migration: String,
    pub aggregate_id: AggregateId,
    pub reason: String,
    pub unmigrated: Vec<StoredEvent>,
}

impl fmt::Display for MigrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "migration failed: migration={}, aggregate={}, reason={}",
            self.migration, self.aggregate_id, self.reason
        )
    }
}

impl std::error::Error for MigrationFailure {}

impl From<MigrationFailure> for DomainError {
    fn from(failure: MigrationFailure) -> Self {
        DomainError::MigrationFailed(Box::new(failure))
    }
}

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx/uuid 等错误转换为 DomainError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database {
            reason: err.to_string(),
        }
    }
}

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for DomainError {
    fn from(err: chrono::ParseError) -> Self {
        DomainError::Parse {
            reason: err.to_string(),
        }
    }
}
