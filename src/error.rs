use crate::key::CompositeKey;
use crate::message::MessageKind;
use thiserror::Error;

/// Failure reported by a store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no {aggregate} stored under {key}")]
    NotFound {
        aggregate: &'static str,
        key: CompositeKey,
    },

    #[error("{op} of {aggregate} {key} failed: {reason}")]
    Backend {
        op: &'static str,
        aggregate: &'static str,
        key: CompositeKey,
        reason: String,
    },
}

/// Failure reported by the broker transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{op} failed: {reason}")]
pub struct TransportError {
    pub op: &'static str,
    pub reason: String,
}

impl TransportError {
    pub fn new(op: &'static str, reason: impl Into<String>) -> Self {
        Self {
            op,
            reason: reason.into(),
        }
    }
}

/// Errors raised while reconciling a batch.
///
/// `Malformed` and `UnknownAggregate` are recovered inside the processor
/// (the record is skipped and counted). Everything else aborts the batch
/// before any offset is committed.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReconcileError {
    #[error("malformed {kind} message at offset {offset}: {reason}")]
    Malformed {
        kind: MessageKind,
        offset: i64,
        reason: String,
    },

    #[error("{kind} delta references unknown aggregate {key}")]
    UnknownAggregate { kind: MessageKind, key: CompositeKey },

    #[error("no handler for message kind `{tag}` (offset {offset})")]
    NoHandlerForKind { tag: String, offset: i64 },

    #[error("no handler for topic `{0}`")]
    NoHandlerForTopic(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("partition {partition} worker stopped: {reason}")]
    WorkerStopped { partition: i32, reason: String },
}

impl ReconcileError {
    /// Whether the error is handled by skipping one record.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ReconcileError::Malformed { .. } | ReconcileError::UnknownAggregate { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_record_level_errors_are_recoverable() {
        let malformed = ReconcileError::Malformed {
            kind: MessageKind::OptionChanged,
            offset: 3,
            reason: "missing field `optionKey`".into(),
        };
        assert!(malformed.is_recoverable());

        let unknown = ReconcileError::UnknownAggregate {
            kind: MessageKind::MarketPriceChanged,
            key: CompositeKey::proposition("c1", "p9"),
        };
        assert!(unknown.is_recoverable());
        assert_eq!(
            unknown.to_string(),
            "MarketPriceChanged delta references unknown aggregate c1:p9"
        );

        let store = ReconcileError::from(StoreError::Backend {
            op: "insert",
            aggregate: "proposition",
            key: CompositeKey::proposition("c1", "p1"),
            reason: "disk full".into(),
        });
        assert!(!store.is_recoverable());
        assert_eq!(
            store.to_string(),
            "insert of proposition c1:p1 failed: disk full"
        );
    }
}
