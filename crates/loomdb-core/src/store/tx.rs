use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// TxKind
///
/// Operation families covered by one TX report.
///

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum TxKind {
    Upsert,
    Retract,
}

///
/// TxOp
///
/// One change entry's operation.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TxOp {
    Upsert,
    Retract,
}

///
/// TxMetadata
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxMetadata {
    pub timestamp_ms: u64,
    pub label: Option<String>,
}

impl TxMetadata {
    #[must_use]
    pub fn now(label: Option<String>) -> Self {
        Self {
            timestamp_ms: now_ms(),
            label,
        }
    }
}

#[expect(clippy::cast_possible_truncation)]
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

///
/// TxReport
///
/// The persisted record of one transaction: the basis after commit, the
/// operation kinds performed, and a snapshot of every changed entity.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxReport {
    pub basis_t: u64,
    pub kind: BTreeSet<TxKind>,
    pub tx_data: Vec<(TxOp, Entity)>,
    pub metadata: TxMetadata,
}

impl TxReport {
    #[must_use]
    pub fn new(
        basis_t: u64,
        kind: BTreeSet<TxKind>,
        tx_data: Vec<(TxOp, Entity)>,
        metadata: TxMetadata,
    ) -> Self {
        Self {
            basis_t,
            kind,
            tx_data,
            metadata,
        }
    }

    /// True when this report carries no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx_data.is_empty()
    }

    /// Combine two reports: kind union, concatenated change list, and the
    /// later basis. Metadata keeps the earlier timestamp.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.kind.extend(other.kind);
        self.tx_data.extend(other.tx_data);
        self.basis_t = self.basis_t.max(other.basis_t);
        if self.metadata.label.is_none() {
            self.metadata.label = other.metadata.label;
        }
        self
    }
}

///
/// TESTS
///
