use crate::catalog::types::{Datum, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Mutator {
    Insert,
    Delete,
}

/// Element-wise change to a set or map column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mutation {
    pub column: String,
    pub mutator: Mutator,
    pub value: Datum,
}

impl Mutation {
    /// True when applying this mutation to `current` would change nothing.
    pub fn is_noop_on(&self, current: Option<&Datum>) -> bool {
        match (&self.value, current) {
            (Datum::UuidSet(values), Some(Datum::UuidSet(existing))) => match self.mutator {
                Mutator::Insert => values.is_subset(existing),
                Mutator::Delete => values.is_disjoint(existing),
            },
            (Datum::Map(values), Some(Datum::Map(existing))) => match self.mutator {
                Mutator::Insert => values.keys().all(|k| existing.contains_key(k)),
                Mutator::Delete => values.keys().all(|k| !existing.contains_key(k)),
            },
            (value, None) => value.is_default() || self.mutator == Mutator::Delete,
            (value, _) => value.is_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Operation {
    /// `uuid_name` may be referenced by later operations of the same
    /// transaction before the server assigns the real identifier.
    Insert {
        table: String,
        uuid_name: String,
        row: Row,
    },
    Update {
        table: String,
        uuid: String,
        row: Row,
    },
    Mutate {
        table: String,
        uuid: String,
        mutations: Vec<Mutation>,
    },
    Delete {
        table: String,
        uuid: String,
    },
}

impl Operation {
    pub fn table(&self) -> &str {
        match self {
            Operation::Insert { table, .. }
            | Operation::Update { table, .. }
            | Operation::Mutate { table, .. }
            | Operation::Delete { table, .. } => table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Update { .. } => "update",
            Operation::Mutate { .. } => "mutate",
            Operation::Delete { .. } => "delete",
        }
    }
}

/// Per-operation outcome reported by the server. A transaction that fails
/// carries `error` on the failing entry; a commit-level failure is appended
/// after the last operation's entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationResult {
    pub uuid: Option<String>,
    pub count: usize,
    pub error: Option<String>,
    pub details: Option<String>,
}

impl OperationResult {
    pub fn inserted(uuid: String) -> Self {
        Self {
            uuid: Some(uuid),
            count: 1,
            ..Self::default()
        }
    }

    pub fn affected(count: usize) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            details: Some(details.into()),
            ..Self::default()
        }
    }
}
