//! Boundary to the configuration database: a read-only client-side cache
//! and an atomic transaction endpoint.

use crate::catalog::types::Row;
use crate::commit::ops::{Operation, OperationResult};
use crate::error::TransportError;
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("table '{0}' is not cached")]
    UnknownTable(String),
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Client-side mirror of server state. It may lag the server by a round
/// trip and is never locked around read-then-decide sequences.
pub trait Cache: Send + Sync {
    /// Every cached row of `table` as `(uuid, row)`, ordered by uuid.
    fn rows(&self, table: &str) -> Result<Vec<(String, Row)>, CacheError>;
}

pub trait Database: Cache {
    /// Submits `ops` as one all-or-nothing transaction. Per-operation
    /// failures come back inside the results; `Err` means no commit decision
    /// was received.
    fn transact(
        &self,
        ops: Vec<Operation>,
    ) -> impl Future<Output = Result<Vec<OperationResult>, TransportError>> + Send;
}
