use crate::catalog::types::is_named_uuid;
use crate::commit::ops::{Operation, OperationResult};
use crate::database::Database;
use crate::error::{OpsError, TransportError};
use crate::model::Model;
use crate::sync_bridge::block_on_ops;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Submits operation lists as single bounded transactions.
pub struct Transactor<D> {
    db: Arc<D>,
    rt: Handle,
    timeout: Duration,
}

impl<D> Clone for Transactor<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            rt: self.rt.clone(),
            timeout: self.timeout,
        }
    }
}

impl<D: Database> Transactor<D> {
    pub fn new(db: Arc<D>, rt: Handle, timeout: Duration) -> Self {
        Self { db, rt, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transact(&self, ops: Vec<Operation>) -> Result<Vec<OperationResult>, OpsError> {
        self.transact_bounded(ops, self.timeout)
    }

    /// Like [`Transactor::transact`], bounded by whichever of the configured
    /// timeout and `deadline` comes first.
    pub fn transact_with_deadline(
        &self,
        ops: Vec<Operation>,
        deadline: Instant,
    ) -> Result<Vec<OperationResult>, OpsError> {
        let bound = self.deadline_bound(deadline)?;
        self.transact_bounded(ops, bound)
    }

    /// Commits `ops` and replaces the named identifier of every record that
    /// was inserted with the identifier the server assigned.
    pub fn transact_and_set_uuids<M: Model>(
        &self,
        models: &mut [M],
        ops: Vec<Operation>,
    ) -> Result<Vec<OperationResult>, OpsError> {
        self.transact_and_set_uuids_within(models, ops, self.timeout)
    }

    pub fn transact_and_set_uuids_with_deadline<M: Model>(
        &self,
        models: &mut [M],
        ops: Vec<Operation>,
        deadline: Instant,
    ) -> Result<Vec<OperationResult>, OpsError> {
        let bound = self.deadline_bound(deadline)?;
        self.transact_and_set_uuids_within(models, ops, bound)
    }

    /// An expired deadline fails without contacting the server.
    fn deadline_bound(&self, deadline: Instant) -> Result<Duration, OpsError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::Timeout(Duration::ZERO).into());
        }
        Ok(remaining.min(self.timeout))
    }

    fn transact_and_set_uuids_within<M: Model>(
        &self,
        models: &mut [M],
        ops: Vec<Operation>,
        bound: Duration,
    ) -> Result<Vec<OperationResult>, OpsError> {
        let inserts: HashMap<String, usize> = ops
            .iter()
            .enumerate()
            .filter_map(|(i, op)| match op {
                Operation::Insert { uuid_name, .. } => Some((uuid_name.clone(), i)),
                _ => None,
            })
            .collect();
        let results = self.transact_bounded(ops, bound)?;
        for model in models.iter_mut() {
            if !is_named_uuid(model.uuid()) {
                continue;
            }
            let Some(&index) = inserts.get(model.uuid()) else {
                continue;
            };
            let uuid = results
                .get(index)
                .and_then(|r| r.uuid.clone())
                .ok_or_else(|| {
                    OpsError::InvalidResult(format!(
                        "no uuid returned for insert {index} into '{}'",
                        M::TABLE
                    ))
                })?;
            model.set_uuid(uuid);
        }
        Ok(results)
    }

    fn transact_bounded(
        &self,
        ops: Vec<Operation>,
        timeout: Duration,
    ) -> Result<Vec<OperationResult>, OpsError> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        let op_count = ops.len();
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        debug!(ops = op_count, timeout_ms, "transacting");
        let db = Arc::clone(&self.db);
        let outcome = block_on_ops(&self.rt, async move {
            tokio::time::timeout(timeout, db.transact(ops)).await
        })
        .inspect_err(|err| warn!(error = %err, ops = op_count, "transaction not submitted"))?;
        let results = match outcome {
            Ok(Ok(results)) => results,
            Ok(Err(err)) => {
                warn!(error = %err, ops = op_count, "transaction transport failure");
                return Err(err.into());
            }
            Err(_) => {
                warn!(ops = op_count, timeout_ms, "transaction timed out");
                return Err(TransportError::Timeout(timeout).into());
            }
        };
        check_operation_results(op_count, results)
    }
}

/// Maps the first failed entry to `ServerRejected`; the server has already
/// rolled the whole transaction back at that point.
pub fn check_operation_results(
    op_count: usize,
    results: Vec<OperationResult>,
) -> Result<Vec<OperationResult>, OpsError> {
    if let Some((index, failed)) = results.iter().enumerate().find(|(_, r)| r.error.is_some()) {
        let error = failed.error.clone().unwrap_or_default();
        let details = failed.details.clone().unwrap_or_default();
        warn!(index, %error, %details, "transaction rejected by server");
        return Err(OpsError::ServerRejected {
            index,
            error,
            details,
        });
    }
    if results.len() < op_count {
        return Err(OpsError::InvalidResult(format!(
            "expected {op_count} results, got {}",
            results.len()
        )));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::check_operation_results;
    use crate::commit::ops::OperationResult;
    use crate::error::OpsError;

    #[test]
    fn first_error_entry_is_reported_with_its_index() {
        let results = vec![
            OperationResult::affected(1),
            OperationResult::failed("constraint violation", "bad column"),
            OperationResult::default(),
        ];
        let err = check_operation_results(3, results).expect_err("rejected");
        match err {
            OpsError::ServerRejected { index, error, .. } => {
                assert_eq!(index, 1);
                assert_eq!(error, "constraint violation");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn commit_level_error_after_last_op_is_rejected() {
        let results = vec![
            OperationResult::affected(1),
            OperationResult::failed("referential integrity violation", "dangling"),
        ];
        let err = check_operation_results(1, results).expect_err("rejected");
        assert!(matches!(err, OpsError::ServerRejected { index: 1, .. }));
    }

    #[test]
    fn short_result_list_is_invalid() {
        let err = check_operation_results(2, vec![OperationResult::affected(1)])
            .expect_err("short");
        assert!(matches!(err, OpsError::InvalidResult(_)));
    }
}
