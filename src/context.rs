use crate::client::ModelClient;
use crate::commit::ops::{Operation, OperationResult};
use crate::commit::transactor::Transactor;
use crate::config::OpsConfig;
use crate::database::Database;
use crate::error::OpsError;
use crate::model::Model;
use crate::sync_bridge::ensure_multi_thread;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::info;

/// Everything an entity helper needs to read the cache and commit: the
/// database handle, a transactor bound to the configured timeout, and the
/// configuration itself.
pub struct OpsContext<D> {
    db: Arc<D>,
    transactor: Transactor<D>,
    config: OpsConfig,
}

impl<D: Database> OpsContext<D> {
    /// `rt` must belong to a multi-thread runtime.
    pub fn new(db: Arc<D>, rt: Handle, config: OpsConfig) -> Result<Self, OpsError> {
        config.validate()?;
        ensure_multi_thread(&rt).map_err(|err| OpsError::InvalidConfig {
            message: err.to_string(),
        })?;
        info!(
            txn_timeout_ms = config.txn_timeout_ms,
            remediate_duplicates = config.remediate_duplicates,
            retry_after_remediation = config.retry_after_remediation,
            "model transaction context ready"
        );
        let transactor = Transactor::new(Arc::clone(&db), rt, config.txn_timeout());
        Ok(Self {
            db,
            transactor,
            config,
        })
    }

    pub fn database(&self) -> &Arc<D> {
        &self.db
    }

    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    pub fn transactor(&self) -> &Transactor<D> {
        &self.transactor
    }

    pub fn model_client(&self) -> ModelClient<'_, D> {
        ModelClient::new(self.db.as_ref())
    }

    /// Commits `ops` and back-fills server identifiers into `models`.
    pub fn commit<M: Model>(
        &self,
        ops: Vec<Operation>,
        models: &mut [M],
    ) -> Result<Vec<OperationResult>, OpsError> {
        self.transactor.transact_and_set_uuids(models, ops)
    }

    /// Like [`OpsContext::commit`], abandoned once `deadline` passes.
    pub fn commit_with_deadline<M: Model>(
        &self,
        ops: Vec<Operation>,
        models: &mut [M],
        deadline: Instant,
    ) -> Result<Vec<OperationResult>, OpsError> {
        self.transactor
            .transact_and_set_uuids_with_deadline(models, ops, deadline)
    }
}
