use crate::client::OperationModel;
use crate::context::OpsContext;
use crate::database::Database;
use crate::error::OpsError;
use crate::model::Detachable;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, warn};

/// What a cleanup pass did. Cleanup never fails the caller; failures are
/// logged and reported as [`RemediationOutcome::Abandoned`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    /// The triggering error was not an ambiguous match.
    NotApplicable,
    Disabled,
    /// The cache no longer holds more than one equivalent record.
    NoDuplicates,
    Detached { sets: usize, detached: usize },
    Abandoned { reason: String },
}

impl RemediationOutcome {
    pub fn detached(&self) -> bool {
        matches!(self, RemediationOutcome::Detached { .. })
    }
}

/// Keeps one survivor per set of mutually equivalent records and detaches
/// the others from every container in a single transaction. Detached records
/// are left for the server to collect.
pub fn remediate_duplicates<M, D>(
    ctx: &OpsContext<D>,
    err: &OpsError,
    records: &[M],
) -> RemediationOutcome
where
    M: Detachable,
    D: Database,
{
    if !err.is_ambiguous() {
        return RemediationOutcome::NotApplicable;
    }
    if !ctx.config().remediate_duplicates {
        debug!(table = M::TABLE, "duplicate cleanup disabled");
        return RemediationOutcome::Disabled;
    }

    let mut searched: Vec<M> = records
        .iter()
        .cloned()
        .map(|mut record| {
            record.set_uuid(String::new());
            record
        })
        .collect();
    let mut models: Vec<OperationModel<'_, M>> = searched
        .iter_mut()
        .map(|record| OperationModel::new(record).bulk(true))
        .collect();
    if let Err(err) = ctx.model_client().lookup(&mut models) {
        error!(table = M::TABLE, error = %err, "duplicate cleanup lookup failed");
        return RemediationOutcome::Abandoned {
            reason: err.to_string(),
        };
    }

    let mut survivors: BTreeSet<String> = BTreeSet::new();
    let mut doomed: BTreeMap<String, M> = BTreeMap::new();
    let mut sets = 0;
    for model in &models {
        let mut found = model.results().to_vec();
        if found.len() < 2 {
            continue;
        }
        found.sort_by(|a, b| a.uuid().cmp(b.uuid()));
        let survivor = found
            .iter()
            .find(|m| survivors.contains(m.uuid()))
            .or_else(|| found.iter().find(|m| !doomed.contains_key(m.uuid())))
            .unwrap_or(&found[0])
            .uuid()
            .to_string();
        warn!(
            table = M::TABLE,
            survivor = %survivor,
            duplicates = found.len() - 1,
            "found equivalent records"
        );
        doomed.remove(&survivor);
        for record in found {
            if record.uuid() != survivor {
                doomed.insert(record.uuid().to_string(), record);
            }
        }
        survivors.insert(survivor);
        sets += 1;
    }
    drop(models);
    doomed.retain(|uuid, _| !survivors.contains(uuid));
    if doomed.is_empty() {
        return RemediationOutcome::NoDuplicates;
    }

    let duplicates: Vec<M> = doomed.into_values().collect();
    let ops = match M::detach_ops(ctx, Vec::new(), &duplicates) {
        Ok(ops) => ops,
        Err(err) => {
            error!(table = M::TABLE, error = %err, "failed to build detach operations");
            return RemediationOutcome::Abandoned {
                reason: err.to_string(),
            };
        }
    };
    if let Err(err) = ctx.transactor().transact(ops) {
        error!(
            table = M::TABLE,
            duplicates = duplicates.len(),
            error = %err,
            "failed to detach duplicates"
        );
        return RemediationOutcome::Abandoned {
            reason: err.to_string(),
        };
    }
    warn!(
        table = M::TABLE,
        sets,
        detached = duplicates.len(),
        "detached duplicate records"
    );
    RemediationOutcome::Detached {
        sets,
        detached: duplicates.len(),
    }
}

/// Runs `attempt`; on an ambiguous match, cleans up and, when configured and
/// something was detached, tries once more. A retry that is still ambiguous
/// reports the first error.
pub fn with_remediation<M, D, T>(
    ctx: &OpsContext<D>,
    records: &mut [M],
    mut attempt: impl FnMut(&mut [M]) -> Result<T, OpsError>,
) -> Result<T, OpsError>
where
    M: Detachable,
    D: Database,
{
    let err = match attempt(records) {
        Err(err) if err.is_ambiguous() => err,
        other => return other,
    };
    let outcome = remediate_duplicates(ctx, &err, records);
    if !outcome.detached() || !ctx.config().retry_after_remediation {
        return Err(err);
    }
    debug!(table = M::TABLE, ?outcome, "retrying after duplicate cleanup");
    match attempt(records) {
        Err(retry) if retry.is_ambiguous() => Err(err),
        other => other,
    }
}
