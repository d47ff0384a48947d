mod descriptor;

pub use descriptor::{Matcher, OperationModel};

use crate::catalog::types::{Datum, Row, new_named_uuid};
use crate::commit::ops::{Mutation, Mutator, Operation};
use crate::database::Cache;
use crate::error::OpsError;
use crate::model::{Model, MutableFields};
use tracing::debug;

/// Resolves operation descriptors against the cache and turns them into
/// database operations. Never writes to the database itself.
pub struct ModelClient<'c, C: Cache + ?Sized> {
    cache: &'c C,
}

impl<'c, C: Cache + ?Sized> ModelClient<'c, C> {
    pub fn new(cache: &'c C) -> Self {
        Self { cache }
    }

    /// Every cached record of kind `M`, in cache order.
    pub fn list<M: Model>(&self) -> Result<Vec<M>, OpsError> {
        self.cache
            .rows(M::TABLE)?
            .iter()
            .map(|(uuid, row)| M::from_row(uuid, row).map_err(OpsError::from))
            .collect()
    }

    pub fn list_with_predicate<M: Model>(
        &self,
        predicate: impl Fn(&M) -> bool,
    ) -> Result<Vec<M>, OpsError> {
        Ok(self.list::<M>()?.into_iter().filter(|m| predicate(m)).collect())
    }

    /// Fills each descriptor's results. A descriptor with no match is not an
    /// error here. Records are normalized first, as for writes.
    pub fn lookup<M: Model>(&self, models: &mut [OperationModel<'_, M>]) -> Result<(), OpsError> {
        let cached = self.list::<M>()?;
        for op_model in models.iter_mut() {
            op_model.model.normalize();
            op_model.resolve(&cached);
        }
        Ok(())
    }

    /// Appends to `ops` the inserts and partial updates that converge the
    /// cache towards the descriptors. Unmatched records get a named
    /// identifier, matched ones the identifier of their match.
    pub fn create_or_update_ops<M: Model>(
        &self,
        mut ops: Vec<Operation>,
        models: &mut [OperationModel<'_, M>],
    ) -> Result<Vec<Operation>, OpsError> {
        let cached = self.list::<M>()?;
        let mut pending: Vec<(M, usize)> = Vec::new();
        for op_model in models.iter_mut() {
            op_model.model.normalize();
            op_model.resolve(&cached);
            match op_model.results.len() {
                0 => {
                    if op_model.not_found_is_error {
                        return Err(not_found(op_model.model()));
                    }
                    // An equal record already queued for insert in this batch
                    // takes this descriptor's mutable columns; later wins.
                    if matches!(op_model.matcher, Matcher::Equivalent)
                        && let Some((queued, index)) = pending
                            .iter_mut()
                            .find(|entry| entry.0.is_equivalent(op_model.model()))
                    {
                        if let Some(Operation::Update { row: changes, .. }) =
                            update_op(&*queued, op_model.model(), op_model.mutable_fields)
                            && let Some(Operation::Insert { row, .. }) = ops.get_mut(*index)
                        {
                            debug!(
                                table = M::TABLE,
                                model = ?op_model.model(),
                                columns = changes.len(),
                                "merged equivalent record into pending insert"
                            );
                            for (column, value) in changes.iter() {
                                row.insert(column.clone(), value.clone());
                            }
                            let merged = M::from_row(queued.uuid(), &*row)?;
                            *queued = merged;
                        }
                        op_model.model.set_uuid(queued.uuid().to_string());
                        continue;
                    }
                    let uuid_name = new_named_uuid();
                    op_model.model.set_uuid(uuid_name.clone());
                    pending.push((op_model.model().clone(), ops.len()));
                    ops.push(Operation::Insert {
                        table: M::TABLE.to_string(),
                        uuid_name,
                        row: op_model.model.to_row(),
                    });
                }
                1 => {
                    let existing = &op_model.results[0];
                    if let Some(op) =
                        update_op(existing, op_model.model(), op_model.mutable_fields)
                    {
                        ops.push(op);
                    }
                    let uuid = existing.uuid().to_string();
                    op_model.model.set_uuid(uuid);
                }
                count if !op_model.bulk => {
                    return Err(ambiguous(op_model.model(), count));
                }
                _ => {
                    for existing in &op_model.results {
                        if let Some(op) =
                            update_op(existing, op_model.model(), op_model.mutable_fields)
                        {
                            ops.push(op);
                        }
                    }
                }
            }
        }
        debug!(table = M::TABLE, ops = ops.len(), "create or update resolved");
        Ok(ops)
    }

    /// Appends element-wise insert or delete mutations of the descriptor's
    /// set and map columns to every matched record. Mutations that would not
    /// change the record are skipped.
    pub fn mutate_ops<M: Model>(
        &self,
        mut ops: Vec<Operation>,
        models: &mut [OperationModel<'_, M>],
        mutator: Mutator,
    ) -> Result<Vec<Operation>, OpsError> {
        let cached = self.list::<M>()?;
        for op_model in models.iter_mut() {
            op_model.model.normalize();
            op_model.resolve(&cached);
            match op_model.results.len() {
                0 if op_model.not_found_is_error => return Err(not_found(op_model.model())),
                count if count > 1 && !op_model.bulk => {
                    return Err(ambiguous(op_model.model(), count));
                }
                _ => {}
            }
            let desired = op_model.model.to_row();
            for existing in &op_model.results {
                let current = existing.to_row();
                let mutations: Vec<Mutation> = desired
                    .iter()
                    .filter(|(column, value)| {
                        matches!(value, Datum::UuidSet(_) | Datum::Map(_))
                            && op_model.mutable_fields.includes(column, value)
                    })
                    .map(|(column, value)| Mutation {
                        column: column.clone(),
                        mutator,
                        value: value.clone(),
                    })
                    .filter(|m| !m.is_noop_on(current.get(&m.column)))
                    .collect();
                if mutations.is_empty() {
                    continue;
                }
                ops.push(Operation::Mutate {
                    table: M::TABLE.to_string(),
                    uuid: existing.uuid().to_string(),
                    mutations,
                });
            }
        }
        Ok(ops)
    }

    /// Appends deletes of the matched records.
    pub fn delete_ops<M: Model>(
        &self,
        mut ops: Vec<Operation>,
        models: &mut [OperationModel<'_, M>],
    ) -> Result<Vec<Operation>, OpsError> {
        let cached = self.list::<M>()?;
        for op_model in models.iter_mut() {
            op_model.model.normalize();
            op_model.resolve(&cached);
            match op_model.results.len() {
                0 if op_model.not_found_is_error => return Err(not_found(op_model.model())),
                count if count > 1 && !op_model.bulk => {
                    return Err(ambiguous(op_model.model(), count));
                }
                _ => {}
            }
            for existing in &op_model.results {
                ops.push(Operation::Delete {
                    table: M::TABLE.to_string(),
                    uuid: existing.uuid().to_string(),
                });
            }
        }
        Ok(ops)
    }
}

/// Partial update carrying only the mutable columns whose desired value
/// differs from `existing`; `None` when the record is already converged.
fn update_op<M: Model>(existing: &M, desired: &M, fields: MutableFields) -> Option<Operation> {
    let current = existing.to_row();
    let mut row = Row::new();
    for (column, value) in desired.to_row().iter() {
        if !fields.includes(column, value) || current.get(column) == Some(value) {
            continue;
        }
        row.insert(column.clone(), value.clone());
    }
    if row.is_empty() {
        return None;
    }
    Some(Operation::Update {
        table: M::TABLE.to_string(),
        uuid: existing.uuid().to_string(),
        row,
    })
}

fn not_found<M: Model>(model: &M) -> OpsError {
    OpsError::NotFound {
        table: M::TABLE,
        model: format!("{model:?}"),
    }
}

fn ambiguous<M: Model>(model: &M, count: usize) -> OpsError {
    OpsError::AmbiguousMatch {
        table: M::TABLE,
        model: format!("{model:?}"),
        count,
    }
}
