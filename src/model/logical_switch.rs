use super::acl::Acl;
use super::{Model, MutableFields};
use crate::catalog::LOGICAL_SWITCH_TABLE;
use crate::catalog::types::{Datum, Row, RowDecodeError};
use crate::client::OperationModel;
use crate::commit::ops::{Mutator, Operation};
use crate::context::OpsContext;
use crate::database::Database;
use crate::error::OpsError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalSwitch {
    pub uuid: String,
    pub name: String,
    pub acls: BTreeSet<String>,
    pub external_ids: BTreeMap<String, String>,
    pub other_config: BTreeMap<String, String>,
}

impl LogicalSwitch {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Model for LogicalSwitch {
    const TABLE: &'static str = LOGICAL_SWITCH_TABLE;

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn set_uuid(&mut self, uuid: String) {
        self.uuid = uuid;
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("name", Datum::Str(self.name.clone()))
            .with("acls", Datum::UuidSet(self.acls.clone()))
            .with("external_ids", Datum::Map(self.external_ids.clone()))
            .with("other_config", Datum::Map(self.other_config.clone()))
    }

    fn from_row(uuid: &str, row: &Row) -> Result<Self, RowDecodeError> {
        Ok(Self {
            uuid: uuid.to_string(),
            name: row.text(LOGICAL_SWITCH_TABLE, "name")?.to_string(),
            acls: row.uuid_set("acls")?,
            external_ids: row.map("external_ids")?,
            other_config: row.map("other_config")?,
        })
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn external_ids(&self) -> Option<&BTreeMap<String, String>> {
        Some(&self.external_ids)
    }

    // Switch names are unique by convention.
    fn same_natural_key(&self, other: &Self) -> bool {
        !self.name.is_empty() && self.name == other.name
    }
}

fn acl_uuids(acls: &[Acl]) -> BTreeSet<String> {
    acls.iter()
        .filter(|acl| !acl.uuid.is_empty())
        .map(|acl| acl.uuid.clone())
        .collect()
}

pub fn find_logical_switches_with_predicate<D: Database>(
    ctx: &OpsContext<D>,
    predicate: impl Fn(&LogicalSwitch) -> bool,
) -> Result<Vec<LogicalSwitch>, OpsError> {
    ctx.model_client().list_with_predicate(predicate)
}

/// The cached switch equivalent to `switch`.
pub fn get_logical_switch<D: Database>(
    ctx: &OpsContext<D>,
    switch: &LogicalSwitch,
) -> Result<LogicalSwitch, OpsError> {
    let mut searched = switch.clone();
    let mut models = [OperationModel::new(&mut searched)];
    ctx.model_client().lookup(&mut models)?;
    let [model] = models;
    match model.into_results().as_slice() {
        [] => Err(OpsError::NotFound {
            table: LOGICAL_SWITCH_TABLE,
            model: format!("{switch:?}"),
        }),
        [only] => Ok(only.clone()),
        many => Err(OpsError::AmbiguousMatch {
            table: LOGICAL_SWITCH_TABLE,
            model: format!("{switch:?}"),
            count: many.len(),
        }),
    }
}

pub fn create_or_update_logical_switch<D: Database>(
    ctx: &OpsContext<D>,
    switch: &mut LogicalSwitch,
) -> Result<(), OpsError> {
    let ops = {
        let mut models = [OperationModel::new(&mut *switch)];
        ctx.model_client().create_or_update_ops(Vec::new(), &mut models)?
    };
    ctx.commit(ops, std::slice::from_mut(switch))?;
    Ok(())
}

/// Attaches `acls` to the switch called `name`, which must exist. The rules
/// may be inserts pending in the same `ops`.
pub fn add_acls_to_logical_switch_ops<D: Database>(
    ctx: &OpsContext<D>,
    ops: Vec<Operation>,
    name: &str,
    acls: &[Acl],
) -> Result<Vec<Operation>, OpsError> {
    let mut switch = LogicalSwitch {
        acls: acl_uuids(acls),
        ..LogicalSwitch::named(name)
    };
    let mut models = [OperationModel::new(&mut switch)
        .with_mutable_fields(MutableFields::Columns(&["acls"]))
        .not_found_is_error(true)];
    ctx.model_client()
        .mutate_ops(ops, &mut models, Mutator::Insert)
}

/// Detaches `acls` from every switch matching `predicate`.
pub fn remove_acls_from_logical_switches_with_predicate_ops<D: Database>(
    ctx: &OpsContext<D>,
    ops: Vec<Operation>,
    predicate: impl Fn(&LogicalSwitch) -> bool,
    acls: &[Acl],
) -> Result<Vec<Operation>, OpsError> {
    let mut switch = LogicalSwitch {
        acls: acl_uuids(acls),
        ..LogicalSwitch::default()
    };
    let mut models = [OperationModel::new(&mut switch)
        .with_predicate(predicate)
        .with_mutable_fields(MutableFields::Columns(&["acls"]))
        .bulk(true)];
    ctx.model_client()
        .mutate_ops(ops, &mut models, Mutator::Delete)
}

pub fn remove_acls_from_logical_switches_with_predicate<D: Database>(
    ctx: &OpsContext<D>,
    predicate: impl Fn(&LogicalSwitch) -> bool,
    acls: &[Acl],
) -> Result<(), OpsError> {
    let ops = remove_acls_from_logical_switches_with_predicate_ops(
        ctx,
        Vec::new(),
        predicate,
        acls,
    )?;
    ctx.transactor().transact(ops)?;
    Ok(())
}
