use super::acl::Acl;
use super::{Model, MutableFields};
use crate::catalog::PORT_GROUP_TABLE;
use crate::catalog::types::{Datum, Row, RowDecodeError};
use crate::client::OperationModel;
use crate::commit::ops::{Mutator, Operation};
use crate::context::OpsContext;
use crate::database::Database;
use crate::error::OpsError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortGroup {
    pub uuid: String,
    pub name: String,
    pub acls: BTreeSet<String>,
    pub external_ids: BTreeMap<String, String>,
}

impl PortGroup {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Model for PortGroup {
    const TABLE: &'static str = PORT_GROUP_TABLE;

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
    }

    fn from_row(uuid: &str, row: &Row) -> Result<Self, RowDecodeError> {
        Ok(Self {
            uuid: uuid.to_string(),
            name: row.text(PORT_GROUP_TABLE, "name")?.to_string(),
            acls: row.uuid_set("acls")?,
            external_ids: row.map("external_ids")?,
        })
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn external_ids(&self) -> Option<&BTreeMap<String, String>> {
        Some(&self.external_ids)
    }

    fn same_natural_key(&self, other: &Self) -> bool {
        !self.name.is_empty() && self.name == other.name
    }
}

pub fn find_port_groups_with_predicate<D: Database>(
    ctx: &OpsContext<D>,
    predicate: impl Fn(&PortGroup) -> bool,
) -> Result<Vec<PortGroup>, OpsError> {
    ctx.model_client().list_with_predicate(predicate)
}

pub fn get_port_group<D: Database>(
    ctx: &OpsContext<D>,
    group: &PortGroup,
) -> Result<PortGroup, OpsError> {
    let mut searched = group.clone();
    let mut models = [OperationModel::new(&mut searched)];
    ctx.model_client().lookup(&mut models)?;
    let [model] = models;
    let mut found = model.into_results();
    match found.len() {
        0 => Err(OpsError::NotFound {
            table: PORT_GROUP_TABLE,
            model: format!("{group:?}"),
        }),
        1 => Ok(found.remove(0)),
        count => Err(OpsError::AmbiguousMatch {
            table: PORT_GROUP_TABLE,
            model: format!("{group:?}"),
            count,
        }),
    }
}

pub fn create_or_update_port_group<D: Database>(
    ctx: &OpsContext<D>,
    group: &mut PortGroup,
) -> Result<(), OpsError> {
    let ops = {
        let mut models = [OperationModel::new(&mut *group)];
        ctx.model_client().create_or_update_ops(Vec::new(), &mut models)?
    };
    ctx.commit(ops, std::slice::from_mut(group))?;
    Ok(())
}

fn membership_template(name: &str, acls: &[Acl]) -> PortGroup {
    PortGroup {
        acls: acls
            .iter()
            .filter(|acl| !acl.uuid.is_empty())
            .map(|acl| acl.uuid.clone())
            .collect(),
        ..PortGroup::named(name)
    }
}

/// Attaches `acls` to the port group called `name`, which must exist.
pub fn add_acls_to_port_group_ops<D: Database>(
    ctx: &OpsContext<D>,
    ops: Vec<Operation>,
    name: &str,
    acls: &[Acl],
) -> Result<Vec<Operation>, OpsError> {
    let mut group = membership_template(name, acls);
    let mut models = [OperationModel::new(&mut group)
        .with_mutable_fields(MutableFields::Columns(&["acls"]))
        .not_found_is_error(true)];
    ctx.model_client()
        .mutate_ops(ops, &mut models, Mutator::Insert)
}

pub fn delete_acls_from_all_port_groups_ops<D: Database>(
    ctx: &OpsContext<D>,
    ops: Vec<Operation>,
    acls: &[Acl],
) -> Result<Vec<Operation>, OpsError> {
    let mut group = membership_template("", acls);
    let mut models = [OperationModel::new(&mut group)
        .with_predicate(|_| true)
        .with_mutable_fields(MutableFields::Columns(&["acls"]))
        .bulk(true)];
    ctx.model_client()
        .mutate_ops(ops, &mut models, Mutator::Delete)
}

pub fn delete_acls_from_all_port_groups<D: Database>(
    ctx: &OpsContext<D>,
    acls: &[Acl],
) -> Result<(), OpsError> {
    let ops = delete_acls_from_all_port_groups_ops(ctx, Vec::new(), acls)?;
    ctx.transactor().transact(ops)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{PortGroup, membership_template};
    use crate::model::Model;
    use crate::model::acl::{AclAction, AclDirection, build_acl};
    use std::collections::BTreeMap;

    #[test]
    fn template_skips_rules_without_identifiers() {
        let mut stored = build_acl(
            "a",
            AclDirection::FromLport,
            1000,
            "ip4",
            AclAction::Drop,
            "",
            None,
            false,
            BTreeMap::new(),
            BTreeMap::new(),
        );
        let unsaved = stored.clone();
        stored.uuid = "5b8e3c52-6d0a-4f55-8c1e-93b1d7b2e4f0".into();

        let group = membership_template("pg", &[stored.clone(), unsaved]);
        assert_eq!(group.acls.len(), 1);
        assert!(group.acls.contains(&stored.uuid));
    }

    #[test]
    fn groups_with_different_names_are_distinct() {
        let a = PortGroup::named("clusterPortGroup");
        let b = PortGroup::named("clusterRtrPortGroup");
        assert!(!a.is_equivalent(&b));
        assert!(a.is_equivalent(&PortGroup::named("clusterPortGroup")));
    }
}
