use super::{Detachable, Model, MutableFields, logical_switch, port_group, truncate_name};
use crate::catalog::ACL_TABLE;
use crate::catalog::types::{Datum, Row, RowDecodeError};
use crate::client::OperationModel;
use crate::commit::ops::Operation;
use crate::context::OpsContext;
use crate::database::Database;
use crate::error::OpsError;
use crate::remediation::with_remediation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclDirection {
    FromLport,
    ToLport,
}

impl AclDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            AclDirection::FromLport => "from-lport",
            AclDirection::ToLport => "to-lport",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "from-lport" => Some(AclDirection::FromLport),
            "to-lport" => Some(AclDirection::ToLport),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclAction {
    Allow,
    AllowRelated,
    Drop,
    Reject,
}

impl AclAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AclAction::Allow => "allow",
            AclAction::AllowRelated => "allow-related",
            AclAction::Drop => "drop",
            AclAction::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "allow" => Some(AclAction::Allow),
            "allow-related" => Some(AclAction::AllowRelated),
            "drop" => Some(AclAction::Drop),
            "reject" => Some(AclAction::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclSeverity {
    Alert,
    Warning,
    Notice,
    Info,
    Debug,
}

impl AclSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AclSeverity::Alert => "alert",
            AclSeverity::Warning => "warning",
            AclSeverity::Notice => "notice",
            AclSeverity::Info => "info",
            AclSeverity::Debug => "debug",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "alert" => Some(AclSeverity::Alert),
            "warning" => Some(AclSeverity::Warning),
            "notice" => Some(AclSeverity::Notice),
            "info" => Some(AclSeverity::Info),
            "debug" => Some(AclSeverity::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for AclSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One packet filtering rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub uuid: String,
    pub name: Option<String>,
    pub direction: AclDirection,
    pub priority: i64,
    pub match_expr: String,
    pub action: AclAction,
    pub log: bool,
    pub severity: Option<AclSeverity>,
    pub meter: Option<String>,
    pub external_ids: BTreeMap<String, String>,
    pub options: BTreeMap<String, String>,
}

impl Model for Acl {
    const TABLE: &'static str = ACL_TABLE;

    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn set_uuid(&mut self, uuid: String) {
        self.uuid = uuid;
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("name", Datum::OptStr(self.name.clone()))
            .with("direction", Datum::Str(self.direction.as_str().into()))
            .with("priority", Datum::Int(self.priority))
            .with("match", Datum::Str(self.match_expr.clone()))
            .with("action", Datum::Str(self.action.as_str().into()))
            .with("log", Datum::Bool(self.log))
            .with(
                "severity",
                Datum::OptStr(self.severity.map(|s| s.as_str().to_string())),
            )
            .with("meter", Datum::OptStr(self.meter.clone()))
            .with("external_ids", Datum::Map(self.external_ids.clone()))
            .with("options", Datum::Map(self.options.clone()))
    }

    fn from_row(uuid: &str, row: &Row) -> Result<Self, RowDecodeError> {
        let direction = row.text(ACL_TABLE, "direction")?;
        let action = row.text(ACL_TABLE, "action")?;
        let severity = match row.optional_text("severity")? {
            Some(value) => Some(AclSeverity::parse(value).ok_or_else(|| invalid("severity", value))?),
            None => None,
        };
        Ok(Self {
            uuid: uuid.to_string(),
            name: row.optional_text("name")?.map(str::to_string),
            direction: AclDirection::parse(direction)
                .ok_or_else(|| invalid("direction", direction))?,
            priority: row.integer(ACL_TABLE, "priority")?,
            match_expr: row.text(ACL_TABLE, "match")?.to_string(),
            action: AclAction::parse(action).ok_or_else(|| invalid("action", action))?,
            log: row.boolean(ACL_TABLE, "log")?,
            severity,
            meter: row.optional_text("meter")?.map(str::to_string),
            external_ids: row.map("external_ids")?,
            options: row.map("options")?,
        })
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn external_ids(&self) -> Option<&BTreeMap<String, String>> {
        Some(&self.external_ids)
    }

    /// A rule is its direction, priority, match and action.
    fn same_natural_key(&self, other: &Self) -> bool {
        self.direction == other.direction
            && self.priority == other.priority
            && self.match_expr == other.match_expr
            && self.action == other.action
    }

    fn normalize(&mut self) {
        self.name = self
            .name
            .take()
            .filter(|n| !n.is_empty())
            .map(|n| truncate_name(&n));
        self.meter = self.meter.take().filter(|m| !m.is_empty());
    }
}

impl Detachable for Acl {
    fn detach_ops<D: Database>(
        ctx: &OpsContext<D>,
        ops: Vec<Operation>,
        duplicates: &[Self],
    ) -> Result<Vec<Operation>, OpsError> {
        let ops = port_group::delete_acls_from_all_port_groups_ops(ctx, ops, duplicates)?;
        logical_switch::remove_acls_from_logical_switches_with_predicate_ops(
            ctx,
            ops,
            |_| true,
            duplicates,
        )
    }
}

fn invalid(column: &str, value: &str) -> RowDecodeError {
    RowDecodeError::InvalidValue {
        column: column.to_string(),
        value: value.to_string(),
    }
}

pub fn acl_name(acl: &Acl) -> &str {
    acl.name.as_deref().unwrap_or_default()
}

/// Builds a rule ready for [`create_or_update_acls`]: the name is capped to
/// the stored length and empty optional fields are left unset.
#[allow(clippy::too_many_arguments)]
pub fn build_acl(
    name: &str,
    direction: AclDirection,
    priority: i64,
    match_expr: &str,
    action: AclAction,
    meter: &str,
    severity: Option<AclSeverity>,
    log: bool,
    external_ids: BTreeMap<String, String>,
    options: BTreeMap<String, String>,
) -> Acl {
    let mut acl = Acl {
        uuid: String::new(),
        name: Some(name.to_string()),
        direction,
        priority,
        match_expr: match_expr.to_string(),
        action,
        log,
        severity,
        meter: Some(meter.to_string()),
        external_ids,
        options,
    };
    acl.normalize();
    acl
}

pub fn set_acl_logging(acl: &mut Acl, severity: Option<AclSeverity>, log: bool) {
    acl.severity = severity;
    acl.log = log;
}

pub fn find_acls_with_predicate<D: Database>(
    ctx: &OpsContext<D>,
    predicate: impl Fn(&Acl) -> bool,
) -> Result<Vec<Acl>, OpsError> {
    ctx.model_client().list_with_predicate(predicate)
}

/// The cached rule equivalent to each of `acls`, skipping those with none.
/// More than one candidate for a rule is an ambiguous match and triggers
/// duplicate cleanup.
pub fn find_acls<D: Database>(ctx: &OpsContext<D>, acls: &mut [Acl]) -> Result<Vec<Acl>, OpsError> {
    with_remediation(ctx, acls, |acls| {
        let mut models: Vec<OperationModel<'_, Acl>> =
            acls.iter_mut().map(OperationModel::new).collect();
        ctx.model_client().lookup(&mut models)?;
        let mut found = Vec::with_capacity(models.len());
        for model in models {
            match model.results() {
                [] => {}
                [only] => found.push(only.clone()),
                many => {
                    return Err(OpsError::AmbiguousMatch {
                        table: ACL_TABLE,
                        model: format!("{:?}", model.model()),
                        count: many.len(),
                    });
                }
            }
        }
        Ok(found)
    })
}

fn acl_ops<D: Database>(
    ctx: &OpsContext<D>,
    ops: Vec<Operation>,
    acls: &mut [Acl],
    fields: MutableFields,
    not_found_is_error: bool,
) -> Result<Vec<Operation>, OpsError> {
    with_remediation(ctx, acls, |acls| {
        let mut models: Vec<OperationModel<'_, Acl>> = acls
            .iter_mut()
            .map(|acl| {
                OperationModel::new(acl)
                    .with_mutable_fields(fields)
                    .not_found_is_error(not_found_is_error)
            })
            .collect();
        ctx.model_client().create_or_update_ops(ops.clone(), &mut models)
    })
}

/// Inserts rules that do not exist yet and updates the non-default columns
/// of those that do.
pub fn create_or_update_acls_ops<D: Database>(
    ctx: &OpsContext<D>,
    ops: Vec<Operation>,
    acls: &mut [Acl],
) -> Result<Vec<Operation>, OpsError> {
    acl_ops(ctx, ops, acls, MutableFields::AllNonDefault, false)
}

/// Like [`create_or_update_acls_ops`] but every rule must already exist.
pub fn update_acls_ops<D: Database>(
    ctx: &OpsContext<D>,
    ops: Vec<Operation>,
    acls: &mut [Acl],
) -> Result<Vec<Operation>, OpsError> {
    acl_ops(ctx, ops, acls, MutableFields::AllNonDefault, true)
}

pub fn create_or_update_acls<D: Database>(
    ctx: &OpsContext<D>,
    acls: &mut [Acl],
) -> Result<(), OpsError> {
    let ops = create_or_update_acls_ops(ctx, Vec::new(), acls)?;
    ctx.commit(ops, acls)?;
    Ok(())
}

/// Rewrites only the logging columns of existing rules, including turning
/// logging off.
pub fn update_acls_logging_ops<D: Database>(
    ctx: &OpsContext<D>,
    ops: Vec<Operation>,
    acls: &mut [Acl],
) -> Result<Vec<Operation>, OpsError> {
    acl_ops(
        ctx,
        ops,
        acls,
        MutableFields::Columns(&["severity", "log"]),
        true,
    )
}

pub fn update_acls_logging<D: Database>(
    ctx: &OpsContext<D>,
    acls: &mut [Acl],
) -> Result<(), OpsError> {
    let ops = update_acls_logging_ops(ctx, Vec::new(), acls)?;
    ctx.commit(ops, acls)?;
    Ok(())
}

/// Deletes the cached rules equivalent to `acls`. Rules still referenced by
/// a switch or port group are rejected by the server, so detach first.
pub fn delete_acls_ops<D: Database>(
    ctx: &OpsContext<D>,
    ops: Vec<Operation>,
    acls: &mut [Acl],
) -> Result<Vec<Operation>, OpsError> {
    with_remediation(ctx, acls, |acls| {
        let mut models: Vec<OperationModel<'_, Acl>> =
            acls.iter_mut().map(OperationModel::new).collect();
        ctx.model_client().delete_ops(ops.clone(), &mut models)
    })
}

#[cfg(test)]
mod tests {
    use super::{Acl, AclAction, AclDirection, AclSeverity, acl_name, build_acl, set_acl_logging};
    use crate::catalog::types::{Datum, RowDecodeError};
    use crate::model::{MAX_NAME_LEN, Model};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn rule(name: &str, priority: i64, match_expr: &str) -> Acl {
        build_acl(
            name,
            AclDirection::ToLport,
            priority,
            match_expr,
            AclAction::AllowRelated,
            "",
            None,
            false,
            BTreeMap::new(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn build_acl_leaves_empty_optionals_unset() {
        let acl = rule("", 1000, "ip4");
        assert_eq!(acl.name, None);
        assert_eq!(acl.meter, None);
        assert_eq!(acl.severity, None);
        assert_eq!(acl_name(&acl), "");
    }

    #[test]
    fn row_round_trip_keeps_every_column() {
        let mut acl = rule("allow-dns", 1001, "udp.dst == 53");
        set_acl_logging(&mut acl, Some(AclSeverity::Warning), true);
        acl.meter = Some("acl-logging".into());
        acl.options.insert("apply-after-lb".into(), "true".into());

        let decoded = Acl::from_row("", &acl.to_row()).expect("decode");
        assert_eq!(decoded, acl);
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let row = rule("a", 1, "ip4").to_row().with("action", Datum::Str("pass".into()));
        let err = Acl::from_row("x", &row).expect_err("invalid action");
        assert_eq!(
            err,
            RowDecodeError::InvalidValue {
                column: "action".into(),
                value: "pass".into()
            }
        );
    }

    #[test]
    fn same_identifier_wins_over_content() {
        let mut existing = rule("a", 1, "ip4");
        existing.uuid = "7d0d9a7a-3b7e-4e62-9f3e-4f1f5f1d0a11".into();
        let mut searched = rule("b", 2, "ip6");
        searched.uuid = existing.uuid.clone();
        assert!(existing.is_equivalent(&searched));
    }

    #[test]
    fn same_name_requires_same_external_ids_before_falling_back() {
        let mut existing = rule("web", 1000, "ip4");
        existing.external_ids.insert("owner".into(), "ns1".into());
        let mut searched = rule("web", 1001, "ip4");
        assert!(!existing.is_equivalent(&searched));

        searched.external_ids = existing.external_ids.clone();
        assert!(existing.is_equivalent(&searched));
    }

    #[test]
    fn natural_key_ignores_name_and_logging() {
        let existing = rule("old-name", 1000, "ip4.src == 10.0.0.0/8");
        let mut searched = rule("new-name", 1000, "ip4.src == 10.0.0.0/8");
        set_acl_logging(&mut searched, Some(AclSeverity::Info), true);
        assert!(existing.is_equivalent(&searched));

        searched.action = AclAction::Drop;
        assert!(!existing.is_equivalent(&searched));
    }

    proptest! {
        #[test]
        fn built_names_never_exceed_the_cap(name in "\\PC{0,120}") {
            let acl = rule(&name, 1000, "ip4");
            prop_assert!(acl_name(&acl).chars().count() <= MAX_NAME_LEN);
            prop_assert!(name.starts_with(acl_name(&acl)));
        }

        #[test]
        fn rules_with_equal_natural_keys_are_equivalent(
            a in "[a-z]{0,10}",
            b in "[a-z]{0,10}",
            priority in 0i64..32768,
        ) {
            let existing = rule(&a, priority, "ip4");
            let searched = rule(&b, priority, "ip4");
            prop_assert!(existing.is_equivalent(&searched));
        }
    }
}
