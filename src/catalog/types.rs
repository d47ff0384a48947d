use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DatumKind {
    Str,
    Int,
    Bool,
    OptStr,
    Map,
    UuidSet,
}

impl DatumKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DatumKind::Str => "Str",
            DatumKind::Int => "Int",
            DatumKind::Bool => "Bool",
            DatumKind::OptStr => "OptStr",
            DatumKind::Map => "Map",
            DatumKind::UuidSet => "UuidSet",
        }
    }
}

/// One column value as the database stores it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Datum {
    Str(String),
    Int(i64),
    Bool(bool),
    OptStr(Option<String>),
    Map(BTreeMap<String, String>),
    UuidSet(BTreeSet<String>),
}

impl Datum {
    pub fn kind(&self) -> DatumKind {
        match self {
            Datum::Str(_) => DatumKind::Str,
            Datum::Int(_) => DatumKind::Int,
            Datum::Bool(_) => DatumKind::Bool,
            Datum::OptStr(_) => DatumKind::OptStr,
            Datum::Map(_) => DatumKind::Map,
            Datum::UuidSet(_) => DatumKind::UuidSet,
        }
    }

    /// Zero value test used when only non-default fields are written.
    pub fn is_default(&self) -> bool {
        match self {
            Datum::Str(v) => v.is_empty(),
            Datum::Int(v) => *v == 0,
            Datum::Bool(v) => !*v,
            Datum::OptStr(v) => v.is_none(),
            Datum::Map(v) => v.is_empty(),
            Datum::UuidSet(v) => v.is_empty(),
        }
    }

    pub fn default_for(kind: DatumKind) -> Datum {
        match kind {
            DatumKind::Str => Datum::Str(String::new()),
            DatumKind::Int => Datum::Int(0),
            DatumKind::Bool => Datum::Bool(false),
            DatumKind::OptStr => Datum::OptStr(None),
            DatumKind::Map => Datum::Map(BTreeMap::new()),
            DatumKind::UuidSet => Datum::UuidSet(BTreeSet::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowDecodeError {
    #[error("missing column '{column}' in table '{table}'")]
    MissingColumn { table: &'static str, column: String },
    #[error("column '{column}' type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("column '{column}' has invalid value '{value}'")]
    InvalidValue { column: String, value: String },
}

/// Column name to value, without the row identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Row {
    pub columns: BTreeMap<String, Datum>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: Datum) -> Self {
        self.columns.insert(column.into(), value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Datum) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Datum> {
        self.columns.get(column)
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut Datum> {
        self.columns.get_mut(column)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Datum)> {
        self.columns.iter()
    }

    pub fn text(&self, table: &'static str, column: &str) -> Result<&str, RowDecodeError> {
        match self.require(table, column)? {
            Datum::Str(v) => Ok(v.as_str()),
            other => Err(mismatch(column, DatumKind::Str, other)),
        }
    }

    pub fn integer(&self, table: &'static str, column: &str) -> Result<i64, RowDecodeError> {
        match self.require(table, column)? {
            Datum::Int(v) => Ok(*v),
            other => Err(mismatch(column, DatumKind::Int, other)),
        }
    }

    pub fn boolean(&self, table: &'static str, column: &str) -> Result<bool, RowDecodeError> {
        match self.require(table, column)? {
            Datum::Bool(v) => Ok(*v),
            other => Err(mismatch(column, DatumKind::Bool, other)),
        }
    }

    /// Optional columns decode as `None` when absent from the row.
    pub fn optional_text(&self, column: &str) -> Result<Option<&str>, RowDecodeError> {
        match self.columns.get(column) {
            None | Some(Datum::OptStr(None)) => Ok(None),
            Some(Datum::OptStr(Some(v))) => Ok(Some(v.as_str())),
            Some(other) => Err(mismatch(column, DatumKind::OptStr, other)),
        }
    }

    pub fn map(&self, column: &str) -> Result<BTreeMap<String, String>, RowDecodeError> {
        match self.columns.get(column) {
            None => Ok(BTreeMap::new()),
            Some(Datum::Map(v)) => Ok(v.clone()),
            Some(other) => Err(mismatch(column, DatumKind::Map, other)),
        }
    }

    pub fn uuid_set(&self, column: &str) -> Result<BTreeSet<String>, RowDecodeError> {
        match self.columns.get(column) {
            None => Ok(BTreeSet::new()),
            Some(Datum::UuidSet(v)) => Ok(v.clone()),
            Some(other) => Err(mismatch(column, DatumKind::UuidSet, other)),
        }
    }

    fn require(&self, table: &'static str, column: &str) -> Result<&Datum, RowDecodeError> {
        self.columns
            .get(column)
            .ok_or_else(|| RowDecodeError::MissingColumn {
                table,
                column: column.to_string(),
            })
    }
}

fn mismatch(column: &str, expected: DatumKind, actual: &Datum) -> RowDecodeError {
    RowDecodeError::TypeMismatch {
        column: column.to_string(),
        expected: expected.as_str(),
        actual: actual.kind().as_str(),
    }
}

const NAMED_UUID_PREFIX: char = 'u';

/// Placeholder identifier for a row inserted in a pending transaction. The
/// server replaces it with a real identifier on commit.
pub fn new_named_uuid() -> String {
    format!("{NAMED_UUID_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

pub fn is_named_uuid(id: &str) -> bool {
    !id.is_empty() && uuid::Uuid::parse_str(id).is_err()
}

#[cfg(test)]
mod tests {
    use super::{Datum, DatumKind, Row, RowDecodeError, is_named_uuid, new_named_uuid};
    use std::collections::BTreeSet;

    #[test]
    fn default_datums_report_default() {
        for kind in [
            DatumKind::Str,
            DatumKind::Int,
            DatumKind::Bool,
            DatumKind::OptStr,
            DatumKind::Map,
            DatumKind::UuidSet,
        ] {
            let datum = Datum::default_for(kind);
            assert!(datum.is_default(), "{kind:?} default");
            assert_eq!(datum.kind(), kind);
        }
        assert!(!Datum::Bool(true).is_default());
        assert!(!Datum::OptStr(Some(String::new())).is_default());
    }

    #[test]
    fn typed_accessors_report_mismatch_and_missing() {
        let row = Row::new()
            .with("priority", Datum::Int(1001))
            .with("match", Datum::Str("ip4".into()));

        assert_eq!(row.integer("ACL", "priority"), Ok(1001));
        assert_eq!(
            row.boolean("ACL", "match"),
            Err(RowDecodeError::TypeMismatch {
                column: "match".into(),
                expected: "Bool",
                actual: "Str",
            })
        );
        assert!(matches!(
            row.text("ACL", "action"),
            Err(RowDecodeError::MissingColumn { .. })
        ));
        assert_eq!(row.optional_text("meter"), Ok(None));
        assert_eq!(row.uuid_set("acls"), Ok(BTreeSet::new()));
    }

    #[test]
    fn named_uuids_are_distinguishable_from_server_uuids() {
        let named = new_named_uuid();
        assert!(is_named_uuid(&named));
        assert!(!is_named_uuid(&uuid::Uuid::new_v4().to_string()));
        assert!(!is_named_uuid(""));
    }
}
