pub mod types;

use crate::catalog::types::DatumKind;
use std::collections::BTreeMap;

pub const ACL_TABLE: &str = "ACL";
pub const LOGICAL_SWITCH_TABLE: &str = "Logical_Switch";
pub const PORT_GROUP_TABLE: &str = "Port_Group";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: &'static str,
    pub kind: DatumKind,
    /// Table whose rows this column references (set columns only).
    pub ref_table: Option<&'static str>,
}

impl ColumnSchema {
    pub const fn new(name: &'static str, kind: DatumKind) -> Self {
        Self {
            name,
            kind,
            ref_table: None,
        }
    }

    pub const fn references(name: &'static str, table: &'static str) -> Self {
        Self {
            name,
            kind: DatumKind::UuidSet,
            ref_table: Some(table),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    /// Rows of non-root tables only live while something references them.
    pub is_root: bool,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: BTreeMap<&'static str, TableSchema>,
}

impl Schema {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.name, t)).collect(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// `(table, column, referenced table)` for every reference column.
    pub fn references(&self) -> Vec<(&'static str, &'static str, &'static str)> {
        self.tables
            .values()
            .flat_map(|t| {
                t.columns
                    .iter()
                    .filter_map(move |c| c.ref_table.map(|r| (t.name, c.name, r)))
            })
            .collect()
    }
}

/// The northbound tables this crate models.
pub fn northbound_schema() -> Schema {
    Schema::new(vec![
        TableSchema {
            name: ACL_TABLE,
            is_root: false,
            columns: vec![
                ColumnSchema::new("name", DatumKind::OptStr),
                ColumnSchema::new("direction", DatumKind::Str),
                ColumnSchema::new("priority", DatumKind::Int),
                ColumnSchema::new("match", DatumKind::Str),
                ColumnSchema::new("action", DatumKind::Str),
                ColumnSchema::new("log", DatumKind::Bool),
                ColumnSchema::new("severity", DatumKind::OptStr),
                ColumnSchema::new("meter", DatumKind::OptStr),
                ColumnSchema::new("external_ids", DatumKind::Map),
                ColumnSchema::new("options", DatumKind::Map),
            ],
        },
        TableSchema {
            name: LOGICAL_SWITCH_TABLE,
            is_root: true,
            columns: vec![
                ColumnSchema::new("name", DatumKind::Str),
                ColumnSchema::references("acls", ACL_TABLE),
                ColumnSchema::new("external_ids", DatumKind::Map),
                ColumnSchema::new("other_config", DatumKind::Map),
            ],
        },
        TableSchema {
            name: PORT_GROUP_TABLE,
            is_root: true,
            columns: vec![
                ColumnSchema::new("name", DatumKind::Str),
                ColumnSchema::references("acls", ACL_TABLE),
                ColumnSchema::new("external_ids", DatumKind::Map),
            ],
        },
    ])
}
