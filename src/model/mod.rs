pub mod acl;
pub mod logical_switch;
pub mod port_group;

use crate::catalog::types::{Datum, Row, RowDecodeError};
use crate::commit::ops::Operation;
use crate::context::OpsContext;
use crate::database::Database;
use crate::error::OpsError;
use std::collections::BTreeMap;
use std::fmt;

/// Maximum length, in characters, of a stored record name.
pub const MAX_NAME_LEN: usize = 63;

/// Truncates `name` to [`MAX_NAME_LEN`] characters.
pub fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_NAME_LEN).collect()
}

/// Capabilities every entity kind provides so the model client, transactor
/// and remediator can be written once.
pub trait Model: Clone + fmt::Debug + Send + Sync + 'static {
    const TABLE: &'static str;

    /// Server identifier, a named placeholder while an insert is pending,
    /// or empty.
    fn uuid(&self) -> &str;

    fn set_uuid(&mut self, uuid: String);

    fn to_row(&self) -> Row;

    fn from_row(uuid: &str, row: &Row) -> Result<Self, RowDecodeError>;

    fn name(&self) -> Option<&str> {
        None
    }

    fn external_ids(&self) -> Option<&BTreeMap<String, String>> {
        None
    }

    /// Kind-specific identity over the required fields, consulted when
    /// neither identifier nor name settles equivalence.
    fn same_natural_key(&self, other: &Self) -> bool;

    /// Canonicalizes caller input before it is matched or stored.
    fn normalize(&mut self) {}

    /// Whether `self`, an existing record, denotes the same object as
    /// `searched`. First rule that applies wins: equal identifiers, then
    /// equal names with equal external ids, then the natural key.
    fn is_equivalent(&self, searched: &Self) -> bool {
        if !searched.uuid().is_empty() && self.uuid() == searched.uuid() {
            return true;
        }
        if let (Some(existing), Some(wanted)) = (self.name(), searched.name())
            && !existing.is_empty()
            && existing == wanted
            && self.external_ids() == searched.external_ids()
        {
            return true;
        }
        self.same_natural_key(searched)
    }
}

/// Columns of an existing record an update may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutableFields {
    /// Every column whose desired value is not the zero value.
    #[default]
    AllNonDefault,
    Columns(&'static [&'static str]),
}

impl MutableFields {
    pub fn includes(&self, column: &str, desired: &Datum) -> bool {
        match self {
            MutableFields::AllNonDefault => !desired.is_default(),
            MutableFields::Columns(columns) => columns.contains(&column),
        }
    }
}

/// Kinds that containers reference and that can therefore be detached from
/// every container during duplicate cleanup.
pub trait Detachable: Model {
    fn detach_ops<D: Database>(
        ctx: &OpsContext<D>,
        ops: Vec<Operation>,
        duplicates: &[Self],
    ) -> Result<Vec<Operation>, OpsError>;
}
