#![allow(dead_code)]

use nbdb_ops::model::Model;
use nbdb_ops::model::acl::{Acl, AclAction, AclDirection, build_acl};
use nbdb_ops::{MemoryDatabase, Operation, OpsConfig, OpsContext};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Handle;

pub fn context(db: &Arc<MemoryDatabase>, config: OpsConfig) -> OpsContext<MemoryDatabase> {
    OpsContext::new(Arc::clone(db), Handle::current(), config).expect("context")
}

pub fn rule(name: &str, priority: i64, match_expr: &str) -> Acl {
    build_acl(
        name,
        AclDirection::FromLport,
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

/// Insert operation for `record` exactly as given, bypassing equivalence.
pub fn raw_insert<M: Model>(uuid_name: &str, record: &M) -> Operation {
    Operation::Insert {
        table: M::TABLE.to_string(),
        uuid_name: uuid_name.to_string(),
        row: record.to_row(),
    }
}
