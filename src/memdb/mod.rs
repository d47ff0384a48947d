//! In-process table server with the transaction semantics of the
//! configuration database: all-or-nothing commits, named identifiers,
//! referential integrity and optional garbage collection of unreferenced
//! rows. Its cache mirror follows commits unless frozen.

mod txn;

use crate::catalog::types::Row;
use crate::catalog::{Schema, northbound_schema};
use crate::commit::ops::{Operation, OperationResult};
use crate::database::{Cache, CacheError, Database};
use crate::error::TransportError;
use im::OrdMap;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use txn::Txn;

pub(crate) type TableRows = OrdMap<String, Row>;
pub(crate) type Tables = OrdMap<String, TableRows>;

#[derive(Debug, Default)]
struct Faults {
    fail_next: Option<TransportError>,
    latency: Duration,
}

pub struct MemoryDatabase {
    schema: Schema,
    server: RwLock<Tables>,
    mirror: RwLock<Tables>,
    cache_frozen: AtomicBool,
    gc_unreferenced: bool,
    faults: Mutex<Faults>,
    transact_calls: AtomicU64,
    commits: AtomicU64,
}

impl MemoryDatabase {
    pub fn new(schema: Schema) -> Self {
        let tables: Tables = schema
            .tables()
            .map(|t| (t.name.to_string(), TableRows::new()))
            .collect();
        Self {
            schema,
            server: RwLock::new(tables.clone()),
            mirror: RwLock::new(tables),
            cache_frozen: AtomicBool::new(false),
            gc_unreferenced: false,
            faults: Mutex::new(Faults::default()),
            transact_calls: AtomicU64::new(0),
            commits: AtomicU64::new(0),
        }
    }

    pub fn northbound() -> Self {
        Self::new(northbound_schema())
    }

    /// Drop rows of non-root tables once nothing references them.
    pub fn with_garbage_collection(mut self, enabled: bool) -> Self {
        self.gc_unreferenced = enabled;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Stops propagating commits to the cache mirror.
    pub fn freeze_cache(&self) {
        self.cache_frozen.store(true, Ordering::Release);
    }

    /// Brings the cache mirror up to the server state and resumes
    /// propagation.
    pub fn sync_cache(&self) {
        let server = self.server.read().clone();
        *self.mirror.write() = server;
        self.cache_frozen.store(false, Ordering::Release);
    }

    pub fn fail_next_transact(&self, err: TransportError) {
        self.faults.lock().fail_next = Some(err);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.faults.lock().latency = latency;
    }

    pub fn transact_calls(&self) -> u64 {
        self.transact_calls.load(Ordering::Acquire)
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    /// Server-side rows of `table`, bypassing the cache mirror.
    pub fn server_rows(&self, table: &str) -> Vec<(String, Row)> {
        self.server
            .read()
            .get(table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn server_row(&self, table: &str, uuid: &str) -> Option<Row> {
        self.server
            .read()
            .get(table)
            .and_then(|rows| rows.get(uuid).cloned())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.server.read().get(table).map_or(0, |rows| rows.len())
    }

    fn apply(&self, ops: &[Operation]) -> Vec<OperationResult> {
        let mut server = self.server.write();
        let mut txn = Txn::new(&self.schema, server.clone());
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            match txn.apply(op) {
                Ok(result) => results.push(result),
                Err(failure) => {
                    debug!(table = op.table(), kind = op.kind(), error = failure.error, "operation failed");
                    results.push(OperationResult::failed(failure.error, failure.details));
                    return results;
                }
            }
        }
        if let Err(failure) = txn.check_references() {
            results.push(OperationResult::failed(failure.error, failure.details));
            return results;
        }
        if self.gc_unreferenced {
            txn.collect_garbage();
        }
        *server = txn.into_tables();
        self.commits.fetch_add(1, Ordering::AcqRel);
        if !self.cache_frozen.load(Ordering::Acquire) {
            *self.mirror.write() = server.clone();
        }
        results
    }
}

impl Cache for MemoryDatabase {
    fn rows(&self, table: &str) -> Result<Vec<(String, Row)>, CacheError> {
        let mirror = self.mirror.read();
        let rows = mirror
            .get(table)
            .ok_or_else(|| CacheError::UnknownTable(table.to_string()))?;
        Ok(rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl Database for MemoryDatabase {
    fn transact(
        &self,
        ops: Vec<Operation>,
    ) -> impl Future<Output = Result<Vec<OperationResult>, TransportError>> + Send {
        async move {
            self.transact_calls.fetch_add(1, Ordering::AcqRel);
            let (fault, latency) = {
                let mut faults = self.faults.lock();
                (faults.fail_next.take(), faults.latency)
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if let Some(err) = fault {
                return Err(err);
            }
            Ok(self.apply(&ops))
        }
    }
}
