pub mod catalog;
pub mod client;
pub mod commit;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod memdb;
pub mod model;
pub mod remediation;
pub mod sync_bridge;

pub use client::{Matcher, ModelClient, OperationModel};
pub use commit::ops::{Mutation, Mutator, Operation, OperationResult};
pub use commit::transactor::Transactor;
pub use config::OpsConfig;
pub use context::OpsContext;
pub use database::{Cache, CacheError, Database};
pub use error::{OpsError, OpsErrorCode, TransportError};
pub use memdb::MemoryDatabase;
pub use model::{Detachable, Model, MutableFields};
pub use remediation::{RemediationOutcome, remediate_duplicates};
