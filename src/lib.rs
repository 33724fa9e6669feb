//! `strata-migrate`: plans, groups and runs versioned and repeatable schema
//! migrations against a schema history table, in the manner of Flyway's
//! core engine. Concrete per-dialect drivers, a CLI, migration discovery
//! from the filesystem, and a callback registry are external concerns —
//! this crate depends on the capability traits in [`adapter`], [`history`]
//! and [`callback`], not on any one database or resolver.

pub mod adapter;
pub mod callback;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod info;
pub mod migration;
pub mod parser;
pub mod planner;
pub mod result;
pub mod template;
pub mod version;

pub use crate::adapter::DatabaseAdapter;
pub use crate::callback::{CallbackHandler, Event, NoopCallbackHandler};
pub use crate::config::{CherryPick, Configuration, IgnorePattern};
pub use crate::error::{Error, Kind, WrapMigrationError};
pub use crate::executor::{migrate, NoopProgressReporter, ProgressReporter};
pub use crate::history::SchemaHistoryStore;
pub use crate::info::{MigrationInfo, MigrationInfoService, MigrationState};
pub use crate::migration::{
    checksum, AppliedMigration, ExecutionContext, MigrationBody, MigrationType, ResolvedMigration,
    TransactionBehavior,
};
pub use crate::planner::{plan_next_group, MigrationGroup};
pub use crate::result::{AppliedMigrationReport, MigrateResult};
pub use crate::template::run_in_boundary;
pub use crate::version::{MigrationVersion, Target};
