//! The capability a concrete per-dialect driver must provide: begin/commit/
//! rollback plus whatever `ExecutionContext` statements run against. A real
//! implementation binds this to an actual connection pool; picking and
//! wiring one is left to the caller.
//!
//! Grounded on a `Transaction`-style trait: a thin capability interface the
//! engine depends on, rather than naming a concrete driver type.

use crate::migration::ExecutionContext;

/// A connection to the target database, scoped to one migration run.
///
/// `begin`/`commit`/`rollback` bound the transactional boundary a group runs
/// inside; `supports_ddl_transactions` lets the planner warn when a group
/// mixes transactional migrations with a database that cannot actually roll
/// back DDL.
pub trait DatabaseAdapter {
    type Error: std::error::Error + Send + Sync + 'static;
    type Context: ExecutionContext;

    /// Whether this database rolls back DDL statements inside a transaction
    /// (PostgreSQL: yes; MySQL/SQLite in practice: no).
    fn supports_ddl_transactions(&self) -> bool;

    /// Begin a transaction and hand back the [`ExecutionContext`] migrations
    /// execute against.
    fn begin(&mut self) -> Result<Self::Context, Self::Error>;

    fn commit(&mut self, context: Self::Context) -> Result<(), Self::Error>;

    fn rollback(&mut self, context: Self::Context) -> Result<(), Self::Error>;

    /// An `ExecutionContext` usable outside any transaction, for
    /// non-transactional statements and for `group = false` runs.
    fn autocommit_context(&mut self) -> Result<Self::Context, Self::Error>;
}
