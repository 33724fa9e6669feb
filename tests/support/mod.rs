//! An in-memory `SchemaHistoryStore` + `DatabaseAdapter` pair used by the
//! integration suites in this directory. Scaled-down stand-ins for the real
//! per-dialect drivers (`rusqlite`, `postgres`) a production caller would
//! wire up instead; connecting one of those is left to the caller, so the
//! suites below exercise the engine against plain `Vec`s.

use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use strata_migrate::{
    AppliedMigration, DatabaseAdapter, ExecutionContext, MigrationBody, MigrationType,
    ResolvedMigration, SchemaHistoryStore, TransactionBehavior,
};

#[derive(Debug)]
pub struct MemoryError(pub String);

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StdError for MemoryError {}

/// A schema history backed by a plain `Vec`, with a reentrant no-op lock
/// (there is only ever one logical connection in these tests, so there is
/// nothing to serialize against).
#[derive(Default)]
pub struct MemoryHistoryStore {
    table_exists: bool,
    rows: Vec<AppliedMigration>,
}

impl MemoryHistoryStore {
    pub fn new() -> MemoryHistoryStore {
        MemoryHistoryStore::default()
    }

    pub fn rows(&self) -> &[AppliedMigration] {
        &self.rows
    }
}

impl SchemaHistoryStore for MemoryHistoryStore {
    type Error = MemoryError;

    fn exists(&mut self) -> Result<bool, Self::Error> {
        Ok(self.table_exists)
    }

    fn create(&mut self) -> Result<(), Self::Error> {
        self.table_exists = true;
        Ok(())
    }

    fn add_applied_migration(&mut self, row: AppliedMigration) -> Result<(), Self::Error> {
        self.rows.push(row);
        Ok(())
    }

    fn all_applied_migrations(&mut self) -> Result<Vec<AppliedMigration>, Self::Error> {
        Ok(self.rows.clone())
    }

    fn lock<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, Box<dyn StdError + Send + Sync>>,
    ) -> Result<T, Box<dyn StdError + Send + Sync>> {
        body(self)
    }
}

#[derive(Default)]
struct Log {
    executed: Vec<String>,
    copies: Vec<(String, String)>,
    fail_on: Option<String>,
}

/// An `ExecutionContext` that records every statement it was asked to run
/// into a log shared with the [`MemoryAdapter`] that created it, so tests
/// can assert on what the engine actually sent without a real connection.
pub struct MemoryContext(Rc<RefCell<Log>>);

impl ExecutionContext for MemoryContext {
    fn execute_statement(&mut self, sql: &str) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let mut log = self.0.borrow_mut();
        if log.fail_on.as_deref() == Some(sql) {
            return Err(Box::new(MemoryError(format!("statement failed: {sql}"))));
        }
        log.executed.push(sql.to_string());
        Ok(())
    }

    fn execute_copy(&mut self, sql: &str, payload: &str) -> Result<(), Box<dyn StdError + Send + Sync>> {
        self.0.borrow_mut().copies.push((sql.to_string(), payload.to_string()));
        Ok(())
    }
}

/// A `DatabaseAdapter` handing out [`MemoryContext`] values that all share
/// one log, configurable to report whether it "supports" DDL transactions
/// (mirroring PostgreSQL vs. MySQL/SQLite in the real adapter matrix).
pub struct MemoryAdapter {
    supports_ddl_transactions: bool,
    log: Rc<RefCell<Log>>,
}

impl MemoryAdapter {
    pub fn new(supports_ddl_transactions: bool) -> MemoryAdapter {
        MemoryAdapter {
            supports_ddl_transactions,
            log: Rc::new(RefCell::new(Log::default())),
        }
    }

    /// Make the next statement matching `sql` fail when executed, to drive
    /// the failure-path scenarios.
    pub fn fail_on(self, sql: impl Into<String>) -> MemoryAdapter {
        self.log.borrow_mut().fail_on = Some(sql.into());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.log.borrow().executed.clone()
    }

    pub fn copies(&self) -> Vec<(String, String)> {
        self.log.borrow().copies.clone()
    }
}

impl DatabaseAdapter for MemoryAdapter {
    type Error = MemoryError;
    type Context = MemoryContext;

    fn supports_ddl_transactions(&self) -> bool {
        self.supports_ddl_transactions
    }

    fn begin(&mut self) -> Result<Self::Context, Self::Error> {
        Ok(MemoryContext(self.log.clone()))
    }

    fn commit(&mut self, _context: Self::Context) -> Result<(), Self::Error> {
        Ok(())
    }

    fn rollback(&mut self, _context: Self::Context) -> Result<(), Self::Error> {
        Ok(())
    }

    fn autocommit_context(&mut self) -> Result<Self::Context, Self::Error> {
        Ok(MemoryContext(self.log.clone()))
    }
}

/// A [`MigrationBody`] that replays a fixed list of statements against
/// whatever [`ExecutionContext`] it's handed, with a chosen transactional
/// classification. Stands in for what a real parsed-and-tokenized script
/// body would do, without needing an actual dialect parser wired up.
#[derive(Debug)]
pub struct ScriptBody {
    statements: Vec<&'static str>,
    behavior: TransactionBehavior,
}

impl ScriptBody {
    pub fn new(statements: Vec<&'static str>) -> ScriptBody {
        ScriptBody {
            statements,
            behavior: TransactionBehavior::Inherit,
        }
    }

    pub fn non_transactional(statements: Vec<&'static str>) -> ScriptBody {
        ScriptBody {
            statements,
            behavior: TransactionBehavior::No,
        }
    }
}

impl MigrationBody for ScriptBody {
    fn can_execute_in_transaction(&self) -> TransactionBehavior {
        self.behavior
    }

    fn execute(&self, context: &mut dyn ExecutionContext) -> Result<(), Box<dyn StdError + Send + Sync>> {
        for statement in &self.statements {
            context.execute_statement(statement)?;
        }
        Ok(())
    }
}

/// Build a versioned [`ResolvedMigration`] running `statements` in order.
pub fn versioned(version: &str, description: &str, statements: Vec<&'static str>) -> ResolvedMigration {
    use std::sync::Arc;
    use strata_migrate::MigrationVersion;

    ResolvedMigration::new(
        Some(MigrationVersion::parse(version).unwrap()),
        description,
        MigrationType::Sql,
        format!("V{version}__{description}.sql"),
        Some(strata_migrate::checksum(statements.join(";").as_str())),
        Arc::new(ScriptBody::new(statements)) as Arc<dyn MigrationBody>,
    )
}

/// Build a non-transactional versioned [`ResolvedMigration`] (e.g. standing
/// in for `CREATE INDEX CONCURRENTLY`).
pub fn versioned_non_transactional(
    version: &str,
    description: &str,
    statements: Vec<&'static str>,
) -> ResolvedMigration {
    use std::sync::Arc;
    use strata_migrate::MigrationVersion;

    ResolvedMigration::new(
        Some(MigrationVersion::parse(version).unwrap()),
        description,
        MigrationType::Sql,
        format!("V{version}__{description}.sql"),
        Some(strata_migrate::checksum(statements.join(";").as_str())),
        Arc::new(ScriptBody::non_transactional(statements)) as Arc<dyn MigrationBody>,
    )
}

