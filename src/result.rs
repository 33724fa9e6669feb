//! The structured summary returned by a successful (or partially successful,
//! via [`crate::error::Error::result`]) migration run.

use crate::migration::{AppliedMigration, MigrationType};
use crate::version::MigrationVersion;

/// One migration applied during a run, as reported back to the caller.
/// A thinner projection of [`AppliedMigration`] aimed at run reporting
/// rather than schema-history storage.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppliedMigrationReport {
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub migration_type: MigrationType,
    pub script: String,
    pub execution_time_millis: i64,
    /// Whether this migration's attempt succeeded. `false` marks the entry
    /// that aborted the group; entries after it in `migrations` (if any)
    /// were never attempted.
    pub success: bool,
}

impl From<&AppliedMigration> for AppliedMigrationReport {
    fn from(m: &AppliedMigration) -> Self {
        AppliedMigrationReport {
            version: m.version.clone(),
            description: m.description.clone(),
            migration_type: m.migration_type,
            script: m.script.clone(),
            execution_time_millis: m.execution_time_millis,
            success: m.success,
        }
    }
}

/// The outcome of one call to the migration executor.
///
/// A summary a caller can log or render without re-querying the schema
/// history store, plus enough detail to diagnose a partial failure.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MigrateResult {
    pub schema_name: String,
    pub initial_schema_version: Option<MigrationVersion>,
    pub target_schema_version: Option<MigrationVersion>,
    pub migrations: Vec<AppliedMigrationReport>,
    pub warnings: Vec<String>,
    pub success: bool,
}

impl MigrateResult {
    pub fn new(schema_name: impl Into<String>) -> MigrateResult {
        MigrateResult {
            schema_name: schema_name.into(),
            initial_schema_version: None,
            target_schema_version: None,
            migrations: Vec::new(),
            warnings: Vec::new(),
            success: false,
        }
    }

    pub fn migrations_executed(&self) -> usize {
        self.migrations.len()
    }

    pub(crate) fn record(&mut self, applied: &AppliedMigration) {
        self.target_schema_version = applied.version.clone().or(self.target_schema_version.clone());
        self.migrations.push(AppliedMigrationReport::from(applied));
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}
