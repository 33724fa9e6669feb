use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use siphasher::sip::SipHasher13;
use time::OffsetDateTime;

use crate::error::Error;
use crate::version::MigrationVersion;

/// The checksum recorded in schema history and compared on reapply.
/// `SipHasher13` rather than the `Hash`/`DefaultHasher` pair in `std`: the
/// default hasher is explicitly documented as unspecified across compiler
/// versions, which would silently invalidate every stored checksum on a
/// toolchain upgrade.
pub fn checksum(script_text: &str) -> i64 {
    let mut hasher = SipHasher13::new();
    script_text.hash(&mut hasher);
    hasher.finish() as i64
}

/// The kind of migration, carried through to schema history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MigrationType {
    Sql,
    Procedural,
    Baseline,
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationType::Sql => "SQL",
            MigrationType::Procedural => "PROCEDURAL",
            MigrationType::Baseline => "BASELINE",
        };
        write!(f, "{s}")
    }
}

/// Three-valued transactionality: `Yes`/`No` are explicit, `Inherit` defers
/// to the engine's default for the group. Modeled as an enum rather than
/// `Option<bool>` so call sites read as a decision rather than a maybe-value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionBehavior {
    Yes,
    No,
    Inherit,
}

impl TransactionBehavior {
    /// Resolve `Inherit` to the engine default (migrations run in a
    /// transaction unless told otherwise).
    pub fn resolve(self) -> bool {
        match self {
            TransactionBehavior::Yes | TransactionBehavior::Inherit => true,
            TransactionBehavior::No => false,
        }
    }
}

/// A live database connection handed to a migration body, scoped to the
/// target schema. The concrete connection type is supplied by the caller's
/// `DatabaseAdapter` implementation; the engine never names it directly.
pub trait ExecutionContext {
    /// Execute a raw SQL statement against the migration connection.
    fn execute_statement(&mut self, sql: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Execute a statement carrying an inline bulk-copy payload (e.g.
    /// PostgreSQL `COPY ... FROM STDIN`). Adapters without bulk-copy support
    /// may treat `payload` as opaque and reject it.
    fn execute_copy(
        &mut self,
        sql: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let _ = payload;
        self.execute_statement(sql)
    }

    /// Switch the schema subsequent statements run against. A connection
    /// already scoped to a single schema may no-op.
    fn set_current_schema(&mut self, schema: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let _ = schema;
        Ok(())
    }

    /// Restore dialect-specific session state (session variables,
    /// `foreign_key_checks`, search_path) to what it was when the connection
    /// was opened, so each migration starts from a known baseline.
    fn reset_session_state(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// A capability that knows how to run a single resolved migration's body.
/// Distinct from [`ExecutionContext`]: this is the migration's own logic
/// (a sequence of parsed statements, or a procedural callback), not the
/// connection it runs against.
pub trait MigrationBody: fmt::Debug + Send + Sync {
    fn can_execute_in_transaction(&self) -> TransactionBehavior;
    fn execute(&self, context: &mut dyn ExecutionContext) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A migration produced by the (external) resolver, not yet applied.
///
/// Absence of `version` marks a repeatable migration.
#[derive(Clone, Debug)]
pub struct ResolvedMigration {
    version: Option<MigrationVersion>,
    description: String,
    migration_type: MigrationType,
    script: String,
    checksum: Option<i64>,
    executor: Arc<dyn MigrationBody>,
}

impl ResolvedMigration {
    pub fn new(
        version: Option<MigrationVersion>,
        description: impl Into<String>,
        migration_type: MigrationType,
        script: impl Into<String>,
        checksum: Option<i64>,
        executor: Arc<dyn MigrationBody>,
    ) -> ResolvedMigration {
        ResolvedMigration {
            version,
            description: description.into(),
            migration_type,
            script: script.into(),
            checksum,
            executor,
        }
    }

    pub fn version(&self) -> Option<&MigrationVersion> {
        self.version.as_ref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn migration_type(&self) -> MigrationType {
        self.migration_type
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn checksum(&self) -> Option<i64> {
        self.checksum
    }

    pub fn is_repeatable(&self) -> bool {
        self.version.is_none()
    }

    pub fn can_execute_in_transaction(&self) -> TransactionBehavior {
        self.executor.can_execute_in_transaction()
    }

    pub fn execute(&self, context: &mut dyn ExecutionContext) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.executor.execute(context)
    }

    /// A human-readable identifier for error messages: `V1.2 (add users)` or
    /// `R (seed lookup data)` for repeatables.
    pub fn identifier(&self) -> String {
        match &self.version {
            Some(v) => format!("V{v} ({})", self.description),
            None => format!("R ({})", self.description),
        }
    }
}

/// A row in schema history: a migration previously recorded as applied
/// (successfully or not).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppliedMigration {
    pub installed_rank: i32,
    #[cfg_attr(feature = "serde", serde(with = "version_serde"))]
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub migration_type: MigrationType,
    pub script: String,
    pub checksum: Option<i64>,
    pub installed_by: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub installed_on: OffsetDateTime,
    pub execution_time_millis: i64,
    pub success: bool,
}

/// `MigrationVersion` is not itself serde-friendly (it holds a parsed
/// component vector); history rows round-trip it as its canonical string.
#[cfg(feature = "serde")]
mod version_serde {
    use crate::version::MigrationVersion;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<MigrationVersion>, s: S) -> Result<S::Ok, S::Error> {
        v.as_ref().map(|v| v.as_str().to_string()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<MigrationVersion>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(s) => MigrationVersion::parse(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

impl AppliedMigration {
    /// Whether `resolved`'s checksum matches this row's, treating a stored
    /// `NULL` checksum as matching any resolved checksum (the baseline/
    /// repair case).
    pub fn checksum_matches(&self, resolved: &ResolvedMigration) -> bool {
        match self.checksum {
            None => true,
            Some(stored) => Some(stored) == resolved.checksum(),
        }
    }

    pub fn identifier(&self) -> String {
        match &self.version {
            Some(v) => format!("V{v} ({})", self.description),
            None => format!("R ({})", self.description),
        }
    }
}

impl Error {
    pub(crate) fn migration_failed(schema: &str, migration: &str, reason: impl fmt::Display) -> Error {
        Error::new(
            crate::error::Kind::MigrationFailed {
                schema: schema.to_string(),
                migration: migration.to_string(),
                reason: reason.to_string(),
            },
            None,
        )
    }
}
