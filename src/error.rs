use std::fmt;
use thiserror::Error as TError;

use crate::result::MigrateResult;

/// An error occurred while planning or running a migration cycle.
///
/// Carries a partial-result pattern: when a failure happens mid-run,
/// whatever [`MigrateResult`] had been assembled so far is still reachable
/// through [`Error::result`], so a caller can inspect which migrations did
/// apply before the failure.
#[derive(Debug)]
pub struct Error {
    kind: Box<Kind>,
    result: Option<MigrateResult>,
}

impl Error {
    pub(crate) fn new(kind: Kind, result: Option<MigrateResult>) -> Error {
        Error {
            kind: Box::new(kind),
            result,
        }
    }

    /// The partial [`MigrateResult`] accumulated before this error, if any.
    pub fn result(&self) -> Option<&MigrateResult> {
        self.result.as_ref()
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Recover an `Error` from a boxed error that may or may not already be
    /// one, e.g. the error a [`crate::history::SchemaHistoryStore::lock`]
    /// closure returned. An `Error` put into the box by an earlier `?` comes
    /// back out unchanged; anything else is wrapped as [`Kind::Adapter`].
    pub(crate) fn from_boxed(
        err: Box<dyn std::error::Error + Send + Sync>,
        context: &str,
        result_so_far: Option<MigrateResult>,
    ) -> Error {
        match err.downcast::<Error>() {
            Ok(err) => *err,
            Err(err) => Error::new(
                Kind::Adapter {
                    context: context.to_string(),
                    source: err,
                },
                result_so_far,
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

/// The error taxonomy this crate produces. Each variant carries the context
/// needed to build a user-facing message naming the schema and the
/// migration responsible.
#[derive(Debug, TError)]
pub enum Kind {
    /// Could not tokenize a migration script.
    #[error("could not parse migration script {script} at line {line}, column {column}: {reason}")]
    ParseError {
        script: String,
        line: usize,
        column: usize,
        reason: String,
    },

    /// Planning found a group mixing transactional and non-transactional
    /// migrations with `configuration.mixed = false`.
    #[error("migration {0} cannot be combined in a single transactional group with the other pending migrations; set `mixed` to allow it")]
    MixedTransactionalError(String),

    /// Planning observed an unignored failed row in schema history.
    #[error("detected failed migration {0} in schema history; repair required before continuing")]
    FailedMigrationPresent(String),

    /// User SQL or a procedural migration raised during execution.
    #[error("migration {migration} failed to apply to schema `{schema}`: {reason}")]
    MigrationFailed {
        schema: String,
        migration: String,
        reason: String,
    },

    /// Could not acquire the schema-history lock.
    #[error("could not acquire schema history lock for schema `{0}`")]
    LockAcquisitionFailed(String),

    /// An invalid `MigrationVersion` string.
    #[error("invalid migration version `{0}`: must be a dotted sequence of non-negative integers")]
    InvalidVersion(String),

    /// An invalid `ignoreMigrationPatterns` entry.
    #[error("invalid ignore pattern `{0}`: expected `state:behavior`")]
    InvalidIgnorePattern(String),

    /// An underlying database adapter error, wrapped with the context of
    /// what the engine was doing when it surfaced.
    #[error("{context}: {source}")]
    Adapter {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Sync + Send>,
    },
}

/// Helper trait for attaching a migration-run context and the result
/// accumulated so far to an arbitrary adapter error.
pub trait WrapMigrationError<T, E> {
    fn migration_err(self, context: &str, result_so_far: Option<&MigrateResult>) -> Result<T, Error>;
}

impl<T, E> WrapMigrationError<T, E> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn migration_err(self, context: &str, result_so_far: Option<&MigrateResult>) -> Result<T, Error> {
        match self {
            Ok(v) => Ok(v),
            Err(err) => Err(Error {
                kind: Box::new(Kind::Adapter {
                    context: context.to_string(),
                    source: Box::new(err),
                }),
                result: result_so_far.cloned(),
            }),
        }
    }
}
