//! The top-level `migrate()` orchestrator. Ties together the migration info
//! service, group planner, execution template and schema history store into
//! one run: plan a group, run it, record the outcome, repeat until there's
//! nothing left to apply.

use std::cell::Cell;
use std::time::Instant;

use crate::adapter::DatabaseAdapter;
use crate::callback::{CallbackHandler, Event};
use crate::config::Configuration;
use crate::error::{Error, Kind, WrapMigrationError};
use crate::history::SchemaHistoryStore;
use crate::info::MigrationInfoService;
use crate::migration::{AppliedMigration, ExecutionContext, ResolvedMigration};
use crate::planner::{plan_next_group, MigrationGroup};
use crate::result::MigrateResult;
use crate::template::run_in_boundary;
use crate::version::{MigrationVersion, Target};

/// Progress reporting hooks fired around group/migration execution: how many
/// steps to expect in the next group, and a start/finish notification per
/// migration. A no-op default is provided below; the engine always
/// additionally logs through the `log` crate regardless of whether a
/// reporter is installed.
pub trait ProgressReporter {
    fn start_group(&mut self, _size: usize) {}
    fn starting(&mut self, _identifier: &str) {}
    fn completed(&mut self, _identifier: &str) {}
}

#[derive(Default)]
pub struct NoopProgressReporter;
impl ProgressReporter for NoopProgressReporter {}

/// Per-run state threaded explicitly through the loop rather than held as
/// mutable fields on a long-lived engine object, so two concurrent calls to
/// `migrate()` (against different adapters) can never share mutable state by
/// accident.
struct RunState {
    fired_versioned_boundary: bool,
    executed: usize,
}

impl RunState {
    fn new() -> RunState {
        RunState {
            fired_versioned_boundary: false,
            executed: 0,
        }
    }
}

/// Everything `do_migrate_group` needs that isn't part of the history/
/// adapter pair, bundled so the function signatures below stay readable.
struct RunContext<'a> {
    config: &'a Configuration,
    schema_name: &'a str,
    callbacks: &'a mut dyn CallbackHandler,
    progress: &'a mut dyn ProgressReporter,
}

/// Run every pending migration against `schema_name`. `history` and
/// `adapter` are the caller's concrete per-dialect collaborators; this
/// function only sequences calls to them: acquire the schema-history lock,
/// plan a group, execute it, record the outcome, and repeat until planning
/// finds nothing left pending (or the target is reached).
pub fn migrate<H, A>(
    history: &mut H,
    adapter: &mut A,
    resolved: Vec<ResolvedMigration>,
    config: &Configuration,
    schema_name: &str,
    callbacks: &mut dyn CallbackHandler,
    progress: &mut dyn ProgressReporter,
) -> Result<MigrateResult, Error>
where
    H: SchemaHistoryStore,
    A: DatabaseAdapter,
{
    callbacks.on_event(Event::BeforeMigrate, None);

    let mut outcome = MigrateResult::new(schema_name);

    if !history
        .exists()
        .migration_err("checking schema history existence", None)?
    {
        history
            .create()
            .migration_err("creating schema history table", None)?;
    }

    outcome.initial_schema_version = current_version(history)?;

    let target = config.target()?;
    let mut state = RunState::new();
    let mut future_warnings_reported = false;
    let mut ctx = RunContext {
        config,
        schema_name,
        callbacks,
        progress,
    };

    let run: Result<(), Box<dyn std::error::Error + Send + Sync>> = if config.group() {
        locked_run(history, schema_name, |history| {
            run_until_dry(
                history,
                adapter,
                &resolved,
                &target,
                &mut ctx,
                &mut state,
                &mut outcome,
                &mut future_warnings_reported,
            )
        })
    } else {
        (|| {
            loop {
                let made_progress = locked_run(history, schema_name, |history| {
                    run_one_group(
                        history,
                        adapter,
                        &resolved,
                        &target,
                        &mut ctx,
                        &mut state,
                        &mut outcome,
                        &mut future_warnings_reported,
                    )
                })?;
                if !made_progress || matches!(target, Target::Next) {
                    break;
                }
            }
            Ok(())
        })()
    };

    match run {
        Ok(()) => {
            outcome.target_schema_version = current_version(history)?;
            if state.executed > 0 {
                ctx.callbacks.on_event(Event::AfterMigrateApplied, None);
            }
            outcome.success = true;
            ctx.callbacks.on_event(Event::AfterMigrate, None);
            Ok(outcome)
        }
        Err(err) => {
            ctx.callbacks.on_event(Event::AfterMigrateError, None);
            ctx.callbacks.on_event(Event::AfterMigrate, None);
            outcome.success = false;
            Err(Error::from_boxed(err, "migration run", Some(outcome)))
        }
    }
}

/// Run `body` with the schema-history lock held, distinguishing "the lock
/// itself could not be acquired" from "the lock was acquired but `body`
/// failed" — only the former is reported as [`Kind::LockAcquisitionFailed`];
/// the latter keeps whatever error `body` produced.
fn locked_run<H, T>(
    history: &mut H,
    schema_name: &str,
    body: impl FnOnce(&mut H) -> Result<T, Box<dyn std::error::Error + Send + Sync>>,
) -> Result<T, Box<dyn std::error::Error + Send + Sync>>
where
    H: SchemaHistoryStore,
{
    let entered = Cell::new(false);
    let result = history.lock(|history| {
        entered.set(true);
        body(history)
    });
    match result {
        Err(err) if !entered.get() => Err(Box::new(Error::new(
            Kind::LockAcquisitionFailed(schema_name.to_string()),
            None,
        )) as Box<dyn std::error::Error + Send + Sync>),
        other => other,
    }
}

fn current_version<H: SchemaHistoryStore>(history: &mut H) -> Result<Option<MigrationVersion>, Error> {
    let applied = history
        .all_applied_migrations()
        .migration_err("reading schema history", None)?;
    Ok(Some(
        applied
            .iter()
            .filter(|a| a.success && a.version.is_some())
            .map(|a| a.version.clone().unwrap())
            .max()
            .unwrap_or_else(MigrationVersion::empty),
    ))
}

/// Run groups one after another until planning returns no more work, or the
/// target is `NEXT` (one migration only). Used when `configuration.group`
/// holds the schema-history lock across the whole run.
fn run_until_dry<H, A>(
    history: &mut H,
    adapter: &mut A,
    resolved: &[ResolvedMigration],
    target: &Target,
    ctx: &mut RunContext,
    state: &mut RunState,
    outcome: &mut MigrateResult,
    future_warnings_reported: &mut bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    H: SchemaHistoryStore,
    A: DatabaseAdapter,
{
    loop {
        let made_progress = run_one_group(
            history,
            adapter,
            resolved,
            target,
            ctx,
            state,
            outcome,
            future_warnings_reported,
        )?;
        if !made_progress || matches!(target, Target::Next) {
            return Ok(());
        }
    }
}

/// Plan and execute exactly one group; returns whether a group was found.
///
/// `plan_next_group` re-derives its future-migration warnings from the full
/// history on every call, so with `configuration.group = false` this runs
/// once per single-migration step rather than once per overall run; without
/// `future_warnings_reported` the same warning string would be appended to
/// `outcome.warnings` on every iteration a future row remains unresolved.
/// This only reports it the first time it's seen.
fn run_one_group<H, A>(
    history: &mut H,
    adapter: &mut A,
    resolved: &[ResolvedMigration],
    _target: &Target,
    ctx: &mut RunContext,
    state: &mut RunState,
    outcome: &mut MigrateResult,
    future_warnings_reported: &mut bool,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>
where
    H: SchemaHistoryStore,
    A: DatabaseAdapter,
{
    let applied = history
        .all_applied_migrations()
        .migration_err("reading schema history", None)?;
    let info = MigrationInfoService::refresh(resolved.to_vec(), applied, ctx.config)?;

    let mut warnings = Vec::new();
    let group = plan_next_group(&info, ctx.config, &mut warnings)?;
    if !*future_warnings_reported && !warnings.is_empty() {
        outcome.warnings.extend(warnings);
        *future_warnings_reported = true;
    }

    let group = match group {
        None => return Ok(false),
        Some(group) => group,
    };

    if ctx.config.group() && !adapter.supports_ddl_transactions() {
        outcome.warn(format!(
            "schema `{}` does not support DDL transactions; grouped migrations will not roll back together on failure",
            ctx.schema_name
        ));
    }

    do_migrate_group(history, adapter, &group, ctx, state, outcome)?;
    Ok(true)
}

fn do_migrate_group<H, A>(
    history: &mut H,
    adapter: &mut A,
    group: &MigrationGroup,
    ctx: &mut RunContext,
    state: &mut RunState,
    outcome: &mut MigrateResult,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    H: SchemaHistoryStore,
    A: DatabaseAdapter,
{
    ctx.progress.start_group(group.members.len());
    let ddl_transactional = adapter.supports_ddl_transactions();
    let skip_executing = ctx.config.skip_executing_migrations();
    let installed_by = ctx.config.installed_by().to_string();
    let schema_name = ctx.schema_name;

    // When the group runs in a transaction on a database that rolls back
    // DDL, history rows are held in memory until the whole group commits,
    // so a failure partway through leaves history untouched rather than
    // containing rows for migrations the database itself just undid.
    // Otherwise each row is written immediately, since nothing will undo
    // the migration it describes.
    let defer_history_writes = group.transactional && ddl_transactional;
    let mut buffered_rows: Vec<AppliedMigration> = Vec::new();

    let body_result = run_in_boundary(adapter, group.transactional, |context| {
        for member in &group.members {
            let resolved = member
                .resolved()
                .expect("a pending MigrationInfo always has a resolved side");

            if resolved.version().is_none() && !state.fired_versioned_boundary {
                ctx.callbacks.on_event(Event::AfterVersioned, None);
                ctx.callbacks.on_event(Event::BeforeRepeatables, None);
                state.fired_versioned_boundary = true;
            }

            ctx.callbacks.on_event(Event::BeforeEachMigrate, Some(resolved));
            context.set_current_schema(schema_name)?;
            context.reset_session_state()?;

            ctx.progress.starting(&resolved.identifier());
            log::info!(target: "strata_migrate::executor", "starting migration {}", resolved.identifier());

            let started = Instant::now();
            let run_result = if skip_executing {
                Ok(())
            } else {
                resolved.execute(context)
            };
            let elapsed_ms = started.elapsed().as_millis() as i64;

            let row = AppliedMigration {
                installed_rank: 0,
                version: resolved.version().cloned(),
                description: resolved.description().to_string(),
                migration_type: resolved.migration_type(),
                script: resolved.script().to_string(),
                checksum: resolved.checksum(),
                installed_by: installed_by.clone(),
                installed_on: time::OffsetDateTime::now_utc(),
                execution_time_millis: elapsed_ms,
                success: run_result.is_ok(),
            };

            match run_result {
                Ok(()) => {
                    if defer_history_writes {
                        buffered_rows.push(row.clone());
                    } else {
                        record_row(history, row.clone())?;
                    }
                    outcome.record(&row);
                    state.executed += 1;
                    ctx.progress.completed(&resolved.identifier());
                    ctx.callbacks.on_event(Event::AfterEachMigrate, Some(resolved));
                    log::info!(target: "strata_migrate::executor", "successfully completed migration {}", resolved.identifier());
                }
                Err(err) => {
                    ctx.callbacks.on_event(Event::AfterEachMigrateError, Some(resolved));
                    if !defer_history_writes {
                        // Nothing will roll this back, so the next run must
                        // see that this migration failed and refuse to
                        // continue until it's repaired.
                        record_row(history, row.clone())?;
                    }
                    outcome.record(&row);
                    return Err(Box::new(Error::migration_failed(
                        schema_name,
                        &resolved.identifier(),
                        err_display(&err),
                    )) as Box<dyn std::error::Error + Send + Sync>);
                }
            }
        }
        Ok(())
    });

    if body_result.is_ok() {
        for row in buffered_rows {
            record_row(history, row)?;
        }
    }

    body_result
}

fn record_row<H: SchemaHistoryStore>(
    history: &mut H,
    mut row: AppliedMigration,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    row.installed_rank = history.next_installed_rank()?;
    history.add_applied_migration(row)?;
    Ok(())
}

fn err_display(err: &(dyn std::error::Error + Send + Sync)) -> String {
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::NoopCallbackHandler;
    use crate::migration::{ExecutionContext, MigrationBody, MigrationType, TransactionBehavior};
    use std::sync::Arc;

    #[derive(Debug)]
    struct SqlBody(&'static str, TransactionBehavior);
    impl MigrationBody for SqlBody {
        fn can_execute_in_transaction(&self) -> TransactionBehavior {
            self.1
        }
        fn execute(&self, ctx: &mut dyn ExecutionContext) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            ctx.execute_statement(self.0)
        }
    }

    #[derive(Debug)]
    struct FailingBody;
    impl MigrationBody for FailingBody {
        fn can_execute_in_transaction(&self) -> TransactionBehavior {
            TransactionBehavior::Yes
        }
        fn execute(&self, _ctx: &mut dyn ExecutionContext) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("boom".into())
        }
    }

    fn versioned(version: &str, sql: &'static str) -> ResolvedMigration {
        ResolvedMigration::new(
            Some(MigrationVersion::parse(version).unwrap()),
            "m",
            MigrationType::Sql,
            format!("V{version}__m.sql"),
            Some(1),
            Arc::new(SqlBody(sql, TransactionBehavior::Yes)) as Arc<dyn MigrationBody>,
        )
    }

    fn failing(version: &str) -> ResolvedMigration {
        ResolvedMigration::new(
            Some(MigrationVersion::parse(version).unwrap()),
            "m",
            MigrationType::Sql,
            format!("V{version}__m.sql"),
            Some(1),
            Arc::new(FailingBody) as Arc<dyn MigrationBody>,
        )
    }

    struct MemoryContext;
    impl ExecutionContext for MemoryContext {
        fn execute_statement(&mut self, _sql: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
    }

    struct MemoryAdapter;
    impl DatabaseAdapter for MemoryAdapter {
        type Error = std::io::Error;
        type Context = MemoryContext;

        fn supports_ddl_transactions(&self) -> bool {
            true
        }
        fn begin(&mut self) -> Result<Self::Context, Self::Error> {
            Ok(MemoryContext)
        }
        fn commit(&mut self, _context: Self::Context) -> Result<(), Self::Error> {
            Ok(())
        }
        fn rollback(&mut self, _context: Self::Context) -> Result<(), Self::Error> {
            Ok(())
        }
        fn autocommit_context(&mut self) -> Result<Self::Context, Self::Error> {
            Ok(MemoryContext)
        }
    }

    #[derive(Default)]
    struct MemoryHistoryStore {
        created: bool,
        rows: Vec<AppliedMigration>,
    }

    impl SchemaHistoryStore for MemoryHistoryStore {
        type Error = std::io::Error;

        fn exists(&mut self) -> Result<bool, Self::Error> {
            Ok(self.created)
        }
        fn create(&mut self) -> Result<(), Self::Error> {
            self.created = true;
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
            body: impl FnOnce(&mut Self) -> Result<T, Box<dyn std::error::Error + Send + Sync>>,
        ) -> Result<T, Box<dyn std::error::Error + Send + Sync>> {
            body(self)
        }
    }

    #[test]
    fn happy_path_applies_every_pending_migration_in_order() {
        let mut history = MemoryHistoryStore::default();
        let mut adapter = MemoryAdapter;
        let config = Configuration::new();
        let result = migrate(
            &mut history,
            &mut adapter,
            vec![versioned("1", "create table a"), versioned("2", "create table b")],
            &config,
            "public",
            &mut NoopCallbackHandler,
            &mut NoopProgressReporter,
        )
        .unwrap();

        assert!(result.success);
        assert_eq!(result.migrations_executed(), 2);
        assert_eq!(history.rows.len(), 2);
        assert!(history.rows.iter().all(|r| r.success));
        assert_eq!(history.rows[0].installed_rank, 1);
        assert_eq!(history.rows[1].installed_rank, 2);
    }

    #[test]
    fn failure_records_failed_row_and_surfaces_error() {
        let mut history = MemoryHistoryStore::default();
        let mut adapter = MemoryAdapter;
        let config = Configuration::new();
        let err = migrate(
            &mut history,
            &mut adapter,
            vec![versioned("1", "create table a"), failing("2")],
            &config,
            "public",
            &mut NoopCallbackHandler,
            &mut NoopProgressReporter,
        )
        .unwrap_err();

        assert!(err.result().is_some());
        // Transactional + DDL-transactional adapter: the whole group rolls
        // back together, so history sees no rows at all even though
        // migration 1 ran successfully before migration 2 failed.
        assert_eq!(history.rows.len(), 0);
        let reported = &err.result().unwrap().migrations;
        assert_eq!(reported.len(), 2);
    }

    #[test]
    fn skip_executing_migrations_records_without_running_body() {
        let mut history = MemoryHistoryStore::default();
        let mut adapter = MemoryAdapter;
        let config = Configuration::new().set_skip_executing_migrations(true);
        let result = migrate(
            &mut history,
            &mut adapter,
            vec![failing("1")],
            &config,
            "public",
            &mut NoopCallbackHandler,
            &mut NoopProgressReporter,
        )
        .unwrap();

        assert!(result.success);
        assert!(history.rows[0].success);
    }
}
