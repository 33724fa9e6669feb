//! Turns a [`MigrationInfoService`] snapshot into the next group of
//! migrations to run, and enforces the pre-execution policy checks: no
//! unrepaired failed migrations, no unresolved future history, and no
//! mixed transactional/non-transactional group unless explicitly allowed.

use crate::config::Configuration;
use crate::error::{Error, Kind};
use crate::info::{MigrationInfo, MigrationInfoService};
use crate::migration::TransactionBehavior;

/// The next group of pending migrations to apply in one pass.
/// `transactional` is the group's resolved mode: `true` if every member can
/// run in a transaction (`Yes`/`Inherit`), `false` if every member is `No`.
/// A group mixing the two is rejected before it reaches here unless
/// `configuration.mixed` allows it, in which case it runs non-transactionally.
pub struct MigrationGroup<'a> {
    pub members: Vec<&'a MigrationInfo>,
    pub transactional: bool,
}

/// Note: this re-derives the future-migration warnings from the full
/// `info` snapshot on every call, so a caller invoking this once per
/// single-migration step (rather than once per run) is responsible for not
/// appending the same warning into a result multiple times.
pub fn plan_next_group<'a>(
    info: &'a MigrationInfoService,
    config: &Configuration,
    warnings: &mut Vec<String>,
) -> Result<Option<MigrationGroup<'a>>, Error> {
    check_failed(info, config)?;
    check_future(info, config, warnings);

    let mut pending = info.pending();
    pending.sort_by(|a, b| match (a.version(), b.version()) {
        (Some(va), Some(vb)) => va.cmp(vb),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.description().cmp(b.description()),
    });

    if pending.is_empty() {
        return Ok(None);
    }

    let members: Vec<&MigrationInfo> = if config.group() {
        pending
    } else {
        vec![pending[0]]
    };

    let transactional = resolve_group_transactionality(&members, config)?;

    Ok(Some(MigrationGroup {
        members,
        transactional,
    }))
}

fn check_failed(info: &MigrationInfoService, config: &Configuration) -> Result<(), Error> {
    for m in info.failed() {
        if config.ignores(m.state()) {
            continue;
        }
        return Err(Error::new(Kind::FailedMigrationPresent(m.identifier()), None));
    }
    Ok(())
}

fn check_future(info: &MigrationInfoService, config: &Configuration, warnings: &mut Vec<String>) {
    for m in info.future() {
        if config.ignores(m.state()) {
            continue;
        }
        warnings.push(format!(
            "schema history contains migration {} not resolved locally (state {:?})",
            m.identifier(),
            m.state()
        ));
    }
}

fn resolve_group_transactionality(
    members: &[&MigrationInfo],
    config: &Configuration,
) -> Result<bool, Error> {
    let mut saw_transactional = false;
    let mut saw_non_transactional = false;

    for m in members {
        let behavior = m
            .resolved()
            .map(|r| r.can_execute_in_transaction())
            .unwrap_or(TransactionBehavior::Inherit);
        match behavior.resolve() {
            true => saw_transactional = true,
            false => saw_non_transactional = true,
        }
    }

    match (saw_transactional, saw_non_transactional) {
        (true, true) if !config.mixed() => {
            let offender = members
                .iter()
                .find(|m| {
                    m.resolved()
                        .map(|r| !r.can_execute_in_transaction().resolve())
                        .unwrap_or(false)
                })
                .map(|m| m.identifier())
                .unwrap_or_default();
            Err(Error::new(Kind::MixedTransactionalError(offender), None))
        }
        (_, true) => Ok(false),
        _ => Ok(true),
    }
}
