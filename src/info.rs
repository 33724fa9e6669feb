use crate::config::{CherryPick, Configuration};
use crate::migration::{AppliedMigration, MigrationType, ResolvedMigration};
use crate::version::{MigrationVersion, Target};

/// The state of a single [`MigrationInfo`], as a pure function of
/// `(resolved?, applied?, target, cherryPick, outOfOrder, ignorePatterns,
/// currentVersion)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MigrationState {
    /// Resolved, not yet applied, within target and not cherry-pick-excluded.
    Pending,
    /// Resolved but above the requested target; excluded from this run.
    AboveTarget,
    /// Resolved but below a recorded baseline; excluded from this run.
    BelowBaseline,
    /// Excluded by `cherryPick` or by `outOfOrder = false` on an
    /// out-of-order candidate.
    Ignored,
    /// Applied, no resolved counterpart, and the row succeeded.
    MissingSuccess,
    /// Applied, no resolved counterpart, and the row failed.
    MissingFailed,
    /// Applied, version exceeds every resolved version, and the row succeeded.
    FutureSuccess,
    /// Applied, version exceeds every resolved version, and the row failed.
    FutureFailed,
    /// Applied and succeeded, matching a resolved migration.
    Success,
    /// Applied and failed, matching a resolved migration.
    Failed,
    /// Resolved, applied, version below current, applied out of order.
    OutOfOrder,
    /// Applied as a baseline marker.
    Baseline,
    /// Resolved repeatable migration not yet applied (or due for reapply).
    Available,
    /// Reserved for undo tracking; never produced by this engine (rollback
    /// beyond the database's own transaction mechanism is a non-goal).
    Undone,
}

impl MigrationState {
    /// Parse the `state` half of an `ignoreMigrationPatterns` entry
    /// (snake_case, case-insensitive).
    pub fn parse(raw: &str) -> Option<MigrationState> {
        use MigrationState::*;
        Some(match raw.to_ascii_lowercase().as_str() {
            "pending" => Pending,
            "above_target" => AboveTarget,
            "below_baseline" => BelowBaseline,
            "ignored" => Ignored,
            "missing_success" => MissingSuccess,
            "missing_failed" => MissingFailed,
            "future_success" => FutureSuccess,
            "future_failed" => FutureFailed,
            "success" => Success,
            "failed" => Failed,
            "out_of_order" => OutOfOrder,
            "baseline" => Baseline,
            "available" => Available,
            "undone" => Undone,
            _ => return None,
        })
    }

    pub fn is_failed(self) -> bool {
        matches!(
            self,
            MigrationState::Failed | MigrationState::MissingFailed | MigrationState::FutureFailed
        )
    }

    pub fn is_resolved_pending(self) -> bool {
        matches!(
            self,
            MigrationState::Pending | MigrationState::OutOfOrder | MigrationState::Available
        )
    }
}

/// A join of a resolved and/or applied migration, carrying a derived
/// `state`.
#[derive(Clone, Debug)]
pub struct MigrationInfo {
    resolved: Option<ResolvedMigration>,
    applied: Option<AppliedMigration>,
    state: MigrationState,
}

impl MigrationInfo {
    pub fn resolved(&self) -> Option<&ResolvedMigration> {
        self.resolved.as_ref()
    }

    pub fn applied(&self) -> Option<&AppliedMigration> {
        self.applied.as_ref()
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn version(&self) -> Option<&MigrationVersion> {
        self.resolved
            .as_ref()
            .and_then(ResolvedMigration::version)
            .or_else(|| self.applied.as_ref().and_then(|a| a.version.as_ref()))
    }

    pub fn description(&self) -> &str {
        self.resolved
            .as_ref()
            .map(ResolvedMigration::description)
            .or_else(|| self.applied.as_ref().map(|a| a.description.as_str()))
            .unwrap_or_default()
    }

    pub fn migration_type(&self) -> Option<MigrationType> {
        self.resolved
            .as_ref()
            .map(ResolvedMigration::migration_type)
            .or_else(|| self.applied.as_ref().map(|a| a.migration_type))
    }

    pub fn identifier(&self) -> String {
        match (&self.resolved, &self.applied) {
            (Some(r), _) => r.identifier(),
            (None, Some(a)) => a.identifier(),
            (None, None) => unreachable!("MigrationInfo always has a resolved or applied side"),
        }
    }
}

/// Pure state-derivation function. `current` is the version of
/// the latest *successful* applied versioned migration, or
/// [`MigrationVersion::empty`] if there is none. `max_resolved` is the
/// highest version among all resolved versioned migrations, used to tell
/// `FUTURE` (ahead of anything the resolver knows about) from `MISSING`
/// (within the known range, but the file disappeared).
fn derive_state(
    resolved: Option<&ResolvedMigration>,
    applied: Option<&AppliedMigration>,
    current: &MigrationVersion,
    max_resolved: Option<&MigrationVersion>,
    target: &Target,
    cherry_pick: Option<&[CherryPick]>,
    out_of_order: bool,
) -> MigrationState {
    match (resolved, applied) {
        (None, Some(app)) => {
            let exceeds_known = match (&app.version, max_resolved) {
                (Some(v), Some(max)) => v > max,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if exceeds_known {
                if app.success {
                    MigrationState::FutureSuccess
                } else {
                    MigrationState::FutureFailed
                }
            } else if app.success {
                MigrationState::MissingSuccess
            } else {
                MigrationState::MissingFailed
            }
        }
        (Some(res), None) => {
            if res.migration_type() == MigrationType::Baseline {
                return MigrationState::Baseline;
            }

            if let Some(picks) = cherry_pick {
                if !cherry_pick_admits(res, picks) {
                    return MigrationState::Ignored;
                }
            }

            match res.version() {
                None => MigrationState::Available,
                Some(v) => {
                    if !target.admits(v, current) {
                        return MigrationState::AboveTarget;
                    }
                    if v < current {
                        if out_of_order {
                            MigrationState::OutOfOrder
                        } else {
                            MigrationState::Ignored
                        }
                    } else {
                        MigrationState::Pending
                    }
                }
            }
        }
        (Some(res), Some(app)) => {
            if app.migration_type == MigrationType::Baseline {
                return MigrationState::Baseline;
            }
            if res.is_repeatable() && !app.checksum_matches(res) {
                return MigrationState::Pending;
            }
            if app.success {
                MigrationState::Success
            } else {
                MigrationState::Failed
            }
        }
        (None, None) => unreachable!("a MigrationInfo must join at least one side"),
    }
}

fn cherry_pick_admits(resolved: &ResolvedMigration, picks: &[CherryPick]) -> bool {
    picks.iter().any(|p| match (p, resolved.version()) {
        (CherryPick::Version(v), Some(rv)) => rv.as_str() == v,
        (CherryPick::Description(d), _) => d == resolved.description(),
        _ => false,
    })
}

/// Joins resolved migrations with schema history and serves read-only
/// queries over the resulting snapshot. Rebuilt fresh by [`refresh`].
///
/// [`refresh`]: MigrationInfoService::refresh
pub struct MigrationInfoService {
    snapshot: Vec<MigrationInfo>,
}

impl MigrationInfoService {
    /// Build a fresh snapshot by joining `resolved` against `applied` and
    /// deriving each entry's state.
    pub fn refresh(
        resolved: Vec<ResolvedMigration>,
        applied: Vec<AppliedMigration>,
        config: &Configuration,
    ) -> Result<MigrationInfoService, crate::Error> {
        let target = config.target()?;
        let cherry_pick = config.cherry_pick();

        let current = applied
            .iter()
            .filter(|a| a.success && a.version.is_some())
            .map(|a| a.version.clone().unwrap())
            .max()
            .unwrap_or_else(MigrationVersion::empty);

        let max_resolved = resolved.iter().filter_map(ResolvedMigration::version).max();

        let mut joined: Vec<MigrationInfo> = Vec::new();
        let mut matched_applied_idx = vec![false; applied.len()];

        for res in &resolved {
            let applied_match = applied.iter().enumerate().find(|(idx, app)| {
                !matched_applied_idx[*idx]
                    && match res.version() {
                        Some(v) => app.version.as_ref() == Some(v),
                        None => app.version.is_none() && app.description == res.description(),
                    }
            });

            let applied_ref = applied_match.map(|(idx, app)| {
                matched_applied_idx[idx] = true;
                app.clone()
            });

            let state = derive_state(
                Some(res),
                applied_ref.as_ref(),
                &current,
                max_resolved,
                &target,
                cherry_pick.as_deref(),
                config.out_of_order(),
            );

            joined.push(MigrationInfo {
                resolved: Some(res.clone()),
                applied: applied_ref,
                state,
            });
        }

        for (idx, app) in applied.into_iter().enumerate() {
            if matched_applied_idx[idx] {
                continue;
            }
            let state = derive_state(
                None,
                Some(&app),
                &current,
                max_resolved,
                &target,
                cherry_pick.as_deref(),
                config.out_of_order(),
            );
            joined.push(MigrationInfo {
                resolved: None,
                applied: Some(app),
                state,
            });
        }

        joined.sort_by(|a, b| match (a.version(), b.version()) {
            (Some(va), Some(vb)) => va.cmp(vb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.description().cmp(b.description()),
        });

        Ok(MigrationInfoService { snapshot: joined })
    }

    /// The latest successful versioned applied migration, if any.
    pub fn current(&self) -> Option<&MigrationInfo> {
        self.snapshot
            .iter()
            .filter(|m| m.state == MigrationState::Success && m.version().is_some())
            .max_by(|a, b| a.version().cmp(&b.version()))
    }

    /// Resolved and not yet applied (already filtered by target/cherry-pick).
    pub fn pending(&self) -> Vec<&MigrationInfo> {
        self.snapshot
            .iter()
            .filter(|m| m.state.is_resolved_pending())
            .collect()
    }

    /// Applied but with no matching resolved migration.
    pub fn future(&self) -> Vec<&MigrationInfo> {
        self.snapshot
            .iter()
            .filter(|m| {
                matches!(
                    m.state,
                    MigrationState::FutureSuccess | MigrationState::FutureFailed
                )
            })
            .collect()
    }

    /// Applied rows with `success = false`, in rank order.
    pub fn failed(&self) -> Vec<&MigrationInfo> {
        let mut out: Vec<&MigrationInfo> = self.snapshot.iter().filter(|m| m.state.is_failed()).collect();
        out.sort_by_key(|m| m.applied().map(|a| a.installed_rank).unwrap_or(i32::MAX));
        out
    }

    /// All resolved migrations, versioned ascending, repeatables last
    /// ordered by description.
    pub fn resolved(&self) -> Vec<&MigrationInfo> {
        self.snapshot.iter().filter(|m| m.resolved().is_some()).collect()
    }

    pub fn all(&self) -> &[MigrationInfo] {
        &self.snapshot
    }
}
