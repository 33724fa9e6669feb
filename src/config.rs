use regex::Regex;

use crate::error::{Error, Kind};
use crate::info::MigrationState;
use crate::version::Target;

/// A single `state:behavior` entry from `ignoreMigrationPatterns`.
/// `state` names one of [`MigrationState`]'s variants (case-insensitive,
/// e.g. `future`, `missing_failed`); `behavior` is currently always
/// `ignore` — the vocabulary is kept open for a future `warn`-only mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnorePattern {
    pub state: MigrationState,
    pub ignore: bool,
}

impl IgnorePattern {
    pub fn parse(raw: &str) -> Result<IgnorePattern, Error> {
        let (state, behavior) = raw
            .split_once(':')
            .ok_or_else(|| Error::new(Kind::InvalidIgnorePattern(raw.to_string()), None))?;

        let state = MigrationState::parse(state)
            .ok_or_else(|| Error::new(Kind::InvalidIgnorePattern(raw.to_string()), None))?;

        let ignore = match behavior {
            "ignore" => true,
            "warn" => false,
            _ => return Err(Error::new(Kind::InvalidIgnorePattern(raw.to_string()), None)),
        };

        Ok(IgnorePattern { state, ignore })
    }
}

/// An explicit cherry-pick entry: either a versioned migration's version or
/// a repeatable migration's description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CherryPick {
    Version(String),
    Description(String),
}

/// The configuration knobs the engine consumes. Loading these from a file,
/// environment, or CLI is left to the caller; this type is the in-memory
/// value handed to the engine, built with a consuming-builder idiom so each
/// `set_*` call reads as a complete, immutable configuration step.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Configuration {
    group: bool,
    mixed: bool,
    out_of_order: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    target: TargetConfig,
    cherry_pick: Option<Vec<String>>,
    skip_executing_migrations: bool,
    ignore_migration_patterns: Vec<String>,
    installed_by: String,
}

#[derive(Clone, Debug)]
enum TargetConfig {
    Latest,
    Version(String),
    Next,
    Current,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig::Latest
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            group: false,
            mixed: false,
            out_of_order: false,
            target: TargetConfig::Latest,
            cherry_pick: None,
            skip_executing_migrations: false,
            ignore_migration_patterns: Vec::new(),
            installed_by: whoami_fallback(),
        }
    }
}

fn whoami_fallback() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "strata-migrate".to_string())
}

impl Configuration {
    pub fn new() -> Configuration {
        Configuration::default()
    }

    /// One transaction per run over all groups, vs. per-migration.
    pub fn set_group(self, group: bool) -> Configuration {
        Configuration { group, ..self }
    }

    /// Allow transactional and non-transactional migrations in one group.
    pub fn set_mixed(self, mixed: bool) -> Configuration {
        Configuration { mixed, ..self }
    }

    /// Allow applying pending versions less than the current applied
    /// maximum.
    pub fn set_out_of_order(self, out_of_order: bool) -> Configuration {
        Configuration {
            out_of_order,
            ..self
        }
    }

    pub fn set_target(self, target: Target) -> Configuration {
        let target = match target {
            Target::Latest => TargetConfig::Latest,
            Target::Version(v) => TargetConfig::Version(v.as_str().to_string()),
            Target::Next => TargetConfig::Next,
            Target::Current => TargetConfig::Current,
        };
        Configuration { target, ..self }
    }

    pub fn set_cherry_pick(self, picks: Vec<String>) -> Configuration {
        Configuration {
            cherry_pick: Some(picks),
            ..self
        }
    }

    /// Record but do not execute migrations.
    pub fn set_skip_executing_migrations(self, skip: bool) -> Configuration {
        Configuration {
            skip_executing_migrations: skip,
            ..self
        }
    }

    pub fn set_ignore_migration_patterns(self, patterns: Vec<String>) -> Configuration {
        Configuration {
            ignore_migration_patterns: patterns,
            ..self
        }
    }

    pub fn set_installed_by(self, installed_by: impl Into<String>) -> Configuration {
        Configuration {
            installed_by: installed_by.into(),
            ..self
        }
    }

    pub fn group(&self) -> bool {
        self.group
    }

    pub fn mixed(&self) -> bool {
        self.mixed
    }

    pub fn out_of_order(&self) -> bool {
        self.out_of_order
    }

    pub fn target(&self) -> Result<Target, Error> {
        Ok(match &self.target {
            TargetConfig::Latest => Target::Latest,
            TargetConfig::Next => Target::Next,
            TargetConfig::Current => Target::Current,
            TargetConfig::Version(v) => Target::Version(crate::version::MigrationVersion::parse(v)?),
        })
    }

    pub fn skip_executing_migrations(&self) -> bool {
        self.skip_executing_migrations
    }

    pub fn installed_by(&self) -> &str {
        &self.installed_by
    }

    /// Parse `cherryPick` entries, classifying each as a version (if it
    /// parses as one) or a repeatable description otherwise.
    pub fn cherry_pick(&self) -> Option<Vec<CherryPick>> {
        self.cherry_pick.as_ref().map(|picks| {
            picks
                .iter()
                .map(|p| match crate::version::MigrationVersion::parse(p) {
                    Ok(_) if looks_versioned(p) => CherryPick::Version(p.clone()),
                    _ => CherryPick::Description(p.clone()),
                })
                .collect()
        })
    }

    pub fn ignore_patterns(&self) -> Result<Vec<IgnorePattern>, Error> {
        self.ignore_migration_patterns
            .iter()
            .map(|p| IgnorePattern::parse(p))
            .collect()
    }

    /// Whether `state` is downgraded to a warning by an ignore pattern.
    pub fn ignores(&self, state: MigrationState) -> bool {
        self.ignore_patterns()
            .map(|patterns| patterns.iter().any(|p| p.state == state && p.ignore))
            .unwrap_or(false)
    }
}

fn looks_versioned(raw: &str) -> bool {
    lazy_static::lazy_static! {
        static ref VERSION_SHAPE: Regex = Regex::new(r"^\d+(\.\d+)*$").unwrap();
    }
    VERSION_SHAPE.is_match(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_defaults() {
        let c = Configuration::new();
        assert!(!c.group());
        assert!(!c.mixed());
        assert!(!c.out_of_order());
        assert!(!c.skip_executing_migrations());
    }

    #[test]
    fn cherry_pick_classifies_versions_and_descriptions() {
        let c = Configuration::new().set_cherry_pick(vec!["1.2".into(), "seed_lookup".into()]);
        let picks = c.cherry_pick().unwrap();
        assert_eq!(picks[0], CherryPick::Version("1.2".into()));
        assert_eq!(picks[1], CherryPick::Description("seed_lookup".into()));
    }

    #[test]
    fn ignore_pattern_parses_state_and_behavior() {
        let p = IgnorePattern::parse("future_success:ignore").unwrap();
        assert_eq!(p.state, MigrationState::FutureSuccess);
        assert!(p.ignore);
    }

    #[test]
    fn ignore_pattern_rejects_malformed_entry() {
        assert!(IgnorePattern::parse("nocolon").is_err());
        assert!(IgnorePattern::parse("future:explode").is_err());
    }
}
