use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Kind};

/// A dotted numeric migration version, e.g. `1.2.3`.
///
/// Versions compare component-wise and numerically — `1.10` is greater than
/// `1.9`, not less than it as a naive string comparison would conclude.
/// [`MigrationVersion::EMPTY`] sorts before every real version and is the
/// implicit "current version" of a database with no schema history.
#[derive(Clone, Debug, Eq)]
pub struct MigrationVersion {
    raw: String,
    components: Vec<u64>,
}

impl MigrationVersion {
    /// Parse a dotted numeric version string such as `"1.2.3"`.
    pub fn parse(raw: &str) -> Result<MigrationVersion, Error> {
        if raw.is_empty() {
            return Ok(MigrationVersion::empty());
        }

        let mut components = Vec::new();
        for part in raw.split('.') {
            let n: u64 = part
                .parse()
                .map_err(|_| Error::new(Kind::InvalidVersion(raw.to_string()), None))?;
            components.push(n);
        }

        Ok(MigrationVersion {
            raw: raw.to_string(),
            components,
        })
    }

    /// The sentinel that precedes every real version: the version of a
    /// database with an empty schema history.
    pub fn empty() -> MigrationVersion {
        MigrationVersion {
            raw: String::new(),
            components: Vec::new(),
        }
    }

    /// True for the [`MigrationVersion::empty`] sentinel.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for MigrationVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MigrationVersion::parse(s)
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<empty>")
        } else {
            write!(f, "{}", self.raw)
        }
    }
}

impl PartialEq for MigrationVersion {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Ord for MigrationVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for MigrationVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for MigrationVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.components.hash(state)
    }
}

/// Planning target for a `migrate()` invocation. Distinct from
/// [`MigrationVersion`]: these are planning sentinels, not versions that can
/// appear on a resolved or applied migration.
#[derive(Clone, Debug)]
pub enum Target {
    /// Migrate up to and including the highest resolved version.
    Latest,
    /// Migrate up to and including a specific version.
    Version(MigrationVersion),
    /// Apply exactly one pending migration (the next one) and stop.
    Next,
    /// Migrate to the current applied version — i.e. apply nothing new, only
    /// useful in combination with `skipExecutingMigrations` or to validate.
    Current,
}

impl Target {
    /// Whether `version` is within this target's upper bound.
    pub fn admits(&self, version: &MigrationVersion, current: &MigrationVersion) -> bool {
        match self {
            Target::Latest => true,
            Target::Version(max) => version <= max,
            Target::Next => true,
            Target::Current => version <= current,
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for MigrationVersion {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.raw)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for MigrationVersion {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        MigrationVersion::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_components() {
        let v = MigrationVersion::parse("1.2.3").unwrap();
        assert_eq!(v.as_str(), "1.2.3");
    }

    #[test]
    fn numeric_not_lexicographic_ordering() {
        let a = MigrationVersion::parse("1.9").unwrap();
        let b = MigrationVersion::parse("1.10").unwrap();
        assert!(a < b);
    }

    #[test]
    fn empty_precedes_every_real_version() {
        let empty = MigrationVersion::empty();
        let v = MigrationVersion::parse("0.1").unwrap();
        assert!(empty < v);
        assert!(empty.is_empty());
    }

    #[test]
    fn shorter_component_list_pads_with_zero() {
        let a = MigrationVersion::parse("1.2").unwrap();
        let b = MigrationVersion::parse("1.2.0").unwrap();
        assert_eq!(a, b);
        let c = MigrationVersion::parse("1.2.1").unwrap();
        assert!(a < c);
    }

    #[test]
    fn rejects_non_numeric_component() {
        assert!(MigrationVersion::parse("1.a").is_err());
    }
}
