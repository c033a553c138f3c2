//! Server version parsing and comparison.
//!
//! Versions are dotted integers (`6.5.314.4300`). Comparison is numeric per
//! component with missing trailing components treated as zero, so `6.5`
//! equals `6.5.0.0` and `6.5.314.4301` is greater than `6.5.314.4300`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A parsed, dotted-integer server version.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerVersion {
    parts: Vec<u32>,
}

impl ServerVersion {
    /// Build a version from its numeric components.
    #[must_use]
    pub fn from_parts(parts: &[u32]) -> Self {
        Self {
            parts: parts.to_vec(),
        }
    }

    /// Parse a version string such as `"6.5.314.4301"`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidVersion` if the string is empty or any
    /// component is not a non-negative integer.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidVersion {
                raw: raw.to_string(),
                reason: "empty version string".to_string(),
            });
        }

        let parts = trimmed
            .split('.')
            .map(|part| {
                part.parse::<u32>().map_err(|_| CoreError::InvalidVersion {
                    raw: raw.to_string(),
                    reason: format!("component {part:?} is not an integer"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { parts })
    }

    /// Return the numeric components.
    #[must_use]
    pub fn parts(&self) -> &[u32] {
        &self.parts
    }

    fn component(&self, idx: usize) -> u32 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl PartialEq for ServerVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ServerVersion {}

impl PartialOrd for ServerVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServerVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|idx| self.component(idx).cmp(&other.component(idx)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Debug for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerVersion({self})")
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .parts
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&text)
    }
}

impl FromStr for ServerVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServerVersion {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServerVersion> for String {
    fn from(version: ServerVersion) -> Self {
        version.to_string()
    }
}

/// A set of minimum versions with OR semantics.
///
/// The requirement is satisfied when the server version is greater than or
/// equal to at least one entry. An empty requirement is never satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRequirement {
    minimums: Vec<ServerVersion>,
}

impl VersionRequirement {
    /// A requirement satisfied by any version at or above `minimum`.
    #[must_use]
    pub fn at_least(minimum: ServerVersion) -> Self {
        Self {
            minimums: vec![minimum],
        }
    }

    /// A requirement satisfied by any version at or above one of `minimums`.
    #[must_use]
    pub fn any_of(minimums: impl IntoIterator<Item = ServerVersion>) -> Self {
        Self {
            minimums: minimums.into_iter().collect(),
        }
    }

    /// Parse every entry of `raw` into a requirement.
    ///
    /// # Errors
    ///
    /// Returns the first version parse failure.
    pub fn parse_any_of<'a>(raw: impl IntoIterator<Item = &'a str>) -> Result<Self, CoreError> {
        let minimums = raw
            .into_iter()
            .map(ServerVersion::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { minimums })
    }

    /// The minimum versions in this requirement.
    #[must_use]
    pub fn minimums(&self) -> &[ServerVersion] {
        &self.minimums
    }

    /// Check the requirement against a known server version.
    #[must_use]
    pub fn is_satisfied_by(&self, version: &ServerVersion) -> bool {
        self.minimums.iter().any(|minimum| version >= minimum)
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .minimums
            .iter()
            .map(|v| format!(">= {v}"))
            .collect::<Vec<_>>()
            .join(" or ");
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> ServerVersion {
        ServerVersion::parse(raw).unwrap()
    }

    #[test]
    fn numeric_not_lexicographic() {
        assert!(v("6.5.314.4301") > v("6.5.314.4300"));
        assert!(v("6.10") > v("6.9"));
        assert!(v("6.5.314.10000") > v("6.5.314.4300"));
    }

    #[test]
    fn missing_components_are_zero() {
        assert_eq!(v("6.5"), v("6.5.0.0"));
        assert!(v("6.5.314.4300") > v("6.5"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(ServerVersion::parse("").is_err());
        assert!(ServerVersion::parse("6.5.x").is_err());
        assert!(ServerVersion::parse("Unknown").is_err());
        assert!(ServerVersion::parse("6..5").is_err());
    }

    #[test]
    fn requirement_or_semantics() {
        let req = VersionRequirement::parse_any_of(["6.5.314.4300", "7.0"]).unwrap();
        assert!(req.is_satisfied_by(&v("6.5.314.4301")));
        assert!(req.is_satisfied_by(&v("7.1")));
        assert!(!req.is_satisfied_by(&v("6.5.314.4200")));
    }

    #[test]
    fn empty_requirement_never_satisfied() {
        let req = VersionRequirement::any_of(Vec::new());
        assert!(!req.is_satisfied_by(&v("99")));
    }

    #[test]
    fn display_round_trips_components() {
        assert_eq!(v(" 6.5.314.4301 ").to_string(), "6.5.314.4301");
        let req = VersionRequirement::at_least(v("6.5"));
        assert_eq!(req.to_string(), ">= 6.5");
    }
}
