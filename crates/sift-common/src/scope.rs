use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A capability an API key was issued for.
///
/// The wire names (`discover`, `event`, `ingestion`) are the values the
/// authentication endpoint expects in its `scopes` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Search and recommendation requests.
    #[serde(alias = "search")]
    Discover,
    /// Behavioural event publishing.
    #[serde(alias = "events")]
    Event,
    /// Document ingestion.
    Ingestion,
}

impl Scope {
    /// All scopes, in wire order.
    pub const ALL: [Self; 3] = [Self::Discover, Self::Event, Self::Ingestion];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Event => "event",
            Self::Ingestion => "ingestion",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discover" | "search" => Ok(Self::Discover),
            "event" | "events" => Ok(Self::Event),
            "ingestion" => Ok(Self::Ingestion),
            other => Err(ConfigError::UnknownScope(other.to_string())),
        }
    }
}

/// An unordered set of [`Scope`]s.
///
/// Defaults to every scope. Iteration and serialization are in a stable order
/// so the same set always produces the same request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    /// Creates a set from any iterator of scopes.
    pub fn new(scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self(scopes.into_iter().collect())
    }

    /// A set containing only the ingestion scope.
    #[must_use]
    pub fn ingestion_only() -> Self {
        Self::new([Scope::Ingestion])
    }

    /// True when the set is exactly `{ingestion}`.
    ///
    /// Keys restricted to ingestion authenticate with the raw key rather than a
    /// bearer token.
    #[must_use]
    pub fn is_ingestion_only(&self) -> bool {
        self.0.len() == 1 && self.0.contains(&Scope::Ingestion)
    }

    #[must_use]
    pub fn contains(&self, scope: Scope) -> bool {
        self.0.contains(&scope)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        self.0.iter().copied()
    }

    /// Wire names of the scopes, in stable order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(Scope::as_str).collect()
    }
}

impl Default for ScopeSet {
    fn default() -> Self {
        Self::new(Scope::ALL)
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = Scope>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl FromStr for ScopeSet {
    type Err = ConfigError;

    /// Parses a comma-separated list such as `discover,event`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}
