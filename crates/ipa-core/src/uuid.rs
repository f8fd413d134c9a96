//! System-generated unique identifiers.
//!
//! Every entry created by the engine receives a random identifier that stays stable across
//! renames, distinct from the human-chosen primary key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Stable unique identifier of a directory object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(Uuid);

impl UniqueId {
    /// Creates a new identifier wrapper from a [`Uuid`].
    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generates a new random identifier (v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner [`Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parses an identifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID.
    pub fn parse_str(input: &str) -> Result<Self> {
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|_| Error::InvalidRequest(format!("invalid unique identifier `{input}`")))
    }
}

impl From<Uuid> for UniqueId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for UniqueId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct_and_parse_back() {
        let first = UniqueId::generate();
        let second = UniqueId::generate();
        assert_ne!(first, second);

        let parsed: UniqueId = first.to_string().parse().unwrap();
        assert_eq!(parsed, first);
        assert_eq!(parsed.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn rejects_garbage() {
        let err = UniqueId::parse_str("autogenerate").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REQUEST");
    }
}
