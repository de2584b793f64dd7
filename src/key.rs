//! # Composite Keys
//!
//! Identities built from several domain key components (contest, proposition,
//! option, variant) joined into one canonical string for map lookups.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Separator placed between key components.
pub const KEY_SEPARATOR: char = ':';

/// Canonical joined identity.
///
/// Two keys are equal iff every component matches, which for the joined form
/// is plain string equality. Components must not contain [`KEY_SEPARATOR`];
/// decoding rejects identities that do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    /// Join the given components in order.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                joined.push(KEY_SEPARATOR);
            }
            joined.push_str(part.as_ref());
        }
        Self(joined)
    }

    /// Identity of a contest.
    pub fn contest(contest_key: &str) -> Self {
        Self(contest_key.to_string())
    }

    /// Identity of a proposition (and of its market).
    pub fn proposition(contest_key: &str, proposition_key: &str) -> Self {
        Self::new([contest_key, proposition_key])
    }

    /// Identity of an outcome inside a proposition: the (option, variant) pair.
    pub fn outcome(option_key: &str, variant_key: &str) -> Self {
        Self::new([option_key, variant_key])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split back into components.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split(KEY_SEPARATOR)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CompositeKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CompositeKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for CompositeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
