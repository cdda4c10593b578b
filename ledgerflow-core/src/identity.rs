use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::LedgerKey;

/// X.500 style member name, e.g. `CN=Alice, O=R3, L=London, C=GB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberName(String);

impl MemberName {
    pub fn new(name: impl Into<String>) -> Self {
        MemberName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberName {
    fn from(name: &str) -> Self {
        MemberName(name.to_string())
    }
}

impl From<String> for MemberName {
    fn from(name: String) -> Self {
        MemberName(name)
    }
}

/// Identity reference used throughout the ledger: a member name together with
/// the ledger key it signs transactions with.
///
/// Ordering is by name, then key, so sets of parties iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Party {
    pub name: MemberName,
    pub ledger_key: LedgerKey,
}

impl Party {
    pub fn new(name: impl Into<MemberName>, ledger_key: LedgerKey) -> Self {
        Self {
            name: name.into(),
            ledger_key,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
