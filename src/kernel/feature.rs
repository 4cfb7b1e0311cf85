//! Identifiers, tokens and record features

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Environment identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ident(Arc<str>);

impl Ident {
    pub fn new(name: impl AsRef<str>) -> Self {
        Ident(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Self {
        Ident::new(name)
    }
}

/// Unforgeable token with a process-unique, monotonically increasing id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// Mint a new token
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Token(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creation id
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$token({})", self.0)
    }
}

/// Key of a composite field.
///
/// The derived ordering is the total order over features: kinds first
/// (Str < Int < Bool < Eof < Null < Token), then values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Str(Arc<str>),
    Int(i64),
    Bool(bool),
    Eof,
    Null,
    Token(Token),
}

impl Feature {
    pub fn str(name: impl AsRef<str>) -> Self {
        Feature::Str(Arc::from(name.as_ref()))
    }
}

impl From<&str> for Feature {
    fn from(name: &str) -> Self {
        Feature::str(name)
    }
}

impl From<i64> for Feature {
    fn from(n: i64) -> Self {
        Feature::Int(n)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Str(s) => write!(f, "'{}'", s),
            Feature::Int(n) => write!(f, "{}", n),
            Feature::Bool(b) => write!(f, "{}", b),
            Feature::Eof => f.write_str("eof"),
            Feature::Null => f.write_str("null"),
            Feature::Token(t) => write!(f, "{}", t),
        }
    }
}
