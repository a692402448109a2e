//! JSON pointers for tokens.
//!
//! Every token is addressed by a JSON pointer rooted at the document, e.g.
//! `#/color/brand/primary`. Source documents carry local pointers; the
//! planner's pointer prefix maps them into the global namespace.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A normalised token pointer of the form `#/seg/seg/...`.
///
/// Stored as the full string; segment accessors split on demand. Ordering is
/// plain lexicographic string order, which keeps plan and diff output
/// deterministic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenPointer(String);

impl TokenPointer {
    /// Build a pointer from raw input, normalising the `#/` prefix.
    ///
    /// Accepts `#/a/b`, `/a/b` and `a/b` alike.
    pub fn new(raw: impl AsRef<str>) -> TokenPointer {
        let trimmed = raw
            .as_ref()
            .trim_start_matches('#')
            .trim_start_matches('/');
        TokenPointer(format!("#/{trimmed}"))
    }

    /// Build a pointer from path segments.
    pub fn from_segments<I, S>(segments: I) -> TokenPointer
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("/");
        TokenPointer(format!("#/{joined}"))
    }

    /// Full pointer string including the `#/` root.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path portion with the leading `#/` removed.
    pub fn path(&self) -> &str {
        &self.0[2..]
    }

    /// Path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path().split('/').filter(|s| !s.is_empty())
    }

    /// First path segment, the token's top-level group.
    pub fn group(&self) -> Option<&str> {
        self.segments().next()
    }

    /// Re-root this pointer under a prefix pointer.
    ///
    /// `#/remote` applied to `#/color/primary` yields
    /// `#/remote/color/primary`. An empty or root prefix is the identity.
    pub fn with_prefix(&self, prefix: &TokenPointer) -> TokenPointer {
        if prefix.path().is_empty() {
            return self.clone();
        }
        TokenPointer(format!("#/{}/{}", prefix.path(), self.path()))
    }

    /// Whether `self` is `prefix` itself or nested below it.
    pub fn starts_with(&self, prefix: &TokenPointer) -> bool {
        if prefix.path().is_empty() {
            return true;
        }
        self.path() == prefix.path()
            || self
                .path()
                .strip_prefix(prefix.path())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Root pointer `#/`, used as the identity prefix.
    pub fn root() -> TokenPointer {
        TokenPointer("#/".to_string())
    }
}

impl fmt::Display for TokenPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TokenPointer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("Empty pointer".to_string());
        }
        Ok(TokenPointer::new(s))
    }
}

impl From<&str> for TokenPointer {
    fn from(value: &str) -> Self {
        TokenPointer::new(value)
    }
}
