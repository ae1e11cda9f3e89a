//! Code signature registry.
//!
//! Normalizes code into a content fingerprint so that logic emitted earlier in
//! the run can be recognized again regardless of comments, blank lines,
//! whitespace, quoting style or letter case.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

use super::code_text::strip_comments;

/// SHA-256 (hex) of normalized code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical text that fingerprints are computed from.
///
/// Comments and docstrings are removed, single quotes become double quotes,
/// everything is lowercased and all whitespace is dropped.
pub fn canonical_form(code: &str) -> String {
    strip_comments(code)
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '\'' { '"' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Fingerprint of `code`, or `None` when nothing but whitespace and comments
/// remains. `None` never matches anything.
pub fn normalize(code: &str) -> Option<Fingerprint> {
    let canonical = canonical_form(code);
    if canonical.is_empty() {
        return None;
    }
    let digest = Sha256::digest(canonical.as_bytes());
    Some(Fingerprint(hex::encode(digest)))
}

/// Set of fingerprints for code emitted during the current run.
#[derive(Debug, Clone, Default)]
pub struct CodeSignatureRegistry {
    seen: HashSet<Fingerprint>,
}

impl CodeSignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&self, code: &str) -> Option<Fingerprint> {
        normalize(code)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Whether equivalent code has already been registered.
    pub fn contains_code(&self, code: &str) -> bool {
        normalize(code).is_some_and(|fp| self.contains(&fp))
    }

    /// Record a fingerprint. Returns `true` if it was not known before.
    pub fn register(&mut self, fingerprint: Fingerprint) -> bool {
        self.seen.insert(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget all signatures. Only called when a new run begins.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
