//! Error taxonomy.
//!
//! The engine draws a hard line between two failure classes:
//!
//! - **Load-time errors** ([`LoadError`]): bad rule data. Surfaced loudly when
//!   a rule set is compiled; the offending rule is rejected before it can run.
//! - **Per-record errors** ([`TagError`], [`TimestampError`], [`ChainError`]):
//!   always recovered locally. A bad line never propagates an error out of
//!   `Pipeline::process`; the worst outcome is a record with fewer enriched
//!   fields than expected.
//!
//! A failed match is *not* an error at all. It is the expected, frequent
//! outcome of trying ordered alternatives, and is modeled as `Option` /
//! [`crate::Dispatch`] variants instead.

use thiserror::Error;

/// Fatal rule-data errors detected while compiling a rule set.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed template {template:?}: {reason}")]
    MalformedTemplate { template: String, reason: String },

    #[error("message rule {rule:?} references unknown chain {chain:?}")]
    UnknownChain { rule: String, chain: String },

    #[error("chain {0:?} is part of a reference cycle")]
    ChainCycle(String),

    #[error("chain {chain:?} references unknown lookup table {table:?}")]
    UnknownTable { chain: String, table: String },

    #[error("message rule {rule:?} references unknown tag policy {policy:?}")]
    UnknownTagPolicy { rule: String, policy: String },

    #[error("invalid tag policy {name:?}: {reason}")]
    BadTagPolicy { name: String, reason: String },

    #[error("invalid rule definition: {0}")]
    BadDefinition(String),

    #[error("rule definition is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value payload decode failure. All-or-nothing: a single token without a
/// value separator fails the whole decode and no partial map is surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("tag token {token:?} has no key-value separator")]
    MissingSeparator { token: String },

    #[error("payload contains no decodable key-value pairs")]
    NoPairs,
}

/// Timestamp composition failure. Non-fatal: the destination field is left
/// unset and the rest of the chain continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("format expects {tokens} components but {values} were captured")]
    TokenCountMismatch { tokens: usize, values: usize },

    #[error("{value:?} does not parse as a {kind} component")]
    BadComponent { kind: &'static str, value: String },

    #[error("no format alternative matched the captured values")]
    NoAlternative,

    #[error("date has no year and assume_current_year is not enabled")]
    MissingYear,

    #[error("incomplete date: day and month are required")]
    IncompleteDate,

    #[error("date components do not form a valid instant")]
    InvalidDate,
}

/// Chain step failure. Only produced when a chain opts into strict flags;
/// under the default lenient policy every step failure degrades to a skipped
/// write. Never escapes `Pipeline::process` either way.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("copy source {src:?} is missing")]
    MissingCopySource { src: String },

    #[error("timestamp compose into {dest:?} failed: {source}")]
    Timestamp {
        dest: String,
        #[source]
        source: TimestampError,
    },
}
