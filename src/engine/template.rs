//! Line-template compilation and matching.
//!
//! A template is literal text interleaved with named placeholders:
//!
//! ```text
//! "%{ts->} %{host} sshd[%{pid}]: %{payload}"
//!  │        │                      └─ capture to end of input
//!  │        └─ capture up to the next literal (" sshd[")
//!  └─ "->" also consumes the run of separators after the capture
//! ```
//!
//! Compilation turns the template string into an alternating
//! `Literal`/`Placeholder` sequence once, at load time. Matching walks that
//! sequence and the input in lockstep:
//!
//! - A literal must match the input bytes exactly (case-sensitive) at the
//!   current position, or the whole match fails immediately.
//! - A placeholder captures greedily up to the *first* occurrence of the next
//!   literal, or to end-of-input when it is the last segment. This is
//!   "consume until literal" grammar semantics; there is no regex-style
//!   backtracking and no longest-match ambiguity resolution.
//! - The `->` marker additionally consumes the run of repeats of the
//!   following literal (classically a space), so ragged column padding does
//!   not end up inside the capture.
//!
//! A match is anchored at the start of the input but does not have to consume
//! all of it; [`Captures::end`] reports where matching stopped so a header
//! match can hand the remainder downstream.

use crate::error::LoadError;
use crate::{Binding, Captures};

/// One compiled template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Placeholder { name: String, trim: bool },
}

/// Compiled, immutable form of a line template.
///
/// Built once at rule-load time and safely shared (it is never mutated by
/// matching). The set of placeholder names is fixed by the template and does
/// not vary per call.
#[derive(Debug, Clone)]
pub struct Matcher {
    segments: Vec<Segment>,
    source: String,
}

impl Matcher {
    /// Compile `template` into a `Matcher`.
    ///
    /// Fails on unbalanced placeholder braces, an empty placeholder name, an
    /// empty template, and on two placeholders with no literal between them
    /// (no split point would exist, so such a template can never match
    /// deterministically).
    pub fn compile(template: &str) -> Result<Self, LoadError> {
        let malformed = |reason: &str| LoadError::MalformedTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut rest = template;
        while !rest.is_empty() {
            match rest.find("%{") {
                None => {
                    segments.push(Segment::Literal(rest.to_string()));
                    rest = "";
                }
                Some(start) => {
                    if start > 0 {
                        segments.push(Segment::Literal(rest[..start].to_string()));
                    }
                    let after_open = &rest[start + 2..];
                    let Some(close) = after_open.find('}') else {
                        return Err(malformed("unterminated placeholder"));
                    };
                    let inner = &after_open[..close];
                    let (name, trim) = match inner.strip_suffix("->") {
                        Some(name) => (name, true),
                        None => (inner, false),
                    };
                    if name.is_empty() {
                        return Err(malformed("empty placeholder name"));
                    }
                    if let Some(Segment::Placeholder { .. }) = segments.last() {
                        return Err(malformed("adjacent placeholders without a separating literal"));
                    }
                    segments.push(Segment::Placeholder { name: name.to_string(), trim });
                    rest = &after_open[close + 1..];
                }
            }
        }
        if segments.is_empty() {
            return Err(malformed("empty template"));
        }
        Ok(Matcher { segments, source: template.to_string() })
    }

    /// The original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in template order. Statically determined by the
    /// template; every successful match binds exactly these names.
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match `input` against the template, anchored at the start.
    ///
    /// Returns `None` on the first literal mismatch; there is no partial
    /// success. On success the returned captures borrow from `input` (values)
    /// and from the matcher (names) without copying either.
    pub fn try_match<'a>(&'a self, input: &'a str) -> Option<Captures<'a>> {
        let mut bindings = Vec::with_capacity(self.segments.len() / 2 + 1);
        let mut pos = 0usize;
        let mut i = 0usize;

        while i < self.segments.len() {
            match &self.segments[i] {
                Segment::Literal(lit) => {
                    if !input[pos..].starts_with(lit.as_str()) {
                        return None;
                    }
                    pos += lit.len();
                    i += 1;
                }
                Segment::Placeholder { name, trim } => match self.segments.get(i + 1) {
                    Some(Segment::Literal(lit)) => {
                        let cap_end = pos + input[pos..].find(lit.as_str())?;
                        bindings.push(Binding { name, value: &input[pos..cap_end] });
                        pos = cap_end;
                        if *trim {
                            // Consume the whole separator run; the first
                            // repeat is the literal segment itself, so it is
                            // already satisfied.
                            while input[pos..].starts_with(lit.as_str()) {
                                pos += lit.len();
                            }
                            i += 2;
                        } else {
                            i += 1;
                        }
                    }
                    // Compilation guarantees placeholders never touch.
                    Some(Segment::Placeholder { .. }) => unreachable!("adjacent placeholders rejected at compile"),
                    None => {
                        // Last segment: capture to end of input. A trailing
                        // trim marker keeps the padding run out of the capture
                        // but still consumes it.
                        let cap_end = if *trim { input.trim_end_matches(' ').len().max(pos) } else { input.len() };
                        bindings.push(Binding { name, value: &input[pos..cap_end] });
                        pos = input.len();
                        i += 1;
                    }
                },
            }
        }

        Some(Captures::new(bindings, pos))
    }
}
