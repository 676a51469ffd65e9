//! Two-stage header/message dispatch.
//!
//! Selecting the right rule for an incoming line is a prioritized alternation
//! over header templates followed by an exact map lookup on the extracted
//! message key:
//!
//! ```text
//! raw message ──▶ header rules, declared order ──▶ first full match wins
//!                        │                               │
//!                        │ (all fail)                    ▼
//!                        ▼                    fixed fields + captures ──▶ record
//!                    NoHeader                           │
//!                                        message key ───┴──▶ exact lookup
//!                                              │                  │ (miss)
//!                                              ▼                  ▼
//!                                     MessageRule + payload    NoMessage
//! ```
//!
//! There is no retry across rules once one partially binds: a header template
//! either matches fully (and writes its fields) or is discarded entirely, and
//! the next rule starts fresh against the original input. Evaluation order is
//! the declaration order, every time — dispatch is deterministic by
//! construction.
//!
//! A lookup miss is not an error: the record keeps whatever the header bound
//! and passes through unenriched. This is the engine-wide policy — a failed
//! match stage means "keep what is already bound", never "abort the record".

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use super::chain::Chain;
use super::tagval::TagValParser;
use super::template::Matcher;
use crate::record::Record;

/// One header alternative: a template over the raw message plus the constant
/// fields it binds alongside its captures (`header_id`, a hard-wired message
/// key, ...). Field paths are absolute record paths, resolved at load time.
#[derive(Debug, Clone)]
pub struct HeaderRule {
    pub id: String,
    pub matcher: Matcher,
    pub fixed: Vec<(String, Value)>,
}

/// How a message rule parses its payload: a column-shaped template or a
/// key-value tag decode.
#[derive(Debug, Clone)]
pub enum PayloadParser {
    Template(Matcher),
    TagVal(TagValParser),
}

/// The per-message-type rule selected by the dispatch lookup.
#[derive(Debug, Clone)]
pub struct MessageRule {
    /// Variant tag written to the record when the payload parses (the rule
    /// corpus distinguishes `httpproxy:01`-style variants this way). Absolute
    /// path and value, resolved at load time.
    pub tag: Option<(String, Value)>,
    pub parser: PayloadParser,
    pub chain: Arc<Chain>,
}

/// Frozen dispatch state: ordered header rules plus the message-key map.
///
/// Built once at rule-load time and shared read-only across concurrent
/// `process` calls; nothing here is mutated by dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    headers: Vec<HeaderRule>,
    messages: HashMap<String, MessageRule>,
    /// Absolute path prefix under which captured placeholder fields land.
    fields_root: String,
}

/// Outcome of the two-stage selection.
#[derive(Debug)]
pub enum Dispatch<'a> {
    /// Header and message rule both resolved; `payload` is the leftover text
    /// the message parser should run over.
    Matched { rule: &'a MessageRule, payload: String },
    /// No header template matched; the record is untouched.
    NoHeader,
    /// A header matched (its fields are bound) but the message key has no
    /// rule.
    NoMessage { key: String },
}

impl DispatchTable {
    pub fn new(headers: Vec<HeaderRule>, messages: HashMap<String, MessageRule>, fields_root: impl Into<String>) -> Self {
        DispatchTable { headers, messages, fields_root: fields_root.into() }
    }

    pub fn fields_root(&self) -> &str {
        &self.fields_root
    }

    pub fn headers(&self) -> &[HeaderRule] {
        &self.headers
    }

    pub fn message_rule(&self, key: &str) -> Option<&MessageRule> {
        self.messages.get(key)
    }

    /// Select a rule for `raw` and bind header fields into `record`.
    ///
    /// `key_field` and `payload_field` are the placeholder names (not paths)
    /// that carry the message key and the leftover payload.
    pub fn dispatch(&self, raw: &str, record: &mut dyn Record, key_field: &str, payload_field: &str) -> Dispatch<'_> {
        for header in &self.headers {
            let Some(caps) = header.matcher.try_match(raw) else {
                trace!(header = %header.id, "header: no match");
                continue;
            };
            debug!(header = %header.id, "header: matched");

            // First full match wins: bind captures and fixed fields, in that
            // order so a fixed field can pin a capture name (a header that
            // hard-wires `messageid` does exactly that).
            let mut key: Option<String> = None;
            let mut payload = String::new();
            for binding in caps.iter() {
                if binding.name == key_field {
                    key = Some(binding.value.to_string());
                }
                if binding.name == payload_field {
                    payload = binding.value.to_string();
                }
                record.put(&format!("{}.{}", self.fields_root, binding.name), Value::String(binding.value.to_string()));
            }
            for (path, value) in &header.fixed {
                if let Some(rest) = path.strip_prefix(&format!("{}.", self.fields_root)) {
                    if rest == key_field {
                        key = value.as_str().map(str::to_string);
                    }
                }
                record.put(path, value.clone());
            }

            let Some(key) = key else {
                debug!(header = %header.id, "header bound no message key");
                return Dispatch::NoMessage { key: String::new() };
            };
            return match self.messages.get(&key) {
                Some(rule) => Dispatch::Matched { rule, payload },
                None => {
                    debug!(%key, "no message rule for key");
                    Dispatch::NoMessage { key }
                }
            };
        }
        Dispatch::NoHeader
    }
}
