//! Public pipeline surface.
//!
//! A [`Pipeline`] ties a frozen [`DispatchTable`] to the record-facing entry
//! point the host agent calls per event. The table is behind `Arc` so one
//! compiled rule set serves arbitrarily many pipelines and worker threads.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::engine::{Dispatch, DispatchTable, MessageRule, PayloadParser};
use crate::record::Record;

/// Field and placeholder conventions for one pipeline.
///
/// The defaults match the rule corpus: the raw line lives in `message`, the
/// header binds the message key as `messageid` and the leftover payload as
/// `payload`.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Record path of the raw input line.
    pub message_field: String,
    /// Placeholder name that carries the message-type key.
    pub message_key_field: String,
    /// Placeholder name that carries the leftover payload.
    pub payload_field: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            message_field: "message".to_string(),
            message_key_field: "messageid".to_string(),
            payload_field: "payload".to_string(),
        }
    }
}

/// What `process` did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Header and message rule matched; payload fields and chain enrichment
    /// were applied.
    Matched,
    /// A header matched but the message stage did not (unknown key, or the
    /// payload did not parse). The record keeps its header fields.
    HeaderOnly,
    /// Nothing matched; the record passed through unmodified.
    NoMatch,
}

/// The single entry point the host invokes per record.
///
/// `process` is synchronous and touches no state other than the record it is
/// given: a `Pipeline` is freely shared across worker threads. Re-running the
/// same pipeline over an already-processed record deterministically re-sets
/// the same fields.
#[derive(Debug, Clone)]
pub struct Pipeline {
    table: Arc<DispatchTable>,
    opts: PipelineOptions,
}

impl Pipeline {
    pub fn new(table: Arc<DispatchTable>) -> Self {
        Pipeline { table, opts: PipelineOptions::default() }
    }

    pub fn with_options(table: Arc<DispatchTable>, opts: PipelineOptions) -> Self {
        Pipeline { table, opts }
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Match and enrich one record in place.
    ///
    /// Never fails: per-record problems degrade to fewer enriched fields, and
    /// the outcome reports how far the record got.
    pub fn process(&self, record: &mut dyn Record) -> Outcome {
        let Some(raw) = record.get_str(&self.opts.message_field).map(str::to_string) else {
            debug!(field = %self.opts.message_field, "no raw message field");
            return Outcome::NoMatch;
        };

        match self.table.dispatch(&raw, record, &self.opts.message_key_field, &self.opts.payload_field) {
            Dispatch::NoHeader => Outcome::NoMatch,
            Dispatch::NoMessage { .. } => Outcome::HeaderOnly,
            Dispatch::Matched { rule, payload } => self.apply_message(rule, &payload, record),
        }
    }

    /// Run the message stage: payload parse, variant tag, enrichment chain.
    fn apply_message(&self, rule: &MessageRule, payload: &str, record: &mut dyn Record) -> Outcome {
        let root = self.table.fields_root();
        match &rule.parser {
            PayloadParser::Template(matcher) => match matcher.try_match(payload) {
                Some(caps) => {
                    for binding in caps.iter() {
                        record.put(&format!("{root}.{}", binding.name), Value::String(binding.value.to_string()));
                    }
                }
                None => {
                    debug!(template = matcher.source(), "payload template did not match");
                    return Outcome::HeaderOnly;
                }
            },
            PayloadParser::TagVal(parser) => {
                if let Err(err) = parser.apply(record, payload) {
                    debug!(%err, "payload tag decode failed");
                    return Outcome::HeaderOnly;
                }
            }
        }

        if let Some((path, value)) = &rule.tag {
            record.put(path, value.clone());
        }
        if let Err(err) = rule.chain.run(record) {
            // Strict-flagged chains may abort; the record still passes
            // through with whatever was bound before the failing step.
            debug!(%err, "chain aborted");
        }
        Outcome::Matched
    }
}
