//! Enrichment chains.
//!
//! A chain is an ordered, immutable list of enrichment steps applied to a
//! record after a message rule has matched. Chains are built once at rule-load
//! time, published behind `Arc`, and shared freely: hundreds of message rules
//! can hold the same chain handle, and nested [`Step::SubChain`] steps
//! reference shared chains rather than copying their step lists.
//!
//! ```text
//! MessageRule ──┐
//! MessageRule ──┼──▶ Arc<Chain> ── steps ──▶ [Set, Copy, Lookup, SubChain ──▶ Arc<Chain>]
//! MessageRule ──┘                                                  (shared "common" chain)
//! ```
//!
//! Acyclicity is a build-time property: a chain can only reference chains
//! that already exist, and the rule-set compiler rejects cyclic references
//! before anything is published. The executor therefore recurses without a
//! depth check.
//!
//! Step failures are per-step and non-fatal under the default lenient policy:
//! a missing copy source, a lookup miss, or an unparseable timestamp leaves
//! the destination unset and the rest of the chain runs. The strict
//! [`ChainFlags`] upgrade the copy/timestamp cases to chain-aborting errors
//! for the rare vendor rules that depend on it; even then the error never
//! escapes `Pipeline::process`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::datetime::{self, DateToken, TimestampDefaults};
use super::domain;
use crate::error::ChainError;
use crate::record::Record;

bitflags::bitflags! {
    /// Per-chain strictness switches. Empty means the lenient policy
    /// observed across the vendor rule corpus.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChainFlags: u8 {
        /// `CopyField` with a missing source aborts the chain instead of
        /// silently skipping.
        const STRICT_COPY = 1 << 0;
        /// `ComposeTimestamp` parse failure aborts the chain instead of
        /// leaving the destination unset.
        const STRICT_TIMESTAMP = 1 << 1;
    }
}

/// Static value-to-value mapping used to normalize categorical fields.
///
/// Built once and shared behind `Arc`; the absent-key policy is "leave the
/// destination unset" unless a default value is configured.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<String, String>,
    default: Option<String>,
}

impl LookupTable {
    pub fn new(entries: HashMap<String, String>) -> Self {
        LookupTable { entries, default: None }
    }

    pub fn with_default(entries: HashMap<String, String>, default: impl Into<String>) -> Self {
        LookupTable { entries, default: Some(default.into()) }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).or(self.default.as_ref()).map(String::as_str)
    }
}

/// One enrichment step. The variant set is closed; rule data selects variants
/// and parameters, never behavior.
#[derive(Debug, Clone)]
pub enum Step {
    /// Unconditionally write a constant value.
    SetConstant { dest: String, value: Value },
    /// Copy a field; skipped when the source is absent.
    CopyField { dest: String, src: String },
    /// Map a field's value through a lookup table.
    Lookup { dest: String, key: String, table: Arc<LookupTable> },
    /// Compose a timestamp from captured component fields.
    ComposeTimestamp {
        dest: String,
        sources: Vec<String>,
        specs: Vec<Vec<DateToken>>,
        defaults: TimestampDefaults,
    },
    /// Write the registrable domain of a hostname field.
    SplitDomain { dest: String, src: String },
    /// Run a shared chain in place.
    SubChain(Arc<Chain>),
}

/// Ordered, immutable enrichment step list.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    steps: Vec<Step>,
    flags: ChainFlags,
}

impl Chain {
    pub fn new(steps: Vec<Step>) -> Self {
        Chain { steps, flags: ChainFlags::empty() }
    }

    pub fn with_flags(steps: Vec<Step>, flags: ChainFlags) -> Self {
        Chain { steps, flags }
    }

    pub fn flags(&self) -> ChainFlags {
        self.flags
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run every step in order against `record`.
    ///
    /// Returns `Err` only when a strict flag turns a step failure into an
    /// abort; the default lenient policy always returns `Ok`.
    pub fn run(&self, record: &mut dyn Record) -> Result<(), ChainError> {
        for step in &self.steps {
            self.run_step(step, record)?;
        }
        Ok(())
    }

    fn run_step(&self, step: &Step, record: &mut dyn Record) -> Result<(), ChainError> {
        match step {
            Step::SetConstant { dest, value } => record.put(dest, value.clone()),
            Step::CopyField { dest, src } => match record.get(src).cloned() {
                Some(value) => record.put(dest, value),
                None if self.flags.contains(ChainFlags::STRICT_COPY) => {
                    return Err(ChainError::MissingCopySource { src: src.clone() });
                }
                None => debug!(%src, "copy: source missing, skipped"),
            },
            Step::Lookup { dest, key, table } => {
                let Some(raw) = record.get_str(key).map(str::to_string) else {
                    debug!(%key, "lookup: key field missing, skipped");
                    return Ok(());
                };
                match table.get(&raw) {
                    Some(mapped) => record.put(dest, Value::String(mapped.to_string())),
                    None => debug!(%key, %raw, "lookup: no entry, destination left unset"),
                }
            }
            Step::ComposeTimestamp { dest, sources, specs, defaults } => {
                let values: Option<Vec<String>> =
                    sources.iter().map(|s| record.get_str(s).map(str::to_string)).collect();
                let result = match &values {
                    Some(values) => {
                        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
                        datetime::compose(&refs, specs, defaults)
                    }
                    None => Err(crate::error::TimestampError::NoAlternative),
                };
                match result {
                    Ok(ts) => record.put(dest, Value::String(ts.to_rfc3339())),
                    Err(err) if self.flags.contains(ChainFlags::STRICT_TIMESTAMP) => {
                        return Err(ChainError::Timestamp { dest: dest.clone(), source: err });
                    }
                    Err(err) => debug!(%dest, %err, "timestamp: destination left unset"),
                }
            }
            Step::SplitDomain { dest, src } => {
                let Some(host) = record.get_str(src).map(str::to_string) else {
                    return Ok(());
                };
                match domain::registrable_domain(&host) {
                    Some(reg) => record.put(dest, Value::String(reg.to_string())),
                    None => debug!(%src, %host, "split_domain: not a splittable hostname"),
                }
            }
            Step::SubChain(chain) => chain.run(record)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Event;
    use serde_json::json;

    fn lookup_table() -> Arc<LookupTable> {
        Arc::new(LookupTable::new(HashMap::from([
            ("0".to_string(), "deny".to_string()),
            ("1".to_string(), "permit".to_string()),
        ])))
    }

    #[test]
    fn set_constant_always_writes() {
        let chain = Chain::new(vec![Step::SetConstant { dest: "f.cat".into(), value: json!("1801000000") }]);
        let mut evt = Event::new();
        chain.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.cat"), Some(&json!("1801000000")));
    }

    #[test]
    fn copy_skips_missing_source_by_default() {
        let chain = Chain::new(vec![
            Step::CopyField { dest: "f.dst".into(), src: "f.absent".into() },
            Step::SetConstant { dest: "f.after".into(), value: json!(true) },
        ]);
        let mut evt = Event::new();
        chain.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.dst"), None);
        // the chain kept running
        assert_eq!(evt.get("f.after"), Some(&json!(true)));
    }

    #[test]
    fn strict_copy_aborts_chain() {
        let chain = Chain::with_flags(
            vec![
                Step::CopyField { dest: "f.dst".into(), src: "f.absent".into() },
                Step::SetConstant { dest: "f.after".into(), value: json!(true) },
            ],
            ChainFlags::STRICT_COPY,
        );
        let mut evt = Event::new();
        assert!(matches!(chain.run(&mut evt), Err(ChainError::MissingCopySource { .. })));
        assert_eq!(evt.get("f.after"), None);
    }

    #[test]
    fn lookup_miss_leaves_destination_unset() {
        let chain = Chain::new(vec![Step::Lookup { dest: "f.action".into(), key: "f.code".into(), table: lookup_table() }]);
        let mut evt = Event::new();
        evt.put("f.code", json!("7"));
        chain.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.action"), None);

        evt.put("f.code", json!("1"));
        chain.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.action"), Some(&json!("permit")));
    }

    #[test]
    fn lookup_default_applies_on_miss() {
        let table = Arc::new(LookupTable::with_default(
            HashMap::from([("0".to_string(), "deny".to_string())]),
            "unknown",
        ));
        let chain = Chain::new(vec![Step::Lookup { dest: "f.action".into(), key: "f.code".into(), table }]);
        let mut evt = Event::new();
        evt.put("f.code", json!("42"));
        chain.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.action"), Some(&json!("unknown")));
    }

    #[test]
    fn timestamp_failure_is_non_fatal() {
        let chain = Chain::new(vec![
            Step::ComposeTimestamp {
                dest: "f.event_time".into(),
                sources: vec!["f.d".into(), "f.mon".into(), "f.y".into()],
                specs: vec![vec![DateToken::DayOfMonth, DateToken::MonthName, DateToken::Year]],
                defaults: TimestampDefaults::default(),
            },
            Step::SetConstant { dest: "f.after".into(), value: json!(true) },
        ]);
        let mut evt = Event::new();
        evt.put("f.d", json!("15"));
        evt.put("f.mon", json!("NotAMonth"));
        evt.put("f.y", json!("2023"));
        chain.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.event_time"), None);
        assert_eq!(evt.get("f.after"), Some(&json!(true)));

        evt.put("f.mon", json!("Jan"));
        chain.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.event_time"), Some(&json!("2023-01-15T00:00:00+00:00")));
    }

    #[test]
    fn split_domain_and_absent_source() {
        let chain = Chain::new(vec![Step::SplitDomain { dest: "f.sld".into(), src: "f.host".into() }]);
        let mut evt = Event::new();
        // absent source: no-op, never an error
        chain.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.sld"), None);

        evt.put("f.host", json!("mail.example.co.uk"));
        chain.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.sld"), Some(&json!("example.co.uk")));
    }

    #[test]
    fn subchain_executes_in_place() {
        let shared = Arc::new(Chain::new(vec![Step::SetConstant { dest: "f.shared".into(), value: json!("yes") }]));
        let a = Chain::new(vec![
            Step::SetConstant { dest: "f.rule".into(), value: json!("a") },
            Step::SubChain(Arc::clone(&shared)),
        ]);
        let b = Chain::new(vec![Step::SubChain(Arc::clone(&shared))]);

        let mut evt = Event::new();
        a.run(&mut evt).unwrap();
        assert_eq!(evt.get("f.shared"), Some(&json!("yes")));

        let mut evt2 = Event::new();
        b.run(&mut evt2).unwrap();
        // the shared chain behaves identically regardless of the caller
        assert_eq!(evt2.get("f.shared"), Some(&json!("yes")));
    }

    #[test]
    fn chain_is_idempotent_for_unchanged_sources() {
        let chain = Chain::new(vec![
            Step::SetConstant { dest: "f.cat".into(), value: json!("x") },
            Step::CopyField { dest: "f.copy".into(), src: "f.src".into() },
            Step::Lookup { dest: "f.action".into(), key: "f.code".into(), table: lookup_table() },
        ]);
        let mut evt = Event::new();
        evt.put("f.src", json!("v"));
        evt.put("f.code", json!("0"));
        chain.run(&mut evt).unwrap();
        let once = evt.clone();
        chain.run(&mut evt).unwrap();
        assert_eq!(evt, once);
    }
}
