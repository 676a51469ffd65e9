extern crate self as siftline;

#[macro_use]
mod macros;
mod api;
mod defs;
mod engine;
mod error;
mod record;

pub use api::{Outcome, Pipeline, PipelineOptions};
pub use defs::{
    ChainDef, CompiledRuleSet, HeaderDef, LookupDef, MessageDef, RuleSetDef, StepDef, TagDecodeDef, TagPolicyDef,
    TimestampDef, compile_rule_set,
};
pub use engine::{
    Chain, ChainFlags, DateToken, Dispatch, DispatchTable, HeaderRule, LookupTable, Matcher, MessageRule,
    PayloadParser, Step, TagValParser, TagValPolicy, TimestampDefaults, compose, decode_tags, registrable_domain,
};
pub use error::{ChainError, LoadError, TagError, TimestampError};
pub use record::{Event, Record};

/// Field values carried by records are JSON values; captured text is always
/// written as a JSON string.
pub use serde_json::Value;

// --- Capture bindings --------------------------------------------------------

/// One field binding: a placeholder or tag name together with the exact
/// substring of the input it bound to.
///
/// Both the template matcher and the key-value tag decoder produce bindings in
/// this form, so downstream code (dispatch, tests) treats them uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// The result of a successful template match: the bindings in template order
/// plus the byte offset where matching stopped.
///
/// The stop offset matters for payload continuation: a header template binds a
/// payload placeholder and the message stage keeps parsing from there, so a
/// match does not have to consume the whole input.
#[derive(Debug, Clone)]
pub struct Captures<'a> {
    bindings: Vec<Binding<'a>>,
    end: usize,
}

impl<'a> Captures<'a> {
    pub(crate) fn new(bindings: Vec<Binding<'a>>, end: usize) -> Self {
        Captures { bindings, end }
    }

    /// Look up a binding by placeholder name.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.bindings.iter().find(|b| b.name == name).map(|b| b.value)
    }

    /// Bindings in template order.
    pub fn iter(&self) -> impl Iterator<Item = &Binding<'a>> {
        self.bindings.iter()
    }

    /// Byte offset into the input where matching stopped.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
