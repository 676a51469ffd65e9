//! Rule definitions as data.
//!
//! Per-vendor rules are *data* fed into the engine: templates, dispatch
//! tables, chains, and lookup tables arrive as a JSON document and are
//! compiled here into the frozen values the engine runs. This is where the
//! construction-then-freeze lifecycle lives:
//!
//! ```text
//! JSON ── RuleSetDef (serde) ── compile_rule_set ──▶ CompiledRuleSet
//!                                   │                    │
//!                    load-time validation:               └─ Arc<DispatchTable>,
//!                    - template syntax                      shared Arc<Chain>s,
//!                    - chain / table / policy refs          PipelineOptions
//!                    - chain reference cycles
//! ```
//!
//! Field names in rule data are relative — `"eventcategory"`, not
//! `"fields.eventcategory"` — and are resolved against the document's
//! `fields_root` during compilation, so the engine itself only ever sees
//! absolute record paths.
//!
//! Named chains may reference each other through `{"op": "chain"}` steps.
//! References resolve to shared `Arc<Chain>` handles, never copies, and the
//! resolver rejects cycles before anything is published; a chain can
//! therefore never reference itself directly or transitively at run time.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::api::{Pipeline, PipelineOptions};
use crate::engine::{
    Chain, ChainFlags, DateToken, DispatchTable, HeaderRule, LookupTable, Matcher, MessageRule, PayloadParser, Step,
    TagValParser, TagValPolicy, TimestampDefaults, parse_offset,
};
use crate::error::LoadError;

fn default_fields_root() -> String {
    "fields".to_string()
}
fn default_message_field() -> String {
    "message".to_string()
}
fn default_message_key_field() -> String {
    "messageid".to_string()
}
fn default_payload_field() -> String {
    "payload".to_string()
}

/// Top-level rule definition document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSetDef {
    /// Record path under which captured fields land.
    #[serde(default = "default_fields_root")]
    pub fields_root: String,
    /// Record path of the raw input line.
    #[serde(default = "default_message_field")]
    pub message_field: String,
    /// Placeholder name carrying the message-type key.
    #[serde(default = "default_message_key_field")]
    pub message_key_field: String,
    /// Placeholder name carrying the leftover payload.
    #[serde(default = "default_payload_field")]
    pub payload_field: String,
    #[serde(default)]
    pub timestamp: TimestampDef,
    /// Named tag-value separator/quote policies.
    #[serde(default)]
    pub policies: HashMap<String, TagPolicyDef>,
    /// Named lookup tables.
    #[serde(default)]
    pub lookups: HashMap<String, LookupDef>,
    /// Named, shareable chains.
    #[serde(default)]
    pub chains: HashMap<String, ChainDef>,
    /// Header rules, tried in declaration order.
    pub headers: Vec<HeaderDef>,
    /// Message rules keyed by message-type key.
    #[serde(default)]
    pub messages: HashMap<String, MessageDef>,
}

impl RuleSetDef {
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Timestamp interpretation defaults for the whole rule set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimestampDef {
    /// Numeric offset, e.g. `"+02:00"` or `"Z"`. Defaults to UTC.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Opt-in for year-less date formats.
    #[serde(default)]
    pub assume_current_year: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagPolicyDef {
    pub pair_separator: String,
    pub kv_separator: String,
    #[serde(default)]
    pub open_quote: String,
    #[serde(default)]
    pub close_quote: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupDef {
    pub entries: HashMap<String, String>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainDef {
    #[serde(default)]
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub strict_copy: bool,
    #[serde(default)]
    pub strict_timestamp: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderDef {
    pub id: String,
    pub pattern: String,
    /// Constant fields bound alongside the captures.
    #[serde(default)]
    pub set: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageDef {
    /// Variant tag written as `msg_id1` when the payload parses.
    #[serde(default)]
    pub tag: Option<String>,
    /// Payload template. Exactly one of `pattern`/`tags` must be present.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Tag-value payload decode.
    #[serde(default)]
    pub tags: Option<TagDecodeDef>,
    /// Inline enrichment steps.
    #[serde(default)]
    pub chain: Option<ChainDef>,
    /// Name of a shared chain to run instead of (not in addition to) an
    /// inline one.
    #[serde(default)]
    pub use_chain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagDecodeDef {
    /// Name of the policy in `policies`.
    pub policy: String,
    /// Source tag key -> destination field.
    #[serde(default)]
    pub map: HashMap<String, String>,
    /// Field under which unmapped keys land; defaults to `"tags"`.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// One enrichment step, tagged by operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepDef {
    Set { field: String, value: Value },
    Copy { dest: String, src: String },
    Lookup { dest: String, table: String, key: String },
    Timestamp { dest: String, sources: Vec<String>, formats: Vec<Vec<DateToken>> },
    Domain { dest: String, src: String },
    Chain { name: String },
}

/// A frozen rule set, ready to hand to workers.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    pub table: Arc<DispatchTable>,
    pub options: PipelineOptions,
}

impl CompiledRuleSet {
    pub fn into_pipeline(self) -> Pipeline {
        Pipeline::with_options(self.table, self.options)
    }
}

/// Everything step compilation needs to resolve references and paths.
struct CompileCtx<'a> {
    root: &'a str,
    lookups: &'a HashMap<String, Arc<LookupTable>>,
    defaults: TimestampDefaults,
}

impl CompileCtx<'_> {
    fn abs(&self, field: &str) -> String {
        format!("{}.{}", self.root, field)
    }
}

/// Compile a definition document into frozen engine values.
///
/// All validation happens here: a malformed template or a dangling reference
/// rejects the rule set before any record can reach it.
pub fn compile_rule_set(def: &RuleSetDef) -> Result<CompiledRuleSet, LoadError> {
    let defaults = TimestampDefaults {
        timezone: match &def.timestamp.timezone {
            Some(tz) => parse_offset(tz)
                .ok_or_else(|| LoadError::BadDefinition(format!("unparseable default timezone {tz:?}")))?,
            None => TimestampDefaults::default().timezone,
        },
        assume_current_year: def.timestamp.assume_current_year,
        ..TimestampDefaults::default()
    };

    let mut policies = HashMap::new();
    for (name, p) in &def.policies {
        let policy = TagValPolicy {
            pair_separator: p.pair_separator.clone(),
            kv_separator: p.kv_separator.clone(),
            open_quote: p.open_quote.clone(),
            close_quote: p.close_quote.clone(),
        };
        policy.validate(name)?;
        policies.insert(name.clone(), policy);
    }

    let mut lookups = HashMap::new();
    for (name, l) in &def.lookups {
        let table = match &l.default {
            Some(d) => LookupTable::with_default(l.entries.clone(), d.clone()),
            None => LookupTable::new(l.entries.clone()),
        };
        lookups.insert(name.clone(), Arc::new(table));
    }

    let ctx = CompileCtx { root: &def.fields_root, lookups: &lookups, defaults };

    // Resolve named chains depth-first; `visiting` carries the DFS path so a
    // back-edge is reported as a cycle on the chain that closes it.
    let mut resolved: HashMap<String, Arc<Chain>> = HashMap::new();
    for name in def.chains.keys() {
        let mut visiting = Vec::new();
        resolve_chain(name, &def.chains, &ctx, &mut resolved, &mut visiting)?;
    }

    let mut headers = Vec::with_capacity(def.headers.len());
    for h in &def.headers {
        let matcher = Matcher::compile(&h.pattern)?;
        let fixed: Vec<(String, Value)> = h.set.iter().map(|(field, value)| (ctx.abs(field), value.clone())).collect();
        headers.push(HeaderRule { id: h.id.clone(), matcher, fixed });
    }

    let mut messages = HashMap::with_capacity(def.messages.len());
    for (key, m) in &def.messages {
        let parser = match (&m.pattern, &m.tags) {
            (Some(pattern), None) => PayloadParser::Template(Matcher::compile(pattern)?),
            (None, Some(tags)) => {
                let policy = policies.get(&tags.policy).cloned().ok_or_else(|| LoadError::UnknownTagPolicy {
                    rule: key.clone(),
                    policy: tags.policy.clone(),
                })?;
                let key_map: HashMap<String, String> =
                    tags.map.iter().map(|(src, dest)| (src.clone(), ctx.abs(dest))).collect();
                let prefix = ctx.abs(tags.prefix.as_deref().unwrap_or("tags"));
                PayloadParser::TagVal(TagValParser::new(policy, key_map, prefix))
            }
            _ => {
                return Err(LoadError::BadDefinition(format!(
                    "message rule {key:?} needs exactly one of \"pattern\" or \"tags\""
                )));
            }
        };

        let chain = match (&m.chain, &m.use_chain) {
            (Some(_), Some(_)) => {
                return Err(LoadError::BadDefinition(format!(
                    "message rule {key:?} has both an inline chain and \"use_chain\""
                )));
            }
            (None, Some(name)) => Arc::clone(
                resolved.get(name).ok_or_else(|| LoadError::UnknownChain { rule: key.clone(), chain: name.clone() })?,
            ),
            (Some(inline), None) => Arc::new(build_chain(key, inline, &ctx, &resolved)?),
            (None, None) => Arc::new(Chain::default()),
        };

        let tag = m.tag.as_ref().map(|t| (ctx.abs("msg_id1"), Value::String(t.clone())));
        messages.insert(key.clone(), MessageRule { tag, parser, chain });
    }

    let table = DispatchTable::new(headers, messages, def.fields_root.clone());
    let options = PipelineOptions {
        message_field: def.message_field.clone(),
        message_key_field: def.message_key_field.clone(),
        payload_field: def.payload_field.clone(),
    };
    Ok(CompiledRuleSet { table: Arc::new(table), options })
}

fn resolve_chain(
    name: &str,
    defs: &HashMap<String, ChainDef>,
    ctx: &CompileCtx<'_>,
    resolved: &mut HashMap<String, Arc<Chain>>,
    visiting: &mut Vec<String>,
) -> Result<Arc<Chain>, LoadError> {
    if let Some(chain) = resolved.get(name) {
        return Ok(Arc::clone(chain));
    }
    if visiting.iter().any(|n| n == name) {
        return Err(LoadError::ChainCycle(name.to_string()));
    }
    let Some(def) = defs.get(name) else {
        let rule = visiting.last().cloned().unwrap_or_default();
        return Err(LoadError::UnknownChain { rule, chain: name.to_string() });
    };

    visiting.push(name.to_string());
    let mut steps = Vec::with_capacity(def.steps.len());
    for step in &def.steps {
        steps.push(match step {
            StepDef::Chain { name: sub } => Step::SubChain(resolve_chain(sub, defs, ctx, resolved, visiting)?),
            other => compile_step(name, other, ctx)?,
        });
    }
    visiting.pop();

    let chain = Arc::new(Chain::with_flags(steps, chain_flags(def)));
    resolved.insert(name.to_string(), Arc::clone(&chain));
    Ok(chain)
}

/// Compile an inline (per-message) chain; sub-chain references resolve
/// against the already-frozen named chains.
fn build_chain(
    owner: &str,
    def: &ChainDef,
    ctx: &CompileCtx<'_>,
    resolved: &HashMap<String, Arc<Chain>>,
) -> Result<Chain, LoadError> {
    let mut steps = Vec::with_capacity(def.steps.len());
    for step in &def.steps {
        steps.push(match step {
            StepDef::Chain { name } => Step::SubChain(Arc::clone(resolved.get(name).ok_or_else(|| {
                LoadError::UnknownChain { rule: owner.to_string(), chain: name.clone() }
            })?)),
            other => compile_step(owner, other, ctx)?,
        });
    }
    Ok(Chain::with_flags(steps, chain_flags(def)))
}

fn chain_flags(def: &ChainDef) -> ChainFlags {
    let mut flags = ChainFlags::empty();
    if def.strict_copy {
        flags |= ChainFlags::STRICT_COPY;
    }
    if def.strict_timestamp {
        flags |= ChainFlags::STRICT_TIMESTAMP;
    }
    flags
}

fn compile_step(owner: &str, def: &StepDef, ctx: &CompileCtx<'_>) -> Result<Step, LoadError> {
    Ok(match def {
        StepDef::Set { field, value } => Step::SetConstant { dest: ctx.abs(field), value: value.clone() },
        StepDef::Copy { dest, src } => Step::CopyField { dest: ctx.abs(dest), src: ctx.abs(src) },
        StepDef::Lookup { dest, table, key } => {
            let table = Arc::clone(ctx.lookups.get(table).ok_or_else(|| LoadError::UnknownTable {
                chain: owner.to_string(),
                table: table.clone(),
            })?);
            Step::Lookup { dest: ctx.abs(dest), key: ctx.abs(key), table }
        }
        StepDef::Timestamp { dest, sources, formats } => Step::ComposeTimestamp {
            dest: ctx.abs(dest),
            sources: sources.iter().map(|s| ctx.abs(s)).collect(),
            specs: formats.clone(),
            defaults: ctx.defaults,
        },
        StepDef::Domain { dest, src } => Step::SplitDomain { dest: ctx.abs(dest), src: ctx.abs(src) },
        StepDef::Chain { name } => {
            // callers handle sub-chain resolution; reaching this arm is a bug
            unreachable!("chain step {name:?} must be resolved by the caller")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Outcome;
    use crate::record::{Event, Record};
    use serde_json::json;

    fn sample_def() -> RuleSetDef {
        serde_json::from_value(json!({
            "timestamp": {"timezone": "Z"},
            "policies": {
                "tvm": {"pair_separator": " ", "kv_separator": "=", "open_quote": "\"", "close_quote": "\""}
            },
            "lookups": {
                "actions": {"entries": {"pass": "permit", "drop": "deny"}, "default": "unknown"}
            },
            "chains": {
                "common": {"steps": [
                    {"op": "set", "field": "product", "value": "acmefw"},
                    {"op": "chain", "name": "stamp"}
                ]},
                "stamp": {"steps": [
                    {"op": "timestamp", "dest": "event_time",
                     "sources": ["hdate", "htime"],
                     "formats": [["month_name", "day_of_month"], ["month_num", "day_of_month"]]}
                ]}
            },
            "headers": [
                {"id": "0001", "pattern": "%{hdate->} %{htime->} %{messageid}: %{payload}",
                 "set": {"header_id": "0001"}}
            ],
            "messages": {
                "fw": {
                    "tag": "fw:01",
                    "tags": {"policy": "tvm", "map": {"action": "raw_action", "dst": "dhost"}},
                    "chain": {"steps": [
                        {"op": "lookup", "dest": "action", "table": "actions", "key": "raw_action"},
                        {"op": "domain", "dest": "sld", "src": "dhost"},
                        {"op": "chain", "name": "common"}
                    ]}
                },
                "login": {
                    "pattern": "user %{username} from %{saddr}",
                    "use_chain": "common"
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn compiles_and_processes_tagval_rule() {
        let compiled = compile_rule_set(&sample_def()).unwrap();
        let pipeline = compiled.into_pipeline();
        let mut evt = Event::new();
        evt.put("message", json!(r#"Jan 15 fw: action="drop" dst=mail.example.co.uk port=443"#));
        assert_eq!(pipeline.process(&mut evt), Outcome::Matched);
        assert_eq!(evt.get("fields.header_id"), Some(&json!("0001")));
        assert_eq!(evt.get("fields.msg_id1"), Some(&json!("fw:01")));
        assert_eq!(evt.get("fields.action"), Some(&json!("deny")));
        assert_eq!(evt.get("fields.sld"), Some(&json!("example.co.uk")));
        assert_eq!(evt.get("fields.tags.port"), Some(&json!("443")));
        // the shared chain ran via the inline chain's sub-chain step
        assert_eq!(evt.get("fields.product"), Some(&json!("acmefw")));
    }

    #[test]
    fn shared_chain_is_one_allocation() {
        let compiled = compile_rule_set(&sample_def()).unwrap();
        let fw = compiled.table.message_rule("fw").unwrap();
        let login = compiled.table.message_rule("login").unwrap();
        // "login" uses "common" directly; "fw" nests it as a sub-chain step.
        let nested = fw.chain.steps().iter().find_map(|s| match s {
            Step::SubChain(c) => Some(Arc::clone(c)),
            _ => None,
        });
        assert!(Arc::ptr_eq(&nested.unwrap(), &login.chain));
    }

    #[test]
    fn chain_cycle_is_rejected() {
        let def: RuleSetDef = serde_json::from_value(json!({
            "chains": {
                "a": {"steps": [{"op": "chain", "name": "b"}]},
                "b": {"steps": [{"op": "chain", "name": "a"}]}
            },
            "headers": []
        }))
        .unwrap();
        assert!(matches!(compile_rule_set(&def), Err(LoadError::ChainCycle(_))));
    }

    #[test]
    fn self_referencing_chain_is_rejected() {
        let def: RuleSetDef = serde_json::from_value(json!({
            "chains": {"a": {"steps": [{"op": "chain", "name": "a"}]}},
            "headers": []
        }))
        .unwrap();
        assert!(matches!(compile_rule_set(&def), Err(LoadError::ChainCycle(name)) if name == "a"));
    }

    #[test]
    fn dangling_references_are_rejected() {
        let unknown_chain: RuleSetDef = serde_json::from_value(json!({
            "headers": [],
            "messages": {"m": {"pattern": "%{x}", "use_chain": "nope"}}
        }))
        .unwrap();
        assert!(matches!(compile_rule_set(&unknown_chain), Err(LoadError::UnknownChain { .. })));

        let unknown_table: RuleSetDef = serde_json::from_value(json!({
            "headers": [],
            "messages": {"m": {"pattern": "%{x}", "chain": {"steps": [
                {"op": "lookup", "dest": "d", "table": "nope", "key": "k"}
            ]}}}
        }))
        .unwrap();
        assert!(matches!(compile_rule_set(&unknown_table), Err(LoadError::UnknownTable { .. })));

        let unknown_policy: RuleSetDef = serde_json::from_value(json!({
            "headers": [],
            "messages": {"m": {"tags": {"policy": "nope"}}}
        }))
        .unwrap();
        assert!(matches!(compile_rule_set(&unknown_policy), Err(LoadError::UnknownTagPolicy { .. })));
    }

    #[test]
    fn malformed_template_rejects_rule_set() {
        let def: RuleSetDef = serde_json::from_value(json!({
            "headers": [{"id": "h", "pattern": "%{unclosed"}]
        }))
        .unwrap();
        assert!(matches!(compile_rule_set(&def), Err(LoadError::MalformedTemplate { .. })));
    }

    #[test]
    fn message_rule_needs_exactly_one_parser() {
        let neither: RuleSetDef = serde_json::from_value(json!({
            "headers": [],
            "messages": {"m": {}}
        }))
        .unwrap();
        assert!(matches!(compile_rule_set(&neither), Err(LoadError::BadDefinition(_))));
    }

    #[test]
    fn from_json_surfaces_parse_errors() {
        assert!(matches!(RuleSetDef::from_json("{not json"), Err(LoadError::Json(_))));
    }
}
