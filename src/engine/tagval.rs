//! Key-value tag payload decoding.
//!
//! Firewall-style payloads carry their fields as delimited `key=value` tags
//! instead of a fixed column layout:
//!
//! ```text
//! id="0001" severity=info action="pass" srcip=10.0.0.1
//! ```
//!
//! Decoding is driven by a four-field [`TagValPolicy`] (pair separator,
//! key-value separator, open/close quote) supplied as rule data. The decode is
//! all-or-nothing: a token that has content but no key-value separator fails
//! the whole call, and no partial map is ever surfaced. Quotes only strip —
//! they do not protect embedded separators from splitting, which matches how
//! the vendor payloads are actually produced.
//!
//! [`TagValParser`] is the record-facing wrapper: decoded keys are remapped
//! through a `source key -> destination path` table, and unmapped keys land
//! verbatim under a namespace prefix.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{LoadError, TagError};
use crate::record::Record;
use crate::Binding;

/// Separator and quote policy for one vendor's tag format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagValPolicy {
    pub pair_separator: String,
    pub kv_separator: String,
    pub open_quote: String,
    pub close_quote: String,
}

impl TagValPolicy {
    /// The common `k=v k="quoted v"` shape.
    pub fn space_equals() -> Self {
        TagValPolicy {
            pair_separator: " ".to_string(),
            kv_separator: "=".to_string(),
            open_quote: "\"".to_string(),
            close_quote: "\"".to_string(),
        }
    }

    pub(crate) fn validate(&self, name: &str) -> Result<(), LoadError> {
        let bad = |reason: &str| LoadError::BadTagPolicy { name: name.to_string(), reason: reason.to_string() };
        if self.pair_separator.is_empty() {
            return Err(bad("empty pair separator"));
        }
        if self.kv_separator.is_empty() {
            return Err(bad("empty key-value separator"));
        }
        Ok(())
    }
}

/// Strip one matching open/close quote pair, if both are present.
fn strip_quotes<'a>(s: &'a str, policy: &TagValPolicy) -> &'a str {
    if policy.open_quote.is_empty() || policy.close_quote.is_empty() {
        return s;
    }
    if s.len() >= policy.open_quote.len() + policy.close_quote.len()
        && s.starts_with(policy.open_quote.as_str())
        && s.ends_with(policy.close_quote.as_str())
    {
        &s[policy.open_quote.len()..s.len() - policy.close_quote.len()]
    } else {
        s
    }
}

/// Decode `payload` into bindings under `policy`.
///
/// Tokens produced by consecutive pair separators are empty and are skipped;
/// a non-empty token without a key-value separator fails the whole decode.
/// A payload that yields no pairs at all is also a failure — the caller
/// picked the wrong parser for this payload.
pub fn decode<'a>(payload: &'a str, policy: &TagValPolicy) -> Result<Vec<Binding<'a>>, TagError> {
    let mut pairs = Vec::new();
    for token in payload.split(policy.pair_separator.as_str()) {
        if token.is_empty() {
            continue;
        }
        let Some((raw_key, raw_value)) = token.split_once(policy.kv_separator.as_str()) else {
            return Err(TagError::MissingSeparator { token: token.to_string() });
        };
        pairs.push(Binding { name: strip_quotes(raw_key, policy), value: strip_quotes(raw_value, policy) });
    }
    if pairs.is_empty() {
        return Err(TagError::NoPairs);
    }
    Ok(pairs)
}

/// Compiled tag-value stage of a message rule: policy plus key remapping.
///
/// Built once at load time; never mutated by decoding.
#[derive(Debug, Clone)]
pub struct TagValParser {
    policy: TagValPolicy,
    /// source key -> absolute destination path
    key_map: HashMap<String, String>,
    /// absolute path prefix for keys missing from `key_map`
    unmapped_prefix: String,
}

impl TagValParser {
    pub fn new(policy: TagValPolicy, key_map: HashMap<String, String>, unmapped_prefix: impl Into<String>) -> Self {
        TagValParser { policy, key_map, unmapped_prefix: unmapped_prefix.into() }
    }

    pub fn policy(&self) -> &TagValPolicy {
        &self.policy
    }

    /// Decode `payload` and write every pair into `record`.
    ///
    /// All-or-nothing: on decode failure nothing is written.
    pub fn apply(&self, record: &mut dyn Record, payload: &str) -> Result<(), TagError> {
        let pairs = decode(payload, &self.policy)?;
        for pair in pairs {
            match self.key_map.get(pair.name) {
                Some(dest) => record.put(dest, Value::String(pair.value.to_string())),
                None => {
                    debug!(key = pair.name, "tagval: unmapped key");
                    record.put(&format!("{}.{}", self.unmapped_prefix, pair.name), Value::String(pair.value.to_string()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Event;
    use serde_json::json;

    fn pairs<'a>(decoded: &'a [Binding<'a>]) -> Vec<(&'a str, &'a str)> {
        decoded.iter().map(|b| (b.name, b.value)).collect()
    }

    #[test]
    fn decodes_space_equals_payload() {
        let decoded = decode("a=1 b=2", &TagValPolicy::space_equals()).unwrap();
        assert_eq!(pairs(&decoded), [("a", "1"), ("b", "2")]);
    }

    #[test]
    fn token_without_separator_fails_whole_decode() {
        let err = decode("a=1 b", &TagValPolicy::space_equals()).unwrap_err();
        assert_eq!(err, TagError::MissingSeparator { token: "b".to_string() });
    }

    #[test]
    fn strips_one_quote_pair_from_keys_and_values() {
        let decoded = decode(r#""action"="pass" note="a" user=bob"#, &TagValPolicy::space_equals()).unwrap();
        assert_eq!(pairs(&decoded), [("action", "pass"), ("note", "a"), ("user", "bob")]);
    }

    #[test]
    fn quotes_do_not_protect_separators() {
        // The pair split happens before quote stripping; an embedded pair
        // separator inside quotes still splits, and the stray token then has
        // no kv separator.
        let err = decode(r#"msg="hello world""#, &TagValPolicy::space_equals()).unwrap_err();
        assert_eq!(err, TagError::MissingSeparator { token: "world\"".to_string() });
    }

    #[test]
    fn value_splits_on_first_kv_separator_only() {
        let decoded = decode("expr=a=b", &TagValPolicy::space_equals()).unwrap();
        assert_eq!(pairs(&decoded), [("expr", "a=b")]);
    }

    #[test]
    fn consecutive_pair_separators_are_skipped() {
        let decoded = decode("a=1  b=2", &TagValPolicy::space_equals()).unwrap();
        assert_eq!(pairs(&decoded), [("a", "1"), ("b", "2")]);
    }

    #[test]
    fn empty_payload_is_no_pairs() {
        assert_eq!(decode("", &TagValPolicy::space_equals()).unwrap_err(), TagError::NoPairs);
    }

    #[test]
    fn empty_value_is_allowed() {
        let decoded = decode("a= b=2", &TagValPolicy::space_equals()).unwrap();
        assert_eq!(pairs(&decoded), [("a", ""), ("b", "2")]);
    }

    #[test]
    fn parser_remaps_keys_and_prefixes_unmapped() {
        let key_map = HashMap::from([
            ("srcip".to_string(), "fields.saddr".to_string()),
            ("action".to_string(), "fields.action".to_string()),
        ]);
        let parser = TagValParser::new(TagValPolicy::space_equals(), key_map, "fields.tags");
        let mut evt = Event::new();
        parser.apply(&mut evt, r#"srcip=10.0.0.1 action="pass" oddball=7"#).unwrap();
        assert_eq!(evt.as_value()["fields"]["saddr"], json!("10.0.0.1"));
        assert_eq!(evt.as_value()["fields"]["action"], json!("pass"));
        assert_eq!(evt.as_value()["fields"]["tags"]["oddball"], json!("7"));
    }

    #[test]
    fn parser_failure_writes_nothing() {
        let parser = TagValParser::new(TagValPolicy::space_equals(), HashMap::new(), "fields.tags");
        let mut evt = Event::new();
        assert!(parser.apply(&mut evt, "a=1 stray").is_err());
        assert_eq!(evt.as_value().as_object().unwrap().len(), 0);
    }
}
