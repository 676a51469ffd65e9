//! The record contract and a tree-shaped default implementation.
//!
//! The engine does not own event storage. Rules read and write fields through
//! the [`Record`] trait: a dot-delimited path addresses a node in a tree-shaped
//! record, `put` creates intermediate containers as needed, and `delete` is a
//! no-op for absent paths. The host agent supplies its own implementation;
//! [`Event`] is the in-crate implementation used by tests and the CLI.
//!
//! The engine never retains a reference to a record beyond a single `process`
//! call, so implementations need no interior synchronization.

use serde_json::{Map, Value};

/// Mutable, path-addressable event object consumed by the engine.
///
/// Paths are dot-delimited (`"fields.event_time"`). Implementations must treat
/// `put` as create-or-overwrite and `delete` as best-effort.
pub trait Record {
    /// Read the value at `path`, or `None` if any path component is absent.
    fn get(&self, path: &str) -> Option<&Value>;

    /// Write `value` at `path`, creating intermediate objects as needed.
    /// A non-object node standing in the way is replaced.
    fn put(&mut self, path: &str, value: Value);

    /// Remove the value at `path`. No-op if the path is absent.
    fn delete(&mut self, path: &str);

    /// Convenience: read a string value at `path`.
    fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }
}

/// A JSON-object-backed record.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    root: Value,
}

impl Default for Event {
    fn default() -> Self {
        Event { root: Value::Object(Map::new()) }
    }
}

impl Event {
    pub fn new() -> Self {
        Event::default()
    }

    /// Wrap an existing JSON value. Non-object roots are replaced with an
    /// empty object, since a record is a tree by contract.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => Event { root: value },
            _ => Event::default(),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }
}

impl Record for Event {
    fn get(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for part in path.split('.') {
            node = node.as_object()?.get(part)?;
        }
        Some(node)
    }

    fn put(&mut self, path: &str, value: Value) {
        let mut node = &mut self.root;
        let mut parts = path.split('.').peekable();
        while let Some(part) = parts.next() {
            let map = match node {
                Value::Object(map) => map,
                other => {
                    *other = Value::Object(Map::new());
                    other.as_object_mut().unwrap()
                }
            };
            if parts.peek().is_none() {
                map.insert(part.to_string(), value);
                return;
            }
            node = map.entry(part.to_string()).or_insert_with(|| Value::Object(Map::new()));
        }
    }

    fn delete(&mut self, path: &str) {
        let Some((parent_path, leaf)) = path.rsplit_once('.') else {
            if let Value::Object(map) = &mut self.root {
                map.remove(path);
            }
            return;
        };
        let mut node = &mut self.root;
        for part in parent_path.split('.') {
            let Some(next) = node.as_object_mut().and_then(|m| m.get_mut(part)) else {
                return;
            };
            node = next;
        }
        if let Value::Object(map) = node {
            map.remove(leaf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_creates_intermediate_objects() {
        let mut evt = Event::new();
        evt.put("fields.source.ip", json!("10.0.0.1"));
        assert_eq!(evt.get_str("fields.source.ip"), Some("10.0.0.1"));
        assert!(evt.get("fields.source").unwrap().is_object());
    }

    #[test]
    fn put_overwrites_existing_leaf() {
        let mut evt = Event::new();
        evt.put("a.b", json!(1));
        evt.put("a.b", json!(2));
        assert_eq!(evt.get("a.b"), Some(&json!(2)));
    }

    #[test]
    fn put_replaces_scalar_in_the_way() {
        let mut evt = Event::new();
        evt.put("a", json!("scalar"));
        evt.put("a.b", json!("leaf"));
        assert_eq!(evt.get_str("a.b"), Some("leaf"));
    }

    #[test]
    fn get_absent_path_is_none() {
        let evt = Event::new();
        assert_eq!(evt.get("no.such.path"), None);
    }

    #[test]
    fn delete_removes_leaf_and_ignores_absent() {
        let mut evt = Event::new();
        evt.put("fields.action", json!("deny"));
        evt.delete("fields.action");
        assert_eq!(evt.get("fields.action"), None);
        // absent paths are a no-op, including missing parents
        evt.delete("fields.action");
        evt.delete("other.deep.path");
    }

    #[test]
    fn top_level_delete() {
        let mut evt = Event::from_value(json!({"message": "x", "keep": true}));
        evt.delete("message");
        assert_eq!(evt.get("message"), None);
        assert_eq!(evt.get("keep"), Some(&json!(true)));
    }
}
