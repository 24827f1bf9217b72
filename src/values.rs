// src/values.rs
use crate::error::{PkiError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CLUSTER_DOMAIN_PATH: &str = "global.discovery.clusterDomain";
pub const PUBLIC_DOMAIN_TEMPLATE_PATH: &str = "global.modules.publicDomainTemplate";

/// Hierarchical configuration addressed by dot-separated paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuesTree {
    root: Value,
}

impl Default for ValuesTree {
    fn default() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }
}

impl From<Value> for ValuesTree {
    fn from(root: Value) -> Self {
        Self { root }
    }
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PkiError::Values(format!("invalid values path '{}'", path)));
    }
    Ok(segments)
}

impl ValuesTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_json(&self) -> &Value {
        &self.root
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments = split_path(path).ok()?;
        segments
            .iter()
            .try_fold(&self.root, |node, segment| node.as_object()?.get(*segment))
    }

    /// String leaf at `path`; `None` when missing or not a string.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Writes `value` at `path`, creating intermediate objects. Non-object
    /// intermediates are replaced.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let segments = split_path(path)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| PkiError::Values("empty values path".to_string()))?;

        let mut node = &mut self.root;
        for segment in parents {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                return Err(PkiError::Values(format!("cannot descend into '{}'", path)));
            };
            node = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            map.insert(last.to_string(), value.into());
        }
        Ok(())
    }

    /// Removes the leaf at `path`, returning it if it was present.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments = split_path(path).ok()?;
        let (last, parents) = segments.split_last()?;

        let mut node = &mut self.root;
        for segment in parents {
            node = node.as_object_mut()?.get_mut(*segment)?;
        }
        node.as_object_mut()?.remove(*last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut values = ValuesTree::new();
        values.set("m.tls.crt", "pem").unwrap();

        assert_eq!(values.get_str("m.tls.crt"), Some("pem"));
        assert!(values.exists("m.tls"));
        assert_eq!(values.as_json(), &json!({"m": {"tls": {"crt": "pem"}}}));
    }

    #[test]
    fn set_keeps_sibling_keys() {
        let mut values = ValuesTree::from(json!({"m": {"tls": {"other": 1}}}));
        values.set("m.tls.key", "k").unwrap();

        assert_eq!(values.get("m.tls.other"), Some(&json!(1)));
        assert_eq!(values.get_str("m.tls.key"), Some("k"));
    }

    #[test]
    fn set_replaces_scalar_intermediate() {
        let mut values = ValuesTree::from(json!({"m": "scalar"}));
        values.set("m.tls.ca", "c").unwrap();
        assert_eq!(values.get_str("m.tls.ca"), Some("c"));
    }

    #[test]
    fn remove_and_missing_paths() {
        let mut values = ValuesTree::from(json!({"a": {"b": {"c": true}}}));

        assert_eq!(values.remove("a.b.c"), Some(json!(true)));
        assert!(!values.exists("a.b.c"));
        assert!(values.exists("a.b"));
        assert_eq!(values.remove("a.x.y"), None);
        assert_eq!(values.get("a.b.c.d"), None);
    }

    #[test]
    fn rejects_empty_segments() {
        let mut values = ValuesTree::new();
        assert!(values.set("a..b", "x").is_err());
        assert!(values.set("", "x").is_err());
        assert_eq!(values.get("a."), None);
    }
}
