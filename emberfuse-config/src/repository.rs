// Configuration repository

use crate::{ConfigError, Result};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Thread-safe configuration store.
///
/// Keys may be dotted (`"app.name"`) to reach into nested objects. Clones
/// share the same underlying items.
#[derive(Clone, Default)]
pub struct Repository {
    items: Arc<RwLock<Map<String, Value>>>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding `items`.
    pub fn from_map(items: Map<String, Value>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        lookup(&self.items.read(), key).is_some()
    }

    /// Raw JSON value at `key`.
    pub fn value(&self, key: &str) -> Option<Value> {
        lookup(&self.items.read(), key).cloned()
    }

    /// Typed value at `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .value(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;

        serde_json::from_value(value)
            .map_err(|e| ConfigError::DeserializationError(format!("[{key}]: {e}")))
    }

    /// Typed value at `key`, or `default` when missing or of another type.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Set `key`, creating intermediate objects for dotted keys.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = to_json(value)?;
        insert(&mut self.items.write(), key, value);
        Ok(())
    }

    /// Prepend onto an array value. A missing key starts an empty array.
    pub fn prepend<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        self.update_array(key, value, |array, value| array.insert(0, value))
    }

    /// Push onto an array value. A missing key starts an empty array.
    pub fn push<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        self.update_array(key, value, Vec::push)
    }

    fn update_array<T, F>(&self, key: &str, value: T, update: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(&mut Vec<Value>, Value),
    {
        let value = to_json(value)?;
        let mut items = self.items.write();

        let mut array = match lookup(&items, key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(array)) => array.clone(),
            Some(_) => return Err(ConfigError::NotAnArray(key.to_string())),
        };
        update(&mut array, value);
        insert(&mut items, key, Value::Array(array));
        Ok(())
    }

    /// Copy of every item.
    pub fn all(&self) -> Map<String, Value> {
        self.items.read().clone()
    }

    /// Top-level keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy `other`'s top-level items over this repository's.
    pub fn merge(&self, other: &Repository) {
        if Arc::ptr_eq(&self.items, &other.items) {
            return;
        }
        let incoming = other.all();
        self.items.write().extend(incoming);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("keys", &self.keys())
            .finish()
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ConfigError::SerializationError(e.to_string()))
}

fn lookup<'a>(items: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = items.get(key) {
        return Some(value);
    }

    let mut segments = key.split('.');
    let mut current = items.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn insert(items: &mut Map<String, Value>, key: &str, value: Value) {
    let mut segments: Vec<&str> = key.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };

    let mut current = items;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(map) = entry else {
            return;
        };
        current = map;
    }
    current.insert(last.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let config = Repository::new();
        config.set("name", "emberfuse").unwrap();

        let value: String = config.get("name").unwrap();
        assert_eq!(value, "emberfuse");
        assert!(config.has("name"));
        assert!(!config.has("missing"));
    }

    #[test]
    fn test_get_or_default() {
        let config = Repository::new();
        config.set("port", "not a number").unwrap();

        assert_eq!(config.get_or("missing", 8080u16), 8080);
        assert_eq!(config.get_or("port", 8080u16), 8080);
    }

    #[test]
    fn test_missing_key() {
        let config = Repository::new();
        assert!(matches!(
            config.get::<String>("missing"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_dotted_keys() {
        let config = Repository::new();
        config.set("app.name", "emberfuse").unwrap();
        config.set("app.debug", true).unwrap();

        assert_eq!(config.get::<String>("app.name").unwrap(), "emberfuse");
        assert!(config.get::<bool>("app.debug").unwrap());
        assert_eq!(
            config.value("app"),
            Some(json!({ "name": "emberfuse", "debug": true }))
        );
        assert_eq!(config.keys(), vec!["app".to_string()]);
    }

    #[test]
    fn test_dotted_set_replaces_scalar_parent() {
        let config = Repository::new();
        config.set("cache", "file").unwrap();
        config.set("cache.driver", "redis").unwrap();

        assert_eq!(config.value("cache"), Some(json!({ "driver": "redis" })));
    }

    #[test]
    fn test_push_and_prepend() {
        let config = Repository::new();
        config.push("services", "b").unwrap();
        config.push("services", "c").unwrap();
        config.prepend("services", "a").unwrap();

        assert_eq!(config.get::<Vec<String>>("services").unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_push_onto_scalar_fails() {
        let config = Repository::new();
        config.set("name", "emberfuse").unwrap();

        assert!(matches!(
            config.push("name", "x"),
            Err(ConfigError::NotAnArray(_))
        ));
    }

    #[test]
    fn test_merge() {
        let config = Repository::new();
        config.set("a", 1).unwrap();
        config.set("b", 1).unwrap();

        let other = Repository::new();
        other.set("b", 2).unwrap();
        other.set("c", 3).unwrap();

        config.merge(&other);
        config.merge(&config.clone());

        assert_eq!(config.keys(), vec!["a", "b", "c"]);
        assert_eq!(config.get::<i64>("b").unwrap(), 2);
        assert_eq!(config.len(), 3);
    }

    #[test]
    fn test_clones_share_items() {
        let config = Repository::new();
        let handle = config.clone();
        handle.set("shared", true).unwrap();

        assert!(config.has("shared"));
    }
}
