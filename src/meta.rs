use std::collections::BTreeMap;
use std::sync::Arc;

use spin::RwLock;

/// An opaque metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<Vec<u8>> for MetaValue {
    fn from(value: Vec<u8>) -> Self {
        MetaValue::Bytes(value)
    }
}

/// String-keyed metadata with prototype-style fallback: a lookup that misses
/// locally continues in the map this one was forked from (the shadowed
/// ancestor's metadata).
#[derive(Debug)]
pub struct MetaMap {
    parent: Option<Arc<MetaMap>>,
    table: RwLock<BTreeMap<String, MetaValue>>,
}

impl MetaMap {
    pub(crate) fn new(parent: Option<Arc<MetaMap>>) -> Self {
        MetaMap {
            parent,
            table: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<MetaValue> {
        if let Some(value) = self.table.read().get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(key))
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&self, key: &str, value: impl Into<MetaValue>) {
        self.table.write().insert(key.to_string(), value.into());
    }

    /// Remove a local entry. An inherited entry is untouched and will show
    /// through again.
    pub fn delete(&self, key: &str) -> bool {
        self.table.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.table.write().clear();
    }
}
