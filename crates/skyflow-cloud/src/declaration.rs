//! Resource declarations
//!
//! A declaration names a resource by `(kind, logical name)` and carries its
//! input properties. Property values are either literals or references to an
//! output field of another declared resource, nested arbitrarily inside lists
//! and maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Reference to an output field of another resource (`node.field`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    /// Logical name of the referenced resource
    pub node: String,

    /// Output field on the referenced resource (e.g. "id", "public_ip")
    pub field: String,
}

impl Reference {
    pub fn new(node: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            field: field.into(),
        }
    }

    /// Parse `node.field`. The field is everything after the last dot.
    pub fn parse(text: &str) -> Option<Self> {
        let (node, field) = text.rsplit_once('.')?;
        if node.is_empty() || field.is_empty() {
            return None;
        }
        Some(Self::new(node, field))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.field)
    }
}

/// A property value: literal, reference, or a nested list/map of either
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Literal(Value),
    Reference(Reference),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        PropertyValue::Literal(value.into())
    }

    pub fn reference(node: impl Into<String>, field: impl Into<String>) -> Self {
        PropertyValue::Reference(Reference::new(node, field))
    }

    pub fn list(items: impl IntoIterator<Item = PropertyValue>) -> Self {
        PropertyValue::List(items.into_iter().collect())
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, PropertyValue)>) -> Self {
        PropertyValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// All references contained in this value, depth first
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            PropertyValue::Literal(_) => {}
            PropertyValue::Reference(r) => out.push(r),
            PropertyValue::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            PropertyValue::Map(entries) => {
                for value in entries.values() {
                    value.collect_references(out);
                }
            }
        }
    }

    /// Substitute every reference through `lookup`.
    ///
    /// Returns the first reference `lookup` could not satisfy.
    pub fn resolve<F>(&self, lookup: &F) -> Result<Value, Reference>
    where
        F: Fn(&Reference) -> Option<Value>,
    {
        match self {
            PropertyValue::Literal(v) => Ok(v.clone()),
            PropertyValue::Reference(r) => lookup(r).ok_or_else(|| r.clone()),
            PropertyValue::List(items) => items
                .iter()
                .map(|item| item.resolve(lookup))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            PropertyValue::Map(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.resolve(lookup)?);
                }
                Ok(Value::Object(map))
            }
        }
    }

    /// JSON rendering with references shown as `${node.field}`
    pub fn to_symbolic(&self) -> Value {
        self.resolve(&|r: &Reference| Some(Value::String(format!("${{{}}}", r))))
            .unwrap_or(Value::Null)
    }

    /// Whether a previously applied value is still what this declares.
    ///
    /// References match any recorded value; their changes are tracked
    /// through the referenced resource instead.
    pub fn matches_recorded(&self, recorded: &Value) -> bool {
        match (self, recorded) {
            (PropertyValue::Literal(v), recorded) => v == recorded,
            (PropertyValue::Reference(_), _) => true,
            (PropertyValue::List(items), Value::Array(values)) => {
                items.len() == values.len()
                    && items
                        .iter()
                        .zip(values)
                        .all(|(item, value)| item.matches_recorded(value))
            }
            (PropertyValue::Map(entries), Value::Object(values)) => {
                entries.len() == values.len()
                    && entries.iter().all(|(key, item)| {
                        values
                            .get(key)
                            .is_some_and(|value| item.matches_recorded(value))
                    })
            }
            _ => false,
        }
    }

    /// Whether any literal string inside this value contains `needle`
    pub fn contains_text(&self, needle: &str) -> bool {
        fn in_value(value: &Value, needle: &str) -> bool {
            match value {
                Value::String(s) => s.contains(needle),
                Value::Array(items) => items.iter().any(|v| in_value(v, needle)),
                Value::Object(map) => map.values().any(|v| in_value(v, needle)),
                _ => false,
            }
        }

        match self {
            PropertyValue::Literal(v) => in_value(v, needle),
            PropertyValue::Reference(_) => false,
            PropertyValue::List(items) => items.iter().any(|item| item.contains_text(needle)),
            PropertyValue::Map(entries) => entries.values().any(|v| v.contains_text(needle)),
        }
    }
}

/// A declared resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDeclaration {
    /// Resource kind understood by the provider (e.g. "aws:ec2/Vpc")
    pub kind: String,

    /// Logical name, unique within a graph
    pub name: String,

    /// Input properties
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ResourceDeclaration {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: PropertyValue) {
        self.properties.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Get the full resource key (kind:name)
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }

    /// All references made by this declaration's properties
    pub fn references(&self) -> Vec<&Reference> {
        self.properties
            .values()
            .flat_map(PropertyValue::references)
            .collect()
    }

    /// Resolve all properties into a JSON object
    pub fn resolve<F>(&self, lookup: &F) -> Result<Value, Reference>
    where
        F: Fn(&Reference) -> Option<Value>,
    {
        let mut map = Map::new();
        for (key, value) in &self.properties {
            map.insert(key.clone(), value.resolve(lookup)?);
        }
        Ok(Value::Object(map))
    }

    /// Properties with references left symbolic
    pub fn symbolic_properties(&self) -> Value {
        Value::Object(
            self.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.to_symbolic()))
                .collect(),
        )
    }

    /// Whether the recorded resolved properties still match this declaration
    pub fn matches_recorded(&self, recorded: &Value) -> bool {
        let Value::Object(values) = recorded else {
            return false;
        };
        self.properties.len() == values.len()
            && self.properties.iter().all(|(key, item)| {
                values
                    .get(key)
                    .is_some_and(|value| item.matches_recorded(value))
            })
    }
}
