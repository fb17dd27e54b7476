//! Exported outputs

use crate::declaration::Reference;
use crate::error::OutputError;
use crate::graph::{Graph, NodeStatus};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::fmt;

/// Where an export's value comes from
#[derive(Debug, Clone)]
pub enum ExportSource {
    /// An output field of an applied resource
    Field { reference: Reference, sensitive: bool },
    /// Locally generated secret material
    Secret(SecretString),
}

/// A named export, in declaration order
#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub source: ExportSource,
}

impl Export {
    pub fn field(name: impl Into<String>, reference: Reference) -> Self {
        Self {
            name: name.into(),
            source: ExportSource::Field {
                reference,
                sensitive: false,
            },
        }
    }

    pub fn sensitive_field(name: impl Into<String>, reference: Reference) -> Self {
        Self {
            name: name.into(),
            source: ExportSource::Field {
                reference,
                sensitive: true,
            },
        }
    }

    pub fn secret(name: impl Into<String>, value: SecretString) -> Self {
        Self {
            name: name.into(),
            source: ExportSource::Secret(value),
        }
    }

    pub fn is_sensitive(&self) -> bool {
        match &self.source {
            ExportSource::Field { sensitive, .. } => *sensitive,
            ExportSource::Secret(_) => true,
        }
    }

    /// The referenced resource field, for field exports
    pub fn reference(&self) -> Option<&Reference> {
        match &self.source {
            ExportSource::Field { reference, .. } => Some(reference),
            ExportSource::Secret(_) => None,
        }
    }
}

/// An exported value
#[derive(Debug, Clone)]
pub enum OutputValue {
    Plain(String),
    Sensitive(SecretString),
}

impl OutputValue {
    pub fn is_sensitive(&self) -> bool {
        matches!(self, OutputValue::Sensitive(_))
    }

    /// The cleartext value. Do not log the result for sensitive values.
    pub fn expose(&self) -> &str {
        match self {
            OutputValue::Plain(value) => value,
            OutputValue::Sensitive(secret) => secret.expose_secret(),
        }
    }
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputValue::Plain(value) => f.write_str(value),
            OutputValue::Sensitive(_) => f.write_str("[sensitive]"),
        }
    }
}

/// Ordered export name -> value mapping
#[derive(Debug, Clone, Default)]
pub struct OutputSet {
    entries: Vec<(String, OutputValue)>,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value; a replaced entry keeps its position
    pub fn insert(&mut self, name: impl Into<String>, value: OutputValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&OutputValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON array of `{name, value, sensitive}` in export order.
    ///
    /// Sensitive values are masked unless `reveal` is set.
    pub fn to_json(&self, reveal: bool) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|(name, value)| {
                    let shown = if reveal {
                        value.expose().to_string()
                    } else {
                        value.to_string()
                    };
                    json!({
                        "name": name,
                        "value": shown,
                        "sensitive": value.is_sensitive(),
                    })
                })
                .collect(),
        )
    }
}

/// Read every export from an applied graph.
///
/// Non-string outputs are rendered as JSON text. Secret exports and
/// exports marked sensitive become [`OutputValue::Sensitive`].
pub fn finalize_outputs(graph: &Graph, exports: &[Export]) -> Result<OutputSet, OutputError> {
    let mut outputs = OutputSet::new();

    for export in exports {
        let value = match &export.source {
            ExportSource::Secret(secret) => OutputValue::Sensitive(secret.clone()),
            ExportSource::Field {
                reference,
                sensitive,
            } => {
                let node = graph
                    .node(&reference.node)
                    .filter(|n| n.status() == NodeStatus::Applied)
                    .ok_or_else(|| OutputError::NotApplied {
                        export: export.name.clone(),
                        node: reference.node.clone(),
                    })?;
                let raw = node
                    .output(&reference.field)
                    .ok_or_else(|| OutputError::MissingField {
                        export: export.name.clone(),
                        node: reference.node.clone(),
                        field: reference.field.clone(),
                    })?;
                let text = match raw {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if *sensitive {
                    OutputValue::Sensitive(SecretString::from(text))
                } else {
                    OutputValue::Plain(text)
                }
            }
        };
        outputs.insert(export.name.clone(), value);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::ResourceDeclaration;
    use serde_json::Map;

    fn applied_graph() -> Graph {
        let mut graph = Graph::build(vec![
            ResourceDeclaration::new("aws:ec2/Instance", "master-node"),
            ResourceDeclaration::new("aws:ec2/Instance", "worker-node-1"),
        ])
        .unwrap();

        let mut outputs = Map::new();
        outputs.insert("public_ip".to_string(), json!("203.0.113.4"));
        outputs.insert("cpu_count".to_string(), json!(2));
        graph.node_at_mut(0).mark_applied("i-1".to_string(), outputs);
        graph
    }

    #[test]
    fn test_finalize_reads_fields_in_export_order() {
        let graph = applied_graph();
        let exports = vec![
            Export::field("cpus", Reference::new("master-node", "cpu_count")),
            Export::field("master_public_ip", Reference::new("master-node", "public_ip")),
            Export::secret("private_key", SecretString::from("KEY".to_string())),
        ];

        let outputs = finalize_outputs(&graph, &exports).unwrap();
        assert_eq!(outputs.names(), vec!["cpus", "master_public_ip", "private_key"]);
        assert_eq!(outputs.get("cpus").unwrap().expose(), "2");
        assert_eq!(
            outputs.get("master_public_ip").unwrap().to_string(),
            "203.0.113.4"
        );
        assert!(outputs.get("private_key").unwrap().is_sensitive());
        assert_eq!(outputs.get("private_key").unwrap().to_string(), "[sensitive]");
    }

    #[test]
    fn test_unapplied_node_cannot_be_exported() {
        let graph = applied_graph();
        let exports = vec![Export::field(
            "worker1_public_ip",
            Reference::new("worker-node-1", "public_ip"),
        )];

        let err = finalize_outputs(&graph, &exports).unwrap_err();
        assert_eq!(
            err,
            OutputError::NotApplied {
                export: "worker1_public_ip".to_string(),
                node: "worker-node-1".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_field() {
        let graph = applied_graph();
        let exports = vec![Export::field("dns", Reference::new("master-node", "public_dns"))];

        let err = finalize_outputs(&graph, &exports).unwrap_err();
        assert!(matches!(err, OutputError::MissingField { field, .. } if field == "public_dns"));
    }

    #[test]
    fn test_json_masks_sensitive_values() {
        let mut outputs = OutputSet::new();
        outputs.insert("ip", OutputValue::Plain("203.0.113.4".to_string()));
        outputs.insert(
            "private_key",
            OutputValue::Sensitive(SecretString::from("KEY".to_string())),
        );

        let masked = outputs.to_json(false);
        assert_eq!(masked[1]["value"], json!("[sensitive]"));
        assert_eq!(masked[1]["sensitive"], json!(true));

        let revealed = outputs.to_json(true);
        assert_eq!(revealed[1]["value"], json!("KEY"));
        assert_eq!(revealed[0]["value"], json!("203.0.113.4"));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut outputs = OutputSet::new();
        outputs.insert("a", OutputValue::Plain("1".to_string()));
        outputs.insert("b", OutputValue::Plain("2".to_string()));
        outputs.insert("a", OutputValue::Plain("3".to_string()));

        assert_eq!(outputs.names(), vec!["a", "b"]);
        assert_eq!(outputs.get("a").unwrap().expose(), "3");
    }
}
