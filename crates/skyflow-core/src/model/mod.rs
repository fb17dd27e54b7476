//! Topology model

mod settings;

pub use settings::{DEFAULT_MAX_CONCURRENCY, Settings};

use crate::error::{Result, TopologyError};
use skyflow_cloud::{Export, ResourceDeclaration, SecretBinding};
use std::collections::HashSet;

/// Everything declared by a project
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Project name
    pub name: String,

    /// Resources, in declaration order
    pub declarations: Vec<ResourceDeclaration>,

    /// Field exports, in declaration order
    pub exports: Vec<Export>,

    /// Locally generated key pairs
    pub secrets: Vec<SecretBinding>,

    pub settings: Settings,
}

impl Topology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn declaration(&self, name: &str) -> Option<&ResourceDeclaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    /// Layer `other` on top of this topology.
    ///
    /// Declarations, exports and key pairs with a name already present
    /// replace the existing entry in place; new ones are appended.
    pub fn merge(&mut self, other: Topology) {
        if !other.name.is_empty() {
            self.name = other.name;
        }
        for decl in other.declarations {
            replace_or_push(&mut self.declarations, decl, |a, b| a.name == b.name);
        }
        for export in other.exports {
            replace_or_push(&mut self.exports, export, |a, b| a.name == b.name);
        }
        for secret in other.secrets {
            replace_or_push(&mut self.secrets, secret, |a, b| a.name == b.name);
        }
        self.settings.merge(other.settings);
    }

    /// Check what the graph builder cannot: export and key pair targets
    pub fn validate(&self) -> Result<()> {
        let declared: HashSet<&str> = self.declarations.iter().map(|d| d.name.as_str()).collect();

        for export in &self.exports {
            if let Some(reference) = export.reference()
                && !declared.contains(reference.node.as_str())
            {
                return Err(TopologyError::UnknownResource {
                    context: format!("export '{}'", export.name),
                    node: reference.node.clone(),
                });
            }
        }

        let mut export_names: HashSet<&str> = self.exports.iter().map(|e| e.name.as_str()).collect();
        for secret in &self.secrets {
            if !declared.contains(secret.target.as_str()) {
                return Err(TopologyError::UnknownResource {
                    context: format!("keypair '{}'", secret.name),
                    node: secret.target.clone(),
                });
            }
            if !export_names.insert(secret.export.as_str()) {
                return Err(TopologyError::InvalidConfig(format!(
                    "keypair '{}' exports '{}', which is already exported",
                    secret.name, secret.export
                )));
            }
        }

        Ok(())
    }
}

fn replace_or_push<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T, &T) -> bool) {
    match items.iter_mut().find(|existing| same(existing, &item)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyflow_cloud::{ApplyMode, PropertyValue, Reference};
    use std::path::Path;

    fn vpc(cidr: &str) -> ResourceDeclaration {
        ResourceDeclaration::new("aws:ec2/Vpc", "my-vpc")
            .with("cidr_block", PropertyValue::literal(cidr))
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert!(!settings.parallel());
        assert_eq!(settings.max_concurrency(), 4);
        assert_eq!(settings.state_dir(), Path::new(".skyflow"));
        assert_eq!(settings.apply_mode(), ApplyMode::Sequential);
    }

    #[test]
    fn test_settings_merge() {
        let mut base = Settings {
            parallel: Some(true),
            max_concurrency: Some(8),
            state_dir: None,
        };
        base.merge(Settings {
            max_concurrency: Some(2),
            ..Default::default()
        });
        assert_eq!(base.apply_mode(), ApplyMode::Parallel { max_concurrency: 2 });
    }

    #[test]
    fn test_merge_replaces_in_place() {
        let mut base = Topology::new("cluster");
        base.declarations.push(vpc("10.0.0.0/16"));
        base.declarations
            .push(ResourceDeclaration::new("aws:ec2/InternetGateway", "igw"));

        let mut local = Topology::default();
        local.declarations.push(vpc("10.9.0.0/16"));
        local
            .declarations
            .push(ResourceDeclaration::new("aws:ec2/SecurityGroup", "web-secgrp"));
        base.merge(local);

        let names: Vec<&str> = base.declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["my-vpc", "igw", "web-secgrp"]);
        assert_eq!(
            base.declaration("my-vpc").unwrap().get("cidr_block"),
            Some(&PropertyValue::literal("10.9.0.0/16"))
        );
        assert_eq!(base.name, "cluster");
    }

    #[test]
    fn test_validate_export_target() {
        let mut topology = Topology::new("cluster");
        topology.declarations.push(vpc("10.0.0.0/16"));
        topology
            .exports
            .push(Export::field("ip", Reference::new("master-node", "public_ip")));

        let err = topology.validate().unwrap_err();
        assert!(matches!(err, TopologyError::UnknownResource { node, .. } if node == "master-node"));
    }

    #[test]
    fn test_validate_keypair() {
        let mut topology = Topology::new("cluster");
        topology.declarations.push(vpc("10.0.0.0/16"));
        topology
            .secrets
            .push(SecretBinding::new("cluster-ssh", "my-key-pair"));
        assert!(matches!(
            topology.validate(),
            Err(TopologyError::UnknownResource { .. })
        ));

        topology
            .declarations
            .push(ResourceDeclaration::new("aws:ec2/KeyPair", "my-key-pair"));
        topology
            .exports
            .push(Export::field("private_key", Reference::new("my-vpc", "id")));
        assert!(matches!(
            topology.validate(),
            Err(TopologyError::InvalidConfig(_))
        ));

        topology.exports.clear();
        assert!(topology.validate().is_ok());
    }
}
