//! Key pair node parsing

use super::{arguments, first_string};
use crate::error::{Result, TopologyError};
use kdl::KdlNode;
use skyflow_cloud::SecretBinding;
use std::path::PathBuf;

/// Parse a `keypair` node
///
/// ```kdl
/// keypair "cluster-ssh" {
///     bits 2048
///     path "id_rsa"
///     inject "my-key-pair" field="public_key"
///     export "private_key"
/// }
/// ```
pub fn parse_keypair(node: &KdlNode) -> Result<SecretBinding> {
    let name = first_string(node)
        .ok_or_else(|| TopologyError::InvalidConfig("keypair requires a name".to_string()))?
        .to_string();

    let mut bits = None;
    let mut path = None;
    let mut target = None;
    let mut field = None;
    let mut export = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "bits" => {
                    let value = arguments(child)
                        .next()
                        .and_then(|e| e.value().as_integer())
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| {
                            TopologyError::InvalidConfig(format!(
                                "keypair '{}': bits must be a positive integer",
                                name
                            ))
                        })?;
                    bits = Some(value);
                }
                "path" => {
                    path = Some(PathBuf::from(string_argument(child, &name)?));
                }
                "inject" => {
                    target = Some(string_argument(child, &name)?);
                    field = match child.get("field") {
                        Some(value) => Some(
                            value
                                .as_string()
                                .ok_or_else(|| {
                                    TopologyError::InvalidConfig(format!(
                                        "keypair '{}': inject field must be a string",
                                        name
                                    ))
                                })?
                                .to_string(),
                        ),
                        None => None,
                    };
                }
                "export" => {
                    export = Some(string_argument(child, &name)?);
                }
                other => {
                    return Err(TopologyError::InvalidConfig(format!(
                        "keypair '{}': unknown setting '{}'",
                        name, other
                    )));
                }
            }
        }
    }

    let target = target.ok_or_else(|| {
        TopologyError::InvalidConfig(format!(
            "keypair '{}' requires an inject target, e.g. inject \"my-key-pair\"",
            name
        ))
    })?;

    let mut binding = SecretBinding::new(name, target);
    if let Some(bits) = bits {
        binding.bits = bits;
    }
    if let Some(path) = path {
        binding.path = path;
    }
    if let Some(field) = field {
        binding.field = field;
    }
    if let Some(export) = export {
        binding.export = export;
    }
    Ok(binding)
}

/// The single string argument of a keypair setting
fn string_argument(child: &KdlNode, keypair: &str) -> Result<String> {
    arguments(child)
        .next()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            TopologyError::InvalidConfig(format!(
                "keypair '{}': {} requires a string value",
                keypair,
                child.name().value()
            ))
        })
}
