//! Export node parsing

use super::{arguments, resource::parse_reference};
use crate::error::{Result, TopologyError};
use kdl::KdlNode;
use skyflow_cloud::Export;

/// Parse `export "NAME" (ref)"node.field" [sensitive=#true]`
pub fn parse_export(node: &KdlNode) -> Result<Export> {
    let mut args = arguments(node);
    let name = args
        .next()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| TopologyError::InvalidConfig("export requires a name".to_string()))?
        .to_string();

    let source = args.next().ok_or_else(|| {
        TopologyError::InvalidConfig(format!(
            "export '{}' requires a reference, e.g. (ref)\"master-node.public_ip\"",
            name
        ))
    })?;
    // The (ref) annotation is optional here: an export is always a reference
    if let Some(ty) = source.ty().map(|t| t.value())
        && ty != "ref"
    {
        return Err(TopologyError::InvalidConfig(format!(
            "export '{}': unknown type annotation ({})",
            name, ty
        )));
    }
    let reference = parse_reference(source, &format!("export '{}'", name))?;

    let sensitive = node
        .get("sensitive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok(if sensitive {
        Export::sensitive_field(name, reference)
    } else {
        Export::field(name, reference)
    })
}
