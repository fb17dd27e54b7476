//! Resource node parsing

use super::arguments;
use crate::error::{Result, TopologyError};
use kdl::{KdlEntry, KdlNode, KdlValue};
use serde_json::Value;
use skyflow_cloud::{PropertyValue, Reference, ResourceDeclaration};
use std::collections::BTreeMap;

/// Type annotation marking a string as a `node.field` reference
const REF_TYPE: &str = "ref";

/// List item node name
const ITEM: &str = "-";

/// Parse `resource "KIND" "NAME" { ... }`
pub fn parse_resource(node: &KdlNode) -> Result<ResourceDeclaration> {
    let mut args = arguments(node).map(|e| e.value().as_string());
    let (Some(Some(kind)), Some(Some(name))) = (args.next(), args.next()) else {
        return Err(TopologyError::InvalidConfig(
            "resource requires a kind and a name, e.g. resource \"aws:ec2/Vpc\" \"my-vpc\""
                .to_string(),
        ));
    };

    let mut decl = ResourceDeclaration::new(kind, name);
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value();
            if decl.get(key).is_some() {
                return Err(TopologyError::InvalidConfig(format!(
                    "resource '{}': property '{}' is set more than once",
                    name, key
                )));
            }
            let context = format!("{}.{}", name, key);
            decl.set(key, parse_property(child, &context)?);
        }
    }

    Ok(decl)
}

/// Parse a property node into a value.
///
/// One argument is a scalar, several are a list, `key=value` entries or
/// child nodes form a map, and children all named `-` form a list.
pub fn parse_property(node: &KdlNode, context: &str) -> Result<PropertyValue> {
    let args: Vec<&KdlEntry> = arguments(node).collect();
    let props: Vec<&KdlEntry> = node.entries().iter().filter(|e| e.name().is_some()).collect();
    let children = node.children().map(|c| c.nodes()).unwrap_or_default();

    if !args.is_empty() && (!props.is_empty() || !children.is_empty()) {
        return Err(TopologyError::InvalidConfig(format!(
            "{}: mixes arguments with properties or children",
            context
        )));
    }

    if !children.is_empty() && children.iter().all(|c| c.name().value() == ITEM) {
        if !props.is_empty() {
            return Err(TopologyError::InvalidConfig(format!(
                "{}: a list cannot also have properties",
                context
            )));
        }
        let items = children
            .iter()
            .enumerate()
            .map(|(i, item)| parse_property(item, &format!("{}[{}]", context, i)))
            .collect::<Result<Vec<_>>>()?;
        return Ok(PropertyValue::List(items));
    }

    match args.as_slice() {
        [] if props.is_empty() && node.children().is_none() => Err(TopologyError::InvalidConfig(
            format!("{}: missing value", context),
        )),
        [] => {
            let mut map = BTreeMap::new();
            for entry in props {
                let key = entry.name().map(|n| n.value()).unwrap_or_default();
                let value = parse_entry(entry, &format!("{}.{}", context, key))?;
                insert_unique(&mut map, key, value, context)?;
            }
            for child in children {
                let key = child.name().value();
                let value = parse_property(child, &format!("{}.{}", context, key))?;
                insert_unique(&mut map, key, value, context)?;
            }
            Ok(PropertyValue::Map(map))
        }
        [single] => parse_entry(single, context),
        many => Ok(PropertyValue::List(
            many.iter()
                .map(|entry| parse_entry(entry, context))
                .collect::<Result<Vec<_>>>()?,
        )),
    }
}

fn insert_unique(
    map: &mut BTreeMap<String, PropertyValue>,
    key: &str,
    value: PropertyValue,
    context: &str,
) -> Result<()> {
    if map.insert(key.to_string(), value).is_some() {
        return Err(TopologyError::InvalidConfig(format!(
            "{}: key '{}' is set more than once",
            context, key
        )));
    }
    Ok(())
}

/// Parse a single entry, honouring a `(ref)` type annotation
pub(crate) fn parse_entry(entry: &KdlEntry, context: &str) -> Result<PropertyValue> {
    match entry.ty().map(|t| t.value()) {
        Some(REF_TYPE) => parse_reference(entry, context).map(PropertyValue::Reference),
        Some(other) => Err(TopologyError::InvalidConfig(format!(
            "{}: unknown type annotation ({})",
            context, other
        ))),
        None => Ok(PropertyValue::Literal(kdl_value_to_json(entry.value(), context)?)),
    }
}

/// Parse a `(ref)"node.field"` entry
pub(crate) fn parse_reference(entry: &KdlEntry, context: &str) -> Result<Reference> {
    let invalid = || TopologyError::InvalidReference {
        context: context.to_string(),
        reference: entry.value().to_string(),
    };
    let text = entry.value().as_string().ok_or_else(invalid)?;
    Reference::parse(text).ok_or_else(invalid)
}

/// Convert a KDL value to JSON
fn kdl_value_to_json(value: &KdlValue, context: &str) -> Result<Value> {
    if let Some(s) = value.as_string() {
        Ok(Value::String(s.to_string()))
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i).map(Value::from).map_err(|_| {
            TopologyError::InvalidConfig(format!("{}: integer {} is out of range", context, i))
        })
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f).map(Value::Number).ok_or_else(|| {
            TopologyError::InvalidConfig(format!("{}: {} is not a finite number", context, value))
        })
    } else if let Some(b) = value.as_bool() {
        Ok(Value::Bool(b))
    } else {
        Ok(Value::Null)
    }
}
