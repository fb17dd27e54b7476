//! Settings node parsing

use super::first_string;
use crate::error::{Result, TopologyError};
use crate::model::Settings;
use kdl::KdlNode;
use std::path::PathBuf;

/// Parse `settings { parallel #true; max-concurrency 4; state-dir ".skyflow" }`
pub fn parse_settings(node: &KdlNode) -> Result<Settings> {
    let mut settings = Settings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "parallel" => {
                    // A bare `parallel` turns it on
                    settings.parallel = Some(
                        child
                            .entries()
                            .first()
                            .and_then(|e| e.value().as_bool())
                            .unwrap_or(true),
                    );
                }
                "max-concurrency" | "max_concurrency" => {
                    let value = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_integer())
                        .and_then(|v| usize::try_from(v).ok())
                        .filter(|v| *v > 0)
                        .ok_or_else(|| {
                            TopologyError::InvalidConfig(
                                "max-concurrency must be a positive integer".to_string(),
                            )
                        })?;
                    settings.max_concurrency = Some(value);
                }
                "state-dir" | "state_dir" => {
                    settings.state_dir = first_string(child).map(PathBuf::from);
                }
                other => {
                    tracing::debug!(setting = other, "Skipping unknown setting");
                }
            }
        }
    }

    Ok(settings)
}
