//! Connector descriptors and availability.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A named capability source the gateway can route tool calls to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDescriptor {
    /// Stable connector id (also the MCP server id for MCP-backed ones).
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// What the connector does.
    pub description: String,
    /// Whether tools are direct HTTP calls (true) or MCP-spawned (false).
    pub http_based: bool,
    /// Binary hint for MCP stdio connectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments for the binary hint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables that must be set for the connector to work.
    pub required_env: Vec<String>,
    /// Human-readable hints for obtaining each variable.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env_hints: HashMap<String, String>,
}

impl ConnectorDescriptor {
    /// The required variables absent from the given environment snapshot.
    #[must_use]
    pub fn missing_env(&self, env: &HashMap<String, String>) -> Vec<String> {
        self.required_env
            .iter()
            .filter(|name| {
                env.get(name.as_str())
                    .is_none_or(|v| v.trim().is_empty())
            })
            .cloned()
            .collect()
    }

    /// Whether every required variable is present.
    #[must_use]
    pub fn is_available(&self, env: &HashMap<String, String>) -> bool {
        self.missing_env(env).is_empty()
    }
}

/// A descriptor enriched with computed availability, as listed over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatus {
    /// The static descriptor.
    #[serde(flatten)]
    pub descriptor: ConnectorDescriptor,
    /// Whether every required variable is present.
    pub available: bool,
    /// The variables still missing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_env: Vec<String>,
}

impl ConnectorStatus {
    /// Computes status against an environment snapshot.
    #[must_use]
    pub fn compute(descriptor: ConnectorDescriptor, env: &HashMap<String, String>) -> Self {
        let missing_env = descriptor.missing_env(env);
        Self {
            available: missing_env.is_empty(),
            missing_env,
            descriptor,
        }
    }
}
