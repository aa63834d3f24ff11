//! Spawn-config client and the production session spawner.
//!
//! The runtime holds no local registry of how to stand up each server; it
//! asks the connector service for a spawn config and builds the matching
//! transport from it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tollgate::facilitator::BoxFuture;

use crate::error::McpError;
use crate::pool::SessionSpawner;
use crate::session::McpSession;
use crate::transport::{DockerTransport, SseTransport, StdioTransport, Transport, TransportType};

/// How to stand up one MCP server, as served by the connector service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnConfig {
    /// The transport the server speaks.
    pub transport: TransportType,
    /// Binary to execute (stdio).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments for the binary (stdio).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment handed to the child; nothing else leaks through.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Container image (docker).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Port the image listens on (docker).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<u16>,
    /// Server base URL (http).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    /// Package identifier, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

/// Client for `GET {base}/registry/servers/{id}/spawn`.
#[derive(Debug, Clone)]
pub struct SpawnConfigClient {
    base_url: String,
    client: reqwest::Client,
}

impl SpawnConfigClient {
    /// Creates a client for the connector service.
    #[must_use]
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
        }
    }

    /// Fetches the spawn config for one server.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::SpawnConfig`] when the service is unreachable,
    /// answers non-2xx, or the body does not parse.
    pub async fn get(&self, server_id: &str) -> Result<SpawnConfig, McpError> {
        let url = format!("{}/registry/servers/{server_id}/spawn", self.base_url);
        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| McpError::SpawnConfig {
                    server_id: server_id.to_owned(),
                    detail: e.to_string(),
                })?;
        if !response.status().is_success() {
            return Err(McpError::SpawnConfig {
                server_id: server_id.to_owned(),
                detail: format!("status {}", response.status()),
            });
        }
        response.json().await.map_err(|e| McpError::SpawnConfig {
            server_id: server_id.to_owned(),
            detail: format!("invalid config: {e}"),
        })
    }
}

/// Builds the transport a spawn config describes.
///
/// # Errors
///
/// Returns [`McpError::SpawnConfig`] when the config is missing the field
/// its transport kind requires.
pub fn build_transport(
    server_id: &str,
    config: &SpawnConfig,
    client: &reqwest::Client,
) -> Result<Box<dyn Transport>, McpError> {
    let missing = |field: &str| McpError::SpawnConfig {
        server_id: server_id.to_owned(),
        detail: format!("{field} required for {:?} transport", config.transport),
    };
    match config.transport {
        TransportType::Stdio => {
            let command = config.command.as_ref().ok_or_else(|| missing("command"))?;
            Ok(Box::new(StdioTransport::new(
                command.clone(),
                config.args.clone(),
                config.env.clone(),
            )))
        }
        TransportType::Http => {
            let url = config.remote_url.as_ref().ok_or_else(|| missing("remoteUrl"))?;
            Ok(Box::new(SseTransport::new(url.clone(), client.clone())))
        }
        TransportType::Docker => {
            let image = config.image.as_ref().ok_or_else(|| missing("image"))?;
            Ok(Box::new(DockerTransport::new(
                image.clone(),
                config.container_port,
                client.clone(),
            )))
        }
    }
}

/// The production [`SessionSpawner`]: spawn config from the connector
/// service, transport built to match, session connected over it.
#[derive(Debug, Clone)]
pub struct ConfigSpawner {
    spawn_configs: SpawnConfigClient,
    client: reqwest::Client,
}

impl ConfigSpawner {
    /// Creates a spawner against the connector service.
    #[must_use]
    pub fn new(spawn_configs: SpawnConfigClient, client: reqwest::Client) -> Self {
        Self {
            spawn_configs,
            client,
        }
    }
}

impl SessionSpawner for ConfigSpawner {
    fn spawn<'a>(
        &'a self,
        server_id: &'a str,
    ) -> BoxFuture<'a, Result<Arc<McpSession>, McpError>> {
        Box::pin(async move {
            let config = self.spawn_configs.get(server_id).await?;
            tracing::info!(server_id, transport = ?config.transport, "spawning mcp server");
            let transport = build_transport(server_id, &config, &self.client)?;
            McpSession::connect(server_id, transport).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn spawn_config_parses_all_transport_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/registry/servers/fs/spawn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transport": "stdio",
                "command": "mcp-server-filesystem",
                "args": ["--root", "/data"],
                "env": { "LOG_LEVEL": "info" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/registry/servers/search/spawn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transport": "sse",
                "remoteUrl": "https://mcp.example.com"
            })))
            .mount(&server)
            .await;

        let client = SpawnConfigClient::new(server.uri(), reqwest::Client::new());

        let fs = client.get("fs").await.unwrap();
        assert_eq!(fs.transport, TransportType::Stdio);
        assert_eq!(fs.command.as_deref(), Some("mcp-server-filesystem"));
        assert_eq!(fs.env.get("LOG_LEVEL").map(String::as_str), Some("info"));

        let search = client.get("search").await.unwrap();
        assert_eq!(search.transport, TransportType::Http);
        assert_eq!(search.remote_url.as_deref(), Some("https://mcp.example.com"));
    }

    #[tokio::test]
    async fn unknown_server_is_a_spawn_config_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/registry/servers/ghost/spawn"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = SpawnConfigClient::new(server.uri(), reqwest::Client::new());
        let err = client.get("ghost").await.unwrap_err();
        assert!(matches!(err, McpError::SpawnConfig { server_id, .. } if server_id == "ghost"));
    }

    #[test]
    fn build_transport_requires_kind_fields() {
        let client = reqwest::Client::new();
        let config = SpawnConfig {
            transport: TransportType::Stdio,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            image: None,
            container_port: None,
            remote_url: None,
            package: None,
        };
        assert!(matches!(
            build_transport("s", &config, &client).unwrap_err(),
            McpError::SpawnConfig { .. }
        ));

        let config = SpawnConfig {
            transport: TransportType::Docker,
            image: Some("ghcr.io/example/mcp:latest".into()),
            ..config
        };
        assert!(build_transport("s", &config, &client).is_ok());
    }
}
