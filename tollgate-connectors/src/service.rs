//! The connector catalog and dispatch service.
//!
//! Presents every connector with computed availability and a uniform
//! `list_tools` / `call_tool` surface. HTTP-backed connectors dispatch to
//! their hand-written handlers; MCP-backed connectors delegate to the
//! session pool.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tollgate_mcp::pool::SessionPool;
use tollgate_mcp::types::{CallToolResult, Tool};
use tollgate_mcp::McpError;

use crate::descriptor::{ConnectorDescriptor, ConnectorStatus};
use crate::oauth1::{OAuth1Credentials, OAuth1Signer};
use crate::x::XConnector;

/// Errors from the connector surface.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The named connector does not exist.
    #[error("unknown connector '{0}'")]
    NotFound(String),

    /// The connector exists but its credentials are missing.
    #[error("connector '{id}' unavailable; missing env: {}", .missing.join(", "))]
    Unavailable {
        /// The connector id.
        id: String,
        /// Required variables still unset.
        missing: Vec<String>,
    },

    /// The MCP runtime failed to serve the call.
    #[error(transparent)]
    Mcp(#[from] McpError),
}

/// The connector catalog and dispatcher.
pub struct ConnectorService {
    descriptors: Vec<ConnectorDescriptor>,
    env: HashMap<String, String>,
    x: XConnector,
    pool: Arc<SessionPool>,
}

impl std::fmt::Debug for ConnectorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorService")
            .field("connectors", &self.descriptors.len())
            .finish_non_exhaustive()
    }
}

impl ConnectorService {
    /// Creates the service from an environment snapshot.
    ///
    /// The snapshot decides availability for the process lifetime;
    /// credentials are not re-read per request.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        env: HashMap<String, String>,
        pool: Arc<SessionPool>,
    ) -> Self {
        let get = |name: &str| env.get(name).filter(|v| !v.trim().is_empty()).cloned();
        let oauth = match (
            get("X_API_KEY"),
            get("X_API_SECRET"),
            get("X_ACCESS_TOKEN"),
            get("X_ACCESS_TOKEN_SECRET"),
        ) {
            (Some(consumer_key), Some(consumer_secret), Some(access_token), Some(access_token_secret)) => {
                Some(OAuth1Signer::new(OAuth1Credentials {
                    consumer_key,
                    consumer_secret,
                    access_token,
                    access_token_secret,
                }))
            }
            _ => None,
        };
        let x = XConnector::new(client, get("X_BEARER_TOKEN"), oauth);

        Self {
            descriptors: builtin_descriptors(),
            env,
            x,
            pool,
        }
    }

    /// Every connector with computed availability.
    #[must_use]
    pub fn list(&self) -> Vec<ConnectorStatus> {
        self.descriptors
            .iter()
            .map(|d| ConnectorStatus::compute(d.clone(), &self.env))
            .collect()
    }

    /// One connector with computed availability.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::NotFound`] for unknown ids.
    pub fn get(&self, id: &str) -> Result<ConnectorStatus, ConnectorError> {
        self.descriptors
            .iter()
            .find(|d| d.id == id)
            .map(|d| ConnectorStatus::compute(d.clone(), &self.env))
            .ok_or_else(|| ConnectorError::NotFound(id.to_owned()))
    }

    /// Finds the connector and rejects unavailable ones.
    fn require_available(&self, id: &str) -> Result<&ConnectorDescriptor, ConnectorError> {
        let descriptor = self
            .descriptors
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ConnectorError::NotFound(id.to_owned()))?;
        let missing = descriptor.missing_env(&self.env);
        if missing.is_empty() {
            Ok(descriptor)
        } else {
            Err(ConnectorError::Unavailable {
                id: id.to_owned(),
                missing,
            })
        }
    }

    /// Lists a connector's tools.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Unavailable`] when credentials are
    /// missing, or the MCP error for spawned connectors.
    pub async fn list_tools(&self, id: &str) -> Result<Vec<Tool>, ConnectorError> {
        let descriptor = self.require_available(id)?;
        if descriptor.http_based {
            return Ok(XConnector::tools());
        }
        let (session_id, tools) = self.pool.get_server_tools(id).await?;
        tracing::debug!(connector = id, %session_id, tools = tools.len(), "listed mcp tools");
        Ok(tools)
    }

    /// Invokes one connector tool.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Unavailable`] when credentials are
    /// missing, or the MCP error for spawned connectors. Upstream failures
    /// of HTTP connectors are successes with `is_error = true`.
    pub async fn call_tool(
        &self,
        id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ConnectorError> {
        let descriptor = self.require_available(id)?;
        tracing::info!(connector = id, tool_name, http = descriptor.http_based, "invoking connector tool");
        if descriptor.http_based {
            return Ok(self.x.call(tool_name, &arguments).await);
        }
        Ok(self
            .pool
            .execute_server_tool(id, tool_name, arguments)
            .await?)
    }
}

/// The built-in connector catalog.
fn builtin_descriptors() -> Vec<ConnectorDescriptor> {
    vec![
        ConnectorDescriptor {
            id: "x".into(),
            label: "X".into(),
            description: "Post tweets, read timelines, and search X".into(),
            http_based: true,
            command: None,
            args: Vec::new(),
            required_env: vec![
                "X_API_KEY".into(),
                "X_API_SECRET".into(),
                "X_ACCESS_TOKEN".into(),
                "X_ACCESS_TOKEN_SECRET".into(),
                "X_BEARER_TOKEN".into(),
            ],
            env_hints: HashMap::from([(
                "X_BEARER_TOKEN".into(),
                "App-only bearer token from the developer portal".into(),
            )]),
        },
        ConnectorDescriptor {
            id: "gmail".into(),
            label: "Gmail".into(),
            description: "Read and send mail through the Gmail MCP server".into(),
            http_based: false,
            command: Some("mcp-server-gmail".into()),
            args: Vec::new(),
            required_env: vec!["GMAIL_CLIENT_ID".into(), "GMAIL_CLIENT_SECRET".into()],
            env_hints: HashMap::new(),
        },
        ConnectorDescriptor {
            id: "github".into(),
            label: "GitHub".into(),
            description: "Repository and issue tools through the GitHub MCP server".into(),
            http_based: false,
            command: Some("mcp-server-github".into()),
            args: Vec::new(),
            required_env: vec!["GITHUB_TOKEN".into()],
            env_hints: HashMap::from([(
                "GITHUB_TOKEN".into(),
                "Personal access token with repo scope".into(),
            )]),
        },
    ]
}
