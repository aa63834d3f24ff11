//! Containerized transport: runs the server image locally and delegates to
//! the SSE transport once the container answers on its published port.

use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio::sync::mpsc;
use tollgate::facilitator::BoxFuture;

use super::{SseTransport, Transport, TransportEvent, TransportType};
use crate::error::McpError;

/// Seconds a stopping container gets before SIGKILL.
const STOP_GRACE_SECS: &str = "5";

/// Health poll attempts against `GET /sse`.
const HEALTH_RETRIES: u32 = 30;

/// Pause between health polls.
const HEALTH_INTERVAL: Duration = Duration::from_millis(1000);

/// Runs an MCP server image in a local container.
///
/// The container publishes its server port on an ephemeral localhost port;
/// once `GET /sse` answers, frames flow through an inner [`SseTransport`].
/// Closing stops (5 s grace) and removes the container.
#[derive(Debug)]
pub struct DockerTransport {
    image: String,
    container_port: u16,
    client: reqwest::Client,
    container_id: Option<String>,
    inner: Option<SseTransport>,
}

impl DockerTransport {
    /// Default port MCP server images listen on.
    pub const DEFAULT_CONTAINER_PORT: u16 = 8080;

    /// Creates a transport for the given image.
    #[must_use]
    pub fn new(image: impl Into<String>, container_port: Option<u16>, client: reqwest::Client) -> Self {
        Self {
            image: image.into(),
            container_port: container_port.unwrap_or(Self::DEFAULT_CONTAINER_PORT),
            client,
            container_id: None,
            inner: None,
        }
    }

    /// Runs one docker CLI command, returning trimmed stdout.
    async fn docker(operation: &'static str, args: &[&str]) -> Result<String, McpError> {
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| McpError::Docker {
                operation,
                detail: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(McpError::Docker {
                operation,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    /// Pulls the image unless it is already cached locally.
    async fn ensure_image(&self) -> Result<(), McpError> {
        if Self::docker("image inspect", &["image", "inspect", self.image.as_str()])
            .await
            .is_ok()
        {
            return Ok(());
        }
        tracing::info!(image = %self.image, "pulling mcp server image");
        Self::docker("pull", &["pull", self.image.as_str()]).await?;
        Ok(())
    }

    /// Polls the published port until `GET /sse` answers.
    async fn wait_healthy(&self, port: u16) -> Result<(), McpError> {
        let url = format!("http://127.0.0.1:{port}/sse");
        for _ in 0..HEALTH_RETRIES {
            let probe = self
                .client
                .get(&url)
                .header("accept", "text/event-stream")
                .timeout(Duration::from_secs(2))
                .send()
                .await;
            if let Ok(response) = probe {
                if response.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(HEALTH_INTERVAL).await;
        }
        Err(McpError::Connect(format!(
            "container for {} never became healthy on port {port}",
            self.image
        )))
    }

    async fn remove_container(container_id: &str) {
        if let Err(e) = Self::docker("stop", &["stop", "-t", STOP_GRACE_SECS, container_id]).await {
            tracing::warn!(container_id, error = %e, "container stop failed");
        }
        if let Err(e) = Self::docker("rm", &["rm", "-f", container_id]).await {
            tracing::warn!(container_id, error = %e, "container remove failed");
        }
    }

    async fn connect_inner(&mut self) -> Result<mpsc::Receiver<TransportEvent>, McpError> {
        self.ensure_image().await?;

        let publish = format!("127.0.0.1:0:{}", self.container_port);
        let container_id = Self::docker(
            "create",
            &["create", "-p", publish.as_str(), self.image.as_str()],
        )
        .await?;
        Self::docker("start", &["start", container_id.as_str()]).await?;

        let port_spec = self.container_port.to_string();
        let mapping =
            Self::docker("port", &["port", container_id.as_str(), port_spec.as_str()]).await;
        let port = match mapping.as_deref().map(parse_published_port) {
            Ok(Some(port)) => port,
            Ok(None) | Err(_) => {
                Self::remove_container(&container_id).await;
                return Err(McpError::Connect(format!(
                    "no published port for container {container_id}"
                )));
            }
        };

        if let Err(e) = self.wait_healthy(port).await {
            Self::remove_container(&container_id).await;
            return Err(e);
        }

        tracing::info!(image = %self.image, container_id = %container_id, port, "mcp container ready");
        let mut inner = SseTransport::new(format!("http://127.0.0.1:{port}"), self.client.clone());
        let events = match inner.connect().await {
            Ok(events) => events,
            Err(e) => {
                Self::remove_container(&container_id).await;
                return Err(e);
            }
        };
        self.container_id = Some(container_id);
        self.inner = Some(inner);
        Ok(events)
    }
}

/// Parses the host port from `docker port` output
/// (e.g. `127.0.0.1:49153` or `0.0.0.0:49153\n[::]:49153`).
fn parse_published_port(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.rsplit_once(':'))
        .find_map(|(_, port)| port.trim().parse().ok())
}

impl Transport for DockerTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Docker
    }

    fn connect(&mut self) -> BoxFuture<'_, Result<mpsc::Receiver<TransportEvent>, McpError>> {
        Box::pin(self.connect_inner())
    }

    fn send(&self, frame: Value) -> BoxFuture<'_, Result<(), McpError>> {
        match &self.inner {
            Some(inner) => inner.send(frame),
            None => Box::pin(async { Err(McpError::SessionClosed) }),
        }
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), McpError>> {
        let inner = self.inner.take();
        let container_id = self.container_id.take();
        Box::pin(async move {
            if let Some(mut inner) = inner {
                let _ = inner.close().await;
            }
            if let Some(container_id) = container_id {
                Self::remove_container(&container_id).await;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_port_parses_docker_output_shapes() {
        assert_eq!(parse_published_port("127.0.0.1:49153"), Some(49153));
        assert_eq!(
            parse_published_port("0.0.0.0:32768\n[::]:32768"),
            Some(32768)
        );
        assert_eq!(parse_published_port(""), None);
        assert_eq!(parse_published_port("garbage"), None);
    }
}
