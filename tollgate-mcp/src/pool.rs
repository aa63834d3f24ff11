//! Session pool: single-flight spawn per server, TTL reuse, idle eviction.
//!
//! The pool keys sessions by `server_id` and guarantees at most one live
//! session per server. The check-then-spawn path holds a per-serverId lock
//! so two concurrent requests never spawn two servers; the global map is a
//! [`DashMap`] and is never held across an await. The background sweeper
//! captures idle sessions first and closes them after releasing all map
//! references.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tollgate::facilitator::BoxFuture;
use uuid::Uuid;

use crate::error::McpError;
use crate::session::McpSession;
use crate::types::{CallToolResult, Tool};

/// Absolute upper bound on session reuse.
pub const POOL_TTL: Duration = Duration::from_secs(30 * 60);

/// Sessions idle longer than this are swept.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Sweep cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Hard cap on concurrently pooled sessions.
pub const MAX_SESSIONS: usize = 100;

/// Produces a connected session for a server id.
///
/// The production implementation fetches the spawn config from the
/// connector service and builds the matching transport; tests substitute
/// scripted sessions.
pub trait SessionSpawner: Send + Sync {
    /// Spawns and connects a session for `server_id`.
    fn spawn<'a>(&'a self, server_id: &'a str)
    -> BoxFuture<'a, Result<Arc<McpSession>, McpError>>;
}

/// Summary of one pooled session, for status endpoints.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// The server the session belongs to.
    pub server_id: String,
    /// The session's unique id.
    pub session_id: Uuid,
    /// Tools the server advertises.
    pub tool_count: usize,
    /// Seconds since the session last served a call.
    pub idle_secs: u64,
}

/// The session pool.
pub struct SessionPool {
    spawner: Arc<dyn SessionSpawner>,
    sessions: DashMap<String, Arc<McpSession>>,
    spawn_locks: DashMap<String, Arc<Mutex<()>>>,
    max_sessions: usize,
    ttl: Duration,
    idle_timeout: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("sessions", &self.sessions.len())
            .field("max_sessions", &self.max_sessions)
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    /// Creates a pool with production limits.
    #[must_use]
    pub fn new(spawner: Arc<dyn SessionSpawner>) -> Self {
        Self {
            spawner,
            sessions: DashMap::new(),
            spawn_locks: DashMap::new(),
            max_sessions: MAX_SESSIONS,
            ttl: POOL_TTL,
            idle_timeout: IDLE_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the session cap.
    #[must_use]
    pub const fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Overrides TTL and idle timeout (tests).
    #[must_use]
    pub const fn with_timeouts(mut self, ttl: Duration, idle_timeout: Duration) -> Self {
        self.ttl = ttl;
        self.idle_timeout = idle_timeout;
        self
    }

    /// The per-serverId spawn lock, created on first use.
    fn lock_for(&self, server_id: &str) -> Arc<Mutex<()>> {
        self.spawn_locks
            .entry(server_id.to_owned())
            .or_default()
            .clone()
    }

    /// Removes a session from the map if it is still the mapped one, then
    /// closes it.
    async fn discard(&self, server_id: &str, session: &Arc<McpSession>) {
        self.sessions
            .remove_if(server_id, |_, mapped| Arc::ptr_eq(mapped, session));
        session.close().await;
    }

    /// Returns the pooled session for `server_id`, spawning one if absent
    /// or expired. With `verify` set, a cached session must answer a
    /// `tools/list` probe; a stale one is discarded and respawned once.
    async fn ensure_session(
        &self,
        server_id: &str,
        verify: bool,
    ) -> Result<Arc<McpSession>, McpError> {
        let lock = self.lock_for(server_id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.sessions.get(server_id).map(|e| Arc::clone(e.value())) {
            if existing.age() < self.ttl {
                if !verify {
                    return Ok(existing);
                }
                match existing.list_tools().await {
                    Ok(_) => return Ok(existing),
                    Err(e) => {
                        tracing::warn!(server_id, error = %e, "cached session failed verification; respawning");
                        self.discard(server_id, &existing).await;
                    }
                }
            } else {
                tracing::debug!(server_id, "session exceeded pool ttl; respawning");
                self.discard(server_id, &existing).await;
            }
        }

        if self.sessions.len() >= self.max_sessions {
            return Err(McpError::PoolFull(self.max_sessions));
        }

        let session = self.spawner.spawn(server_id).await?;
        self.sessions
            .insert(server_id.to_owned(), Arc::clone(&session));
        Ok(session)
    }

    /// Returns the session id and tool schemas for a server, reusing the
    /// pooled session when it is fresh.
    ///
    /// # Errors
    ///
    /// Returns a spawn or transport error when no session can be
    /// established.
    pub async fn get_server_tools(
        &self,
        server_id: &str,
    ) -> Result<(Uuid, Vec<Tool>), McpError> {
        let session = self.ensure_session(server_id, true).await?;
        Ok((session.session_id(), session.tools().to_vec()))
    }

    /// Executes one tool call against a server's pooled session.
    ///
    /// A failed call closes the session so the next request reconstructs
    /// it; the call itself is never retried.
    ///
    /// # Errors
    ///
    /// Returns the spawn, transport, or protocol error.
    pub async fn execute_server_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError> {
        self.execute_server_tool_with_meta(server_id, tool_name, arguments, None)
            .await
    }

    /// [`SessionPool::execute_server_tool`] with an optional `_meta`
    /// object forwarded to the server (e.g. payment payloads).
    ///
    /// # Errors
    ///
    /// Same conditions as [`SessionPool::execute_server_tool`].
    pub async fn execute_server_tool_with_meta(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
        meta: Option<Value>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.ensure_session(server_id, false).await?;
        match session.call_tool_with_meta(tool_name, arguments, meta).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(server_id, tool_name, error = %e, "tool call failed; discarding session");
                self.discard(server_id, &session).await;
                Err(e)
            }
        }
    }

    /// Summaries of every pooled session.
    #[must_use]
    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|entry| SessionSummary {
                server_id: entry.key().clone(),
                session_id: entry.value().session_id(),
                tool_count: entry.value().tools().len(),
                idle_secs: entry.value().idle().as_secs(),
            })
            .collect()
    }

    /// Number of pooled sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Closes sessions idle longer than the idle timeout.
    ///
    /// Candidates are captured while iterating the map; closing happens
    /// after every map reference is released.
    pub async fn sweep(&self) {
        let idle: Vec<(String, Arc<McpSession>)> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle() > self.idle_timeout)
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (server_id, session) in idle {
            tracing::info!(
                server_id = %server_id,
                session_id = %session.session_id(),
                idle_secs = session.idle().as_secs(),
                "sweeping idle mcp session"
            );
            self.discard(&server_id, &session).await;
        }
    }

    /// Runs the sweeper until [`SessionPool::shutdown`] cancels it.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(SWEEP_INTERVAL) => {}
                }
                let Some(pool) = pool.upgrade() else { break };
                pool.sweep().await;
            }
        })
    }

    /// Cancels the sweeper and closes every pooled session.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let all: Vec<(String, Arc<McpSession>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        self.sessions.clear();
        for (server_id, session) in all {
            tracing::debug!(server_id = %server_id, "closing mcp session on shutdown");
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Spawner producing scripted sessions and counting spawns.
    struct ScriptedSpawner {
        spawns: AtomicUsize,
        fail: bool,
    }

    impl ScriptedSpawner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                spawns: AtomicUsize::new(0),
                fail: false,
            })
        }
    }

    impl SessionSpawner for ScriptedSpawner {
        fn spawn<'a>(
            &'a self,
            server_id: &'a str,
        ) -> BoxFuture<'a, Result<Arc<McpSession>, McpError>> {
            Box::pin(async move {
                self.spawns.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(McpError::Connect("scripted failure".into()));
                }
                let transport = ScriptedTransport::with_default_tools(vec![Tool {
                    name: "echo".into(),
                    description: String::new(),
                    input_schema: serde_json::json!({ "type": "object" }),
                }]);
                McpSession::connect(server_id, Box::new(transport)).await
            })
        }
    }

    #[tokio::test]
    async fn tools_are_served_from_the_cached_session() {
        let spawner = ScriptedSpawner::new();
        let pool = SessionPool::new(Arc::clone(&spawner) as Arc<dyn SessionSpawner>);

        let (first_id, tools) = pool.get_server_tools("srv-a").await.unwrap();
        assert_eq!(tools.len(), 1);
        let (second_id, _) = pool.get_server_tools("srv-a").await.unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(spawner.spawns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_servers_get_distinct_sessions() {
        let spawner = ScriptedSpawner::new();
        let pool = SessionPool::new(Arc::clone(&spawner) as Arc<dyn SessionSpawner>);

        let (a, _) = pool.get_server_tools("srv-a").await.unwrap();
        let (b, _) = pool.get_server_tools("srv-b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.session_count(), 2);
    }

    #[tokio::test]
    async fn expired_session_is_respawned() {
        let spawner = ScriptedSpawner::new();
        let pool = SessionPool::new(Arc::clone(&spawner) as Arc<dyn SessionSpawner>)
            .with_timeouts(Duration::from_millis(10), Duration::from_secs(300));

        let (first_id, _) = pool.get_server_tools("srv-a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let (second_id, _) = pool.get_server_tools("srv-a").await.unwrap();

        assert_ne!(first_id, second_id);
        assert_eq!(spawner.spawns.load(Ordering::SeqCst), 2);
        assert_eq!(pool.session_count(), 1);
    }

    #[tokio::test]
    async fn execute_reuses_the_session_without_verification() {
        let spawner = ScriptedSpawner::new();
        let pool = SessionPool::new(Arc::clone(&spawner) as Arc<dyn SessionSpawner>);

        let result = pool
            .execute_server_tool("srv-a", "echo", serde_json::json!({ "v": 1 }))
            .await
            .unwrap();
        assert!(!result.is_error);
        let _ = pool
            .execute_server_tool("srv-a", "echo", serde_json::json!({ "v": 2 }))
            .await
            .unwrap();
        assert_eq!(spawner.spawns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pool_cap_rejects_new_servers() {
        let spawner = ScriptedSpawner::new();
        let pool = SessionPool::new(Arc::clone(&spawner) as Arc<dyn SessionSpawner>)
            .with_max_sessions(1);

        pool.get_server_tools("srv-a").await.unwrap();
        let err = pool.get_server_tools("srv-b").await.unwrap_err();
        assert!(matches!(err, McpError::PoolFull(1)));
    }

    #[tokio::test]
    async fn sweep_evicts_idle_sessions_only() {
        let spawner = ScriptedSpawner::new();
        let pool = SessionPool::new(Arc::clone(&spawner) as Arc<dyn SessionSpawner>)
            .with_timeouts(Duration::from_secs(1800), Duration::from_millis(10));

        pool.get_server_tools("srv-idle").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.get_server_tools("srv-fresh").await.unwrap();

        pool.sweep().await;
        let remaining = pool.sessions();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].server_id, "srv-fresh");
    }

    #[tokio::test]
    async fn concurrent_requests_spawn_one_session() {
        let spawner = ScriptedSpawner::new();
        let pool = Arc::new(SessionPool::new(
            Arc::clone(&spawner) as Arc<dyn SessionSpawner>
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.get_server_tools("srv-a").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(spawner.spawns.load(Ordering::SeqCst), 1);
        assert_eq!(pool.session_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let spawner = ScriptedSpawner::new();
        let pool = SessionPool::new(Arc::clone(&spawner) as Arc<dyn SessionSpawner>);
        pool.get_server_tools("srv-a").await.unwrap();
        pool.get_server_tools("srv-b").await.unwrap();

        pool.shutdown().await;
        assert_eq!(pool.session_count(), 0);
    }

    #[tokio::test]
    async fn spawn_failure_propagates() {
        let spawner = Arc::new(ScriptedSpawner {
            spawns: AtomicUsize::new(0),
            fail: true,
        });
        let pool = SessionPool::new(spawner as Arc<dyn SessionSpawner>);
        assert!(matches!(
            pool.get_server_tools("srv-a").await.unwrap_err(),
            McpError::Connect(_)
        ));
        assert_eq!(pool.session_count(), 0);
    }
}
