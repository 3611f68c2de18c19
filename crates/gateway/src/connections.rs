//! In-memory registry of live client transports.
//!
//! Every connected end-user session and human-agent console registers a
//! sink here. Delivery is best-effort: a failed send drops the entry,
//! never the session, and never an in-flight turn. The registry is the
//! only mutable map shared across tasks; it synchronizes internally.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use parlor_domain::trace::TraceEvent;
use parlor_protocol::ServerFrame;

/// A handle the gateway can push frames through to one transport's
/// writer task.
pub type FrameSink = mpsc::Sender<ServerFrame>;

/// Registry key: a transport belongs to exactly one session or one
/// human agent, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionKey {
    Session(String),
    HumanAgent(String),
}

impl ConnectionKey {
    fn label(&self) -> String {
        match self {
            ConnectionKey::Session(id) => format!("session:{id}"),
            ConnectionKey::HumanAgent(id) => format!("human-agent:{id}"),
        }
    }
}

/// One live transport.
pub struct ConnectionEntry {
    pub tenant_id: Option<String>,
    pub agent_id: Option<String>,
    pub sink: FrameSink,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Registry counts returned by the monitoring endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total: usize,
    pub sessions: usize,
    pub human_agents: usize,
    /// Distinct tenants with at least one live transport.
    pub tenants: usize,
    /// Distinct agents with at least one live transport.
    pub agents: usize,
}

/// Summary of one connected session, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConnectionInfo {
    pub session_id: String,
    pub tenant_id: Option<String>,
    pub agent_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Thread-safe registry of all live transports.
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionKey, ConnectionEntry>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a transport. A reconnect under the same key replaces
    /// the previous entry (last writer wins); the stale writer task
    /// ends when its channel closes.
    pub fn register(
        &self,
        key: ConnectionKey,
        tenant_id: Option<String>,
        agent_id: Option<String>,
        sink: FrameSink,
    ) {
        let now = Utc::now();
        TraceEvent::ConnectionRegistered {
            key: key.label(),
            tenant_id: tenant_id.clone(),
            agent_id: agent_id.clone(),
        }
        .emit();

        self.entries.write().insert(
            key,
            ConnectionEntry {
                tenant_id,
                agent_id,
                sink,
                connected_at: now,
                last_seen: now,
            },
        );
    }

    /// Remove a transport. Unknown keys are a no-op.
    pub fn unregister(&self, key: &ConnectionKey, reason: &str) {
        if self.entries.write().remove(key).is_some() {
            TraceEvent::ConnectionDropped {
                key: key.label(),
                reason: reason.to_owned(),
            }
            .emit();
        }
    }

    pub fn touch(&self, key: &ConnectionKey) {
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.last_seen = Utc::now();
        }
    }

    pub fn is_connected(&self, key: &ConnectionKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Deliver one frame to one transport. Returns whether delivery
    /// succeeded; a closed channel unregisters the entry.
    pub async fn send(&self, key: &ConnectionKey, frame: ServerFrame) -> bool {
        let sink = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(e) => e.sink.clone(),
                None => return false,
            }
        };

        if sink.send(frame).await.is_err() {
            self.unregister_stale(key, &sink, "send failed");
            return false;
        }
        true
    }

    /// Best-effort fan-out to every session transport of a tenant.
    /// Returns how many transports took the frame.
    pub async fn broadcast_by_tenant(&self, tenant_id: &str, frame: &ServerFrame) -> usize {
        let targets = self.collect_sessions(|e| e.tenant_id.as_deref() == Some(tenant_id));
        self.deliver_all(targets, frame).await
    }

    /// Best-effort fan-out to every session transport bound to an agent.
    pub async fn broadcast_by_agent(&self, agent_id: &str, frame: &ServerFrame) -> usize {
        let targets = self.collect_sessions(|e| e.agent_id.as_deref() == Some(agent_id));
        self.deliver_all(targets, frame).await
    }

    /// Push a frame to every connected human-agent console.
    pub async fn notify_human_agents(&self, frame: &ServerFrame) -> usize {
        let targets: Vec<(ConnectionKey, FrameSink)> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|(k, _)| matches!(k, ConnectionKey::HumanAgent(_)))
                .map(|(k, e)| (k.clone(), e.sink.clone()))
                .collect()
        };
        self.deliver_all(targets, frame).await
    }

    pub fn stats(&self) -> ConnectionStats {
        let entries = self.entries.read();
        let sessions = entries
            .keys()
            .filter(|k| matches!(k, ConnectionKey::Session(_)))
            .count();
        let tenants: HashSet<&str> = entries
            .values()
            .filter_map(|e| e.tenant_id.as_deref())
            .collect();
        let agents: HashSet<&str> = entries
            .values()
            .filter_map(|e| e.agent_id.as_deref())
            .collect();
        ConnectionStats {
            total: entries.len(),
            sessions,
            human_agents: entries.len() - sessions,
            tenants: tenants.len(),
            agents: agents.len(),
        }
    }

    /// Connected sessions, optionally scoped to one tenant.
    pub fn active_sessions(&self, tenant_id: Option<&str>) -> Vec<SessionConnectionInfo> {
        let entries = self.entries.read();
        let mut out: Vec<SessionConnectionInfo> = entries
            .iter()
            .filter_map(|(k, e)| match k {
                ConnectionKey::Session(id)
                    if tenant_id.is_none_or(|t| e.tenant_id.as_deref() == Some(t)) =>
                {
                    Some(SessionConnectionInfo {
                        session_id: id.clone(),
                        tenant_id: e.tenant_id.clone(),
                        agent_id: e.agent_id.clone(),
                        connected_at: e.connected_at,
                        last_seen: e.last_seen,
                    })
                }
                _ => None,
            })
            .collect();
        out.sort_by(|a, b| b.connected_at.cmp(&a.connected_at));
        out
    }

    // ── Private helpers ───────────────────────────────────────────

    /// Remove a transport only while `failed` is still its registered
    /// sink. A reconnect may replace the entry between the sink clone
    /// and the awaited send; the replacement must survive the stale
    /// send's failure.
    fn unregister_stale(&self, key: &ConnectionKey, failed: &FrameSink, reason: &str) {
        let removed = {
            let mut entries = self.entries.write();
            let is_stale = entries
                .get(key)
                .is_some_and(|entry| entry.sink.same_channel(failed));
            is_stale && entries.remove(key).is_some()
        };
        if removed {
            TraceEvent::ConnectionDropped {
                key: key.label(),
                reason: reason.to_owned(),
            }
            .emit();
        }
    }

    fn collect_sessions(
        &self,
        pred: impl Fn(&ConnectionEntry) -> bool,
    ) -> Vec<(ConnectionKey, FrameSink)> {
        let entries = self.entries.read();
        entries
            .iter()
            .filter(|(k, e)| matches!(k, ConnectionKey::Session(_)) && pred(e))
            .map(|(k, e)| (k.clone(), e.sink.clone()))
            .collect()
    }

    async fn deliver_all(
        &self,
        targets: Vec<(ConnectionKey, FrameSink)>,
        frame: &ServerFrame,
    ) -> usize {
        let mut delivered = 0;
        for (key, sink) in targets {
            if sink.send(frame.clone()).await.is_ok() {
                delivered += 1;
            } else {
                self.unregister_stale(&key, &sink, "send failed");
            }
        }
        delivered
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn pong() -> ServerFrame {
        ServerFrame::Pong {
            timestamp: Utc::now(),
        }
    }

    fn register_session(
        reg: &ConnectionRegistry,
        session_id: &str,
        tenant: &str,
    ) -> mpsc::Receiver<ServerFrame> {
        let (tx, rx) = mpsc::channel(8);
        reg.register(
            ConnectionKey::Session(session_id.into()),
            Some(tenant.into()),
            Some("a1".into()),
            tx,
        );
        rx
    }

    #[tokio::test]
    async fn register_replaces_previous_transport() {
        let reg = ConnectionRegistry::new();
        let mut rx1 = register_session(&reg, "s1", "t1");
        let mut rx2 = register_session(&reg, "s1", "t1");

        assert_eq!(reg.stats().total, 1);
        assert!(reg.send(&ConnectionKey::Session("s1".into()), pong()).await);

        // Only the most recent transport receives frames.
        assert!(rx2.try_recv().is_ok());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_send_from_a_stale_sink_keeps_the_reconnect() {
        let reg = ConnectionRegistry::new();
        let key = ConnectionKey::Session("s1".into());
        let (t1, rx1) = mpsc::channel(8);
        reg.register(key.clone(), Some("t1".into()), Some("a1".into()), t1.clone());
        drop(rx1);

        // The client reconnects before the stale transport's failed
        // send is handled.
        let mut rx2 = register_session(&reg, "s1", "t1");

        reg.unregister_stale(&key, &t1, "send failed");
        assert!(reg.is_connected(&key));
        assert!(reg.send(&key, pong()).await);
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stats_count_distinct_tenants_and_agents() {
        let reg = ConnectionRegistry::new();
        let _rx1 = register_session(&reg, "s1", "t1");
        let _rx2 = register_session(&reg, "s2", "t1");
        let _rx3 = register_session(&reg, "s3", "t2");
        let (tx, _rx_h) = mpsc::channel(8);
        reg.register(ConnectionKey::HumanAgent("h1".into()), None, None, tx);

        let stats = reg.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.sessions, 3);
        assert_eq!(stats.human_agents, 1);
        assert_eq!(stats.tenants, 2);
        // register_session binds every session to agent "a1".
        assert_eq!(stats.agents, 1);
    }

    #[tokio::test]
    async fn send_to_closed_sink_unregisters() {
        let reg = ConnectionRegistry::new();
        let rx = register_session(&reg, "s1", "t1");
        drop(rx);

        let key = ConnectionKey::Session("s1".into());
        assert!(!reg.send(&key, pong()).await);
        assert!(!reg.is_connected(&key));
    }

    #[tokio::test]
    async fn tenant_broadcast_skips_other_tenants() {
        let reg = ConnectionRegistry::new();
        let mut rx_a = register_session(&reg, "s1", "t1");
        let mut rx_b = register_session(&reg, "s2", "t2");

        let delivered = reg.broadcast_by_tenant("t1", &pong()).await;
        assert_eq!(delivered, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn human_agents_are_not_sessions() {
        let reg = ConnectionRegistry::new();
        let _rx_s = register_session(&reg, "s1", "t1");
        let (tx, mut rx_h) = mpsc::channel(8);
        reg.register(ConnectionKey::HumanAgent("h1".into()), None, None, tx);

        let stats = reg.stats();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.human_agents, 1);

        let notified = reg.notify_human_agents(&pong()).await;
        assert_eq!(notified, 1);
        assert!(rx_h.try_recv().is_ok());

        assert_eq!(reg.active_sessions(Some("t1")).len(), 1);
        assert_eq!(reg.active_sessions(Some("t2")).len(), 0);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let reg = ConnectionRegistry::new();
        let key = ConnectionKey::Session("s1".into());
        let _rx = register_session(&reg, "s1", "t1");

        reg.unregister(&key, "test");
        reg.unregister(&key, "test");
        assert_eq!(reg.stats().total, 0);
    }
}
