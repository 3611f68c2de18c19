//! Gateway-owned session store.
//!
//! Persists session state in `sessions.json` under the configured state
//! path. Each session tracks tenant/agent identity, lifecycle status,
//! the AI/human mode, usage counters, and at most one handoff record.
//!
//! All state transitions are validated here: logical violations (double
//! accept, clearing a non-playground session, turns against an ended
//! session) surface as `Error::InvalidState` and are never retried. Only
//! the idempotent `flush` is retried, once, on transient IO failure.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use parlor_domain::error::{Error, Result};
use parlor_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What surface opened the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    StandaloneWidget,
    Playground,
    ChannelBridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// Who answers the next user turn.
///
/// Invariant: `HumanActive` if and only if the session holds a handoff
/// record with status `Accepted`; `HumanPending` iff the record is
/// `Pending`. Enforced by the transition methods below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Ai,
    HumanPending,
    HumanActive,
}

/// Optional end-user identity attached to a session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Participant {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPriority {
    High,
    Normal,
    Low,
}

impl HandoffPriority {
    /// Parse with the wire default (`normal`) for unknown values.
    pub fn parse(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Normal,
        }
    }

    /// Estimated wait before a human agent accepts, in minutes.
    pub fn estimated_wait_minutes(self) -> u32 {
        match self {
            Self::High => 2,
            Self::Normal => 5,
            Self::Low => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Accepted,
    Completed,
    /// Implicit terminal state when the session ends before resolution.
    Cancelled,
}

/// The single handoff record a session may carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub handoff_id: String,
    pub session_id: String,
    pub reason: String,
    pub priority: HandoffPriority,
    pub status: HandoffStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub accepted_by: Option<String>,
    #[serde(default)]
    pub accepted_by_name: Option<String>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution: Option<String>,
}

impl HandoffRecord {
    fn is_open(&self) -> bool {
        matches!(self.status, HandoffStatus::Pending | HandoffStatus::Accepted)
    }
}

/// A single conversation tracked by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub tenant_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub participant: Option<Participant>,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub token_usage: u64,
    #[serde(default)]
    pub handoff: Option<HandoffRecord>,
}

impl Session {
    /// The accepted human agent's id, when the session is `HumanActive`.
    pub fn accepted_agent_id(&self) -> Option<&str> {
        self.handoff
            .as_ref()
            .filter(|h| h.status == HandoffStatus::Accepted)
            .and_then(|h| h.accepted_by.as_deref())
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Filter for session listings.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub tenant_id: Option<String>,
    pub kind: Option<SessionKind>,
    pub include_ended: bool,
    pub limit: usize,
    pub page: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session store backed by a JSON file, with all reads/writes going
/// through an in-memory map under one lock so per-session transitions
/// are serialized at the store boundary.
pub struct SessionStore {
    sessions_path: PathBuf,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions/sessions.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let sessions_path = dir.join("sessions.json");
        let sessions: HashMap<String, Session> = if sessions_path.exists() {
            let raw = std::fs::read_to_string(&sessions_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %sessions_path.display(),
            "session store loaded"
        );

        Ok(Self {
            sessions_path,
            sessions: RwLock::new(sessions),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Create and persist a new session in AI mode.
    pub fn open(
        &self,
        tenant_id: &str,
        agent_id: &str,
        participant: Option<Participant>,
        kind: SessionKind,
    ) -> Session {
        let now = Utc::now();
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_owned(),
            agent_id: agent_id.to_owned(),
            participant,
            kind,
            status: SessionStatus::Active,
            mode: SessionMode::Ai,
            created_at: now,
            last_activity: now,
            ended_at: None,
            message_count: 0,
            token_usage: 0,
            handoff: None,
        };

        self.sessions
            .write()
            .insert(session.session_id.clone(), session.clone());

        TraceEvent::SessionOpened {
            session_id: session.session_id.clone(),
            tenant_id: tenant_id.to_owned(),
            agent_id: agent_id.to_owned(),
            kind: format!("{kind:?}"),
        }
        .emit();

        session
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Like `get`, but unknown ids are an error.
    pub fn require(&self, session_id: &str) -> Result<Session> {
        self.get(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))
    }

    /// List sessions sorted by last activity (newest first), paginated.
    /// Returns the page and the total match count.
    pub fn list(&self, filter: &SessionFilter) -> (Vec<Session>, usize) {
        let sessions = self.sessions.read();
        let mut matched: Vec<Session> = sessions
            .values()
            .filter(|s| {
                filter
                    .tenant_id
                    .as_ref()
                    .is_none_or(|t| &s.tenant_id == t)
                    && filter.kind.is_none_or(|k| s.kind == k)
                    && (filter.include_ended || s.is_active())
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

        let total = matched.len();
        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        let skip = filter.page.saturating_sub(1) * limit;
        let page = matched.into_iter().skip(skip).take(limit).collect();
        (page, total)
    }

    /// End a session: any state transitions to `Ended`. An open handoff
    /// is cancelled implicitly. Idempotent on already-ended sessions.
    pub fn end(&self, session_id: &str) -> Result<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

        let now = Utc::now();
        if session.status == SessionStatus::Active {
            session.status = SessionStatus::Ended;
            session.ended_at = Some(now);
            session.last_activity = now;
            session.mode = SessionMode::Ai;
            if let Some(h) = session.handoff.as_mut() {
                if h.is_open() {
                    h.status = HandoffStatus::Cancelled;
                    h.resolved_at = Some(now);
                }
            }

            TraceEvent::SessionEnded {
                session_id: session_id.to_owned(),
                duration_ms: (now - session.created_at).num_milliseconds(),
                message_count: session.message_count,
            }
            .emit();
        }

        Ok(session.clone())
    }

    /// Hard-delete a session record. Only `Playground` sessions may be
    /// cleared; the caller is responsible for deleting the transcript.
    pub fn clear(&self, session_id: &str) -> Result<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

        if session.kind != SessionKind::Playground {
            return Err(Error::InvalidState(
                "clear is only allowed for playground sessions".into(),
            ));
        }

        Ok(sessions.remove(session_id).expect("checked above"))
    }

    // ── Counters ──────────────────────────────────────────────────

    /// Record one appended message against the session counters.
    pub fn record_message(&self, session_id: &str, token_count: u32) {
        let mut sessions = self.sessions.write();
        if let Some(s) = sessions.get_mut(session_id) {
            s.message_count += 1;
            s.token_usage += u64::from(token_count);
            s.last_activity = Utc::now();
        }
    }

    /// Fold provider-reported usage into the token counter.
    pub fn record_usage(&self, session_id: &str, tokens: u64) {
        let mut sessions = self.sessions.write();
        if let Some(s) = sessions.get_mut(session_id) {
            s.token_usage += tokens;
            s.last_activity = Utc::now();
        }
    }

    /// Reset the message counter (after a transcript wipe).
    pub fn reset_message_count(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        if let Some(s) = sessions.get_mut(session_id) {
            s.message_count = 0;
            s.last_activity = Utc::now();
        }
    }

    pub fn touch(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        if let Some(s) = sessions.get_mut(session_id) {
            s.last_activity = Utc::now();
        }
    }

    // ── Handoff transitions ───────────────────────────────────────

    /// Request a handoff. Returns the record and whether it was newly
    /// created; re-requesting while a handoff is open is idempotent and
    /// returns the existing record.
    pub fn request_handoff(
        &self,
        session_id: &str,
        reason: &str,
        priority: HandoffPriority,
    ) -> Result<(HandoffRecord, bool)> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

        if !session.is_active() {
            return Err(Error::InvalidState("session has ended".into()));
        }

        if let Some(existing) = session.handoff.as_ref().filter(|h| h.is_open()) {
            if existing.priority != priority {
                tracing::warn!(
                    session_id = %session_id,
                    existing_priority = existing.priority.as_str(),
                    requested_priority = priority.as_str(),
                    "handoff re-requested with different priority; keeping existing record"
                );
            }
            return Ok((existing.clone(), false));
        }

        let now = Utc::now();
        let record = HandoffRecord {
            handoff_id: format!("handoff_{}_{}", now.timestamp(), &session.session_id[..8]),
            session_id: session_id.to_owned(),
            reason: reason.to_owned(),
            priority,
            status: HandoffStatus::Pending,
            requested_at: now,
            accepted_by: None,
            accepted_by_name: None,
            accepted_at: None,
            resolved_at: None,
            resolution: None,
        };

        session.handoff = Some(record.clone());
        session.mode = SessionMode::HumanPending;
        session.last_activity = now;

        TraceEvent::HandoffRequested {
            session_id: session_id.to_owned(),
            handoff_id: record.handoff_id.clone(),
            priority: priority.as_str().to_owned(),
            estimated_wait_minutes: priority.estimated_wait_minutes(),
        }
        .emit();

        Ok((record, true))
    }

    /// Accept a pending handoff by its id. Returns the updated session.
    pub fn accept_handoff(
        &self,
        handoff_id: &str,
        agent_id: &str,
        agent_name: Option<&str>,
    ) -> Result<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .values_mut()
            .find(|s| {
                s.handoff
                    .as_ref()
                    .is_some_and(|h| h.handoff_id == handoff_id)
            })
            .ok_or_else(|| Error::NotFound(format!("handoff {handoff_id}")))?;

        let handoff = session.handoff.as_mut().expect("matched above");
        if handoff.status != HandoffStatus::Pending {
            return Err(Error::InvalidState(format!(
                "handoff {handoff_id} is not pending"
            )));
        }

        let now = Utc::now();
        handoff.status = HandoffStatus::Accepted;
        handoff.accepted_by = Some(agent_id.to_owned());
        handoff.accepted_by_name = agent_name.map(str::to_owned);
        handoff.accepted_at = Some(now);
        session.mode = SessionMode::HumanActive;
        session.last_activity = now;

        TraceEvent::HandoffAccepted {
            session_id: session.session_id.clone(),
            handoff_id: handoff_id.to_owned(),
            human_agent_id: agent_id.to_owned(),
        }
        .emit();

        Ok(session.clone())
    }

    /// Complete the handoff and return the session to AI mode.
    pub fn end_handoff(&self, session_id: &str, resolution: &str) -> Result<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

        let handoff = session
            .handoff
            .as_mut()
            .filter(|h| h.is_open())
            .ok_or_else(|| {
                Error::InvalidState("session is not in human handoff mode".into())
            })?;

        let now = Utc::now();
        handoff.status = HandoffStatus::Completed;
        handoff.resolved_at = Some(now);
        handoff.resolution = Some(resolution.to_owned());
        session.mode = SessionMode::Ai;
        session.last_activity = now;

        TraceEvent::HandoffEnded {
            session_id: session_id.to_owned(),
            handoff_id: handoff.handoff_id.clone(),
            resolution: resolution.to_owned(),
        }
        .emit();

        Ok(session.clone())
    }

    /// Pending handoffs for a tenant, highest priority first.
    pub fn pending_handoffs(&self, tenant_id: Option<&str>) -> Vec<HandoffRecord> {
        let sessions = self.sessions.read();
        let mut pending: Vec<HandoffRecord> = sessions
            .values()
            .filter(|s| tenant_id.is_none_or(|t| s.tenant_id == t))
            .filter_map(|s| s.handoff.clone())
            .filter(|h| h.status == HandoffStatus::Pending)
            .collect();
        pending.sort_by_key(|h| match h.priority {
            HandoffPriority::High => 0,
            HandoffPriority::Normal => 1,
            HandoffPriority::Low => 2,
        });
        pending
    }

    /// Handoff counts by status for a tenant.
    pub fn handoff_stats(&self, tenant_id: Option<&str>) -> HashMap<&'static str, usize> {
        let sessions = self.sessions.read();
        let mut stats: HashMap<&'static str, usize> = HashMap::from([
            ("pending", 0),
            ("accepted", 0),
            ("completed", 0),
            ("cancelled", 0),
        ]);
        for s in sessions.values() {
            if tenant_id.is_some_and(|t| s.tenant_id != t) {
                continue;
            }
            if let Some(h) = &s.handoff {
                let key = match h.status {
                    HandoffStatus::Pending => "pending",
                    HandoffStatus::Accepted => "accepted",
                    HandoffStatus::Completed => "completed",
                    HandoffStatus::Cancelled => "cancelled",
                };
                *stats.entry(key).or_default() += 1;
            }
        }
        stats
    }

    // ── Persistence ───────────────────────────────────────────────

    /// Persist the current session map to disk. Retried once on
    /// transient IO failure; the write is idempotent.
    pub fn flush(&self) -> Result<()> {
        let json = {
            let sessions = self.sessions.read();
            serde_json::to_string_pretty(&*sessions).map_err(Error::Json)?
        };

        match std::fs::write(&self.sessions_path, &json) {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!(error = %first, "session flush failed, retrying once");
                std::fs::write(&self.sessions_path, &json).map_err(Error::Io)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
