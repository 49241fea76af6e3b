//! The `Session` data model (§3): a durable header plus counters, owned
//! exclusively by the Lifecycle Machine and stored by the Registry.
//!
//! Runtime-only state (child handle, PTY, screen model, inferencer,
//! subscriber set) deliberately does **not** live on this struct — see
//! `SessionRuntime` in `pty::mod` — so that `Session` stays cheaply
//! `Serialize`/`Deserialize` and nothing non-serializable ever leaks into
//! the on-disk record (§9: "split into an immutable identity/config header
//! and a runtime container").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What kind of child process a session launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    Agent,
    PlainShell,
}

/// The 8-state lifecycle (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Created,
    Starting,
    Active,
    Paused,
    Stopped,
    Archived,
    Errored,
    Deleted,
}

impl SessionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "Created",
            SessionState::Starting => "Starting",
            SessionState::Active => "Active",
            SessionState::Paused => "Paused",
            SessionState::Stopped => "Stopped",
            SessionState::Archived => "Archived",
            SessionState::Errored => "Errored",
            SessionState::Deleted => "Deleted",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable launch configuration chosen when the session was created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    pub command_name: String,
    pub model: Option<String>,
    pub allowed_tools: Vec<String>,
    pub denied_tools: Vec<String>,
    pub permission_mode: String,
    pub system_prompt: Option<String>,
    pub resume: bool,
    #[serde(rename = "continue")]
    pub continue_: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            command_name: "claude".to_string(),
            model: None,
            allowed_tools: Vec::new(),
            denied_tools: Vec::new(),
            permission_mode: "default".to_string(),
            system_prompt: None,
            resume: false,
            continue_: false,
        }
    }
}

/// `{code, message, timestamp, retry_count <= 3}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionError {
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl SessionError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retry_count < 3
    }
}

/// The durable session record (§3 "Session").
///
/// Runtime handles are intentionally absent; see module docs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub kind: SessionKind,
    pub work_dir: PathBuf,
    pub config: LaunchConfig,
    pub state: SessionState,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,

    pub pause_count: u32,
    pub resume_count: u32,
    pub message_count: u64,
    pub user_messages: u64,
    pub assistant_messages: u64,

    pub error: Option<SessionError>,

    pub is_archived: bool,
    pub auto_archived: bool,

    /// Fields carried in the persisted record (§6) that aren't part of the
    /// core's own identity model but are round-tripped for collaborators.
    pub session_id: Option<String>,
    pub project_path: Option<PathBuf>,
    pub real_path: Option<PathBuf>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Session {
    #[must_use]
    pub fn new(kind: SessionKind, work_dir: PathBuf, config: LaunchConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            work_dir,
            config,
            state: SessionState::Created,
            created_at: Utc::now(),
            started_at: None,
            paused_at: None,
            stopped_at: None,
            archived_at: None,
            pause_count: 0,
            resume_count: 0,
            message_count: 0,
            user_messages: 0,
            assistant_messages: 0,
            error: None,
            is_archived: false,
            auto_archived: false,
            session_id: None,
            project_path: None,
            real_path: None,
            name: None,
            description: None,
        }
    }

    /// Rule violations per §4.E `validate`. Empty means the record is sound.
    ///
    /// `child_alive` is whether the PTY Supervisor layer still considers
    /// this session's child process running — `Session` itself carries no
    /// runtime-liveness data, so the "Active without live child" rule can
    /// only fire when a caller supplies it. Pass `None` when that
    /// information isn't available (e.g. validating a record in isolation);
    /// [`crate::registry::Registry::repair`] is the one caller that knows
    /// the live set and passes `Some(_)`, which is also where the state gets
    /// corrected back to `Stopped`, not just flagged.
    #[must_use]
    pub fn validate(&self, child_alive: Option<bool>) -> Vec<String> {
        let mut violations = Vec::new();

        if self.id.trim().is_empty() {
            violations.push("empty id".to_string());
        }
        if self.state == SessionState::Active && self.started_at.is_none() {
            violations.push("Active without started_at".to_string());
        }
        if self.state == SessionState::Active && child_alive == Some(false) {
            violations.push("Active without live child".to_string());
        }
        if self.state == SessionState::Archived && self.archived_at.is_none() {
            violations.push("Archived without archived_at".to_string());
        }
        if self.state == SessionState::Errored && self.error.is_none() {
            violations.push("Errored without error".to_string());
        }
        if let (Some(archived), Some(stopped)) = (self.archived_at, self.stopped_at) {
            if archived < stopped {
                violations.push("archived_at before stopped_at".to_string());
            }
        }
        if let Some(started) = self.started_at {
            if started > Utc::now() {
                violations.push("started_at in the future".to_string());
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_in_created_state() {
        let s = Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default());
        assert_eq!(s.state, SessionState::Created);
        assert!(s.started_at.is_none());
        assert!(!s.id.is_empty());
    }

    #[test]
    fn validate_flags_active_without_started_at() {
        let mut s = Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default());
        s.state = SessionState::Active;
        let violations = s.validate(None);
        assert!(violations.iter().any(|v| v.contains("Active without started_at")));
    }

    #[test]
    fn validate_flags_active_without_live_child_only_when_liveness_is_known() {
        let mut s = Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default());
        s.state = SessionState::Active;
        s.started_at = Some(Utc::now());

        assert!(s.validate(None).is_empty());
        assert!(s.validate(Some(true)).is_empty());
        let violations = s.validate(Some(false));
        assert!(violations.iter().any(|v| v.contains("Active without live child")));
    }

    #[test]
    fn validate_flags_archived_before_stopped() {
        let mut s = Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default());
        s.stopped_at = Some(Utc::now());
        s.archived_at = Some(s.stopped_at.unwrap() - chrono::Duration::seconds(5));
        let violations = s.validate(None);
        assert!(violations.iter().any(|v| v.contains("archived_at before stopped_at")));
    }

    #[test]
    fn session_error_retry_budget() {
        let mut err = SessionError::new("start_failed", "boom");
        assert!(err.is_retryable());
        err.retry_count = 3;
        assert!(!err.is_retryable());
    }
}
