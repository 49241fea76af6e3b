//! Structured, kind-carrying errors for the public session-hub operations.
//!
//! Internal plumbing (I/O, serialization, process spawning) still propagates
//! with `anyhow::Result` + `.context(...)`. At the boundary of a public
//! operation (`Supervisor::start`, `Lifecycle::transition`, ...) an
//! `anyhow::Error` is wrapped into a [`CoreError`] with `ErrorKind::Internal`
//! so callers never have to downcast to learn what went wrong.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Semantic error category. Kept separate from the error *type* so a
/// collaborator (e.g. an HTTP router) can match on `kind` without knowing
/// about `CoreError` internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// `work_dir` outside allowed prefixes or containing a traversal segment.
    PathNotAllowed,
    /// Session id unknown to the registry.
    NotFound,
    /// `start` issued for a session that is already running.
    AlreadyActive,
    /// `(state, event)` not present in the transition table.
    InvalidTransition,
    /// Table row present but its guard evaluated to false.
    TransitionBlocked,
    /// Agent-only operation invoked on a plain-shell session.
    WrongKind,
    /// `attach` issued against a session already at its subscriber cap.
    MaxSubscribers,
    /// Child process could not be launched or the PTY could not be allocated.
    StartFailed,
    /// Anything not otherwise classified.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::PathNotAllowed => "path-not-allowed",
            ErrorKind::NotFound => "not-found",
            ErrorKind::AlreadyActive => "already-active",
            ErrorKind::InvalidTransition => "invalid-transition",
            ErrorKind::TransitionBlocked => "transition-blocked",
            ErrorKind::WrongKind => "wrong-kind",
            ErrorKind::MaxSubscribers => "max-subscribers",
            ErrorKind::StartFailed => "start-failed",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A structured error carrying `kind` + `message` + optional `details`.
///
/// Deliberately does not derive `thiserror`'s `#[from]` for `anyhow::Error`:
/// the conversion is lossy by design (anyhow's backtrace/cause chain is
/// collapsed into a single message), so it is spelled out via
/// [`CoreError::internal`] at each call site instead of happening silently.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl CoreError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), details: None }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Wrap an opaque internal failure (I/O, serde, etc.) into `ErrorKind::Internal`.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::Internal, err.to_string())
    }

    #[must_use]
    pub fn not_found(session_id: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("no session with id {session_id}"))
    }

    #[must_use]
    pub fn already_active(session_id: &str) -> Self {
        Self::new(ErrorKind::AlreadyActive, format!("session {session_id} is already active"))
    }

    #[must_use]
    pub fn path_not_allowed(path: &std::path::Path) -> Self {
        Self::new(ErrorKind::PathNotAllowed, format!("work_dir not allowed: {}", path.display()))
    }

    #[must_use]
    pub fn wrong_kind(session_id: &str) -> Self {
        Self::new(ErrorKind::WrongKind, format!("session {session_id} is not an agent session"))
    }

    #[must_use]
    pub fn max_subscribers(cap: usize) -> Self {
        Self::new(ErrorKind::MaxSubscribers, format!("subscriber cap of {cap} reached"))
    }

    #[must_use]
    pub fn invalid_transition(from: &str, event: &str) -> Self {
        Self::new(ErrorKind::InvalidTransition, format!("no transition for ({from}, {event})"))
            .with_details(serde_json::json!({ "from": from, "event": event }))
    }

    #[must_use]
    pub fn transition_blocked(from: &str, to: &str) -> Self {
        Self::new(ErrorKind::TransitionBlocked, format!("guard rejected {from} -> {to}"))
            .with_details(serde_json::json!({ "from": from, "to": to }))
    }

    #[must_use]
    pub fn start_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::StartFailed, reason.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = CoreError::not_found("abc123");
        let rendered = err.to_string();
        assert!(rendered.starts_with("not-found:"));
        assert!(rendered.contains("abc123"));
    }

    #[test]
    fn invalid_transition_carries_details() {
        let err = CoreError::invalid_transition("Deleted", "Start");
        assert_eq!(err.kind, ErrorKind::InvalidTransition);
        assert_eq!(err.details.unwrap()["from"], "Deleted");
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::MaxSubscribers).unwrap();
        assert_eq!(json, "\"max-subscribers\"");
    }
}
