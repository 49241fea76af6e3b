//! The genuine data-driven (State, Event) transition table (§4.E, §9).
//!
//! The daemon's `hub/lifecycle.rs`/`hub/state.rs` perform equivalent work
//! procedurally, matching on `(current_state, requested_event)` inline
//! wherever a transition is requested. Per §9's redesign note this
//! component instead encodes the table as data — the same "encode as an
//! immutable table" pattern the daemon already applies to its slash-command
//! dispatch — so `GetValidTransitions`/`CanTransition` are pure lookups
//! rather than re-deriving the same `match` a second time.

use crate::session::{Session, SessionState};
use chrono::{Duration, Utc};

/// Events the Lifecycle Machine accepts (§4.E table, left column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Start,
    Delete,
    Ready,
    Failed,
    Pause,
    Stop,
    Error,
    Resume,
    Archive,
    Reopen,
    Retry,
    Discard,
}

impl Event {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Start => "Start",
            Event::Delete => "Delete",
            Event::Ready => "Ready",
            Event::Failed => "Failed",
            Event::Pause => "Pause",
            Event::Stop => "Stop",
            Event::Error => "Error",
            Event::Resume => "Resume",
            Event::Archive => "Archive",
            Event::Reopen => "Reopen",
            Event::Retry => "Retry",
            Event::Discard => "Discard",
        }
    }
}

/// One row of the transition table. `guard` is evaluated against the
/// session record *before* the transition's action runs; a `None` guard
/// always passes.
pub struct TransitionRow {
    pub from: SessionState,
    pub event: Event,
    pub to: SessionState,
    pub guard: Option<fn(&Session) -> bool>,
    pub description: &'static str,
}

fn paused_within_24h(session: &Session) -> bool {
    session.paused_at.is_some_and(|t| Utc::now().signed_duration_since(t) <= Duration::hours(24))
}

fn stopped_within_7d(session: &Session) -> bool {
    session.stopped_at.is_some_and(|t| Utc::now().signed_duration_since(t) <= Duration::days(7))
}

fn retry_budget_remains(session: &Session) -> bool {
    session.error.as_ref().is_some_and(crate::session::SessionError::is_retryable)
}

/// The full `(State, Event)` transition table (§4.E).
pub const TABLE: &[TransitionRow] = &[
    TransitionRow {
        from: SessionState::Created,
        event: Event::Start,
        to: SessionState::Starting,
        guard: None, // work_dir validity is checked by Supervisor.start itself, not here
        description: "invoke Supervisor.start",
    },
    TransitionRow {
        from: SessionState::Created,
        event: Event::Delete,
        to: SessionState::Deleted,
        guard: None,
        description: "purge record",
    },
    TransitionRow {
        from: SessionState::Starting,
        event: Event::Ready,
        to: SessionState::Active,
        guard: None, // "child is running" is asserted by the caller issuing Ready
        description: "set started_at",
    },
    TransitionRow {
        from: SessionState::Starting,
        event: Event::Failed,
        to: SessionState::Errored,
        guard: None,
        description: "set error{code: start_failed, retry_count: 0}",
    },
    TransitionRow {
        from: SessionState::Active,
        event: Event::Pause,
        to: SessionState::Paused,
        guard: None,
        description: "send stop-signal, pause_count++, set paused_at",
    },
    TransitionRow {
        from: SessionState::Active,
        event: Event::Stop,
        to: SessionState::Stopped,
        guard: None,
        description: "send terminate, set stopped_at",
    },
    TransitionRow {
        from: SessionState::Active,
        event: Event::Error,
        to: SessionState::Errored,
        guard: None,
        description: "populate error",
    },
    TransitionRow {
        from: SessionState::Paused,
        event: Event::Resume,
        to: SessionState::Active,
        guard: Some(paused_within_24h),
        description: "send continue-signal, resume_count++",
    },
    TransitionRow {
        from: SessionState::Paused,
        event: Event::Stop,
        to: SessionState::Stopped,
        guard: None,
        description: "terminate, set stopped_at",
    },
    TransitionRow {
        from: SessionState::Paused,
        event: Event::Archive,
        to: SessionState::Archived,
        guard: None,
        description: "set archived_at, is_archived",
    },
    TransitionRow {
        from: SessionState::Stopped,
        event: Event::Resume,
        to: SessionState::Starting,
        guard: Some(stopped_within_7d),
        description: "reuse id (resume flag), resume_count++",
    },
    TransitionRow {
        from: SessionState::Stopped,
        event: Event::Archive,
        to: SessionState::Archived,
        guard: None,
        description: "compress transcript if large, set archived_at",
    },
    TransitionRow {
        from: SessionState::Stopped,
        event: Event::Delete,
        to: SessionState::Deleted,
        guard: None,
        description: "purge transcript and record",
    },
    TransitionRow {
        from: SessionState::Archived,
        event: Event::Reopen,
        to: SessionState::Stopped,
        guard: None,
        description: "clear is_archived, archived_at",
    },
    TransitionRow {
        from: SessionState::Archived,
        event: Event::Delete,
        to: SessionState::Deleted,
        guard: None,
        description: "purge",
    },
    TransitionRow {
        from: SessionState::Errored,
        event: Event::Retry,
        to: SessionState::Starting,
        guard: Some(retry_budget_remains),
        description: "retry_count++",
    },
    TransitionRow {
        from: SessionState::Errored,
        event: Event::Discard,
        to: SessionState::Deleted,
        guard: None,
        description: "purge",
    },
];

/// Find the row for `(from, event)`. `Deleted` has no outgoing rows at all
/// (terminal state, §4.E), so this simply returns `None` for it.
#[must_use]
pub fn lookup(from: SessionState, event: Event) -> Option<&'static TransitionRow> {
    TABLE.iter().find(|row| row.from == from && row.event == event)
}

/// Every event with a row whose `from` matches `state`, for UI hints.
#[must_use]
pub fn valid_transitions(state: SessionState) -> Vec<Event> {
    TABLE.iter().filter(|row| row.from == state).map(|row| row.event).collect()
}

/// Whether `(state, event)` has a table row, irrespective of its guard.
#[must_use]
pub fn can_transition(state: SessionState, event: Event) -> bool {
    lookup(state, event).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{LaunchConfig, SessionKind};
    use std::path::PathBuf;

    #[test]
    fn table_covers_every_documented_row() {
        assert_eq!(TABLE.len(), 17);
    }

    #[test]
    fn deleted_state_has_no_outgoing_rows() {
        assert!(valid_transitions(SessionState::Deleted).is_empty());
        assert!(!can_transition(SessionState::Deleted, Event::Start));
    }

    #[test]
    fn unknown_pair_returns_none() {
        assert!(lookup(SessionState::Created, Event::Resume).is_none());
    }

    #[test]
    fn paused_resume_guard_rejects_after_24_hours() {
        let mut session = Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default());
        session.paused_at = Some(Utc::now() - Duration::hours(25));
        let row = lookup(SessionState::Paused, Event::Resume).expect("row exists");
        assert!(!(row.guard.expect("guard present"))(&session));
    }

    #[test]
    fn errored_retry_guard_checks_retry_budget() {
        let mut session = Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default());
        session.error = Some(crate::session::SessionError { retry_count: 3, ..crate::session::SessionError::new("x", "y") });
        let row = lookup(SessionState::Errored, Event::Retry).expect("row exists");
        assert!(!(row.guard.expect("guard present"))(&session));
    }
}
