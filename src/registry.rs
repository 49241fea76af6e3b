//! Session Registry (§4.F): the live-session map plus the on-disk index of
//! known-but-inactive sessions, atomic persistence, and the auto-maintenance
//! sweeps the Lifecycle Machine relies on.
//!
//! Grounded in the daemon's `hub/state.rs` `HubState` (a `HashMap`-backed
//! live map guarded by a single owner) for the in-memory half, and
//! `commands/update.rs`'s write-temp-then-`fs::rename` self-update routine
//! for the atomic on-disk half — the same idiom, generalized from "replace
//! one binary" to "replace one session record".

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::table::{self, Event};
use crate::pty::PathPolicy;
use crate::session::{Session, SessionState};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

/// How old a `Stopped` session must be before `auto_archive_old` archives it
/// (§4.E auto-maintenance).
const AUTO_ARCHIVE_AFTER: Duration = Duration::hours(7 * 24);

/// Holds the live-session map (§4.F) and knows where records are persisted
/// on disk. The registry is the sole creator/destroyer of sessions; the
/// Lifecycle Machine only mutates records it already holds.
pub struct Registry {
    jobs_dir: PathBuf,
    path_policy: PathPolicy,
    sessions: RwLock<HashMap<String, Session>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("jobs_dir", &self.jobs_dir).finish_non_exhaustive()
    }
}

impl Registry {
    /// Opens a registry rooted at `jobs_dir`, creating the directory if it
    /// doesn't exist, and loads every `*.json` record found there.
    pub fn open(jobs_dir: PathBuf, path_policy: PathPolicy) -> CoreResult<Self> {
        fs::create_dir_all(&jobs_dir).map_err(CoreError::internal)?;
        let mut sessions = HashMap::new();
        for entry in fs::read_dir(&jobs_dir).map_err(CoreError::internal)? {
            let entry = entry.map_err(CoreError::internal)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path).map_err(CoreError::internal)?;
            match serde_json::from_str::<Session>(&contents) {
                Ok(session) => {
                    sessions.insert(session.id.clone(), session);
                }
                Err(err) => {
                    log::warn!("skipping unreadable session record {}: {err}", path.display());
                }
            }
        }
        Ok(Self { jobs_dir, path_policy, sessions: RwLock::new(sessions) })
    }

    #[must_use]
    pub fn path_policy(&self) -> &PathPolicy {
        &self.path_policy
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{id}.json"))
    }

    /// Write `session` to `<id>.json.tmp` then atomically rename it over
    /// `<id>.json` (§4.F "Writes are atomic").
    fn persist(&self, session: &Session) -> CoreResult<()> {
        let final_path = self.record_path(&session.id);
        let tmp_path = final_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(session).map_err(CoreError::internal)?;
        fs::write(&tmp_path, json).map_err(CoreError::internal)?;
        fs::rename(&tmp_path, &final_path).map_err(CoreError::internal)?;
        Ok(())
    }

    fn purge_file(&self, id: &str) {
        let path = self.record_path(id);
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to purge session record {}: {err}", path.display());
            }
        }
    }

    /// Create a new session record, validating `work_dir` against the
    /// registry's path policy, and persist it in `Created` state.
    pub fn create(&self, session: Session) -> CoreResult<Session> {
        self.path_policy.validate(&session.work_dir)?;
        self.persist(&session)?;
        self.sessions.write().expect("lock poisoned").insert(session.id.clone(), session.clone());
        Ok(session)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().expect("lock poisoned").get(id).cloned()
    }

    /// All known sessions (§4.F `list(root)` — filesystem rooting is the
    /// HTTP collaborator's concern; here `list` simply returns every
    /// session this registry instance holds).
    #[must_use]
    pub fn list(&self) -> Vec<Session> {
        self.sessions.read().expect("lock poisoned").values().cloned().collect()
    }

    #[must_use]
    pub fn list_by_state(&self, state: SessionState) -> Vec<Session> {
        self.sessions.read().expect("lock poisoned").values().filter(|s| s.state == state).cloned().collect()
    }

    /// Apply a transition-table row's action to `session` in-place. Only
    /// the side effects §4.E describes as pure record mutation are applied
    /// here; side effects that touch the PTY Supervisor (start/terminate
    /// signals) are the caller's responsibility, invoked around this call.
    fn apply_action(session: &mut Session, event: Event, to: SessionState) {
        let now = Utc::now();
        match event {
            Event::Ready => session.started_at = Some(now),
            Event::Failed => session.error = Some(crate::session::SessionError::new("start_failed", "child failed to start")),
            Event::Pause => {
                session.pause_count += 1;
                session.paused_at = Some(now);
            }
            Event::Stop => session.stopped_at = Some(now),
            Event::Resume if to == SessionState::Active => session.resume_count += 1,
            Event::Resume if to == SessionState::Starting => session.resume_count += 1,
            Event::Archive => {
                session.archived_at = Some(now);
                session.is_archived = true;
            }
            Event::Reopen => {
                session.is_archived = false;
                session.archived_at = None;
            }
            Event::Retry => {
                if let Some(err) = session.error.as_mut() {
                    err.retry_count += 1;
                }
            }
            _ => {}
        }
        session.state = to;
    }

    /// Dispatch `(session.state, event)` through the transition table
    /// (§4.E). Atomic per session: locates the row, evaluates its guard,
    /// mutates the record, persists, and makes the result visible to
    /// subsequent `get()` calls — all while holding the write lock.
    pub fn transition(&self, id: &str, event: Event) -> CoreResult<Session> {
        let mut sessions = self.sessions.write().expect("lock poisoned");
        let session = sessions.get_mut(id).ok_or_else(|| CoreError::not_found(id))?;

        let row = table::lookup(session.state, event)
            .ok_or_else(|| CoreError::invalid_transition(session.state.as_str(), event.as_str()))?;

        if let Some(guard) = row.guard {
            if !guard(session) {
                return Err(CoreError::transition_blocked(session.state.as_str(), row.to.as_str()));
            }
        }

        let from = session.state.as_str();
        Self::apply_action(session, event, row.to);
        log::info!("session {id}: {from} -> {event:?} -> {}", session.state.as_str());

        if session.state == SessionState::Deleted {
            let snapshot = session.clone();
            drop(sessions);
            self.sessions.write().expect("lock poisoned").remove(id);
            self.purge_file(id);
            return Ok(snapshot);
        }

        let snapshot = session.clone();
        self.persist(&snapshot)?;
        Ok(snapshot)
    }

    /// `auto_archive_old` (§4.E): any `Stopped` session idle past 7 days
    /// moves to `Archived` with `auto_archived = true`.
    pub fn auto_archive_old(&self) {
        let candidates: Vec<String> = {
            let sessions = self.sessions.read().expect("lock poisoned");
            sessions
                .values()
                .filter(|s| {
                    s.state == SessionState::Stopped
                        && s.stopped_at.is_some_and(|t| Utc::now().signed_duration_since(t) > AUTO_ARCHIVE_AFTER)
                })
                .map(|s| s.id.clone())
                .collect()
        };
        for id in candidates {
            if let Ok(mut sessions) = self.sessions.write() {
                if let Some(session) = sessions.get_mut(&id) {
                    session.state = SessionState::Archived;
                    session.archived_at = Some(Utc::now());
                    session.is_archived = true;
                    session.auto_archived = true;
                    let snapshot = session.clone();
                    drop(sessions);
                    if let Err(err) = self.persist(&snapshot) {
                        log::error!("failed to persist auto-archived session {id}: {err}");
                    }
                }
            }
        }
    }

    /// `cleanup_deleted` (§4.E): physically remove any `Deleted` record
    /// still lingering in memory or on disk (normally `transition` already
    /// purges on reaching `Deleted`; this sweep catches stragglers left by
    /// a crash between the state flip and the purge).
    pub fn cleanup_deleted(&self) {
        let ids: Vec<String> = {
            let sessions = self.sessions.read().expect("lock poisoned");
            sessions.values().filter(|s| s.state == SessionState::Deleted).map(|s| s.id.clone()).collect()
        };
        for id in ids {
            self.sessions.write().expect("lock poisoned").remove(&id);
            self.purge_file(&id);
        }
    }

    /// `repair` (§4.E validation-driven auto-maintenance): any `Active`
    /// session whose child-process handle is absent is forced to `Stopped`;
    /// any `Stopped` session with `stopped_at` unset has it backfilled.
    /// `live_ids` is the set of session ids the PTY Supervisor layer still
    /// considers running — the only place that information exists, which is
    /// why `Session::validate`'s "Active without live child" rule is checked
    /// here rather than inside `validate` itself.
    pub fn repair(&self, live_ids: &std::collections::HashSet<String>) {
        let mut sessions = self.sessions.write().expect("lock poisoned");
        let mut touched = Vec::new();
        for session in sessions.values_mut() {
            let child_alive = live_ids.contains(&session.id);
            for violation in session.validate(Some(child_alive)) {
                log::warn!("session {} failed validation: {violation}", session.id);
            }
            if session.state == SessionState::Active && !child_alive {
                session.state = SessionState::Stopped;
                session.stopped_at.get_or_insert(Utc::now());
                touched.push(session.clone());
            } else if session.state == SessionState::Stopped && session.stopped_at.is_none() {
                session.stopped_at = Some(Utc::now());
                touched.push(session.clone());
            }
        }
        drop(sessions);
        for session in touched {
            if let Err(err) = self.persist(&session) {
                log::error!("failed to persist repaired session {}: {err}", session.id);
            }
        }
    }

    /// Every `id` currently held, for `repair`'s caller to cross-reference
    /// against the set of Supervisors actually running.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.sessions.read().expect("lock poisoned").keys().cloned().collect()
    }
}

/// Path containment shared by the Registry and the PTY Supervisor (§4.F
/// "all session work_dirs must satisfy the Supervisor's path validation").
#[must_use]
pub fn path_policy_from_prefixes(prefixes: Vec<PathBuf>) -> PathPolicy {
    PathPolicy::new(prefixes)
}
