//! End-to-end lifecycle scenarios (spec §8) wiring the Registry and the
//! Lifecycle transition table together, verifying the persisted record on
//! disk reflects every transition.

use chrono::{Duration, Utc};
use session_hub::pty::PathPolicy;
use session_hub::registry::Registry;
use session_hub::{LaunchConfig, Session, SessionKind, SessionState};
use std::path::PathBuf;
use tempfile::TempDir;

fn open_registry(dir: &TempDir) -> Registry {
    Registry::open(dir.path().to_path_buf(), PathPolicy::default()).expect("open registry")
}

#[test]
fn happy_path_start_pause_resume_stop_archive() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    let session = registry
        .create(Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default()))
        .expect("create session");

    registry.transition(&session.id, session_hub::lifecycle::table::Event::Start).unwrap();
    registry.transition(&session.id, session_hub::lifecycle::table::Event::Ready).unwrap();
    registry.transition(&session.id, session_hub::lifecycle::table::Event::Pause).unwrap();
    let after_resume = registry.transition(&session.id, session_hub::lifecycle::table::Event::Resume).unwrap();
    assert_eq!(after_resume.state, SessionState::Active);
    registry.transition(&session.id, session_hub::lifecycle::table::Event::Stop).unwrap();
    let archived = registry.transition(&session.id, session_hub::lifecycle::table::Event::Archive).unwrap();

    assert_eq!(archived.pause_count, 1);
    assert_eq!(archived.resume_count, 1);
    assert!(archived.is_archived);
    assert!(archived.archived_at.unwrap() >= archived.stopped_at.unwrap());

    // Reopen from disk to confirm the persisted record matches memory.
    let reopened = open_registry(&dir);
    let reloaded = reopened.get(&session.id).expect("record persisted");
    assert_eq!(reloaded.state, SessionState::Archived);
    assert_eq!(reloaded.pause_count, 1);
}

#[test]
fn resume_stopped_respects_seven_day_window() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);

    let mut stale = Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default());
    stale.state = SessionState::Stopped;
    stale.stopped_at = Some(Utc::now() - Duration::days(8));
    registry.create(stale.clone()).unwrap();

    let blocked = registry.transition(&stale.id, session_hub::lifecycle::table::Event::Resume);
    assert!(blocked.is_err());
    assert_eq!(registry.get(&stale.id).unwrap().state, SessionState::Stopped);

    let mut fresh = Session::new(SessionKind::Agent, PathBuf::from("/tmp/y"), LaunchConfig::default());
    fresh.state = SessionState::Stopped;
    fresh.stopped_at = Some(Utc::now() - Duration::days(1));
    registry.create(fresh.clone()).unwrap();

    let resumed = registry.transition(&fresh.id, session_hub::lifecycle::table::Event::Resume).unwrap();
    assert_eq!(resumed.state, SessionState::Starting);
}

#[test]
fn deleted_session_is_unreachable_and_transitions_fail() {
    let dir = TempDir::new().unwrap();
    let registry = open_registry(&dir);
    let session = registry
        .create(Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default()))
        .unwrap();

    registry.transition(&session.id, session_hub::lifecycle::table::Event::Delete).unwrap();
    assert!(registry.get(&session.id).is_none());
    let err = registry.transition(&session.id, session_hub::lifecycle::table::Event::Start).unwrap_err();
    assert_eq!(err.kind, session_hub::ErrorKind::NotFound);
}
