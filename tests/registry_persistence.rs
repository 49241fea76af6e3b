//! Registry persistence and auto-maintenance scenarios (spec §4.F, §4.E).

use chrono::{Duration, Utc};
use session_hub::pty::PathPolicy;
use session_hub::registry::Registry;
use session_hub::{LaunchConfig, Session, SessionKind, SessionState};
use std::collections::HashSet;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn atomic_write_leaves_no_tmp_file_behind() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::open(dir.path().to_path_buf(), PathPolicy::default()).unwrap();
    let session = registry
        .create(Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default()))
        .unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert!(entries.iter().any(|name| name.to_string_lossy() == format!("{}.json", session.id)));
    assert!(entries.iter().all(|name| !name.to_string_lossy().ends_with(".tmp")));
}

#[test]
fn reopening_registry_recovers_every_known_session() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::open(dir.path().to_path_buf(), PathPolicy::default()).unwrap();
    for i in 0..5 {
        registry
            .create(Session::new(SessionKind::Agent, PathBuf::from(format!("/tmp/work-{i}")), LaunchConfig::default()))
            .unwrap();
    }

    let reopened = Registry::open(dir.path().to_path_buf(), PathPolicy::default()).unwrap();
    assert_eq!(reopened.list().len(), 5);
}

#[test]
fn auto_archive_old_only_touches_stale_stopped_sessions() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::open(dir.path().to_path_buf(), PathPolicy::default()).unwrap();

    let mut stale = Session::new(SessionKind::Agent, PathBuf::from("/tmp/stale"), LaunchConfig::default());
    stale.state = SessionState::Stopped;
    stale.stopped_at = Some(Utc::now() - Duration::days(10));
    registry.create(stale.clone()).unwrap();

    let mut recent = Session::new(SessionKind::Agent, PathBuf::from("/tmp/recent"), LaunchConfig::default());
    recent.state = SessionState::Stopped;
    recent.stopped_at = Some(Utc::now() - Duration::hours(1));
    registry.create(recent.clone()).unwrap();

    registry.auto_archive_old();

    assert_eq!(registry.get(&stale.id).unwrap().state, SessionState::Archived);
    assert_eq!(registry.get(&recent.id).unwrap().state, SessionState::Stopped);
}

#[test]
fn repair_backfills_missing_stopped_at_and_demotes_dead_active() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::open(dir.path().to_path_buf(), PathPolicy::default()).unwrap();

    let mut orphaned_active = Session::new(SessionKind::Agent, PathBuf::from("/tmp/x"), LaunchConfig::default());
    orphaned_active.state = SessionState::Active;
    orphaned_active.started_at = Some(Utc::now());
    registry.create(orphaned_active.clone()).unwrap();

    let mut live_active = Session::new(SessionKind::Agent, PathBuf::from("/tmp/y"), LaunchConfig::default());
    live_active.state = SessionState::Active;
    live_active.started_at = Some(Utc::now());
    registry.create(live_active.clone()).unwrap();

    let mut live_ids = HashSet::new();
    live_ids.insert(live_active.id.clone());
    registry.repair(&live_ids);

    assert_eq!(registry.get(&orphaned_active.id).unwrap().state, SessionState::Stopped);
    assert_eq!(registry.get(&live_active.id).unwrap().state, SessionState::Active);
}

#[test]
fn create_validates_path_policy_before_touching_disk() {
    let dir = TempDir::new().unwrap();
    let policy = PathPolicy::new(vec![PathBuf::from("/allowed")]);
    let registry = Registry::open(dir.path().to_path_buf(), policy).unwrap();

    let err = registry
        .create(Session::new(SessionKind::Agent, PathBuf::from("/forbidden"), LaunchConfig::default()))
        .unwrap_err();
    assert_eq!(err.kind, session_hub::ErrorKind::PathNotAllowed);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
