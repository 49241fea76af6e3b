//! Deadline-driven shutdown coordinator (§5 "Shutdown", §9 redesign note,
//! §12).
//!
//! Grounded in the daemon's `process.rs` graceful-then-forceful kill idiom
//! (SIGTERM, wait up to a bound, then SIGKILL) — generalized here from a
//! single child process to every active session in the [`Registry`], and
//! made deadline-driven rather than built on fixed `sleep`s, per §9's
//! redesign note ("Graceful shutdown with fixed sleeps").

use crate::fanout::Fanout;
use crate::pty::{commands::SignalKind, Supervisor};
use crate::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Notify every subscriber of every active session, send graceful-terminate
/// to every child concurrently, wait up to `deadline / 2`, force-kill any
/// survivors, then persist the registry (§5 steps 1-5; step 6, closing the
/// HTTP collaborator, is out of scope for the core).
pub async fn shutdown_all(registry: &Registry, fanout: &Fanout, supervisors: &[Arc<Supervisor>], deadline: Duration) {
    for session in registry.list() {
        fanout.notify_shutdown(&session.id, "session-hub is shutting down");
    }

    let mut joins = tokio::task::JoinSet::new();
    for supervisor in supervisors {
        let supervisor = supervisor.clone();
        joins.spawn(async move {
            let _ = supervisor.signal(SignalKind::Terminate);
        });
    }
    let graceful_deadline = deadline / 2;
    let _ = tokio::time::timeout(graceful_deadline, async {
        while joins.join_next().await.is_some() {}
    })
    .await;

    // `signal` only ever locks the `Child` handle briefly (see pty/mod.rs),
    // never the exit-watcher's blocking wait, so this loop can't stall on a
    // straggler the way it would if `signal` contended with `wait()`.
    for supervisor in supervisors {
        if supervisor.is_active() {
            let _ = supervisor.signal(SignalKind::Kill);
        }
    }

    registry.repair(&std::collections::HashSet::new());
    log::info!("shutdown_all complete");
}
