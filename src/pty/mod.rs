//! PTY Supervisor (§4.C): owns one session's child process and
//! pseudoterminal, pumps bytes through the Screen Model + Inferencer,
//! delivers them to the Fan-out, accepts input/resize, and detects exit.
//!
//! Grounded in the daemon's `agent/pty/{mod,events,commands}.rs` and
//! `agent/spawn.rs`: a dedicated `std::thread` read-pump (PTY reads are
//! blocking I/O, exactly as the daemon's `spawn_cli_reader_thread` treats
//! them) paired with a `tokio::sync::broadcast::Sender<PtyEvent>` — the same
//! channel shape as the daemon's `hub/agent_handle.rs` `PtyHandle` — so
//! other observers can subscribe to PTY activity without the pump calling
//! them directly and risking a block on a slow subscriber. The *primary*
//! Fan-out path is the direct call sequence §4.C specifies (`screen.feed →
//! inferencer.feed → fanout.broadcast_output`); the broadcast channel is a
//! secondary, opt-in tap for collaborators that want the raw event stream.

pub mod commands;
pub mod events;
pub mod spawn;

use crate::error::{CoreError, CoreResult};
use crate::fanout::Fanout;
use crate::inferencer::events::{Checkpoint, HookEvent};
use crate::inferencer::{AgentStateSnapshot, Inferencer};
use crate::screen::{Screen, Snapshot};
use crate::session::SessionKind;
use commands::SignalKind;
use events::PtyEvent;
use portable_pty::{Child, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;

const READ_CHUNK_SIZE: usize = 4096;
const INITIAL_COLS: u16 = 80;
const INITIAL_ROWS: u16 = 24;

/// Configuration needed to launch the child process (distinct from
/// [`crate::session::LaunchConfig`], which is the *persisted* record —
/// this is the resolved command line + environment derived from it).
#[derive(Debug, Clone)]
pub struct StartConfig {
    pub work_dir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
    pub env_vars: HashMap<String, String>,
}

/// Validates `work_dir` against the configured allowed-path prefixes (§4.C).
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    /// Empty means "any" (development mode).
    pub allowed_prefixes: Vec<PathBuf>,
}

impl PathPolicy {
    #[must_use]
    pub fn new(allowed_prefixes: Vec<PathBuf>) -> Self {
        Self { allowed_prefixes }
    }

    /// `work_dir` must be absolute, must not contain a parent-traversal
    /// segment, and (unless the prefix list is empty) must start with one
    /// of the configured prefixes.
    pub fn validate(&self, work_dir: &Path) -> CoreResult<()> {
        if !work_dir.is_absolute() {
            return Err(CoreError::path_not_allowed(work_dir));
        }
        if work_dir.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(CoreError::path_not_allowed(work_dir));
        }
        if self.allowed_prefixes.is_empty() {
            return Ok(());
        }
        if self.allowed_prefixes.iter().any(|prefix| work_dir.starts_with(prefix)) {
            return Ok(());
        }
        Err(CoreError::path_not_allowed(work_dir))
    }
}

/// The live PTY handles for a started session; absent before `start` and
/// after cleanup. Deliberately holds no reference to the `Child`: `write`
/// and `resize` only ever need `master`/`writer`, and keeping `Child` out
/// of this mutex means neither call contends with the exit-watcher's
/// `wait()`.
struct Runtime {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

const EXIT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

type ExitCallback = Box<dyn Fn(Option<i32>) + Send + Sync>;

/// Owns one session's child process + PTY. See module docs for the
/// concurrency model.
///
/// Always used behind an `Arc<Supervisor>`: `start` takes `self: &Arc<Self>`
/// because the read-pump and exit-watcher threads each need their own
/// strong handle that outlives the call to `start`.
pub struct Supervisor {
    session_id: String,
    kind: SessionKind,
    screen: Arc<Mutex<Screen>>,
    inferencer: Arc<Inferencer>,
    fanout: Arc<Fanout>,
    runtime: Mutex<Option<Runtime>>,
    child: Mutex<Option<Box<dyn Child + Send + Sync>>>,
    active: AtomicBool,
    on_exit: RwLock<Option<ExitCallback>>,
    event_tx: broadcast::Sender<PtyEvent>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("session_id", &self.session_id)
            .field("kind", &self.kind)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new(session_id: impl Into<String>, kind: SessionKind, fanout: Arc<Fanout>) -> Arc<Self> {
        let (event_tx, _rx) = broadcast::channel(256);
        let supervisor = Arc::new(Self {
            session_id: session_id.into(),
            kind,
            screen: Arc::new(Mutex::new(Screen::new(INITIAL_COLS, INITIAL_ROWS))),
            inferencer: Arc::new(Inferencer::new()),
            fanout,
            runtime: Mutex::new(None),
            child: Mutex::new(None),
            active: AtomicBool::new(false),
            on_exit: RwLock::new(None),
            event_tx,
        });
        supervisor.wire_inferencer_callbacks();
        supervisor
    }

    /// Wire the Inferencer's synchronous callbacks (§4.B step 7) to a
    /// non-blocking push into the Fan-out, so a slow subscriber write can
    /// never stall the read-pump thread that ultimately triggers them.
    fn wire_inferencer_callbacks(self: &Arc<Self>) {
        let fanout = self.fanout.clone();
        let session_id = self.session_id.clone();
        self.inferencer.on_state_change(move |old, new| {
            fanout.offer_agent_event(
                &session_id,
                "state-change",
                serde_json::json!({ "from": format!("{old:?}"), "to": format!("{new:?}") }),
            );
        });
        let fanout = self.fanout.clone();
        let session_id = self.session_id.clone();
        self.inferencer.on_permission_prompt(move |tool| {
            fanout.offer_agent_event(&session_id, "permission-prompt", serde_json::json!({ "tool": tool }));
        });
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PtyEvent> {
        self.event_tx.subscribe()
    }

    pub fn on_exit(&self, callback: impl Fn(Option<i32>) + Send + Sync + 'static) {
        *self.on_exit.write().expect("lock poisoned") = Some(Box::new(callback));
    }

    /// Launch the child process under a fresh PTY (§4.C `start`).
    ///
    /// Idempotent per session id: fails fast with `already-active` if this
    /// supervisor already owns a running child; fails fast (no side
    /// effects) on path or allocation errors.
    pub fn start(self: &Arc<Self>, config: StartConfig, policy: &PathPolicy) -> CoreResult<()> {
        policy.validate(&config.work_dir)?;

        if self.active.swap(true, Ordering::SeqCst) {
            return Err(CoreError::already_active(&self.session_id));
        }

        let result = self.start_inner(config);
        if result.is_err() {
            self.active.store(false, Ordering::SeqCst);
        }
        result
    }

    fn start_inner(self: &Arc<Self>, config: StartConfig) -> CoreResult<()> {
        let pair = spawn::open_pty(INITIAL_COLS, INITIAL_ROWS).map_err(|e| CoreError::start_failed(e.to_string()))?;
        let cmd = spawn::build_command(&config.program, &config.args, &config.work_dir, &config.env_vars);
        let child = pair.slave.spawn_command(cmd).map_err(|e| CoreError::start_failed(e.to_string()))?;
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(|e| CoreError::start_failed(e.to_string()))?;
        let reader = pair.master.try_clone_reader().map_err(|e| CoreError::start_failed(e.to_string()))?;

        *self.runtime.lock().expect("lock poisoned") = Some(Runtime { master: pair.master, writer });
        *self.child.lock().expect("lock poisoned") = Some(child);

        self.spawn_read_pump(reader);
        self.spawn_exit_watcher();

        Ok(())
    }

    fn spawn_read_pump(self: &Arc<Self>, mut reader: Box<dyn Read + Send>) {
        let supervisor = self.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let chunk = &buf[..n];
                        supervisor.screen.lock().expect("lock poisoned").feed(chunk);
                        supervisor.inferencer.feed(chunk);
                        supervisor.fanout.broadcast_output(&supervisor.session_id, chunk.to_vec());
                        let _ = supervisor.event_tx.send(PtyEvent::output(chunk.to_vec()));
                    }
                }
            }
            // EOF or a read error means the PTY closed; the exit-watcher
            // thread (polling `try_wait()`) is what actually runs cleanup
            // once the child itself has been reaped, per §4.C.
        });
    }

    /// Poll `try_wait()` rather than the blocking `wait()` so this thread
    /// never holds `self.child`'s lock for longer than one poll — `write`,
    /// `resize`, and `signal` all need to run against a live child while
    /// this loop is spinning.
    fn spawn_exit_watcher(self: &Arc<Self>) {
        let supervisor = self.clone();
        std::thread::spawn(move || {
            let exit_code = loop {
                let polled = {
                    let mut guard = supervisor.child.lock().expect("lock poisoned");
                    guard.as_mut().map(|child| child.try_wait())
                };
                match polled {
                    Some(Ok(Some(status))) => break Some(status.exit_code() as i32),
                    Some(Ok(None)) => std::thread::sleep(EXIT_POLL_INTERVAL),
                    Some(Err(_)) | None => break None,
                }
            };
            *supervisor.child.lock().expect("lock poisoned") = None;
            *supervisor.runtime.lock().expect("lock poisoned") = None;
            supervisor.active.store(false, Ordering::SeqCst);
            supervisor.inferencer.mark_exited();

            let _ = supervisor.event_tx.send(PtyEvent::process_exited(exit_code));
            supervisor.fanout.close_session(&supervisor.session_id, "process exited");

            if let Some(cb) = supervisor.on_exit.read().expect("lock poisoned").as_ref() {
                cb(exit_code);
            }
        });
    }

    /// Forward bytes to the child's stdin (§4.C `write`).
    pub fn write(&self, bytes: &[u8]) -> CoreResult<()> {
        let mut guard = self.runtime.lock().expect("lock poisoned");
        match guard.as_mut() {
            Some(rt) => rt.writer.write_all(bytes).map_err(CoreError::internal),
            None => Err(CoreError::new(crate::error::ErrorKind::Internal, "session has no running child")),
        }
    }

    /// Resize the OS PTY window and the Screen Model identically so
    /// snapshots stay coherent (§4.C `resize`).
    pub fn resize(&self, cols: u16, rows: u16) -> CoreResult<()> {
        if cols == 0 || rows == 0 {
            return Err(CoreError::new(crate::error::ErrorKind::Internal, "resize requires positive dimensions"));
        }
        self.screen.lock().expect("lock poisoned").resize(cols, rows);
        let guard = self.runtime.lock().expect("lock poisoned");
        if let Some(rt) = guard.as_ref() {
            rt.master
                .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
                .map_err(CoreError::internal)?;
        }
        Ok(())
    }

    /// Send terminate (graceful) or kill (forceful) to the child (§4.C `signal`).
    ///
    /// Grounded in the daemon's `process.rs` graceful-then-forceful idiom:
    /// `Terminate` sends `SIGTERM` via `libc::kill`, `Kill` calls the PTY
    /// child handle's own forceful `kill()`.
    pub fn signal(&self, kind: SignalKind) -> CoreResult<()> {
        let mut guard = self.child.lock().expect("lock poisoned");
        let Some(child) = guard.as_mut() else {
            return Ok(()); // already exited; signaling a dead child is a no-op
        };
        match kind {
            SignalKind::Terminate => {
                #[cfg(unix)]
                if let Some(pid) = child.process_id() {
                    // SAFETY: `pid` is a live process id owned by this
                    // supervisor's child; `libc::kill` with SIGTERM is a
                    // standard graceful-shutdown request, not memory-unsafe.
                    unsafe {
                        libc::kill(pid as libc::pid_t, libc::SIGTERM);
                    }
                }
                #[cfg(not(unix))]
                child.kill().map_err(CoreError::internal)?;
                Ok(())
            }
            SignalKind::Kill => child.kill().map_err(CoreError::internal),
        }
    }

    /// Current Screen snapshot (§4.C `snapshot`).
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.screen.lock().expect("lock poisoned").snapshot()
    }

    fn require_agent_kind(&self) -> CoreResult<()> {
        if self.kind == SessionKind::Agent {
            Ok(())
        } else {
            Err(CoreError::wrong_kind(&self.session_id))
        }
    }

    /// Current Agent State Snapshot (§4.C `agent_state`); `wrong-kind` on
    /// plain-shell sessions.
    pub fn agent_state(&self) -> CoreResult<AgentStateSnapshot> {
        self.require_agent_kind()?;
        Ok(self.inferencer.snapshot())
    }

    pub fn checkpoints(&self) -> CoreResult<Vec<Checkpoint>> {
        self.require_agent_kind()?;
        Ok(self.inferencer.checkpoints())
    }

    pub fn events(&self) -> CoreResult<Vec<HookEvent>> {
        self.require_agent_kind()?;
        Ok(self.inferencer.events())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::Fanout;

    fn policy_any() -> PathPolicy {
        PathPolicy::new(Vec::new())
    }

    #[test]
    fn path_policy_rejects_relative_path() {
        let policy = PathPolicy::new(vec![PathBuf::from("/tmp")]);
        assert!(policy.validate(Path::new("relative/path")).is_err());
    }

    #[test]
    fn path_policy_rejects_parent_traversal() {
        let policy = policy_any();
        assert!(policy.validate(Path::new("/tmp/../etc")).is_err());
    }

    #[test]
    fn path_policy_rejects_outside_allowed_prefix() {
        let policy = PathPolicy::new(vec![PathBuf::from("/allowed")]);
        assert!(policy.validate(Path::new("/not-allowed/x")).is_err());
        assert!(policy.validate(Path::new("/allowed/x")).is_ok());
    }

    #[test]
    fn empty_prefix_list_allows_any_absolute_path() {
        let policy = policy_any();
        assert!(policy.validate(Path::new("/anywhere")).is_ok());
    }

    #[test]
    fn agent_only_operations_reject_plain_shell_sessions() {
        let fanout = Arc::new(Fanout::new(10));
        let supervisor = Supervisor::new("s1", SessionKind::PlainShell, fanout);
        assert!(supervisor.agent_state().is_err());
        assert!(supervisor.checkpoints().is_err());
        assert!(supervisor.events().is_err());
    }

    #[test]
    fn resize_rejects_non_positive_dimensions() {
        let fanout = Arc::new(Fanout::new(10));
        let supervisor = Supervisor::new("s1", SessionKind::Agent, fanout);
        assert!(supervisor.resize(0, 24).is_err());
    }

    #[test]
    fn write_before_start_reports_internal_error() {
        let fanout = Arc::new(Fanout::new(10));
        let supervisor = Supervisor::new("s1", SessionKind::Agent, fanout);
        assert!(supervisor.write(b"hello").is_err());
    }
}
