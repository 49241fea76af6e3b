//! Agent State Inferencer (§4.B): pattern-based derivation of an
//! `AgentStateSnapshot` from the same byte stream the Screen Model sees.

pub mod events;
pub mod patterns;

use chrono::{DateTime, Utc};
use events::{Checkpoint, EventHistory, HookEvent, HookEventType};
use patterns::{library, PatternType};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// The coarse agent state (§1, §4.B step 2 priority order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    Idle,
    Generating,
    WaitingInput,
    PermissionPrompt,
    ToolRunning,
    Error,
    Exited,
}

/// `normal/vim/plan/compact` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentMode {
    Normal,
    Vim,
    Plan,
    Compact,
}

/// A snapshot of everything the inferencer currently believes (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateSnapshot {
    pub state: AgentState,
    pub mode: AgentMode,
    pub vim_submode: Option<String>,
    pub permission_mode: Option<String>,
    pub is_generating: bool,
    pub pending_permission: bool,
    pub pending_tool: Option<String>,
    pub last_tool_used: Option<String>,
    pub last_slash_command: Option<String>,
    pub tokens_estimated: Option<u64>,
    pub cost_estimated: Option<f64>,
    pub background_tasks: Vec<String>,
    pub last_checkpoint_id: Option<String>,
    pub checkpoint_count: u64,
    pub can_rewind: bool,
    pub active_patterns: Vec<String>,
    pub recent_events: Vec<HookEvent>,
    pub last_activity: DateTime<Utc>,
    pub state_changed_at: DateTime<Utc>,
}

impl Default for AgentStateSnapshot {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            state: AgentState::Idle,
            mode: AgentMode::Normal,
            vim_submode: None,
            permission_mode: None,
            is_generating: false,
            pending_permission: false,
            pending_tool: None,
            last_tool_used: None,
            last_slash_command: None,
            tokens_estimated: None,
            cost_estimated: None,
            background_tasks: Vec::new(),
            last_checkpoint_id: None,
            checkpoint_count: 0,
            can_rewind: false,
            active_patterns: Vec::new(),
            recent_events: Vec::new(),
            last_activity: now,
            state_changed_at: now,
        }
    }
}

type StateChangeCallback = Box<dyn Fn(AgentState, AgentState) + Send + Sync>;
type PermissionCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Mutable fields split out from the callbacks so a single `RwLock` covers
/// the data the read-pump writes and snapshot readers read, matching §4.B's
/// "single writer, many concurrent snapshot readers" requirement.
struct Inner {
    snapshot: AgentStateSnapshot,
    checkpoints: Vec<Checkpoint>,
    events: EventHistory,
}

/// Infers an [`AgentStateSnapshot`] from terminal output chunks.
///
/// Callbacks registered via `on_state_change`/`on_permission_prompt` run
/// synchronously from inside `feed` in this implementation's single-thread
/// read-pump usage, but are documented (§4.B step 7) as logically
/// asynchronous: they must not assume they can block the pump, and a caller
/// driving this from a shared runtime should dispatch them onto a separate
/// task (e.g. via `tokio::spawn`) rather than calling them inline if they do
/// any I/O.
pub struct Inferencer {
    inner: RwLock<Inner>,
    on_state_change: RwLock<Option<StateChangeCallback>>,
    on_permission_prompt: RwLock<Option<PermissionCallback>>,
}

impl std::fmt::Debug for Inferencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inferencer").finish_non_exhaustive()
    }
}

impl Default for Inferencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Inferencer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                snapshot: AgentStateSnapshot::default(),
                checkpoints: Vec::new(),
                events: EventHistory::new(),
            }),
            on_state_change: RwLock::new(None),
            on_permission_prompt: RwLock::new(None),
        }
    }

    pub fn on_state_change(&self, callback: impl Fn(AgentState, AgentState) + Send + Sync + 'static) {
        *self.on_state_change.write().expect("lock poisoned") = Some(Box::new(callback));
    }

    pub fn on_permission_prompt(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_permission_prompt.write().expect("lock poisoned") = Some(Box::new(callback));
    }

    /// Current snapshot. Never fails (§4.B: "permit many concurrent
    /// snapshot readers").
    #[must_use]
    pub fn snapshot(&self) -> AgentStateSnapshot {
        self.inner.read().expect("lock poisoned").snapshot.clone()
    }

    /// Feed a chunk of the same byte stream the Screen Model sees and run
    /// the derivation policy (§4.B steps 1-7).
    pub fn feed(&self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        let mut active: Vec<(&'static str, PatternType, patterns::Priority)> = Vec::new();
        for pattern in library() {
            if pattern.regex.is_match(&text) {
                active.push((pattern.name, pattern.kind, pattern.priority));
            }
        }

        let mut inner = self.inner.write().expect("lock poisoned");
        let old_state = inner.snapshot.state;

        inner.snapshot.active_patterns = active.iter().map(|(name, ..)| (*name).to_string()).collect();
        inner.snapshot.last_activity = Utc::now();

        // Step 2: highest priority wins, Error > PermissionPrompt >
        // ToolRunning > Generating > WaitingInput. Absence of signals
        // leaves state unchanged.
        let has = |kind: PatternType| active.iter().any(|(_, k, _)| *k == kind);
        let new_state = if text.contains("Error:") || text.contains("error:") {
            Some(AgentState::Error)
        } else if has(PatternType::Permission) {
            Some(AgentState::PermissionPrompt)
        } else if has(PatternType::Tool) {
            Some(AgentState::ToolRunning)
        } else if has(PatternType::Progress) {
            Some(AgentState::Generating)
        } else if has(PatternType::Prompt) {
            Some(AgentState::WaitingInput)
        } else {
            None
        };

        if let Some(new_state) = new_state {
            inner.snapshot.state = new_state;
            inner.snapshot.is_generating = new_state == AgentState::Generating;
            inner.snapshot.pending_permission = new_state == AgentState::PermissionPrompt;
        }

        // Step 3: mode.
        if has(PatternType::Vim) {
            inner.snapshot.mode = AgentMode::Vim;
            inner.snapshot.vim_submode = if text.contains("-- INSERT --") {
                Some("insert".to_string())
            } else if text.contains("-- VISUAL --") {
                Some("visual".to_string())
            } else {
                Some("normal".to_string())
            };
        } else if text.contains("plan mode") {
            inner.snapshot.mode = AgentMode::Plan;
        } else if text.contains("vim mode") {
            inner.snapshot.mode = AgentMode::Vim;
        }

        // Step 4: pending-tool extraction.
        if let Some(caps) = patterns::RE_PERMISSION_ALLOW.captures(&text) {
            inner.snapshot.pending_tool = Some(caps[1].to_string());
        }
        if let Some(caps) = patterns::RE_TOOL_ACTIVITY.captures(&text) {
            inner.snapshot.last_tool_used = Some(caps[2].trim().to_string());
        }

        // Step 5: slash-command side effects.
        for line in text.lines() {
            if let Some(caps) = patterns::RE_COMMAND_SLASH.captures(line.trim()) {
                let command = caps[1].to_string();
                inner.snapshot.last_slash_command = Some(command.clone());
                match command.as_str() {
                    "vim" => inner.snapshot.mode = AgentMode::Vim,
                    "plan" => inner.snapshot.mode = AgentMode::Plan,
                    "compact" => inner.snapshot.mode = AgentMode::Compact,
                    "clear" => inner.snapshot.mode = AgentMode::Normal,
                    "rewind" => inner.snapshot.can_rewind = true,
                    _ => {}
                }
            }
        }

        // Step 6: metrics, never fail.
        if let Some(caps) = patterns::RE_INFO_TOKENS.captures(&text) {
            inner.snapshot.tokens_estimated = caps[1].parse().ok();
        }
        if let Some(caps) = patterns::RE_INFO_COST.captures(&text) {
            inner.snapshot.cost_estimated = caps[1].parse().ok();
        }
        if has(PatternType::Background) {
            let task = text.trim().to_string();
            if !inner.snapshot.background_tasks.contains(&task) {
                inner.snapshot.background_tasks.push(task);
            }
        }

        let pending_tool_for_callback = inner.snapshot.pending_tool.clone();
        let state_changed = new_state.is_some() && new_state != Some(old_state);
        if state_changed {
            inner.snapshot.state_changed_at = Utc::now();
        }
        inner.snapshot.recent_events = inner.events.tail();
        drop(inner);

        // Step 7: callbacks run logically asynchronously relative to feed
        // and must not block it; invoked after the lock is released so a
        // slow callback never holds up the next concurrent snapshot reader.
        if state_changed {
            if let Some(cb) = self.on_state_change.read().expect("lock poisoned").as_ref() {
                cb(old_state, new_state.expect("state_changed implies Some"));
            }
        }
        if new_state == Some(AgentState::PermissionPrompt) {
            if let (Some(cb), Some(tool)) =
                (self.on_permission_prompt.read().expect("lock poisoned").as_ref(), pending_tool_for_callback.as_deref())
            {
                cb(tool);
            }
        }
    }

    /// Append a checkpoint reported by a collaborator (§4.B).
    pub fn add_checkpoint(&self, id: impl Into<String>, tool_used: impl Into<String>, files_affected: Vec<String>) {
        let mut inner = self.inner.write().expect("lock poisoned");
        let id = id.into();
        inner.checkpoints.push(Checkpoint {
            id: id.clone(),
            timestamp: Utc::now(),
            tool_used: tool_used.into(),
            files_affected,
        });
        inner.snapshot.last_checkpoint_id = Some(id);
        inner.snapshot.checkpoint_count = inner.checkpoints.len() as u64;
    }

    /// Append a hook event reported by a collaborator (§4.B).
    pub fn add_event(&self, event_type: HookEventType, tool: Option<String>, data: serde_json::Value) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.events.push(HookEvent { event_type, tool, timestamp: Utc::now(), data });
        inner.snapshot.recent_events = inner.events.tail();
    }

    #[must_use]
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.inner.read().expect("lock poisoned").checkpoints.clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<HookEvent> {
        self.inner.read().expect("lock poisoned").events.all()
    }

    /// Mark the agent as exited; a terminal state no further `feed` should
    /// move out of (the Supervisor calls this from its exit-watcher task).
    pub fn mark_exited(&self) {
        let mut inner = self.inner.write().expect("lock poisoned");
        let old = inner.snapshot.state;
        inner.snapshot.state = AgentState::Exited;
        inner.snapshot.is_generating = false;
        inner.snapshot.state_changed_at = Utc::now();
        drop(inner);
        if old != AgentState::Exited {
            if let Some(cb) = self.on_state_change.read().expect("lock poisoned").as_ref() {
                cb(old, AgentState::Exited);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn spinner_sets_generating() {
        let inferencer = Inferencer::new();
        inferencer.feed("⠋ Thinking...".as_bytes());
        let snap = inferencer.snapshot();
        assert_eq!(snap.state, AgentState::Generating);
        assert!(snap.is_generating);
        assert!(snap.active_patterns.contains(&"spinner".to_string()));
    }

    #[test]
    fn permission_prompt_extracts_tool_and_fires_callback() {
        let inferencer = Inferencer::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        inferencer.on_permission_prompt(move |tool| {
            assert_eq!(tool, "Edit");
            fired_clone.store(true, Ordering::SeqCst);
        });

        inferencer.feed(b"Allow Edit to write file.txt? [y/n]");
        let snap = inferencer.snapshot();
        assert_eq!(snap.state, AgentState::PermissionPrompt);
        assert!(snap.pending_permission);
        assert_eq!(snap.pending_tool.as_deref(), Some("Edit"));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn bare_prompt_sets_waiting_input() {
        let inferencer = Inferencer::new();
        inferencer.feed(b"> ");
        assert_eq!(inferencer.snapshot().state, AgentState::WaitingInput);
    }

    #[test]
    fn error_outranks_progress() {
        let inferencer = Inferencer::new();
        inferencer.feed("⠋ Error: boom".as_bytes());
        assert_eq!(inferencer.snapshot().state, AgentState::Error);
    }

    #[test]
    fn slash_rewind_sets_can_rewind() {
        let inferencer = Inferencer::new();
        inferencer.feed(b"/rewind 2\n");
        assert!(inferencer.snapshot().can_rewind);
        assert_eq!(inferencer.snapshot().last_slash_command.as_deref(), Some("rewind"));
    }

    #[test]
    fn absence_of_signals_leaves_state_unchanged() {
        let inferencer = Inferencer::new();
        inferencer.feed(b"⠋ working");
        assert_eq!(inferencer.snapshot().state, AgentState::Generating);
        inferencer.feed(b"plain text with no markers");
        assert_eq!(inferencer.snapshot().state, AgentState::Generating);
    }

    #[test]
    fn checkpoint_and_event_histories_track_counts() {
        let inferencer = Inferencer::new();
        inferencer.add_checkpoint("cp1", "Edit", vec!["a.rs".to_string()]);
        assert_eq!(inferencer.snapshot().checkpoint_count, 1);
        assert_eq!(inferencer.snapshot().last_checkpoint_id.as_deref(), Some("cp1"));

        inferencer.add_event(HookEventType::PreToolUse, Some("Edit".to_string()), serde_json::json!({}));
        assert_eq!(inferencer.events().len(), 1);
    }

    #[test]
    fn mark_exited_fires_state_change_once() {
        let inferencer = Inferencer::new();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_clone = calls.clone();
        inferencer.on_state_change(move |_old, new| {
            assert_eq!(new, AgentState::Exited);
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        inferencer.mark_exited();
        inferencer.mark_exited();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
