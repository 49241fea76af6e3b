//! Checkpoints and hook events (§3), bounded histories (§4.B).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum retained hook events per session (§3: "bounded at 100").
pub const EVENT_HISTORY_CAP: usize = 100;
/// Recent-tail length exposed in a snapshot (§3: "recent tail 10 exposed").
pub const EVENT_TAIL_LEN: usize = 10;

/// `{id, timestamp, tool_used, files_affected[]}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tool_used: String,
    pub files_affected: Vec<String>,
}

/// Hook event type (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookEventType {
    PreToolUse,
    PostToolUse,
    PermissionRequest,
    UserPromptSubmit,
    Stop,
    SubagentStop,
    SessionStart,
    SessionEnd,
    Notification,
    PreCompact,
}

/// `{type, tool, timestamp, data}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    #[serde(rename = "type")]
    pub event_type: HookEventType,
    pub tool: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Bounded ring of hook events with a cheap "last 10" tail view.
#[derive(Debug, Default)]
pub struct EventHistory {
    events: VecDeque<HookEvent>,
}

impl EventHistory {
    #[must_use]
    pub fn new() -> Self {
        Self { events: VecDeque::with_capacity(EVENT_HISTORY_CAP) }
    }

    pub fn push(&mut self, event: HookEvent) {
        if self.events.len() == EVENT_HISTORY_CAP {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Copy of the full bounded history, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<HookEvent> {
        self.events.iter().cloned().collect()
    }

    /// Copy of the most recent `EVENT_TAIL_LEN` events, oldest first.
    #[must_use]
    pub fn tail(&self) -> Vec<HookEvent> {
        let skip = self.events.len().saturating_sub(EVENT_TAIL_LEN);
        self.events.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: HookEventType) -> HookEvent {
        HookEvent { event_type: kind, tool: None, timestamp: Utc::now(), data: serde_json::Value::Null }
    }

    #[test]
    fn history_caps_at_100() {
        let mut history = EventHistory::new();
        for _ in 0..150 {
            history.push(event(HookEventType::Notification));
        }
        assert_eq!(history.all().len(), EVENT_HISTORY_CAP);
    }

    #[test]
    fn tail_returns_last_ten() {
        let mut history = EventHistory::new();
        for i in 0..25 {
            let mut e = event(HookEventType::Notification);
            e.tool = Some(i.to_string());
            history.push(e);
        }
        let tail = history.tail();
        assert_eq!(tail.len(), EVENT_TAIL_LEN);
        assert_eq!(tail.last().unwrap().tool.as_deref(), Some("24"));
        assert_eq!(tail.first().unwrap().tool.as_deref(), Some("15"));
    }
}
