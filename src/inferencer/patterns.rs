//! The fixed, ordered pattern library (§4.B).
//!
//! Grounded in the daemon's `agent/notification.rs`, which already
//! byte-scans terminal output for OSC9/OSC777 notification sequences —
//! generalized here into a `regex`-backed library covering the eleven
//! pattern types §4.B requires. `regex` itself is pulled in the way the
//! `mylm` sibling example already depends on it for this exact class of
//! terminal-output classification.

use once_cell::sync::Lazy;
use regex::Regex;

/// One of the eleven pattern categories named in §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    Permission,
    Tool,
    Progress,
    Prompt,
    Mode,
    Vim,
    Status,
    Command,
    Info,
    Background,
    Checkpoint,
}

/// Relative precedence when multiple patterns match the same chunk.
/// Higher wins (§4.B step 2: "highest priority wins").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub u8);

/// One entry in the pattern library: `(name, compiled regex, type, priority,
/// description)`.
pub struct Pattern {
    pub name: &'static str,
    pub regex: &'static Lazy<Regex>,
    pub kind: PatternType,
    pub priority: Priority,
    pub description: &'static str,
}

macro_rules! pattern_regex {
    ($ident:ident, $re:expr) => {
        pub static $ident: Lazy<Regex> = Lazy::new(|| Regex::new($re).expect("static pattern regex is valid"));
    };
}

pattern_regex!(RE_PERMISSION_ALLOW, r"(?i)allow\s+(\w+)\s+to\b");
pattern_regex!(RE_PERMISSION_YN, r"\[[yY]/[nN]\]");
pattern_regex!(RE_TOOL_ACTIVITY, r"(?m)^(Running|Writing|Reading|Searching|Editing):\s*(.*)$");
pattern_regex!(RE_SPINNER, r"[\u{2800}-\u{28FF}\u{2801}]|[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]");
pattern_regex!(RE_PROGRESS_NUMERIC, r"\b(\d+)\s*/\s*(\d+)\b");
pattern_regex!(RE_PROGRESS_PERCENT, r"\b(\d{1,3})%");
pattern_regex!(RE_PROMPT_ARROW, r"(?m)^>\s*$");
pattern_regex!(RE_PROMPT_CLAUDE, r"(?m)claude>\s*$");
pattern_regex!(RE_MODE_VIM, r"vim mode");
pattern_regex!(RE_MODE_PLAN, r"plan mode");
pattern_regex!(RE_VIM_INSERT, r"-- INSERT --");
pattern_regex!(RE_VIM_NORMAL, r"-- NORMAL --");
pattern_regex!(RE_VIM_VISUAL, r"-- VISUAL --");
pattern_regex!(RE_STATUS_ERROR, r"(?i)error:");
pattern_regex!(RE_STATUS_WARNING, r"(?i)warning:");
pattern_regex!(RE_STATUS_CHECK, r"[✓✗]");
pattern_regex!(RE_COMMAND_SLASH, r"(?m)^/(\w+)(?:\s+(.*))?$");
pattern_regex!(RE_INFO_TOKENS, r"(?i)tokens?:\s*(\d+)");
pattern_regex!(RE_INFO_COST, r"\$\s?(\d+(?:\.\d+)?)");
pattern_regex!(RE_BACKGROUND_TASK, r"(?i)background task");
pattern_regex!(RE_CHECKPOINT, r"(?i)(checkpoint|rewind)");

/// The ordered library, highest priority first within each type group.
/// Order within the returned slice does not itself encode precedence —
/// `priority` does, per §4.B step 2 — patterns are simply grouped here by
/// kind for readability.
pub fn library() -> &'static [Pattern] {
    static LIB: Lazy<Vec<Pattern>> = Lazy::new(|| {
        vec![
            Pattern { name: "permission_allow", regex: &RE_PERMISSION_ALLOW, kind: PatternType::Permission, priority: Priority(90), description: "Allow <X> to ..." },
            Pattern { name: "permission_yn", regex: &RE_PERMISSION_YN, kind: PatternType::Permission, priority: Priority(89), description: "[y/n] style confirmation" },
            Pattern { name: "tool_activity", regex: &RE_TOOL_ACTIVITY, kind: PatternType::Tool, priority: Priority(70), description: "Running:/Writing:/Reading:/Searching:/Editing:" },
            Pattern { name: "spinner", regex: &RE_SPINNER, kind: PatternType::Progress, priority: Priority(60), description: "unicode spinner glyph" },
            Pattern { name: "progress_numeric", regex: &RE_PROGRESS_NUMERIC, kind: PatternType::Progress, priority: Priority(55), description: "n/m numeric progress" },
            Pattern { name: "progress_percent", regex: &RE_PROGRESS_PERCENT, kind: PatternType::Progress, priority: Priority(55), description: "n% percent progress" },
            Pattern { name: "prompt_arrow", regex: &RE_PROMPT_ARROW, kind: PatternType::Prompt, priority: Priority(40), description: "bare > prompt" },
            Pattern { name: "prompt_claude", regex: &RE_PROMPT_CLAUDE, kind: PatternType::Prompt, priority: Priority(40), description: "claude> prompt" },
            Pattern { name: "mode_vim", regex: &RE_MODE_VIM, kind: PatternType::Mode, priority: Priority(50), description: "vim mode marker" },
            Pattern { name: "mode_plan", regex: &RE_MODE_PLAN, kind: PatternType::Mode, priority: Priority(50), description: "plan mode marker" },
            Pattern { name: "vim_insert", regex: &RE_VIM_INSERT, kind: PatternType::Vim, priority: Priority(51), description: "-- INSERT --" },
            Pattern { name: "vim_normal", regex: &RE_VIM_NORMAL, kind: PatternType::Vim, priority: Priority(51), description: "-- NORMAL --" },
            Pattern { name: "vim_visual", regex: &RE_VIM_VISUAL, kind: PatternType::Vim, priority: Priority(51), description: "-- VISUAL --" },
            Pattern { name: "status_error", regex: &RE_STATUS_ERROR, kind: PatternType::Status, priority: Priority(100), description: "Error: severity marker" },
            Pattern { name: "status_warning", regex: &RE_STATUS_WARNING, kind: PatternType::Status, priority: Priority(80), description: "Warning: severity marker" },
            Pattern { name: "status_check", regex: &RE_STATUS_CHECK, kind: PatternType::Status, priority: Priority(45), description: "check/cross glyph" },
            Pattern { name: "command_slash", regex: &RE_COMMAND_SLASH, kind: PatternType::Command, priority: Priority(65), description: "/command line" },
            Pattern { name: "info_tokens", regex: &RE_INFO_TOKENS, kind: PatternType::Info, priority: Priority(10), description: "tokens: N" },
            Pattern { name: "info_cost", regex: &RE_INFO_COST, kind: PatternType::Info, priority: Priority(10), description: "$amount cost hint" },
            Pattern { name: "background_task", regex: &RE_BACKGROUND_TASK, kind: PatternType::Background, priority: Priority(20), description: "background task mention" },
            Pattern { name: "checkpoint", regex: &RE_CHECKPOINT, kind: PatternType::Checkpoint, priority: Priority(30), description: "checkpoint/rewind mention" },
        ]
    });
    &LIB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_allow_captures_tool_name() {
        let text = "Allow Edit to write file.txt? [y/n]";
        let caps = RE_PERMISSION_ALLOW.captures(text).unwrap();
        assert_eq!(&caps[1], "Edit");
    }

    #[test]
    fn spinner_matches_braille_glyph() {
        assert!(RE_SPINNER.is_match("⠋ Thinking..."));
    }

    #[test]
    fn slash_command_matches_and_captures_args() {
        let caps = RE_COMMAND_SLASH.captures("/rewind 3").unwrap();
        assert_eq!(&caps[1], "rewind");
        assert_eq!(&caps[2], "3");
    }

    #[test]
    fn library_has_all_eleven_pattern_types() {
        use std::collections::HashSet;
        let kinds: HashSet<_> = library().iter().map(|p| p.kind).collect();
        assert_eq!(kinds.len(), 11);
    }
}
