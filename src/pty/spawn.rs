//! PTY allocation and child-command construction.
//!
//! Grounded in the daemon's `agent/spawn.rs` (`open_pty`, `build_command`):
//! same `portable_pty` native system, same pattern of propagating the
//! ambient environment plus a baseline `TERM`.

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, CommandBuilder, PtyPair, PtySize};
use std::collections::HashMap;
use std::path::Path;

/// Allocate a PTY pair at the given dimensions.
pub fn open_pty(cols: u16, rows: u16) -> Result<PtyPair> {
    let pty_system = native_pty_system();
    pty_system
        .openpty(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
        .context("failed to allocate PTY")
}

/// Build the child command: the configured program (agent binary or a
/// login shell) with its working directory and environment, plus a
/// baseline `TERM=xterm-256color` the core always appends (§6).
pub fn build_command(program: &str, args: &[String], cwd: &Path, env_vars: &HashMap<String, String>) -> CommandBuilder {
    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    cmd.cwd(cwd);
    for (key, value) in env_vars {
        cmd.env(key, value);
    }
    cmd.env("TERM", "xterm-256color");
    cmd
}
