//! In-memory VT100/ANSI screen model (§4.A).
//!
//! Wraps [`vt100::Parser`] — the terminal-emulation crate the daemon's
//! `agent/screen.rs` and `agent/pty/mod.rs` already build on — behind the
//! narrower `feed`/`resize`/`snapshot`/`set_alternate` contract the
//! inferencer and fan-out actually need. `vt100` already implements the
//! CSI/SGR/scrollback/alternate-buffer surface listed in §4.A; this module
//! does not reimplement terminal emulation, it adapts it.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default scrollback depth (§6 `scrollback_lines`).
pub const DEFAULT_SCROLLBACK_LINES: usize = 1000;

/// `{content, display, cursor_x, cursor_y, width, height, in_alternate_screen,
/// history}` (§6 frame protocol snapshot shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Full screen content, rows joined by `\n`.
    pub content: String,
    /// Per-row displayed text, right-trimmed of trailing blanks.
    pub display: Vec<String>,
    pub cursor_x: u16,
    pub cursor_y: u16,
    pub width: u16,
    pub height: u16,
    pub in_alternate_screen: bool,
    /// Scrollback tail, oldest first.
    pub history: Vec<String>,
}

/// The screen model for one session's PTY.
///
/// Single-writer (the read-pump calls `feed`/`resize`), multi-reader
/// (`snapshot` from any number of concurrent callers) — callers are expected
/// to hold this behind a `Mutex`/`RwLock` per §5; the type itself is not
/// internally synchronized.
#[derive(Debug)]
pub struct Screen {
    parser: vt100::Parser,
    scrollback_cap: usize,
    /// Lines evicted from the top of the main buffer, oldest first.
    ///
    /// Grounded in the daemon's own `agent/pty/mod.rs` buffering strategy
    /// (`add_to_buffer`, `MAX_BUFFER_LINES`): a bounded line deque fed
    /// directly from the raw byte stream rather than queried back out of
    /// `vt100`'s internal scrollback, since `vt100::Parser` only exposes its
    /// scrollback through the *viewport* offset (`set_scrollback`), which is
    /// designed for interactive paging, not bulk retrieval.
    history: VecDeque<String>,
    /// Bytes of the current, not-yet-newline-terminated line.
    pending_line: Vec<u8>,
    in_alternate: bool,
}

impl Screen {
    /// Creates a screen with the given initial dimensions (§4.C starts at 80x24).
    #[must_use]
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_scrollback(cols, rows, DEFAULT_SCROLLBACK_LINES)
    }

    #[must_use]
    pub fn with_scrollback(cols: u16, rows: u16, scrollback_cap: usize) -> Self {
        Self {
            parser: vt100::Parser::new(rows, cols, scrollback_cap),
            scrollback_cap,
            history: VecDeque::with_capacity(scrollback_cap.min(4096)),
            pending_line: Vec::new(),
            in_alternate: false,
        }
    }

    /// Feed a chunk of raw PTY bytes. Never fails; prefix-associative per
    /// §8 ("feed is prefix-associative"): `vt100::Parser::process` buffers
    /// incomplete escape sequences internally across calls, so splitting a
    /// byte stream across multiple `feed` calls is equivalent to feeding it
    /// whole. Line buffering for scrollback is likewise split-safe: a
    /// newline straddling two `feed` calls still closes exactly one line,
    /// since the half-line bytes are held in `pending_line` between calls.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
        if !self.in_alternate {
            self.buffer_lines(bytes);
        }
    }

    /// Split newly-read bytes on `\n` and push completed lines into the
    /// bounded history deque, dropping the oldest line past `scrollback_cap`.
    fn buffer_lines(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&self.pending_line).into_owned();
                if self.history.len() == self.scrollback_cap {
                    self.history.pop_front();
                }
                self.history.push_back(line);
                self.pending_line.clear();
            } else {
                self.pending_line.push(byte);
            }
        }
    }

    /// Resize both the viewport and the bound of future scrollback growth.
    /// Rejects non-positive dimensions (programming-error kind, surfaced to
    /// the caller as a `bool` since the screen model itself is infallible
    /// at the byte-feeding layer but `resize` is a deliberate entry point
    /// that can be misused).
    pub fn resize(&mut self, cols: u16, rows: u16) -> bool {
        if cols == 0 || rows == 0 {
            return false;
        }
        self.parser.set_size(rows, cols);
        true
    }

    /// Switch into (`true`) or out of (`false`) the alternate screen buffer.
    ///
    /// `vt100::Parser` tracks alternate-screen mode itself (DEC private mode
    /// 1049/47); this method drives it the same way a real application
    /// would, by feeding the corresponding CSI sequence, so the parser's
    /// internal main/alternate split stays the single source of truth and
    /// `set_alternate(false)` genuinely restores the untouched main buffer
    /// rather than a hand-rolled copy.
    pub fn set_alternate(&mut self, enter: bool) {
        if enter == self.in_alternate {
            return;
        }
        let seq: &[u8] = if enter { b"\x1b[?1049h" } else { b"\x1b[?1049l" };
        self.parser.process(seq);
        self.in_alternate = enter;
    }

    #[must_use]
    pub fn in_alternate_screen(&self) -> bool {
        self.in_alternate
    }

    #[must_use]
    pub fn dimensions(&self) -> (u16, u16) {
        self.parser.screen().size()
    }

    /// Build a `Snapshot` of the current visible screen + scrollback tail.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let screen = self.parser.screen();
        let (rows, cols) = screen.size();
        let mut display = Vec::with_capacity(rows as usize);
        for row in 0..rows {
            let mut line = String::with_capacity(cols as usize);
            for col in 0..cols {
                if let Some(cell) = screen.cell(row, col) {
                    let contents = cell.contents();
                    line.push_str(if contents.is_empty() { " " } else { &contents });
                } else {
                    line.push(' ');
                }
            }
            display.push(line.trim_end().to_string());
        }
        let content = display.join("\n");
        let (cursor_y, cursor_x) = screen.cursor_position();

        Snapshot {
            content,
            display,
            cursor_x,
            cursor_y,
            width: cols,
            height: rows,
            in_alternate_screen: self.in_alternate,
            history: self.history.iter().cloned().collect(),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_prefix_associative() {
        let input = b"hello\x1b[2;5Hworld\r\n> ";
        let mut whole = Screen::new(80, 24);
        whole.feed(input);

        let mut split = Screen::new(80, 24);
        for chunk in input.chunks(3) {
            split.feed(chunk);
        }

        assert_eq!(whole.snapshot().display, split.snapshot().display);
        assert_eq!(whole.snapshot().cursor_x, split.snapshot().cursor_x);
        assert_eq!(whole.snapshot().cursor_y, split.snapshot().cursor_y);
    }

    #[test]
    fn feed_prompt_renders_trimmed_row() {
        let mut screen = Screen::new(80, 24);
        screen.feed(b"> ");
        let snap = screen.snapshot();
        assert_eq!(snap.display[0], ">");
    }

    #[test]
    fn resize_rejects_non_positive() {
        let mut screen = Screen::new(80, 24);
        assert!(!screen.resize(0, 24));
        assert!(!screen.resize(80, 0));
        assert!(screen.resize(100, 30));
        assert_eq!(screen.dimensions(), (30, 100));
    }

    #[test]
    fn set_alternate_restores_main_buffer() {
        let mut screen = Screen::new(80, 24);
        screen.feed(b"main buffer content");
        let before = screen.snapshot();

        screen.set_alternate(true);
        screen.feed(b"fullscreen app content");
        assert!(screen.in_alternate_screen());

        screen.set_alternate(false);
        let after = screen.snapshot();
        assert_eq!(before.display, after.display);
        assert!(!screen.in_alternate_screen());
    }

    #[test]
    fn feed_never_panics_on_malformed_sequences() {
        let mut screen = Screen::new(80, 24);
        screen.feed(b"\x1b[999;999;999;999m\x1b[?");
        screen.feed(&[0x1b, 0x00, 0xff, 0x1b, b'[']);
    }
}
