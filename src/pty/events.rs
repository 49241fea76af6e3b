//! Events the read-pump and exit-watcher broadcast to the Fan-out.
//!
//! Grounded directly in the daemon's `agent/pty/events.rs`: the same
//! `PtyEvent` shape (`Output`/`Resized`/`ProcessExited`), constructors and
//! predicates, generalized only in that `Output` now carries the already-fed
//! chunk rather than being the sole mechanism callers use to learn about it.

/// An event broadcast from a [`crate::pty::Supervisor`] to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    /// Raw bytes read from the child's stdout/stderr this tick.
    Output(Vec<u8>),
    /// The PTY window was resized.
    Resized { rows: u16, cols: u16 },
    /// The child process exited.
    ProcessExited { exit_code: Option<i32> },
}

impl PtyEvent {
    #[must_use]
    pub fn output(data: Vec<u8>) -> Self {
        PtyEvent::Output(data)
    }

    #[must_use]
    pub fn resized(rows: u16, cols: u16) -> Self {
        PtyEvent::Resized { rows, cols }
    }

    #[must_use]
    pub fn process_exited(exit_code: Option<i32>) -> Self {
        PtyEvent::ProcessExited { exit_code }
    }

    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self, PtyEvent::Output(_))
    }

    #[must_use]
    pub fn is_resized(&self) -> bool {
        matches!(self, PtyEvent::Resized { .. })
    }

    #[must_use]
    pub fn is_process_exited(&self) -> bool {
        matches!(self, PtyEvent::ProcessExited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_match_predicates() {
        assert!(PtyEvent::output(vec![1, 2, 3]).is_output());
        assert!(PtyEvent::resized(24, 80).is_resized());
        assert!(PtyEvent::process_exited(Some(0)).is_process_exited());
    }

    #[test]
    fn output_carries_bytes() {
        let event = PtyEvent::output(b"hello".to_vec());
        match event {
            PtyEvent::Output(data) => assert_eq!(data, b"hello"),
            _ => panic!("expected Output"),
        }
    }
}
