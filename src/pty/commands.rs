//! Small command/control vocabulary for the PTY Supervisor (§4.C `signal`).

/// Graceful vs. forceful termination, as `signal(kind)` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM on Unix: ask the child to exit.
    Terminate,
    /// SIGKILL on Unix: force the child to exit immediately.
    Kill,
}
