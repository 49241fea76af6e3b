//! PTY supervisor, terminal emulation, and agent-state inference for
//! remotely driven interactive agent sessions.
//!
//! Module map mirrors the component table: [`screen`] (A), [`inferencer`]
//! (B), [`pty`] (C), [`fanout`] (D), [`lifecycle`] (E), [`registry`] (F).
//! [`session`] holds the durable data model all of the above share;
//! [`error`] and [`config`] are the ambient error/configuration surfaces;
//! [`shutdown`] is the process-wide shutdown coordinator; [`socket`] is the
//! wire codec the Fan-out's frames are encoded into.

pub mod config;
pub mod error;
pub mod fanout;
pub mod inferencer;
pub mod lifecycle;
pub mod pty;
pub mod registry;
pub mod screen;
pub mod session;
pub mod shutdown;
pub mod socket;

pub use config::HubConfig;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use fanout::Fanout;
pub use inferencer::{AgentMode, AgentState, AgentStateSnapshot, Inferencer};
pub use pty::{PathPolicy, Supervisor};
pub use registry::Registry;
pub use screen::{Screen, Snapshot};
pub use session::{LaunchConfig, Session, SessionKind, SessionState};
