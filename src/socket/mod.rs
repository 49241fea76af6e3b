//! Wire codec for the bidirectional socket the Fan-out's frames ride over
//! (§6 "External Interfaces").
//!
//! Length-prefixed frames: `[u32 LE length][u8 type][payload]`. See
//! [`framing`] for frame types and the codec itself. The listener/accept
//! loop that binds an actual Unix socket and turns connections into
//! [`crate::fanout::Subscriber`]s is a collaborator concern (the HTTP/socket
//! router named as out of scope in §1) — this module owns only the wire
//! format the core's frames are encoded into.

pub mod framing;
