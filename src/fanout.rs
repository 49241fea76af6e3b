//! Subscriber Fan-out (§4.D): per-session set of remote subscribers that
//! receive framed output/agent-event traffic and may push input/resize
//! frames back to a session's PTY Supervisor.
//!
//! Grounded in `client/mod.rs`'s `Client` trait (id + push methods),
//! generalized here from TUI/browser-specific variants into a single
//! transport-agnostic [`Subscriber`]; the subscribe/broadcast shape follows
//! `hub/agent_handle.rs`'s `PtyHandle`; frames delivered to subscribers are
//! the JSON shapes of §6, carried inside `socket/framing.rs`'s
//! length-prefixed envelope (`frame_type::JSON`).

use crate::error::{CoreError, CoreResult};
use crate::screen::Snapshot;
use crate::socket::framing::Frame;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Default per-session subscriber cap (§4.D `attach`).
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 10;
/// Default liveness ping interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
/// Default stale-subscriber timeout.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Bound on each subscriber's outbound queue; a full queue is treated the
/// same as a write failure so one slow subscriber can never back-pressure
/// the broadcaster (§4.D "writes... must be serialized per subscriber").
const SUBSCRIBER_QUEUE_DEPTH: usize = 256;

/// What `attach` records about a connecting subscriber (§4.D).
#[derive(Debug, Clone, Default)]
pub struct SubscriberMeta {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

/// A sink a subscriber can be pushed encoded frames through. Implemented
/// by whatever owns the actual transport (a Unix socket connection, a
/// WebSocket, an in-process test probe); the Fan-out only ever calls
/// `send`, never touches the transport directly.
pub trait Subscriber: Send + Sync {
    fn id(&self) -> &str;
    /// Enqueue a frame for delivery. Returns `false` if the subscriber's
    /// sink is closed or full — callers treat that exactly like a write
    /// failure and detach the subscriber.
    fn send(&self, frame: Vec<u8>) -> bool;
}

/// A channel-backed [`Subscriber`], the shape most real transports use: a
/// task on the other end of `tx` drains frames and writes them to the wire.
pub struct ChannelSubscriber {
    id: String,
    tx: tokio::sync::mpsc::Sender<Vec<u8>>,
}

impl ChannelSubscriber {
    #[must_use]
    pub fn new(id: impl Into<String>) -> (Arc<Self>, tokio::sync::mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = tokio::sync::mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        (Arc::new(Self { id: id.into(), tx }), rx)
    }
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, frame: Vec<u8>) -> bool {
        self.tx.try_send(frame).is_ok()
    }
}

struct Entry {
    subscriber: Arc<dyn Subscriber>,
    meta: SubscriberMeta,
    connected_at: DateTime<Utc>,
    last_activity: Mutex<DateTime<Utc>>,
}

#[derive(Default)]
struct SessionSubscribers {
    entries: Vec<Entry>,
}

impl SessionSubscribers {
    fn push_to_all(&self, frame: &Frame) -> Vec<String> {
        let encoded = frame.encode();
        let mut failed = Vec::new();
        for entry in &self.entries {
            if !entry.subscriber.send(encoded.clone()) {
                failed.push(entry.subscriber.id().to_string());
            } else {
                *entry.last_activity.lock().expect("lock poisoned") = Utc::now();
            }
        }
        failed
    }
}

/// Per-session subscriber sets, keyed by session id.
///
/// `attach`/`detach`/`broadcast_*` are safe under concurrent use from many
/// subscribers and the PTY read-pump: the outer map is an `RwLock` (reads
/// dominate — one broadcast per output chunk, attach/detach are rare), and
/// each session's subscriber list is behind its own `Mutex` so broadcasting
/// to session A never contends with attaching to session B.
pub struct Fanout {
    max_subscribers: usize,
    sessions: RwLock<HashMap<String, Mutex<SessionSubscribers>>>,
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout").field("max_subscribers", &self.max_subscribers).finish_non_exhaustive()
    }
}

impl Fanout {
    #[must_use]
    pub fn new(max_subscribers: usize) -> Self {
        Self { max_subscribers, sessions: RwLock::new(HashMap::new()) }
    }

    fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&SessionSubscribers) -> R) -> Option<R> {
        let sessions = self.sessions.read().expect("lock poisoned");
        sessions.get(session_id).map(|slot| f(&slot.lock().expect("lock poisoned")))
    }

    /// Add a subscriber to a session's set, enforcing the per-session cap
    /// and immediately delivering a snapshot frame (§4.D `attach`).
    pub fn attach(
        &self,
        session_id: &str,
        subscriber: Arc<dyn Subscriber>,
        meta: SubscriberMeta,
        snapshot: &Snapshot,
    ) -> CoreResult<()> {
        let mut sessions = self.sessions.write().expect("lock poisoned");
        let slot = sessions.entry(session_id.to_string()).or_insert_with(|| Mutex::new(SessionSubscribers::default()));
        let mut set = slot.lock().expect("lock poisoned");

        if set.entries.len() >= self.max_subscribers {
            return Err(CoreError::max_subscribers(self.max_subscribers));
        }

        let now = Utc::now();
        let frame = Frame::Json(serde_json::json!({ "type": "snapshot", "snapshot": snapshot }));
        subscriber.send(frame.encode());

        set.entries.push(Entry { subscriber, meta, connected_at: now, last_activity: Mutex::new(now) });
        Ok(())
    }

    /// Remove a subscriber; idempotent, and drops the session's entry
    /// entirely once its set is empty (§4.D `detach`).
    pub fn detach(&self, session_id: &str, subscriber_id: &str) {
        let sessions = self.sessions.read().expect("lock poisoned");
        let Some(slot) = sessions.get(session_id) else { return };
        let mut set = slot.lock().expect("lock poisoned");
        set.entries.retain(|e| e.subscriber.id() != subscriber_id);
        let is_empty = set.entries.is_empty();
        drop(set);
        drop(sessions);
        if is_empty {
            self.sessions.write().expect("lock poisoned").remove(session_id);
        }
    }

    /// Deliver PTY output to every subscriber of `session_id` (§4.D
    /// `broadcast_output`). Subscribers whose send fails are detached
    /// without blocking the caller.
    pub fn broadcast_output(&self, session_id: &str, data: Vec<u8>) {
        let data = String::from_utf8_lossy(&data).into_owned();
        let frame = Frame::Json(serde_json::json!({ "type": "output", "data": data }));
        self.broadcast(session_id, &frame);
    }

    /// Deliver an agent-event frame (§4.D `broadcast_agent_event`).
    pub fn broadcast_agent_event(&self, session_id: &str, event_type: &str, data: Value) {
        let frame = Frame::Json(serde_json::json!({
            "type": "claude:event",
            "event_type": event_type,
            "data": data,
            "timestamp": Utc::now(),
        }));
        self.broadcast(session_id, &frame);
    }

    /// Non-blocking hand-off used by the Inferencer's callbacks (§9's
    /// redesign note): same wire shape as `broadcast_agent_event`, named
    /// distinctly so callers know this call site must never block.
    pub fn offer_agent_event(&self, session_id: &str, event_type: &str, data: Value) {
        self.broadcast_agent_event(session_id, event_type, data);
    }

    /// Tell every subscriber of `session_id` the process has exited, then
    /// drop the session's subscriber set (§4.C/§4.D interaction: once a
    /// session's child exits there is nothing left to fan output from).
    pub fn close_session(&self, session_id: &str, message: &str) {
        let frame = Frame::Json(serde_json::json!({ "type": "closed", "message": message }));
        self.broadcast(session_id, &frame);
        self.sessions.write().expect("lock poisoned").remove(session_id);
    }

    /// Tell every subscriber of `session_id` the whole hub is going down
    /// (§6 `{type:"shutdown", message}`, §5 shutdown step 1). Distinct from
    /// `close_session`'s `{type:"closed"}`, which means "this session
    /// specifically ended"; `{type:"shutdown"}` means "everything is".
    pub fn notify_shutdown(&self, session_id: &str, message: &str) {
        let frame = Frame::Json(serde_json::json!({ "type": "shutdown", "message": message }));
        self.broadcast(session_id, &frame);
    }

    fn broadcast(&self, session_id: &str, frame: &Frame) {
        let failed = self.with_session(session_id, |set| set.push_to_all(frame)).unwrap_or_default();
        for id in failed {
            self.detach(session_id, &id);
        }
    }

    /// Route a frame received from a subscriber (§4.D `receive`):
    /// `input` frames are forwarded to the session's Supervisor via
    /// `on_input`, `resize` frames via `on_resize`; anything else is
    /// discarded. Also refreshes `last_activity` for liveness tracking.
    pub fn receive(
        &self,
        session_id: &str,
        subscriber_id: &str,
        frame: &Value,
        mut on_input: impl FnMut(&[u8]),
        mut on_resize: impl FnMut(u16, u16),
    ) {
        self.touch(session_id, subscriber_id);
        match frame.get("type").and_then(Value::as_str) {
            Some("input") => {
                if let Some(data) = frame.get("data").and_then(Value::as_str) {
                    on_input(data.as_bytes());
                }
            }
            Some("resize") => {
                if let (Some(cols), Some(rows)) =
                    (frame.get("cols").and_then(Value::as_u64), frame.get("rows").and_then(Value::as_u64))
                {
                    on_resize(cols as u16, rows as u16);
                }
            }
            _ => {}
        }
    }

    fn touch(&self, session_id: &str, subscriber_id: &str) {
        self.with_session(session_id, |set| {
            if let Some(entry) = set.entries.iter().find(|e| e.subscriber.id() == subscriber_id) {
                *entry.last_activity.lock().expect("lock poisoned") = Utc::now();
            }
        });
    }

    /// Ping subscribers that have been idle past `stale_timeout`; any whose
    /// ping write fails is detached (§4.D "Liveness").
    pub fn sweep_stale(&self, stale_timeout: Duration) {
        let sessions = self.sessions.read().expect("lock poisoned");
        let now = Utc::now();
        let mut to_detach: Vec<(String, String)> = Vec::new();
        for (session_id, slot) in sessions.iter() {
            let set = slot.lock().expect("lock poisoned");
            for entry in &set.entries {
                let idle = now.signed_duration_since(*entry.last_activity.lock().expect("lock poisoned"));
                if idle.to_std().unwrap_or_default() >= stale_timeout {
                    let ping = Frame::Json(serde_json::json!({ "type": "ping" }));
                    if !entry.subscriber.send(ping.encode()) {
                        to_detach.push((session_id.clone(), entry.subscriber.id().to_string()));
                    }
                }
            }
        }
        drop(sessions);
        for (session_id, subscriber_id) in to_detach {
            self.detach(&session_id, &subscriber_id);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.with_session(session_id, |set| set.entries.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::Screen;

    fn snapshot() -> Snapshot {
        Screen::new(80, 24).snapshot()
    }

    #[test]
    fn attach_delivers_snapshot_before_output() {
        let fanout = Fanout::new(DEFAULT_MAX_SUBSCRIBERS);
        let (sub, mut rx) = ChannelSubscriber::new("sub-1");
        fanout.attach("s1", sub, SubscriberMeta::default(), &snapshot()).unwrap();
        fanout.broadcast_output("s1", b"hello".to_vec());

        let first = rx.try_recv().expect("snapshot frame");
        let second = rx.try_recv().expect("output frame");
        assert_eq!(first[4], crate::socket::framing::frame_type::JSON);
        let first_json: Value = serde_json::from_slice(&first[5..]).unwrap();
        assert_eq!(first_json["type"], "snapshot");
        let second_json: Value = serde_json::from_slice(&second[5..]).unwrap();
        assert_eq!(second_json["type"], "output");
    }

    #[test]
    fn attach_rejects_past_cap() {
        let fanout = Fanout::new(1);
        let (sub1, _rx1) = ChannelSubscriber::new("sub-1");
        let (sub2, _rx2) = ChannelSubscriber::new("sub-2");
        fanout.attach("s1", sub1, SubscriberMeta::default(), &snapshot()).unwrap();
        assert!(fanout.attach("s1", sub2, SubscriberMeta::default(), &snapshot()).is_err());
    }

    #[test]
    fn detach_is_idempotent_and_clears_empty_session() {
        let fanout = Fanout::new(DEFAULT_MAX_SUBSCRIBERS);
        let (sub, _rx) = ChannelSubscriber::new("sub-1");
        fanout.attach("s1", sub, SubscriberMeta::default(), &snapshot()).unwrap();
        fanout.detach("s1", "sub-1");
        fanout.detach("s1", "sub-1"); // second call is a no-op, not an error
        assert_eq!(fanout.subscriber_count("s1"), 0);
    }

    #[test]
    fn broadcast_to_unknown_session_is_a_silent_no_op() {
        let fanout = Fanout::new(DEFAULT_MAX_SUBSCRIBERS);
        fanout.broadcast_output("missing", b"x".to_vec());
    }

    #[test]
    fn receive_routes_input_and_resize_frames() {
        let fanout = Fanout::new(DEFAULT_MAX_SUBSCRIBERS);
        let (sub, _rx) = ChannelSubscriber::new("sub-1");
        fanout.attach("s1", sub, SubscriberMeta::default(), &snapshot()).unwrap();

        let mut received_input = Vec::new();
        let mut received_resize = None;
        let input_frame = serde_json::json!({ "type": "input", "data": "hi" });
        fanout.receive("s1", "sub-1", &input_frame, |b| received_input = b.to_vec(), |_, _| {});
        assert_eq!(received_input, b"hi");

        let resize_frame = serde_json::json!({ "type": "resize", "cols": 100, "rows": 40 });
        fanout.receive("s1", "sub-1", &resize_frame, |_| {}, |c, r| received_resize = Some((c, r)));
        assert_eq!(received_resize, Some((100, 40)));
    }

    #[test]
    fn unrelated_frame_types_are_discarded() {
        let fanout = Fanout::new(DEFAULT_MAX_SUBSCRIBERS);
        let (sub, _rx) = ChannelSubscriber::new("sub-1");
        fanout.attach("s1", sub, SubscriberMeta::default(), &snapshot()).unwrap();
        let frame = serde_json::json!({ "type": "unknown" });
        fanout.receive("s1", "sub-1", &frame, |_| panic!("should not be called"), |_, _| panic!("should not be called"));
    }

    #[test]
    fn failed_send_detaches_subscriber_on_next_broadcast() {
        let fanout = Fanout::new(DEFAULT_MAX_SUBSCRIBERS);
        let (sub, rx) = ChannelSubscriber::new("sub-1");
        fanout.attach("s1", sub, SubscriberMeta::default(), &snapshot()).unwrap();
        drop(rx); // closes the channel, so future sends fail
        fanout.broadcast_output("s1", b"x".to_vec());
        assert_eq!(fanout.subscriber_count("s1"), 0);
    }

    #[test]
    fn close_session_notifies_and_clears_subscribers() {
        let fanout = Fanout::new(DEFAULT_MAX_SUBSCRIBERS);
        let (sub, mut rx) = ChannelSubscriber::new("sub-1");
        fanout.attach("s1", sub, SubscriberMeta::default(), &snapshot()).unwrap();
        rx.try_recv().unwrap(); // drain the snapshot frame
        fanout.close_session("s1", "process exited");
        let closed = rx.try_recv().expect("closed frame");
        let json: Value = serde_json::from_slice(&closed[5..]).unwrap();
        assert_eq!(json["type"], "closed");
        assert_eq!(json["message"], "process exited");
        assert_eq!(fanout.subscriber_count("s1"), 0);
    }

    #[test]
    fn notify_shutdown_sends_distinct_frame_without_detaching() {
        let fanout = Fanout::new(DEFAULT_MAX_SUBSCRIBERS);
        let (sub, mut rx) = ChannelSubscriber::new("sub-1");
        fanout.attach("s1", sub, SubscriberMeta::default(), &snapshot()).unwrap();
        rx.try_recv().unwrap(); // drain the snapshot frame
        fanout.notify_shutdown("s1", "going down");
        let shutdown = rx.try_recv().expect("shutdown frame");
        let json: Value = serde_json::from_slice(&shutdown[5..]).unwrap();
        assert_eq!(json["type"], "shutdown");
        assert_eq!(json["message"], "going down");
        assert_eq!(fanout.subscriber_count("s1"), 1);
    }
}
