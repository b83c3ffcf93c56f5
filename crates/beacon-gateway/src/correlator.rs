//! In-flight request correlation for one channel.
//!
//! The correlator is owned exclusively by the channel's driver task, so no
//! locking is needed: all mutation is serialized through that task's event
//! loop. Each pending call is resolved exactly once — by a matching
//! response, by deadline expiry, or by forced failure on teardown —
//! because every resolution path removes the entry before sending.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use beacon_proto::{BeaconResponse, CorrelationId};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::BeaconError;

/// Delivered to the waiter of one call.
pub(crate) type CallReply = Result<BeaconResponse, BeaconError>;

/// One outstanding request awaiting exactly one resolution.
pub(crate) struct PendingCall {
    /// Wire name of the event, for logging and timeout errors.
    pub event: &'static str,
    /// When this call fails with a timeout.
    pub deadline: Instant,
    /// The timeout the deadline was computed from.
    pub timeout: Duration,
    /// Serialized request frame, kept for retransmission after a reconnect.
    pub frame: String,
    /// Delivers the result to the single waiter.
    pub reply: oneshot::Sender<CallReply>,
}

/// Tracks in-flight requests for one channel.
pub(crate) struct Correlator {
    next_id: u64,
    pending: HashMap<CorrelationId, PendingCall>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Allocate the next correlation id.
    ///
    /// Monotonically unique within the channel's lifetime; a u64 does not
    /// realistically wrap, so a live id is never aliased.
    pub(crate) fn next(&mut self) -> CorrelationId {
        let id = CorrelationId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register a pending call under its id.
    pub(crate) fn register(&mut self, id: CorrelationId, call: PendingCall) {
        self.pending.insert(id, call);
    }

    /// Resolve the pending call for `id`, if any.
    ///
    /// Returns `false` for unknown ids: stale responses to already timed-out
    /// or abandoned calls, which are dropped without affecting any live call.
    pub(crate) fn resolve(&mut self, id: CorrelationId, reply: CallReply) -> bool {
        match self.pending.remove(&id) {
            Some(call) => {
                // The waiter may have abandoned the call; a failed send is fine.
                let _ = call.reply.send(reply);
                true
            }
            None => false,
        }
    }

    /// Fail every pending call, draining the table.
    ///
    /// Used on teardown (`Closed`) and when the channel gives up
    /// reconnecting (`Network`).
    pub(crate) fn fail_all(&mut self, mut make_error: impl FnMut(&'static str) -> BeaconError) -> usize {
        let drained = self.pending.drain().collect::<Vec<_>>();
        let count = drained.len();
        for (_, call) in drained {
            let _ = call.reply.send(Err(make_error(call.event)));
        }
        count
    }

    /// Fail every call whose deadline is at or before `now` with `Timeout`.
    ///
    /// Returns the number of calls expired. Driven by the channel's periodic
    /// sweep, so no per-call timer is needed.
    pub(crate) fn expire_due(&mut self, now: Instant) -> usize {
        let due: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|(_, call)| call.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &due {
            if let Some(call) = self.pending.remove(id) {
                debug!(id = %id, event = call.event, "call deadline elapsed");
                let _ = call.reply.send(Err(BeaconError::Timeout {
                    event: call.event.to_string(),
                    after: call.timeout,
                }));
            }
        }
        due.len()
    }

    /// Iterate the pending frames in id order, for retransmission after a
    /// reconnect.
    pub(crate) fn pending_frames(&self) -> Vec<(CorrelationId, String)> {
        let mut frames: Vec<(CorrelationId, String)> = self
            .pending
            .iter()
            .map(|(id, call)| (*id, call.frame.clone()))
            .collect();
        frames.sort_by_key(|(id, _)| *id);
        frames
    }

    /// Number of calls currently in flight.
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(event: &'static str, deadline: Instant) -> (PendingCall, oneshot::Receiver<CallReply>) {
        let (tx, rx) = oneshot::channel();
        (
            PendingCall {
                event,
                deadline,
                timeout: Duration::from_secs(1),
                frame: format!("{{\"event\":\"{event}\"}}"),
                reply: tx,
            },
            rx,
        )
    }

    fn far_future() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    // ==================== Id Allocation Tests ====================

    #[test]
    fn test_next_is_monotonic() {
        let mut correlator = Correlator::new();
        let a = correlator.next();
        let b = correlator.next();
        let c = correlator.next();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_next_never_aliases_pending_id() {
        let mut correlator = Correlator::new();
        let id = correlator.next();
        let (call, _rx) = pending("get_status", far_future());
        correlator.register(id, call);

        for _ in 0..100 {
            assert_ne!(correlator.next(), id);
        }
    }

    // ==================== Resolution Tests ====================

    #[test]
    fn test_resolve_delivers_to_waiter() {
        let mut correlator = Correlator::new();
        let id = correlator.next();
        let (call, mut rx) = pending("ping", far_future());
        correlator.register(id, call);

        assert!(correlator.resolve(id, Ok(BeaconResponse::Pong)));
        assert_eq!(correlator.len(), 0);

        let reply = rx.try_recv().unwrap();
        assert!(matches!(reply, Ok(BeaconResponse::Pong)));
    }

    #[test]
    fn test_resolve_unknown_id_is_dropped() {
        let mut correlator = Correlator::new();
        assert!(!correlator.resolve(CorrelationId::new(99), Ok(BeaconResponse::Pong)));
    }

    #[test]
    fn test_resolve_is_exactly_once() {
        let mut correlator = Correlator::new();
        let id = correlator.next();
        let (call, _rx) = pending("ping", far_future());
        correlator.register(id, call);

        assert!(correlator.resolve(id, Ok(BeaconResponse::Pong)));
        // Second resolution of the same id finds nothing.
        assert!(!correlator.resolve(id, Ok(BeaconResponse::Pong)));
    }

    #[test]
    fn test_resolve_tolerates_abandoned_waiter() {
        let mut correlator = Correlator::new();
        let id = correlator.next();
        let (call, rx) = pending("get_status", far_future());
        correlator.register(id, call);

        drop(rx);
        // The waiter is gone; resolution still removes the entry.
        assert!(correlator.resolve(id, Ok(BeaconResponse::Pong)));
        assert_eq!(correlator.len(), 0);
    }

    // ==================== Expiry Tests ====================

    #[test]
    fn test_expire_due_times_out_only_due_calls() {
        let mut correlator = Correlator::new();
        let now = Instant::now();

        let due_id = correlator.next();
        let (due_call, mut due_rx) = pending("get_status", now - Duration::from_millis(1));
        correlator.register(due_id, due_call);

        let live_id = correlator.next();
        let (live_call, mut live_rx) = pending("get_logs", far_future());
        correlator.register(live_id, live_call);

        assert_eq!(correlator.expire_due(now), 1);
        assert_eq!(correlator.len(), 1);

        let reply = due_rx.try_recv().unwrap();
        assert!(matches!(reply, Err(BeaconError::Timeout { .. })));
        assert!(live_rx.try_recv().is_err());
    }

    #[test]
    fn test_late_response_after_expiry_is_unknown() {
        let mut correlator = Correlator::new();
        let id = correlator.next();
        let (call, _rx) = pending("get_status", Instant::now() - Duration::from_millis(1));
        correlator.register(id, call);

        correlator.expire_due(Instant::now());
        assert!(!correlator.resolve(id, Ok(BeaconResponse::Pong)));
    }

    // ==================== Teardown Tests ====================

    #[test]
    fn test_fail_all_drains_everything() {
        let mut correlator = Correlator::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let id = correlator.next();
            let (call, rx) = pending("get_status", far_future());
            correlator.register(id, call);
            receivers.push(rx);
        }

        assert_eq!(correlator.fail_all(|_| BeaconError::Closed), 3);
        assert_eq!(correlator.len(), 0);

        for mut rx in receivers {
            let reply = rx.try_recv().unwrap();
            assert!(matches!(reply, Err(BeaconError::Closed)));
        }
    }

    // ==================== Retransmission Tests ====================

    #[test]
    fn test_pending_frames_in_id_order() {
        let mut correlator = Correlator::new();
        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for event in ["get_status", "get_logs", "ping"] {
            let id = correlator.next();
            let (call, rx) = pending(event, far_future());
            correlator.register(id, call);
            ids.push(id);
            receivers.push(rx);
        }

        let frames = correlator.pending_frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames.iter().map(|(id, _)| *id).collect::<Vec<_>>(), ids);
        assert!(frames[0].1.contains("get_status"));
    }
}
