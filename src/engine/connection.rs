//! Connection scheduler: admission control, in-flight budgets, and the
//! request/response round-robin transmit pump.

use std::collections::VecDeque;

use crate::engine::close::State;
use crate::engine::config::{APP_IO_BUDGET, INFLIGHT_BUDGET};
use crate::engine::error::{ConnError, MsgError, TryError};
use crate::engine::message::{Message, MessageKind, MsgQueue};

/// Outcome of handing one message to the data-path engine for framing and
/// posting (the three branches `xio_connection_send` can
/// return).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Posted successfully.
    Sent,
    /// No window/budget/sqe right now; retry from the next pump tick.
    WouldBlock,
    /// The message was rejected after framing (e.g. failed validation once
    /// sized); drop it from the ready queue and keep draining.
    Rejected,
    /// Any other failure: drop the message and stop the pump with an error.
    Fatal(ConnError),
}

/// The data-path engine as seen by the connection scheduler: "write session
/// header, call transport send". A production
/// implementation threads this through [`crate::engine::task::TaskPool`]
/// and the wire codec; [`crate::engine::test_support`] provides a fake for
/// unit tests.
pub trait Transport {
    fn transmit(&mut self, msg: &Message) -> SendOutcome;
}

/// Per-kind in-flight budgets.
#[derive(Debug, Clone, Copy)]
pub struct Budgets {
    pub reqs: i64,
    pub one_way_sends: i64,
    pub app_io: i64,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            reqs: INFLIGHT_BUDGET as i64,
            one_way_sends: INFLIGHT_BUDGET as i64,
            app_io: APP_IO_BUDGET as i64,
        }
    }
}

/// A duplex peer binding.
pub struct Connection {
    pub state: State,
    pub in_close: bool,
    pub close_reason: Option<ConnError>,
    pub kref: u32,

    pub reqs_msgq: MsgQueue,
    pub rsps_msgq: MsgQueue,
    pub reqs_inflight: MsgQueue,
    pub rsps_inflight: MsgQueue,

    pub budgets: Budgets,
    budgets_max: Budgets,

    /// Round-robin toggle: `false` picks requests next, `true` picks
    /// responses next.
    toggle: bool,

    pub is_flushed: bool,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Task pools (the primary pool and the one-way control-message pool)
    /// are owned one level up, by [`crate::engine::channel::Channel`]:
    /// the scheduler here only moves [`Message`]s between queues and never
    /// itself needs to borrow a task, so keeping the pools out of this
    /// struct avoids them being locked for the duration of every `xmit`
    /// call (`xio_connection_send` acquires/releases tasks around the
    /// scheduler, not inside it).
    pub fn new() -> Self {
        Self {
            state: State::Init,
            in_close: false,
            close_reason: None,
            kref: 1,
            reqs_msgq: VecDeque::new(),
            rsps_msgq: VecDeque::new(),
            reqs_inflight: VecDeque::new(),
            rsps_inflight: VecDeque::new(),
            budgets: Budgets::default(),
            budgets_max: Budgets::default(),
            toggle: false,
            is_flushed: false,
        }
    }

    fn is_open_for_enqueue(&self) -> bool {
        matches!(self.state, State::Init | State::Established | State::Online) && !self.in_close
    }

    /// Enqueue contract, steps 1-6. `no_queueing_mode` models the
    /// session layer's policy (step 3); `notify` is called with
    /// `MsgError::Flushed` if the connection already refuses new sends.
    fn enqueue(
        &mut self,
        mut msg: Message,
        sn: u32,
        timestamp: u64,
        no_queueing_mode: bool,
        notify: &mut impl FnMut(u32, MsgError),
    ) -> Result<(), TryError> {
        if !self.is_open_for_enqueue() {
            notify(sn, MsgError::Flushed);
            return Err(TryError::WouldBlock);
        }
        if no_queueing_mode && self.state != State::Online {
            return Err(TryError::WouldBlock);
        }
        msg.sn = sn;
        msg.timestamp = timestamp;
        if msg.kind.is_request() {
            self.reqs_msgq.push_back(msg);
        } else {
            self.rsps_msgq.push_back(msg);
        }
        Ok(())
    }

    /// `send_request`: enqueue a chain of requests. A chain is
    /// enqueued atomically or fails after partial enqueue with an error
    /// notification per already-enqueued message being rolled back is not
    /// attempted — the reference semantics are "enqueue all or fail after
    /// partial enqueue with error notification per message", so on the
    /// first failure we stop and report `Partial` for the remainder via
    /// `notify`, leaving already-queued messages queued.
    pub fn send_request(
        &mut self,
        chain: Vec<Message>,
        mut next_sn: impl FnMut() -> u32,
        timestamp: u64,
        no_queueing_mode: bool,
        mut notify: impl FnMut(u32, MsgError),
    ) -> Result<(), TryError> {
        for (i, msg) in chain.into_iter().enumerate() {
            let sn = next_sn();
            if let Err(e) = self.enqueue(msg, sn, timestamp, no_queueing_mode, &mut notify) {
                if i > 0 {
                    notify(sn, MsgError::Partial);
                }
                return Err(e);
            }
        }
        if self.state == State::Online {
            return Ok(());
        }
        Ok(())
    }

    /// `send_response`: each response must carry `request_sn` set.
    pub fn send_response(
        &mut self,
        chain: Vec<Message>,
        timestamp: u64,
        mut notify: impl FnMut(u32, MsgError),
    ) -> Result<(), TryError> {
        for msg in chain {
            if msg.request_sn.is_none() {
                notify(msg.sn, MsgError::MsgInvalid);
                return Err(TryError::WouldBlock);
            }
            let sn = msg.sn;
            self.enqueue(msg, sn, timestamp, false, &mut notify)?;
        }
        Ok(())
    }

    pub fn send_one_way(
        &mut self,
        chain: Vec<Message>,
        mut next_sn: impl FnMut() -> u32,
        timestamp: u64,
        mut notify: impl FnMut(u32, MsgError),
    ) -> Result<(), TryError> {
        for msg in chain {
            let sn = next_sn();
            self.enqueue(msg, sn, timestamp, false, &mut notify)?;
        }
        Ok(())
    }

    /// The round-robin pump. Alternates between the request
    /// and response ready queues via `toggle`; a queue that returns
    /// `WouldBlock` twice in a row (both queues stalled) ends the pump.
    pub fn xmit(&mut self, transport: &mut impl Transport) -> Result<(), ConnError> {
        let mut retries = 0u32;
        loop {
            let queue_is_reqs = !self.toggle;
            self.toggle = !self.toggle;

            let queue = if queue_is_reqs { &mut self.reqs_msgq } else { &mut self.rsps_msgq };
            let Some(msg) = queue.front().cloned() else {
                // This side is empty; only the other side might still have
                // work, so don't count this as a stall by itself.
                if (queue_is_reqs && self.rsps_msgq.is_empty())
                    || (!queue_is_reqs && self.reqs_msgq.is_empty())
                {
                    return Ok(());
                }
                continue;
            };

            // Per-message admission: a budget
            // miss behaves exactly like the transport reporting `WouldBlock`
            // — the message stays queued for the next tick — without ever
            // reaching the transport.
            if self.admit(msg.kind).is_err() {
                retries += 1;
                if retries >= 2 {
                    return Ok(());
                }
                continue;
            }

            match transport.transmit(&msg) {
                SendOutcome::WouldBlock => {
                    self.release_budget(msg.kind);
                    retries += 1;
                    if retries >= 2 {
                        return Ok(());
                    }
                }
                SendOutcome::Rejected => {
                    self.release_budget(msg.kind);
                    retries = 0;
                    self.pop_ready(queue_is_reqs);
                }
                SendOutcome::Fatal(e) => {
                    self.release_budget(msg.kind);
                    self.pop_ready(queue_is_reqs);
                    return Err(e);
                }
                SendOutcome::Sent => {
                    retries = 0;
                    let msg = self.pop_ready(queue_is_reqs).expect("just peeked");
                    if queue_is_reqs {
                        self.reqs_inflight.push_back(msg);
                    } else {
                        self.rsps_inflight.push_back(msg);
                    }
                }
            }
        }
    }

    fn pop_ready(&mut self, reqs: bool) -> Option<Message> {
        if reqs {
            self.reqs_msgq.pop_front()
        } else {
            self.rsps_msgq.pop_front()
        }
    }

    /// Per-message admission check against the relevant in-flight budget
    ///. Returns `WouldBlock` when the budget
    /// for `kind` is exhausted; the caller must leave the message queued.
    pub fn admit(&mut self, kind: MessageKind) -> Result<(), TryError> {
        let budget = match kind {
            MessageKind::Request => &mut self.budgets.reqs,
            MessageKind::OneWayReq | MessageKind::OneWayRsp => &mut self.budgets.one_way_sends,
            _ => &mut self.budgets.app_io,
        };
        if *budget <= 0 {
            return Err(TryError::WouldBlock);
        }
        *budget -= 1;
        Ok(())
    }

    /// Return a budget unit (a message left in-flight completed or was
    /// flushed back to ready).
    pub fn release_budget(&mut self, kind: MessageKind) {
        let (budget, max) = match kind {
            MessageKind::Request => (&mut self.budgets.reqs, self.budgets_max.reqs),
            MessageKind::OneWayReq | MessageKind::OneWayRsp => {
                (&mut self.budgets.one_way_sends, self.budgets_max.one_way_sends)
            }
            _ => (&mut self.budgets.app_io, self.budgets_max.app_io),
        };
        *budget = (*budget + 1).min(max);
    }

    /// `flush_msgs`: re-prepend every in-flight message to the head
    /// of its ready queue, in reverse completion order so enqueue order is
    /// preserved, and restore the budget each one had consumed.
    pub fn flush_msgs(&mut self) {
        while let Some(msg) = self.reqs_inflight.pop_back() {
            self.release_budget(msg.kind);
            self.reqs_msgq.push_front(msg);
        }
        while let Some(msg) = self.rsps_inflight.pop_back() {
            self.release_budget(msg.kind);
            self.rsps_msgq.push_front(msg);
        }
    }

    /// `notify_msgs_flush`: drain both ready queues, delivering
    /// `MSG_FLUSHED` to each application message. Idempotent via
    /// `is_flushed`, to prevent double-flush.
    pub fn notify_msgs_flush(&mut self, mut notify: impl FnMut(u32, MsgError)) {
        if self.is_flushed {
            return;
        }
        self.is_flushed = true;
        while let Some(msg) = self.reqs_msgq.pop_front() {
            notify(msg.sn, MsgError::Flushed);
        }
        while let Some(msg) = self.rsps_msgq.pop_front() {
            notify(msg.sn, MsgError::Flushed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysSend;
    impl Transport for AlwaysSend {
        fn transmit(&mut self, _msg: &Message) -> SendOutcome {
            SendOutcome::Sent
        }
    }

    struct AlwaysBlock;
    impl Transport for AlwaysBlock {
        fn transmit(&mut self, _msg: &Message) -> SendOutcome {
            SendOutcome::WouldBlock
        }
    }

    fn req(sn: u32) -> Message {
        let mut m = Message::new(MessageKind::Request);
        m.sn = sn;
        m
    }

    #[test]
    fn enqueue_rejected_when_not_admitting_state() {
        let mut conn = Connection::new();
        conn.state = State::Closed;
        let mut notified = Vec::new();
        let res = conn.send_request(
            vec![req(0)],
            || 0,
            0,
            false,
            |sn, e| notified.push((sn, e)),
        );
        assert!(res.is_err());
        assert_eq!(notified, vec![(0, MsgError::Flushed)]);
    }

    #[test]
    fn round_robin_pump_drains_both_queues_in_order() {
        let mut conn = Connection::new();
        conn.state = State::Online;
        conn.reqs_msgq.push_back(req(1));
        conn.reqs_msgq.push_back(req(3));
        conn.rsps_msgq.push_back(req(2));
        let mut t = AlwaysSend;
        conn.xmit(&mut t).unwrap();
        assert!(conn.reqs_msgq.is_empty());
        assert!(conn.rsps_msgq.is_empty());
        assert_eq!(conn.reqs_inflight.len(), 2);
        assert_eq!(conn.rsps_inflight.len(), 1);
    }

    #[test]
    fn pump_stops_after_both_queues_stall_twice() {
        let mut conn = Connection::new();
        conn.state = State::Online;
        conn.reqs_msgq.push_back(req(1));
        conn.rsps_msgq.push_back(req(2));
        let mut t = AlwaysBlock;
        conn.xmit(&mut t).unwrap();
        assert_eq!(conn.reqs_msgq.len(), 1, "message stays queued for the next tick");
        assert_eq!(conn.rsps_msgq.len(), 1);
    }

    #[test]
    fn budget_saturation_then_recovery() {
        let mut conn = Connection::new();
        for _ in 0..INFLIGHT_BUDGET {
            conn.admit(MessageKind::Request).unwrap();
        }
        assert_eq!(conn.admit(MessageKind::Request), Err(TryError::WouldBlock));
        conn.release_budget(MessageKind::Request);
        assert!(conn.admit(MessageKind::Request).is_ok());
    }

    #[test]
    fn flush_restores_budgets_and_reorders_to_ready_head() {
        let mut conn = Connection::new();
        conn.state = State::Online;
        conn.admit(MessageKind::Request).unwrap();
        conn.admit(MessageKind::Request).unwrap();
        conn.reqs_inflight.push_back(req(10));
        conn.reqs_inflight.push_back(req(11));
        conn.reqs_msgq.push_back(req(12));

        conn.flush_msgs();
        assert_eq!(conn.budgets.reqs, INFLIGHT_BUDGET as i64);
        let order: Vec<u32> = conn.reqs_msgq.iter().map(|m| m.sn).collect();
        assert_eq!(order, vec![10, 11, 12]);

        let mut flushed = Vec::new();
        conn.notify_msgs_flush(|sn, e| flushed.push((sn, e)));
        assert_eq!(flushed.len(), 3);
        assert!(conn.reqs_msgq.is_empty());

        // Double-flush is a no-op.
        let mut flushed_again = Vec::new();
        conn.notify_msgs_flush(|sn, e| flushed_again.push((sn, e)));
        assert!(flushed_again.is_empty());
    }
}
