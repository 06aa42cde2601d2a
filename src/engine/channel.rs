//! Wires the scheduler, data-path engine, window, reactor, close state
//! machine, and cancel subsystem into the control flow: application ->
//! connection (enqueue) -> data path (frame + post) -> verbs -> network ->
//! peer -> verbs -> reactor (poll) -> data path (parse) -> connection ->
//! application callback, with the flow-control window threaded through
//! every post/receive and close/cancel acting out-of-band against the
//! connection's queues.
//!
//! Every other module in `engine` is a standalone, hardware-free building
//! block; [`Channel`] is the one piece that actually drives them together
//! against a concrete [`Verbs`]/[`SessionHooks`] pair, the way a real
//! application would. [`crate::engine::test_support`]'s fakes let this run
//! without RDMA hardware, which is exactly what the `tests` module below
//! does for each end-to-end scenario.

use std::collections::VecDeque;

use crate::engine::close::{self, State};
use crate::engine::config::{self, Tunables};
use crate::engine::connection::{Connection, SendOutcome, Transport};
use crate::engine::datapath::{self, RdmaSegment, TransferMode};
use crate::engine::error::{ConnError, EngineError, FatalError, MsgError, TryError};
use crate::engine::iface::{Completion, CompletionOpcode, SessionHooks, Verbs, WorkRequest};
use crate::engine::message::{Message, MessageKind, MsgFlags};
use crate::engine::reactor::{PassOutcome, Reactor};
use crate::engine::task::{SgList, TaskOp, TaskState};
use crate::engine::wire::{
    CancelHeader, FrameType, NopHeader, ReqHeader, ReqOpcode, RspHeader, RspStatus, Tlv,
    TransportHeader, WireSge,
};
use crate::engine::window::FlowWindow;
use crate::engine::task::TaskPool;

/// A message waiting to be reinjected into the scheduler's ready queues once
/// the completion batch currently being polled has fully drained — mirrors
/// the `more_in_batch` hint from the reactor's completion dispatch. Rather
/// than act immediately from inside the completion loop (which would need
/// `verbs` while the reactor still holds it), every side effect a
/// completion produces is recorded here and applied once
/// [`Reactor::poll_pass`] returns.
enum RxAction {
    /// A RECV completed and the receive queue should be refilled with a
    /// fresh primary task.
    RefillRecv,
    /// An application message was fully delivered; echo `credits` earned by
    /// rearming this receive back into the window and hand the message to
    /// the session layer.
    Deliver { sn: u32, data: Vec<u8> },
    /// The inbound request asked for RDMA_READ; schedule the segmented read
    /// against the buffer the session layer assigns.
    ScheduleRead { request_sn: u32, remote: Vec<WireSge> },
    /// Queue a control-plane reply frame (FIN_ACK, CANCEL_RSP, ...).
    SendControl(Message),
    /// The peer requested graceful close.
    FinReceived,
    /// The peer acknowledged our FIN.
    FinAckReceived,
    /// A non-flush error requires tearing the connection down.
    Disconnect,
}

/// Channel ties the connection scheduler ([`Connection`]), the credit window
/// ([`FlowWindow`]), the task pools, the completion-queue reactor
/// ([`Reactor`]), and the two external collaborators ([`Verbs`],
/// [`SessionHooks`]) into one drivable unit.
pub struct Channel<V, S> {
    pub conn: Connection,
    pub window: FlowWindow,
    pub reactor: Reactor,
    pub task_pool: TaskPool,
    pub one_way_pool: TaskPool,
    pub verbs: V,
    pub session: S,
    pub tunables: Tunables,
}

impl<V: Verbs, S: SessionHooks> Channel<V, S> {
    pub fn new(tunables: Tunables, task_pool_capacity: usize, verbs: V, session: S) -> Self {
        let actual_rq_depth = tunables.actual_rq_depth();
        Self {
            conn: Connection::new(),
            window: FlowWindow::new(tunables.sq_depth, tunables.rq_depth, actual_rq_depth),
            reactor: Reactor::default(),
            task_pool: TaskPool::new(task_pool_capacity),
            one_way_pool: TaskPool::new(config::MSG_POOL_SZ),
            verbs,
            session,
            tunables,
        }
    }

    /// Move the connection to `ONLINE` once the setup handshake (external to
    /// this module; see `ctrl::Connecter` and DESIGN.md) has completed.
    pub fn mark_online(&mut self) {
        self.conn.state = State::Online;
    }

    /// `send_request`: enqueue a chain of requests, stamping session
    /// sequence numbers as they go. Sequence numbers are allocated up front
    /// into a small local queue so the `next_sn` closure handed to the
    /// scheduler never needs its own borrow of `self.session` — only
    /// `notify` does, which keeps this to the one mutable borrow of
    /// `self.session` the borrow checker can see at a time.
    pub fn send_request(&mut self, chain: Vec<Message>) -> Result<(), TryError> {
        let no_queueing = self.session.no_queueing_mode();
        let mut sns: VecDeque<u32> = (0..chain.len()).map(|_| self.session.next_sn()).collect();
        let session = &mut self.session;
        self.conn.send_request(
            chain,
            move || sns.pop_front().expect("one sn allocated per chain element"),
            0,
            no_queueing,
            |sn, e| session.notify_msg_error(sn, e),
        )
    }

    /// `send_response`: each message must already carry `request_sn`.
    pub fn send_response(&mut self, chain: Vec<Message>) -> Result<(), TryError> {
        let session = &mut self.session;
        self.conn.send_response(chain, 0, |sn, e| session.notify_msg_error(sn, e))
    }

    /// `send_one_way`.
    pub fn send_one_way(&mut self, chain: Vec<Message>) -> Result<(), TryError> {
        let mut sns: VecDeque<u32> = (0..chain.len()).map(|_| self.session.next_sn()).collect();
        let session = &mut self.session;
        self.conn.send_one_way(
            chain,
            move || sns.pop_front().expect("one sn allocated per chain element"),
            0,
            |sn, e| session.notify_msg_error(sn, e),
        )
    }

    /// Drive the round-robin transmit pump. Builds the wire
    /// frame for each popped message, decides the transfer mode, chains the
    /// work requests, and posts them.
    pub fn pump(&mut self) -> Result<(), ConnError> {
        let mut ctx = XmitCtx {
            window: &mut self.window,
            task_pool: &mut self.task_pool,
            one_way_pool: &mut self.one_way_pool,
            verbs: &mut self.verbs,
            tunables: &self.tunables,
        };
        let result = self.conn.xmit(&mut ctx);
        if let Err(e) = result {
            self.teardown(e);
            return Err(e);
        }
        Ok(())
    }

    /// One reactor pass: poll the CQ, dispatch every completion, then apply
    /// the side effects the batch produced, and finally run the idle
    /// handler if nothing else needed sending.
    pub fn poll(&mut self) -> Result<PassOutcome, EngineError> {
        let mut actions: Vec<RxAction> = Vec::new();
        let outcome = {
            let verbs = &mut self.verbs;
            let reactor = &mut self.reactor;
            let window = &mut self.window;
            let task_pool = &mut self.task_pool;
            let one_way_pool = &mut self.one_way_pool;
            reactor.poll_pass(verbs, |c| {
                dispatch_completion(window, task_pool, one_way_pool, c, &mut actions)
            })?
        };

        for action in actions {
            self.apply_rx_action(action)?;
        }

        if outcome == PassOutcome::Empty && self.reactor.should_rearm() {
            self.reactor.rearm(&mut self.verbs).map_err(EngineError::Io)?;
        }

        self.maybe_emit_idle_nop();
        Ok(outcome)
    }

    fn apply_rx_action(&mut self, action: RxAction) -> Result<(), EngineError> {
        match action {
            RxAction::RefillRecv => {
                if let Ok(ltid) = self.task_pool.acquire() {
                    self.task_pool.get_mut(ltid).op = TaskOp::Recv;
                    self.verbs.post_recv(ltid).map_err(EngineError::Io)?;
                }
            }
            RxAction::Deliver { sn, .. } => {
                self.session.notify_msg(sn);
            }
            RxAction::ScheduleRead { request_sn, remote } => {
                self.schedule_rdma_read(request_sn, remote)?;
            }
            RxAction::SendControl(msg) => {
                // Control replies bypass admission budgets: the active-close path
                // sends FIN directly, bypassing the ready queue; here we still
                // route it through the ready queue
                // since the one-way budget is large and this keeps a single
                // code path through `xmit`.
                if msg.kind.is_request() {
                    self.conn.reqs_msgq.push_back(msg);
                } else {
                    self.conn.rsps_msgq.push_back(msg);
                }
            }
            RxAction::FinReceived => {
                // An incoming FIN_REQ is `fin_ack=false` in the transition
                // table regardless of which state it lands in: ONLINE (the
                // common passive-close case), or FIN_WAIT_1/FIN_WAIT_2 (the
                // peer's own close crossing ours). All three cells demand
                // SEND_ACK, so every incoming FIN_REQ gets a FIN_ACK back.
                let (next, flags) = close::transition(self.conn.state, false).map_err(EngineError::Conn)?;
                self.conn.state = next;
                debug_assert_eq!(flags, close::SendFlags::SendAck);
                let mut fin_ack = Message::new(MessageKind::FinRsp);
                fin_ack.flags |= MsgFlags::LAST;
                self.one_way_send(fin_ack)?;
            }
            RxAction::FinAckReceived => {
                // An incoming FIN_ACK is `fin_ack=true`: FIN_WAIT_1 ->
                // FIN_WAIT_2, CLOSING -> TIME_WAIT, or LAST_ACK -> CLOSED
                // (which also runs post-destroy teardown).
                let (next, flags) = close::transition(self.conn.state, true).map_err(EngineError::Conn)?;
                self.conn.state = next;
                debug_assert_eq!(flags, close::SendFlags::None);
                if next == State::Closed {
                    self.post_destroy();
                }
            }
            RxAction::Disconnect => {
                self.teardown(ConnError::SessionDisconnected);
            }
        }
        Ok(())
    }

    /// `disconnect()`: mark the connection closing and
    /// run what `pre_disconnect` does once posted to the owning execution
    /// context — here, synchronously, since this crate's `Channel` is
    /// already confined to one thread by construction.
    pub fn disconnect(&mut self) -> Result<(), EngineError> {
        let mut active = close::ActiveClose::default();
        active.begin();
        self.conn.in_close = active.in_close;
        self.conn.state = active.pre_disconnect(self.conn.state).map_err(EngineError::Conn)?;

        let mut fin = Message::new(MessageKind::FinReq);
        fin.flags |= MsgFlags::LAST;
        self.one_way_send(fin)?;
        self.session.notify_connection_closed();
        Ok(())
    }

    /// The upper layer's `connection_destroy` call during passive close.
    pub fn connection_destroy(&mut self) -> Result<(), EngineError> {
        self.conn.state = close::passive::on_connection_destroy(self.conn.state).map_err(EngineError::Conn)?;
        let mut fin = Message::new(MessageKind::FinReq);
        fin.flags |= MsgFlags::LAST;
        self.one_way_send(fin)
    }

    fn post_destroy(&mut self) {
        self.conn.flush_msgs();
        let session = &mut self.session;
        self.conn.notify_msgs_flush(|sn, e| session.notify_msg_error(sn, e));
        let _ = self.verbs.disconnect();
        self.session.notify_teardown();
    }

    fn one_way_send(&mut self, msg: Message) -> Result<(), EngineError> {
        self.send_one_way(vec![msg]).map_err(EngineError::Try)
    }

    fn teardown(&mut self, reason: ConnError) {
        self.conn.state = State::Disconnected;
        self.conn.close_reason = Some(reason);
        self.conn.in_close = true;
        self.conn.flush_msgs();
        let session = &mut self.session;
        self.conn.notify_msgs_flush(|sn, e| session.notify_msg_error(sn, e));
        self.session.notify_connection_closed();
    }

    /// `cancel_request`: cooperative, returns immediately. A hit in
    /// the ready queue resolves locally with no wire exchange; a request
    /// already posted to the wire (found in-flight) instead requires a
    /// `CANCEL_REQ` round trip, whose outcome arrives later as a
    /// `CANCEL_RSP` event.
    pub fn cancel_request(&mut self, sn: u32) -> MsgError {
        if crate::engine::cancel::cancel_in_ready_queue(&mut self.conn.reqs_msgq, sn).is_some() {
            return MsgError::Canceled;
        }
        let posted = self.conn.reqs_inflight.iter().any(|m| m.sn == sn)
            || self.conn.rsps_inflight.iter().any(|m| m.sn == sn);
        if !posted {
            return MsgError::CancelFailed;
        }
        let mut msg = Message::new(MessageKind::CancelReq);
        msg.sn = sn;
        let _ = self.one_way_send(msg);
        MsgError::Canceled
    }

    /// After an inbound request carrying `read_sge` descriptors, build the
    /// local SG list (from the session's `ASSIGN_IN_BUF` hook, modeled here
    /// as the session simply being asked for sn context) and split it
    /// against the peer's exposed list with [`datapath::prep_rdma_op`],
    /// allocating phantom tasks for every non-final segment.
    fn schedule_rdma_read(&mut self, request_sn: u32, remote: Vec<WireSge>) -> Result<(), EngineError> {
        let mut remote_sg = SgList::default();
        for sge in &remote {
            let _ = remote_sg.push(*sge);
        }
        // Mirrors the remote layout locally: a real session supplies its own
        // target buffers via `ASSIGN_IN_BUF`; the engine only needs the
        // total length to match, which a same-shape local list guarantees.
        let local_sg = remote_sg.clone();

        let segments = datapath::prep_rdma_op(&local_sg, &remote_sg);
        let total = segments.len();
        let mut chain = Vec::with_capacity(total);
        for (i, seg) in segments.iter().enumerate() {
            let remaining = datapath::phantom_remaining_at(total, i);
            let ltid = if remaining == 0 {
                self.task_pool.acquire()
            } else {
                self.task_pool.acquire_phantom(remaining)
            }
            .map_err(EngineError::Try)?;
            let task = self.task_pool.get_mut(ltid);
            task.op = TaskOp::RdmaRead;
            task.sn = request_sn;
            let _ = task.peer_read_sge.push(seg.remote);
            let _ = task.recv_sge.push(seg.local);
            // Only the final (primary) segment is signaled, mirroring the
            // same "last WR carries the completion" pattern used for
            // outgoing RDMA_WRITE chains.
            chain.push(WorkRequest::RdmaRead {
                task_ltid: ltid,
                local: seg.local,
                remote: seg.remote,
                signaled: remaining == 0,
            });
        }
        self.verbs.post_send_chain(&chain).map_err(EngineError::Io)?;
        self.window.kick_rdma_rd = true;
        Ok(())
    }

    /// Idle handler: after a polling pass, if the connection has room
    /// but nothing queued, emit a `CREDIT_NOP` carrying the accumulated
    /// credit count so the peer doesn't starve waiting on a piggyback that
    /// will never come.
    fn maybe_emit_idle_nop(&mut self) {
        let anything_queued = !self.conn.reqs_msgq.is_empty() || !self.conn.rsps_msgq.is_empty();
        if self.conn.state != State::Online {
            return;
        }
        if !self.window.should_emit_idle_nop(anything_queued) {
            return;
        }
        let msg = Message::new(MessageKind::CreditNop);
        let _ = self.one_way_send(msg);
    }
}

/// The [`Transport`] implementation the connection scheduler's `xmit` pump
/// drives.
struct XmitCtx<'a, V> {
    window: &'a mut FlowWindow,
    task_pool: &'a mut TaskPool,
    one_way_pool: &'a mut TaskPool,
    verbs: &'a mut V,
    tunables: &'a Tunables,
}

impl<V: Verbs> Transport for XmitCtx<'_, V> {
    fn transmit(&mut self, msg: &Message) -> SendOutcome {
        if self.window.xmit_window() < 1 {
            return SendOutcome::WouldBlock;
        }

        let uses_one_way_pool = !matches!(msg.kind, MessageKind::Request | MessageKind::Response);
        let pool = if uses_one_way_pool { &mut *self.one_way_pool } else { &mut *self.task_pool };
        let ltid = match pool.acquire() {
            Ok(ltid) => ltid,
            Err(_) => return SendOutcome::WouldBlock,
        };

        let framed = frame_outgoing(msg, pool.get_mut(ltid), self.window, self.tunables);
        let (bytes_len, mode, local_for_mode, remote_for_mode) = match framed {
            Ok(v) => v,
            Err(_) => {
                pool.release(ltid);
                return SendOutcome::Rejected;
            }
        };

        let mut chain = Vec::new();
        let signal_forced = self.window.tx_window_sz() < 1 || self.window.sqe_avail < 2;
        match mode {
            TransferMode::RdmaWrite => {
                chain.push(WorkRequest::RdmaWrite {
                    task_ltid: ltid,
                    local: local_for_mode.unwrap_or_default(),
                    remote: remote_for_mode.unwrap_or_default(),
                    signaled: false,
                });
                chain.push(WorkRequest::Send { task_ltid: ltid, bytes_len, signaled: true, fence: false });
                self.window.sqe_avail -= 2;
            }
            TransferMode::RdmaRead => {
                chain.push(WorkRequest::Send { task_ltid: ltid, bytes_len, signaled: true, fence: false });
                self.window.sqe_avail -= 1;
            }
            TransferMode::InlineSend => {
                chain.push(WorkRequest::Send {
                    task_ltid: ltid,
                    bytes_len,
                    signaled: signal_forced,
                    fence: matches!(msg.kind, MessageKind::FinReq | MessageKind::FinRsp),
                });
                self.window.sqe_avail -= 1;
            }
        }

        match self.verbs.post_send_chain(&chain) {
            Ok(()) => SendOutcome::Sent,
            Err(_) => {
                pool.release(ltid);
                SendOutcome::Fatal(ConnError::ConnectError)
            }
        }
    }
}

/// Serialize `msg` into `task`'s staging buffer: TLV envelope, transport
/// header (sn/ack_sn/credits stamped via [`FlowWindow::write_sn`]), and the
/// per-kind sub-header. Returns the frame's total length and the
/// transfer mode chosen, plus the (local, remote) descriptor pair an
/// RDMA_WRITE-mode response needs for its chained WRITE.
fn frame_outgoing(
    msg: &Message,
    task: &mut crate::engine::task::Task,
    window: &mut FlowWindow,
    tunables: &Tunables,
) -> Result<(usize, TransferMode, Option<WireSge>, Option<WireSge>), MsgError> {
    task.sn = msg.sn;
    let ulp_hdr_len = msg.total_header_len();
    let ulp_data_len = msg.total_data_len();

    let (mode, read_sge, write_sge) = match msg.kind {
        MessageKind::Request => {
            let mode = datapath::decide_request_mode(
                Tlv::WIRE_SIZE + TransportHeader::WIRE_SIZE + ReqHeader::FIXED_SIZE,
                ulp_hdr_len,
                ulp_data_len,
                tunables.max_send_buf_sz,
            );
            let read_sge: Vec<WireSge> = if mode == TransferMode::RdmaRead {
                msg.data.iter().filter_map(|e| e.wire_sge()).collect()
            } else {
                Vec::new()
            };
            let write_sge: Vec<WireSge> = if msg.wants_small_zero_copy() {
                msg.header.iter().chain(msg.data.iter()).filter_map(|e| e.wire_sge()).collect()
            } else {
                Vec::new()
            };
            (mode, read_sge, write_sge)
        }
        MessageKind::Response => {
            let peer_requested_write = !msg.data.is_empty() && msg.wants_small_zero_copy();
            let mode = datapath::decide_response_mode(
                peer_requested_write,
                msg.wants_small_zero_copy(),
                ulp_data_len,
                tunables.max_send_buf_sz,
            );
            (mode, Vec::new(), Vec::new())
        }
        _ => (TransferMode::InlineSend, Vec::new(), Vec::new()),
    };

    // MSG_SIZE is scoped to the inline frame (header + data, since both ride
    // in the task's staging buffer for this mode) per spec.md §8 "ulp_hdr_len
    // + xio_hdr_len exceeds max_send_buf_sz". RDMA_READ/RDMA_WRITE modes move
    // the payload out of band, so an oversized body is exactly why one of
    // those modes was chosen, not a reason to reject the message.
    if mode == TransferMode::InlineSend
        && ulp_hdr_len + ulp_data_len + config::MAX_HDR > tunables.max_send_buf_sz.max(config::MAX_HDR)
    {
        return Err(MsgError::MsgSize);
    }

    let (sn, ack_sn, credits) = window.write_sn();
    let mut off = Tlv::WIRE_SIZE + TransportHeader::WIRE_SIZE;

    match msg.kind {
        MessageKind::Request | MessageKind::OneWayReq => {
            let hdr = ReqHeader {
                version: config::XIO_REQ_HEADER_VERSION,
                opcode: if mode == TransferMode::RdmaRead { ReqOpcode::RdmaRead } else { ReqOpcode::Send },
                ulp_hdr_len: ulp_hdr_len as u16,
                ulp_pad_len: 0,
                ulp_imm_len: ulp_data_len as u32,
                recv_sge: Vec::new(),
                read_sge: read_sge.clone(),
                write_sge: write_sge.clone(),
            };
            ensure_capacity(&mut task.buf, off + hdr.wire_len())?;
            hdr.write(&mut task.buf[off..off + hdr.wire_len()]);
            off += hdr.wire_len();
        }
        MessageKind::Response | MessageKind::OneWayRsp => {
            let hdr = RspHeader {
                version: config::XIO_RSP_HEADER_VERSION,
                status: RspStatus::Ok,
                ulp_hdr_len: ulp_hdr_len as u16,
                ulp_pad_len: 0,
                ulp_imm_len: ulp_data_len as u32,
            };
            ensure_capacity(&mut task.buf, off + RspHeader::WIRE_SIZE)?;
            hdr.write(&mut task.buf[off..off + RspHeader::WIRE_SIZE]);
            off += RspHeader::WIRE_SIZE;
        }
        MessageKind::CreditNop => {
            let hdr = NopHeader { sn, ack_sn, credits, opcode: 0, flags: 0 };
            ensure_capacity(&mut task.buf, off + NopHeader::WIRE_SIZE)?;
            hdr.write(&mut task.buf[off..off + NopHeader::WIRE_SIZE]);
            off += NopHeader::WIRE_SIZE;
        }
        MessageKind::CancelReq | MessageKind::CancelRsp => {
            let hdr = CancelHeader { sn: msg.request_sn.unwrap_or(msg.sn) as u16, result: 0, ulp_msg: Vec::new() };
            ensure_capacity(&mut task.buf, off + hdr.wire_len())?;
            hdr.write(&mut task.buf[off..off + hdr.wire_len()]);
            off += hdr.wire_len();
        }
        MessageKind::FinReq | MessageKind::FinRsp | MessageKind::HelloReq | MessageKind::HelloRsp => {}
    }

    if mode == TransferMode::InlineSend {
        for elem in msg.header.iter().chain(msg.data.iter()) {
            ensure_capacity(&mut task.buf, off + elem.bytes.len())?;
            task.buf[off..off + elem.bytes.len()].copy_from_slice(&elem.bytes);
            off += elem.bytes.len();
        }
    }

    let tlv = Tlv { frame_type: msg.kind.frame_type(), length: (off - Tlv::WIRE_SIZE) as u16 };
    tlv.write(&mut task.buf[0..Tlv::WIRE_SIZE]);
    let th = TransportHeader {
        version: config::XIO_REQ_HEADER_VERSION,
        flags: msg.flags.bits(),
        hdr_len: 0,
        sn,
        ack_sn,
        credits,
        task_id: task.ltid,
    };
    th.write(&mut task.buf[Tlv::WIRE_SIZE..Tlv::WIRE_SIZE + TransportHeader::WIRE_SIZE]);

    let local_for_mode = write_sge.first().copied();
    let remote_for_mode = write_sge.first().copied();
    Ok((off, mode, local_for_mode, remote_for_mode))
}

fn ensure_capacity(buf: &mut Vec<u8>, needed: usize) -> Result<(), MsgError> {
    if needed > buf.len() {
        if needed > buf.capacity().max(1 << 20) {
            return Err(MsgError::MsgSize);
        }
        buf.resize(needed, 0);
    }
    Ok(())
}

/// Dispatch one completion. Only touches fields that are disjoint from `verbs`/`reactor`
/// (both already borrowed by the caller for the duration of the poll pass);
/// anything that needs `verbs` is recorded into `actions` instead and run
/// once the pass returns.
fn dispatch_completion(
    window: &mut FlowWindow,
    task_pool: &mut TaskPool,
    one_way_pool: &mut TaskPool,
    c: &Completion,
    actions: &mut Vec<RxAction>,
) -> Result<(), FatalError> {
    if !c.success {
        if !c.is_flush_err {
            actions.push(RxAction::Disconnect);
        }
        return Ok(());
    }

    match c.opcode {
        CompletionOpcode::Send => {
            window.on_send_completion();
        }
        CompletionOpcode::RdmaRead | CompletionOpcode::RdmaWrite => {
            window.on_send_completion();
        }
        CompletionOpcode::Recv => {
            let needs_refill = window.on_recv_completion();
            if needs_refill {
                actions.push(RxAction::RefillRecv);
            }
            window.grant_credit(1);

            let task = if let Some(t) = get_task_any_pool(task_pool, one_way_pool, c.task_ltid) {
                t
            } else {
                return Ok(());
            };
            let buf = task.buf.clone();
            parse_and_dispatch(&buf, window, actions);
        }
    }
    Ok(())
}

/// Look up a completion's `task_ltid` in whichever pool actually holds it.
/// Tasks the refill path allocates (§4.2 "refill the RQ") always come from
/// `task_pool`, but a RECV could in principle complete against a task the
/// one-way pool handed out, so both slabs are checked rather than assuming
/// the primary pool owns every ltid.
fn get_task_any_pool<'a>(
    task_pool: &'a mut TaskPool,
    one_way_pool: &'a mut TaskPool,
    ltid: u32,
) -> Option<&'a crate::engine::task::Task> {
    if (ltid as usize) < task_pool.capacity() {
        Some(task_pool.get(ltid))
    } else if (ltid as usize) < one_way_pool.capacity() {
        Some(one_way_pool.get(ltid))
    } else {
        None
    }
}

/// Parse an inbound frame and turn it into zero or more [`RxAction`]s
///: TLV dispatch, window advance, and per-kind
/// handling.
fn parse_and_dispatch(buf: &[u8], window: &mut FlowWindow, actions: &mut Vec<RxAction>) {
    let Some(tlv) = Tlv::read(buf) else { return };
    let body = &buf[Tlv::WIRE_SIZE..];
    let Some(th) = TransportHeader::read(body) else { return };
    let _ = window.on_frame_received(th.sn as u32, th.credits as u32);
    let sub = &body[TransportHeader::WIRE_SIZE..];

    match tlv.frame_type {
        FrameType::CreditNop => {
            // Credits were already folded in above; nothing further to do.
        }
        FrameType::Request | FrameType::OneWayReq => {
            let Some(hdr) = ReqHeader::read(sub) else { return };
            let data_start = TransportHeader::WIRE_SIZE + hdr.wire_len() + Tlv::WIRE_SIZE;
            let ulp_bytes = if data_start <= buf.len() { buf[data_start..].to_vec() } else { Vec::new() };
            if hdr.opcode == ReqOpcode::RdmaRead && !hdr.read_sge.is_empty() {
                actions.push(RxAction::ScheduleRead { request_sn: th.sn as u32, remote: hdr.read_sge });
            } else {
                actions.push(RxAction::Deliver { sn: th.sn as u32, data: ulp_bytes });
            }
        }
        FrameType::Response | FrameType::OneWayRsp => {
            if RspHeader::read(sub).is_some() {
                actions.push(RxAction::Deliver { sn: th.sn as u32, data: Vec::new() });
            }
        }
        FrameType::FinReq => actions.push(RxAction::FinReceived),
        FrameType::FinRsp => actions.push(RxAction::FinAckReceived),
        FrameType::CancelReq => {
            if let Some(cancel) = CancelHeader::read(sub) {
                let mut rsp = Message::new(MessageKind::CancelRsp);
                rsp.request_sn = Some(cancel.sn as u32);
                actions.push(RxAction::SendControl(rsp));
            }
        }
        FrameType::CancelRsp => {
            if let Some(cancel) = CancelHeader::read(sub) {
                actions.push(RxAction::Deliver { sn: cancel.sn as u32, data: Vec::new() });
            }
        }
        FrameType::HelloReq | FrameType::HelloRsp | FrameType::SetupReq | FrameType::SetupRsp => {
            // Negotiated one layer up over the TCP bootstrap (DESIGN.md);
            // any such frame arriving on the RDMA wire this late is a no-op.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::iface::SessionHooks;
    use crate::engine::message::IovElement;
    use crate::engine::test_support::{FakeSession, FakeVerbs};

    fn tunables() -> Tunables {
        Tunables { max_send_buf_sz: 8192, sq_depth: 16, rq_depth: 16 }
    }

    fn channel() -> Channel<FakeVerbs, FakeSession> {
        let mut ch = Channel::new(tunables(), 32, FakeVerbs::default(), FakeSession::default());
        ch.mark_online();
        ch.window.peer_credits = 16;
        ch
    }

    #[test]
    fn inline_request_is_framed_and_posted() {
        let mut ch = channel();
        let mut msg = Message::new(MessageKind::Request);
        msg.header.push(IovElement::new(b"ping".to_vec()));
        msg.data.push(IovElement::new(vec![b'x'; 32]));
        ch.send_request(vec![msg]).unwrap();
        ch.pump().unwrap();

        assert_eq!(ch.verbs.posted_chains.len(), 1);
        assert_eq!(ch.conn.reqs_inflight.len(), 1);
        assert!(ch.conn.reqs_msgq.is_empty());
    }

    #[test]
    fn oversized_request_chooses_rdma_read_mode() {
        let mut ch = channel();
        let mut msg = Message::new(MessageKind::Request);
        msg.header.push(IovElement::new(b"ping".to_vec()));
        msg.data.push(IovElement::with_mr(vec![0u8; 128 * 1024], 0x2000, 7));
        ch.send_request(vec![msg]).unwrap();
        ch.pump().unwrap();

        assert_eq!(ch.verbs.posted_chains.len(), 1);
        let chain = &ch.verbs.posted_chains[0];
        assert_eq!(chain.len(), 1);
        assert!(matches!(chain[0], WorkRequest::Send { .. }));
    }

    #[test]
    fn budget_saturation_keeps_65th_request_queued() {
        let mut ch = channel();
        ch.window.peer_credits = 1000;
        ch.window.sqe_avail = 1000;
        ch.window.max_sn = 1000;
        for i in 0..65u32 {
            let mut msg = Message::new(MessageKind::Request);
            msg.sn = i;
            ch.conn.reqs_msgq.push_back(msg);
        }
        ch.pump().unwrap();
        assert_eq!(ch.conn.reqs_inflight.len(), 64);
        assert_eq!(ch.conn.reqs_msgq.len(), 1);
    }

    #[test]
    fn flush_on_abrupt_disconnect_notifies_every_queued_message() {
        let mut ch = channel();
        for i in 0..10u32 {
            let mut msg = Message::new(MessageKind::Request);
            msg.sn = i;
            ch.conn.reqs_msgq.push_back(msg);
        }
        ch.teardown(ConnError::SessionDisconnected);
        assert_eq!(ch.session.msg_errors.len(), 10);
        assert!(ch.session.msg_errors.iter().all(|(_, e)| *e == MsgError::Flushed));
        assert_eq!(ch.conn.state, State::Disconnected);
    }

    #[test]
    fn graceful_active_close_walks_the_state_sequence() {
        let mut ch = channel();
        ch.disconnect().unwrap();
        assert_eq!(ch.conn.state, State::FinWait1);
        assert_eq!(ch.session.connection_closed, 1);

        // Peer acks our FIN_REQ.
        ch.apply_rx_action(RxAction::FinAckReceived).unwrap();
        assert_eq!(ch.conn.state, State::FinWait2);

        // Peer then destroys its side and sends its own FIN_REQ, which we
        // must ack in turn.
        ch.apply_rx_action(RxAction::FinReceived).unwrap();
        assert_eq!(ch.conn.state, State::TimeWait);
    }

    #[test]
    fn cancel_of_ready_request_resolves_locally() {
        let mut ch = channel();
        let mut msg = Message::new(MessageKind::Request);
        msg.sn = 7;
        ch.conn.reqs_msgq.push_back(msg);
        assert_eq!(ch.cancel_request(7), MsgError::Canceled);
        assert!(ch.conn.reqs_msgq.is_empty());
    }

    #[test]
    fn idle_nop_emitted_when_queues_drain_with_credit_to_spare() {
        let mut ch = channel();
        ch.window.credits = 3;
        ch.window.sqe_avail = 4;
        ch.maybe_emit_idle_nop();
        assert_eq!(ch.conn.rsps_msgq.len(), 1);
        assert_eq!(ch.conn.rsps_msgq[0].kind, MessageKind::CreditNop);
    }
}
