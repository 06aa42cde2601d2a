//! Interfaces consumed from external collaborators.
//!
//! The engine never talks to `libibverbs`, a timer wheel, or a session
//! registry directly — it is generic over these traits so the connection
//! scheduler and data-path engine are unit-testable without RDMA hardware.
//! [`crate::backend`] provides the production [`Verbs`] implementation over
//! this crate's own `rdma` wrapper; [`crate::engine::test_support`] provides
//! in-process fakes for all four traits.

use crate::engine::wire::WireSge;

/// A single outgoing work request in a chain to be posted atomically.
#[derive(Debug, Clone)]
pub enum WorkRequest {
    Send {
        task_ltid: u32,
        bytes_len: usize,
        signaled: bool,
        fence: bool,
    },
    RdmaRead {
        task_ltid: u32,
        local: WireSge,
        remote: WireSge,
        signaled: bool,
    },
    RdmaWrite {
        task_ltid: u32,
        local: WireSge,
        remote: WireSge,
        signaled: bool,
    },
}

/// Opcode of a completed work request, as reported by the completion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOpcode {
    Recv,
    Send,
    RdmaRead,
    RdmaWrite,
}

/// A single entry drained from the completion queue.
#[derive(Debug, Clone)]
pub struct Completion {
    pub task_ltid: u32,
    pub opcode: CompletionOpcode,
    pub success: bool,
    /// `true` for a `WR_FLUSH_ERR`, which is expected during teardown and
    /// must not be treated as a connection-level error.
    pub is_flush_err: bool,
    /// Set on the last RECV in a polled batch, so the receive handler knows
    /// more messages followed.
    pub more_in_batch: bool,
}

/// The RDMA verbs collaborator.
///
/// All operations are non-blocking; `post_send_chain`/`post_recv` return
/// immediately, and the outcome is observed later via [`Verbs::poll_cq`].
pub trait Verbs {
    /// Post a chain of work requests as a single atomic submit batch. On
    /// failure the whole chain must be considered not-posted.
    fn post_send_chain(&mut self, chain: &[WorkRequest]) -> std::io::Result<()>;

    /// Post a receive buffer for `task_ltid`.
    fn post_recv(&mut self, task_ltid: u32) -> std::io::Result<()>;

    /// Drain up to `max` completions into `out`, returning the number
    /// drained.
    fn poll_cq(&mut self, max: usize, out: &mut Vec<Completion>) -> std::io::Result<usize>;

    /// Arm the CQ for event-driven notification.
    fn arm_cq(&mut self) -> std::io::Result<()>;

    /// Acknowledge `count` CQ notification events.
    fn ack_cq_events(&mut self, count: u32);

    /// Initiate an RDMA disconnect of the underlying queue pair.
    fn disconnect(&mut self) -> std::io::Result<()>;
}

/// A slice carved out of the external buffer-pool allocator ("Memory
/// pool").
#[derive(Debug, Clone, Copy)]
pub struct PoolSlice {
    pub addr: u64,
    pub mr_handle: u32,
    pub length: usize,
}

/// The user-facing buffer-pool allocator.
pub trait MemPool {
    fn alloc(&mut self, size: usize) -> Option<PoolSlice>;
    fn free(&mut self, slice: PoolSlice);
}

/// An opaque handle to a piece of work posted to an execution context, used
/// to cancel it (`remove_event` counterpart for delayed work).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHandle(pub u64);

/// The thread/event-loop primitive.
///
/// One context per OS thread; all mutations to a connection or RDMA handle
/// must happen from the thread that owns its context.
pub trait ExecCtx {
    /// Post a one-shot, deduplicating unit of work to run on this context's
    /// thread.
    fn add_work(&mut self, tag: &'static str) -> WorkHandle;

    /// Post work to run after `delay_ms` milliseconds.
    fn add_delayed_work(&mut self, tag: &'static str, delay_ms: u64) -> WorkHandle;

    /// Cancel previously posted work, if it has not run yet.
    fn remove_work(&mut self, handle: WorkHandle);

    /// Whether the owning event loop is in the process of stopping (used to
    /// suppress posting new work during shutdown).
    fn is_loop_stopping(&self) -> bool;
}

/// Outcome of validating an outbound message against session-layer policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admit,
    RejectInvalid,
    RejectShutdown,
    RejectWouldBlock,
}

/// The session layer.
///
/// Supplies the sequence-number allocator, input/output validators, and the
/// notification fan-out the engine calls into on message completion, error,
/// and connection-state changes.
pub trait SessionHooks {
    /// Allocate the next session-wide sequence number for an outgoing
    /// message (`session_get_sn`).
    fn next_sn(&mut self) -> u32;

    /// Validate an inbound request against session policy.
    fn is_valid_in_req(&self) -> bool;

    /// Validate an outbound message against session policy (size limits,
    /// mr presence where required).
    fn is_valid_out_msg(&self) -> bool;

    /// Whether the session is in "no-queueing" mode.
    fn no_queueing_mode(&self) -> bool;

    fn notify_msg_error(&mut self, sn: u32, err: crate::engine::error::MsgError);
    fn notify_connection_closed(&mut self);
    fn notify_teardown(&mut self);
    fn notify_msg(&mut self, sn: u32);
}
