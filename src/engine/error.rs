//! Error taxonomy for the engine.
//!
//! Three tiers, matching the severity bands the reference implementation
//! distinguishes: transient (retry locally), message-level (per-message,
//! connection survives), and connection-level (the connection tears down).
//! There is deliberately no "fatal, abort the process" tier: the source
//! calls `exit(0)` on a handful of otherwise-unreachable completion errors;
//! here they propagate as [`FatalError`] instead.

use thiserror::Error;

/// Per-message failure reported to the application for a message that does
/// not abort the connection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MsgError {
    /// Message framing would exceed `max_send_buf_sz`.
    #[error("message size exceeds the negotiated send buffer")]
    MsgSize,
    /// Message failed validation (missing memory region, bad iovec, etc).
    #[error("message failed validation")]
    MsgInvalid,
    /// Message was canceled by request of the application.
    #[error("message was canceled")]
    Canceled,
    /// A cancel request could not be completed.
    #[error("cancel request failed")]
    CancelFailed,
    /// The peer could not locate the message targeted by a cancel request.
    #[error("message not found")]
    NotFound,
    /// The message was flushed off a queue on connection teardown.
    #[error("message flushed on connection teardown")]
    Flushed,
    /// Only part of a message chain could be enqueued.
    #[error("partial message chain enqueue")]
    Partial,
}

/// Connection-level failure. Transitions the connection to `DISCONNECTED`
/// or `ERROR` and triggers a flush of both ready and in-flight queues.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnError {
    /// The underlying RDMA connection failed to establish.
    #[error("connect error")]
    ConnectError,
    /// The peer (session layer) disconnected.
    #[error("session disconnected")]
    SessionDisconnected,
    /// The peer refused the session.
    #[error("session refused")]
    SessionRefused,
    /// The connection is shutting down; no further sends are accepted.
    #[error("connection is shutting down")]
    Shutdown,
    /// The close state machine was asked for a transition the table marks
    /// invalid (this is a programmer error, not a wire
    /// event, and must never be produced by a correct peer).
    #[error("invalid close-state transition attempted")]
    InvalidTransition,
}

/// Transient condition recovered by retrying from the next scheduler tick.
/// Never surfaced to the application as an error notification, only as the
/// return code of the call that produced it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TryError {
    /// No credits, no send-queue entries, or no in-flight budget available.
    #[error("would block: no window/budget available")]
    WouldBlock,
    /// The task pool has no free entries; caller should retry later.
    #[error("task pool exhausted")]
    PoolExhausted,
}

/// Conditions that indicate a bug in this engine or its caller rather than a
/// wire event: an unknown completion opcode, a memory-region lookup miss, or
/// pool exhaustion during an allocation the protocol requires to succeed
/// (e.g. allocating the task that must carry a FIN). These propagate to the
/// caller of the reactor/connection APIs instead of aborting the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    /// A completion carried an opcode the engine does not understand.
    #[error("unknown work-completion opcode: {0}")]
    UnknownOpcode(u32),
    /// A required memory-region lookup failed.
    #[error("memory region lookup miss for stag {0}")]
    MrLookupMiss(u32),
    /// An allocation that the protocol requires to succeed failed anyway.
    #[error("required allocation failed: {0}")]
    RequiredAllocFailed(&'static str),
}

/// Top-level error type returned by fallible engine entry points that can
/// fail at any of the three severities above.
#[derive(Debug, Error)]
pub enum EngineError {
    /// See [`TryError`].
    #[error(transparent)]
    Try(#[from] TryError),
    /// See [`MsgError`].
    #[error(transparent)]
    Msg(#[from] MsgError),
    /// See [`ConnError`].
    #[error(transparent)]
    Conn(#[from] ConnError),
    /// See [`FatalError`].
    #[error(transparent)]
    Fatal(#[from] FatalError),
    /// An I/O error surfaced from the verbs collaborator.
    #[error("I/O error from the RDMA backend")]
    Io(#[from] std::io::Error),
}
