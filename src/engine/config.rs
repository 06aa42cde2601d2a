//! Tunables and wire constants shared across the engine.
//!
//! Most of these mirror fixed constants of the reference protocol (pool
//! sizes, budgets, header versions); a few are overridable at connection
//! setup time via [`Tunables`].

/// Size of the per-connection pool of one-way message envelopes used for
/// control traffic (FIN, HELLO, NOP, read receipts). Never grown at runtime.
pub const MSG_POOL_SZ: usize = 1024;

/// Default in-flight budget for application requests and for one-way sends.
pub const INFLIGHT_BUDGET: usize = 64;

/// Default in-flight budget for application I/O (requests + responses +
/// one-way, combined).
pub const APP_IO_BUDGET: usize = 256;

/// Maximum number of scatter/gather elements a task may carry per direction.
pub const XIO_MAX_IOV: usize = 16;

/// Extra receive-queue entries provisioned above the negotiated `rq_depth`,
/// to absorb the control-message traffic (NOP/FIN/HELLO) that rides the same
/// queue as application messages.
pub const EXTRA_RQE: usize = 16;

/// Completions drained per polling pass.
pub const MAX_POLL_WC: usize = 16;

/// Consecutive empty polling passes before the reactor re-arms the CQ for
/// event-driven notification.
pub const MAX_NUM_DELAYED_ARM: u32 = 16;

/// Per-poll-pass time budget, in microseconds: a polling pass keeps draining
/// the CQ in batches of [`MAX_POLL_WC`] until either a batch comes back empty
/// or this much wall-clock time has elapsed.
pub const POLLING_TIMEOUT_US: u64 = 1000;

/// CQ notification acks are batched; acknowledge every this many events.
pub const CQ_ACK_BATCH: u32 = 128;

/// Force a signaled completion every this many sends regardless of whether
/// one was otherwise due (hard ceiling).
pub const HARD_CQ_MOD: u32 = 64;

/// Force a signaled completion every this many sends regardless of whether
/// one was otherwise due (soft, used for responses).
pub const SOFT_CQ_MOD: u32 = 32;

/// Highest value `sim_peer_credits` is clipped to; matches `MAX_RECV_WR`.
pub const MAX_RECV_WR: u32 = 4096;

/// Half of the 16-bit sequence-number space, used to disambiguate wraparound
/// when comparing two sequence numbers.
pub const SN_HALF_WINDOW: u32 = 1 << 15;

/// Version stamped into every outgoing request header.
pub const XIO_REQ_HEADER_VERSION: u8 = 1;

/// Version stamped into every outgoing response header.
pub const XIO_RSP_HEADER_VERSION: u8 = 1;

/// Byte size of the transport header that precedes every frame, not counting
/// the TLV envelope.
pub const MAX_HDR: usize = 128;

/// Per-connection, negotiable tunables exchanged during the setup handshake
///. Defaults mirror common values used in the
/// reference implementation's test harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Tunables {
    /// Size of the inline send buffer carried by every task.
    pub max_send_buf_sz: usize,
    /// Depth of the send queue (bounds `max_sn`).
    pub sq_depth: usize,
    /// Depth of the receive queue as negotiated (before `EXTRA_RQE`).
    pub rq_depth: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_send_buf_sz: 8192,
            sq_depth: 64,
            rq_depth: 64,
        }
    }
}

impl Tunables {
    /// Negotiate the connection's effective tunables as the element-wise
    /// minimum of the two peers' proposals, per the setup handshake.
    pub fn negotiate(client: &Tunables, server: &Tunables) -> Tunables {
        Tunables {
            max_send_buf_sz: client.max_send_buf_sz.min(server.max_send_buf_sz),
            sq_depth: client.sq_depth.min(server.sq_depth),
            rq_depth: client.rq_depth.min(server.rq_depth),
        }
    }

    /// The receive-queue depth actually provisioned, after padding with
    /// [`EXTRA_RQE`] for control traffic.
    pub fn actual_rq_depth(&self) -> usize {
        self.rq_depth + EXTRA_RQE
    }
}
