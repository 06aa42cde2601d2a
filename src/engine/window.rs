//! Credit-based sliding-window flow control and the RDMA handle that
//! carries it plus the device-level bookkeeping from the RDMA handle.

use crate::engine::config::{MAX_RECV_WR, SN_HALF_WINDOW};

/// Compare two 16-bit-wrapped sequence numbers (widened to `u32` inside the
/// handle) using a half-window rule, so wraparound doesn't break ordering.
pub fn sn_lt(a: u32, b: u32) -> bool {
    let diff = b.wrapping_sub(a);
    diff != 0 && diff < SN_HALF_WINDOW
}

/// Flow-control and device-level accounting for one connection's RDMA QP.
#[derive(Debug, Clone)]
pub struct FlowWindow {
    /// Next sequence number this side will stamp on an outgoing frame.
    pub sn: u32,
    /// Highest `sn` this side may use before waiting for send completions
    /// to retire (`= sq_depth`).
    pub max_sn: u32,
    /// Next sequence number expected from the peer.
    pub exp_sn: u32,
    /// Last sequence number acknowledged by the peer.
    pub ack_sn: u32,

    /// Credits this side currently holds to transmit to the peer.
    pub peer_credits: i64,
    /// Credits accumulated locally (receives freshly rearmed) waiting to be
    /// piggybacked or flushed via a NOP.
    pub credits: u32,
    /// Local mirror of what the peer is believed to hold, to avoid
    /// starving it (`sim_peer_credits`), clipped at [`MAX_RECV_WR`].
    pub sim_peer_credits: u32,

    pub sqe_avail: i64,
    pub rqe_avail: i64,
    pub actual_rq_depth: usize,

    pub kick_rdma_rd: bool,
    pub last_send_signaled: bool,
    pub req_sig_cnt: u32,
    pub rsp_sig_cnt: u32,
}

impl FlowWindow {
    pub fn new(sq_depth: usize, rq_depth: usize, actual_rq_depth: usize) -> Self {
        Self {
            sn: 0,
            max_sn: sq_depth as u32,
            exp_sn: 0,
            ack_sn: 0,
            peer_credits: 0,
            credits: 0,
            sim_peer_credits: 0,
            sqe_avail: sq_depth as i64,
            rqe_avail: rq_depth as i64,
            actual_rq_depth,
            kick_rdma_rd: false,
            last_send_signaled: false,
            req_sig_cnt: 0,
            rsp_sig_cnt: 0,
        }
    }

    /// `tx_window_sz = max_sn - sn`.
    pub fn tx_window_sz(&self) -> i64 {
        self.max_sn as i64 - self.sn as i64
    }

    /// The actual transmit window for this pump iteration: bounded by the
    /// send-sequence window, peer credits, and device send-queue entries.
    pub fn xmit_window(&self) -> i64 {
        self.tx_window_sz().min(self.peer_credits).min(self.sqe_avail)
    }

    /// Overwrite the outgoing frame's sn/ack_sn/credits, then advance local
    /// bookkeeping exactly as the "Sequence and credit piggybacking" step
    /// specifies: increment `sn`, fold `credits` into `sim_peer_credits`,
    /// reset `credits`, decrement `peer_credits`.
    ///
    /// Returns the `(sn, ack_sn, credits)` triple that was stamped, for the
    /// caller to write into the wire header.
    pub fn write_sn(&mut self) -> (u16, u16, u16) {
        let sn = self.sn as u16;
        let ack_sn = self.exp_sn.wrapping_sub(1) as u16;
        let credits = self.credits.min(u16::MAX as u32) as u16;

        self.sn += 1;
        self.sim_peer_credits = (self.sim_peer_credits + credits as u32).min(MAX_RECV_WR);
        self.credits = 0;
        self.peer_credits -= 1;

        (sn, ack_sn, credits)
    }

    /// Process an inbound frame's piggybacked ack_sn/credits and advance the
    /// send-sequence window per each acknowledged completion.
    pub fn on_send_completion(&mut self) {
        self.max_sn += 1;
    }

    /// Advance the receive side's expected sn on an in-order application
    /// frame, or report mismatch for the caller to log-and-accept
    /// ("out-of-order frames are logged but accepted").
    pub fn on_frame_received(&mut self, hdr_sn: u32, hdr_credits: u32) -> bool {
        self.peer_credits += hdr_credits as i64;
        let in_order = hdr_sn == self.exp_sn;
        if in_order {
            self.exp_sn += 1;
        }
        in_order
    }

    /// Decrement `rqe_avail`/`sim_peer_credits` on a completed RECV, and
    /// report whether the receive queue needs refilling ("Receive
    /// handling").
    pub fn on_recv_completion(&mut self) -> bool {
        self.rqe_avail -= 1;
        self.sim_peer_credits = self.sim_peer_credits.saturating_sub(1);
        self.rqe_avail <= self.actual_rq_depth as i64 + 1
    }

    /// Local credits freshly rearmed are folded in here as the receive queue
    /// refills (counterpart to refill logic consuming `rqe_avail`).
    pub fn grant_credit(&mut self, n: u32) {
        self.credits += n;
    }

    /// Whether the idle handler should emit a `CREDIT_NOP`: connected,
    /// has send-queue room and peer credits and local credits, but nothing
    /// queued to send.
    pub fn should_emit_idle_nop(&self, anything_queued: bool) -> bool {
        !anything_queued && self.sqe_avail > 0 && self.peer_credits > 0 && self.credits > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sn_lt_handles_wraparound() {
        assert!(sn_lt(5, 6));
        assert!(!sn_lt(6, 5));
        assert!(sn_lt(u32::MAX, 0));
        assert!(!sn_lt(0, u32::MAX));
    }

    #[test]
    fn write_sn_advances_bookkeeping() {
        let mut w = FlowWindow::new(16, 16, 32);
        w.peer_credits = 4;
        w.grant_credit(3);
        let (sn, _ack, credits) = w.write_sn();
        assert_eq!(sn, 0);
        assert_eq!(credits, 3);
        assert_eq!(w.sn, 1);
        assert_eq!(w.peer_credits, 3);
        assert_eq!(w.sim_peer_credits, 3);
        assert_eq!(w.credits, 0);
    }

    #[test]
    fn sim_peer_credits_clipped_at_max_recv_wr() {
        let mut w = FlowWindow::new(16, 16, 32);
        w.peer_credits = 1;
        w.grant_credit(MAX_RECV_WR + 100);
        w.write_sn();
        assert_eq!(w.sim_peer_credits, MAX_RECV_WR);
    }

    #[test]
    fn in_order_frame_advances_exp_sn_out_of_order_does_not() {
        let mut w = FlowWindow::new(16, 16, 32);
        assert!(w.on_frame_received(0, 0));
        assert_eq!(w.exp_sn, 1);
        assert!(!w.on_frame_received(5, 0));
        assert_eq!(w.exp_sn, 1, "out-of-order frame is logged but does not advance exp_sn");
    }

    #[test]
    fn xmit_window_is_bounded_by_tightest_resource() {
        let mut w = FlowWindow::new(16, 16, 32);
        w.peer_credits = 2;
        w.sqe_avail = 100;
        assert_eq!(w.xmit_window(), 2);
        w.peer_credits = 100;
        w.sqe_avail = 3;
        assert_eq!(w.xmit_window(), 3);
    }
}
