//! The RDMA data-path engine: transfer-mode decision, work-request
//! chaining for RDMA_READ/RDMA_WRITE segmentation, and the sequence/credit
//! piggybacking applied to every outgoing frame.

use crate::engine::config::MAX_HDR;
use crate::engine::task::SgList;
use crate::engine::wire::WireSge;

/// How a message's payload will cross the wire ("Transfer-mode
/// decision").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Payload rides inline in the SEND, in the task's staging buffer.
    InlineSend,
    /// The requester exposes its buffer; the peer issues RDMA_READ against
    /// it, and only the header travels via SEND.
    RdmaRead,
    /// The responder RDMA_WRITEs the payload into a buffer the requester
    /// exposed, chaining WRITE before the header SEND.
    RdmaWrite,
}

/// Decide the outgoing transfer mode for a *request*: inline if the
/// framed size fits under `max_send_buf_sz - MAX_HDR`, else the requester
/// exposes its buffer for the peer to RDMA_READ.
pub fn decide_request_mode(xio_hdr_len: usize, ulp_hdr_len: usize, ulp_imm_len: usize, max_send_buf_sz: usize) -> TransferMode {
    if xio_hdr_len + ulp_hdr_len + ulp_imm_len < max_send_buf_sz.saturating_sub(MAX_HDR) {
        TransferMode::InlineSend
    } else {
        TransferMode::RdmaRead
    }
}

/// Decide the outgoing transfer mode for a *response* ("Response-side
/// decision"). If the inbound request carried `read_sge` descriptors (it
/// asked for its response to arrive via RDMA_WRITE) or the caller set
/// `small_zero_copy`, or the response is simply too big to inline, the
/// responder exposes a buffer and the peer (or itself, symmetrically)
/// issues RDMA_WRITE; otherwise the response rides inline.
pub fn decide_response_mode(
    peer_requested_write: bool,
    small_zero_copy: bool,
    response_len: usize,
    max_send_buf_sz: usize,
) -> TransferMode {
    if peer_requested_write {
        TransferMode::RdmaWrite
    } else if small_zero_copy || response_len >= max_send_buf_sz.saturating_sub(MAX_HDR) {
        TransferMode::RdmaWrite
    } else {
        TransferMode::InlineSend
    }
}

/// One segment of a jointly-walked local/remote scatter-gather pair: the
/// portion of each side's descriptor that overlaps, plus whether this
/// segment is the final (non-phantom) one ("Phantom tasks" vs
/// "RDMA-read scheduling").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdmaSegment {
    pub local: WireSge,
    pub remote: WireSge,
    pub is_final: bool,
}

/// Walk `local` and `remote` scatter-gather lists jointly, splitting at
/// element boundaries whenever one side's current element is shorter than
/// the other's, and emit one segment per resulting work request
/// (`prep_rdma_op`). The two lists must carry equal total length —
/// callers validate this before calling ("validate total lengths match").
///
/// All segments but the last are phantom carriers; only the final segment
/// is marked `is_final` so the caller knows to allocate it as the primary
/// (non-phantom) task that triggers completion notification.
pub fn prep_rdma_op(local: &SgList, remote: &SgList) -> Vec<RdmaSegment> {
    let mut segments = Vec::new();
    let (mut li, mut ri) = (0usize, 0usize);
    let (mut loff, mut roff) = (0u64, 0u64);

    while li < local.entries.len() && ri < remote.entries.len() {
        let l = local.entries[li];
        let r = remote.entries[ri];
        let l_remaining = l.length as u64 - loff;
        let r_remaining = r.length as u64 - roff;
        let take = l_remaining.min(r_remaining);

        let is_last_element_pair =
            li == local.entries.len() - 1 && ri == remote.entries.len() - 1 && l_remaining == take && r_remaining == take;

        segments.push(RdmaSegment {
            local: WireSge { addr: l.addr + loff, length: take as u32, stag: l.stag },
            remote: WireSge { addr: r.addr + roff, length: take as u32, stag: r.stag },
            is_final: is_last_element_pair,
        });

        loff += take;
        roff += take;
        if loff == l.length as u64 {
            li += 1;
            loff = 0;
        }
        if roff == r.length as u64 {
            ri += 1;
            roff = 0;
        }
    }

    segments
}

/// Number of phantom siblings remaining after the `i`-th segment of a
/// `total`-segment chain: `rsize - r - 1`.
pub fn phantom_remaining_at(total: usize, i: usize) -> usize {
    total - i - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_mode_chosen_when_payload_fits() {
        let mode = decide_request_mode(16, 4, 32, 8192);
        assert_eq!(mode, TransferMode::InlineSend);
    }

    #[test]
    fn rdma_read_chosen_when_payload_too_large() {
        let mode = decide_request_mode(16, 4, 128 * 1024, 8192);
        assert_eq!(mode, TransferMode::RdmaRead);
    }

    #[test]
    fn response_uses_write_when_request_asked_for_it() {
        let mode = decide_response_mode(true, false, 100, 8192);
        assert_eq!(mode, TransferMode::RdmaWrite);
    }

    #[test]
    fn response_inlines_when_small_and_unrequested() {
        let mode = decide_response_mode(false, false, 100, 8192);
        assert_eq!(mode, TransferMode::InlineSend);
    }

    #[test]
    fn prep_rdma_op_matching_single_segments_is_one_final_segment() {
        let mut local = SgList::default();
        local.push(WireSge { addr: 0x1000, length: 4096, stag: 1 }).unwrap();
        let mut remote = SgList::default();
        remote.push(WireSge { addr: 0x2000, length: 4096, stag: 2 }).unwrap();

        let segs = prep_rdma_op(&local, &remote);
        assert_eq!(segs.len(), 1);
        assert!(segs[0].is_final);
        assert_eq!(segs[0].local.length, 4096);
        assert_eq!(segs[0].remote.length, 4096);
    }

    #[test]
    fn prep_rdma_op_splits_at_shorter_side_and_marks_only_last_final() {
        // local: [2048, 2048]  remote: [4096]
        let mut local = SgList::default();
        local.push(WireSge { addr: 0, length: 2048, stag: 1 }).unwrap();
        local.push(WireSge { addr: 4096, length: 2048, stag: 1 }).unwrap();
        let mut remote = SgList::default();
        remote.push(WireSge { addr: 0x9000, length: 4096, stag: 2 }).unwrap();

        let segs = prep_rdma_op(&local, &remote);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].local.length, 2048);
        assert_eq!(segs[0].remote.length, 2048);
        assert!(!segs[0].is_final);
        assert_eq!(segs[1].remote.addr, 0x9000 + 2048);
        assert!(segs[1].is_final);

        for (i, _) in segs.iter().enumerate() {
            let remaining = phantom_remaining_at(segs.len(), i);
            assert_eq!(remaining, segs.len() - i - 1);
        }
    }

    #[test]
    fn prep_rdma_op_handles_many_small_segments_on_both_sides() {
        let mut local = SgList::default();
        for _ in 0..4 {
            local.push(WireSge { addr: 0, length: 1024, stag: 1 }).unwrap();
        }
        let mut remote = SgList::default();
        remote.push(WireSge { addr: 0, length: 2048, stag: 2 }).unwrap();
        remote.push(WireSge { addr: 8192, length: 2048, stag: 2 }).unwrap();

        let segs = prep_rdma_op(&local, &remote);
        assert_eq!(segs.len(), 4);
        let total_local: u32 = segs.iter().map(|s| s.local.length).sum();
        let total_remote: u32 = segs.iter().map(|s| s.remote.length).sum();
        assert_eq!(total_local, 4096);
        assert_eq!(total_remote, 4096);
        assert!(segs[..3].iter().all(|s| !s.is_final));
        assert!(segs[3].is_final);
    }
}
