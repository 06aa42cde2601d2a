//! Cancel subsystem.
//!
//! Cancellation is cooperative and asynchronous: `cancel_request` returns
//! immediately, and the outcome surfaces later as an event. The search
//! walks the message's possible locations in the order the reference
//! implementation does, since a message further along the pipeline is
//! progressively more expensive (and less likely) to cancel.

use crate::engine::error::MsgError;
use crate::engine::message::MsgQueue;
use crate::engine::task::{TaskPool, TaskState};

/// Where a cancel target was found, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelLocation {
    /// Found on the ready queue, not yet framed: removed outright.
    Ready,
    /// Found on the tx-ready list, framed but not yet posted: decremented
    /// and moved to tx-complete.
    TxReady,
    /// Already posted (in-flight or tx-complete): a `CANCEL_REQ` must be
    /// sent to the peer; the outcome is asynchronous.
    Posted,
    /// Not found anywhere local.
    NotFound,
}

/// Search `reqs_msgq` for sn-matching request. On a hit,
/// removes it and reports `MSG_CANCELED` immediately — no wire round trip
/// needed since the peer never saw the message.
pub fn cancel_in_ready_queue(queue: &mut MsgQueue, sn: u32) -> Option<CancelLocation> {
    let idx = queue.iter().position(|m| m.sn == sn)?;
    queue.remove(idx);
    Some(CancelLocation::Ready)
}

/// Search the tx-ready list (framed tasks not yet posted to the verb) for a
/// matching task. On a hit, the task's refcount is
/// decremented and it is moved to tx-complete; the cancellation is
/// resolved locally, no wire exchange needed.
pub fn cancel_in_tx_ready(
    tx_ready: &mut Vec<u32>,
    tx_complete: &mut Vec<u32>,
    tasks: &mut TaskPool,
    sn: u32,
) -> Option<CancelLocation> {
    let idx = tx_ready.iter().position(|&ltid| tasks.get(ltid).sn == sn)?;
    let ltid = tx_ready.remove(idx);
    tasks.release(ltid);
    tx_complete.push(ltid);
    Some(CancelLocation::TxReady)
}

/// Search already-posted lists (`in_flight_list`, `tx_comp_list`) for a
/// matching task. A hit here cannot be resolved locally: a
/// `CANCEL_REQ` carrying `sn` must be wired to the peer, and the outcome
/// (`MSG_CANCELED` or `MSG_NOT_FOUND`) arrives asynchronously.
pub fn cancel_in_posted(in_flight: &[u32], tx_comp: &[u32], tasks: &TaskPool, sn: u32) -> CancelLocation {
    let found = in_flight.iter().chain(tx_comp).any(|&ltid| tasks.get(ltid).sn == sn);
    if found {
        CancelLocation::Posted
    } else {
        CancelLocation::NotFound
    }
}

/// Peer-side handling of an inbound `CANCEL_REQ`. Searches the local
/// RDMA-read lists for the task carrying the *logical* (non-phantom)
/// operation matching `sn`: `phantom_idx == 0` per the original's indexing,
/// which this engine models as [`crate::engine::task::Task::is_phantom`]
/// being `false`.
pub fn handle_cancel_req(
    rdma_rd_list: &[u32],
    rdma_rd_in_flight: &[u32],
    tasks: &mut TaskPool,
    sn: u32,
) -> CancelOutcome {
    let hit = rdma_rd_list
        .iter()
        .chain(rdma_rd_in_flight)
        .find(|&&ltid| !tasks.get(ltid).is_phantom() && tasks.get(ltid).sn == sn);

    match hit {
        Some(&ltid) => {
            // Suppress delivery to the application; the CANCEL_RSP is sent
            // once the in-flight RDMA read for this task actually completes.
            tasks.get_mut(ltid).state = TaskState::CancelPending;
            CancelOutcome::Pending(ltid)
        }
        None => CancelOutcome::NotFound,
    }
}

/// Result of searching the peer-side lists for a `CANCEL_REQ` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was found mid-flight; its `CANCEL_RSP` will be sent once
    /// the pending RDMA read completes, carrying `MSG_CANCELED`.
    Pending(u32),
    /// The peer has no record of the message; reply immediately with
    /// `MSG_NOT_FOUND`.
    NotFound,
}

impl CancelOutcome {
    pub fn to_msg_error(self) -> MsgError {
        match self {
            CancelOutcome::Pending(_) => MsgError::Canceled,
            CancelOutcome::NotFound => MsgError::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::message::{Message, MessageKind};

    #[test]
    fn cancel_hits_ready_queue_first() {
        let mut queue = MsgQueue::new();
        let mut m = Message::new(MessageKind::Request);
        m.sn = 7;
        queue.push_back(m);
        assert_eq!(cancel_in_ready_queue(&mut queue, 7), Some(CancelLocation::Ready));
        assert!(queue.is_empty());
    }

    #[test]
    fn cancel_falls_through_to_posted_search() {
        let mut tasks = TaskPool::new(4);
        let a = tasks.acquire().unwrap();
        tasks.get_mut(a).sn = 7;
        let in_flight = vec![a];
        assert_eq!(cancel_in_posted(&in_flight, &[], &tasks, 7), CancelLocation::Posted);
        assert_eq!(cancel_in_posted(&in_flight, &[], &tasks, 99), CancelLocation::NotFound);
    }

    #[test]
    fn peer_side_cancel_marks_pending_and_suppresses_phantom_matches() {
        let mut tasks = TaskPool::new(4);
        let phantom = tasks.acquire_phantom(1).unwrap();
        tasks.get_mut(phantom).sn = 9;
        let real = tasks.acquire().unwrap();
        tasks.get_mut(real).sn = 9;

        let rdma_rd_list = vec![phantom, real];
        let outcome = handle_cancel_req(&rdma_rd_list, &[], &mut tasks, 9);
        assert_eq!(outcome, CancelOutcome::Pending(real));
        assert_eq!(tasks.get(real).state, TaskState::CancelPending);
    }

    #[test]
    fn peer_side_cancel_reports_not_found() {
        let mut tasks = TaskPool::new(4);
        let outcome = handle_cancel_req(&[], &[], &mut tasks, 42);
        assert_eq!(outcome, CancelOutcome::NotFound);
        assert_eq!(outcome.to_msg_error(), MsgError::NotFound);
    }
}
