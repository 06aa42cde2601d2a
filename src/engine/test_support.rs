//! In-process fakes for the four external-collaborator traits, backed
//! by plain `Vec`/`VecDeque` state. Used by this crate's own unit tests and
//! usable by downstream integration tests that want to drive the engine
//! without real RDMA hardware.

use std::collections::VecDeque;

use crate::engine::error::MsgError;
use crate::engine::iface::{Completion, ExecCtx, MemPool, PoolSlice, Verbs, WorkHandle, WorkRequest};

/// A fake [`Verbs`] backed by in-memory queues. `post_send_chain` records
/// the chain; completions are injected by the test via
/// [`FakeVerbs::complete`] rather than produced automatically, since the
/// whole point is deterministic, hardware-free driving of the engine.
#[derive(Debug, Default)]
pub struct FakeVerbs {
    pub posted_chains: Vec<Vec<WorkRequest>>,
    pub posted_recvs: Vec<u32>,
    pending_completions: VecDeque<Completion>,
    pub armed: u32,
    pub acked_events: u32,
    pub disconnected: bool,
    pub fail_next_post: bool,
}

impl FakeVerbs {
    pub fn complete(&mut self, c: Completion) {
        self.pending_completions.push_back(c);
    }
}

impl Verbs for FakeVerbs {
    fn post_send_chain(&mut self, chain: &[WorkRequest]) -> std::io::Result<()> {
        if self.fail_next_post {
            self.fail_next_post = false;
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected post failure"));
        }
        self.posted_chains.push(chain.to_vec());
        Ok(())
    }

    fn post_recv(&mut self, task_ltid: u32) -> std::io::Result<()> {
        self.posted_recvs.push(task_ltid);
        Ok(())
    }

    fn poll_cq(&mut self, max: usize, out: &mut Vec<Completion>) -> std::io::Result<usize> {
        let mut n = 0;
        while n < max {
            match self.pending_completions.pop_front() {
                Some(c) => {
                    out.push(c);
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn arm_cq(&mut self) -> std::io::Result<()> {
        self.armed += 1;
        Ok(())
    }

    fn ack_cq_events(&mut self, count: u32) {
        self.acked_events += count;
    }

    fn disconnect(&mut self) -> std::io::Result<()> {
        self.disconnected = true;
        Ok(())
    }
}

/// A fake [`MemPool`] backed by a bump allocator over a fixed-size byte
/// arena; `free` is a no-op (tests don't care about reuse).
#[derive(Debug)]
pub struct FakeMemPool {
    next_addr: u64,
    capacity: u64,
}

impl FakeMemPool {
    pub fn new(capacity: u64) -> Self {
        Self { next_addr: 0x1_0000_0000, capacity }
    }
}

impl MemPool for FakeMemPool {
    fn alloc(&mut self, size: usize) -> Option<PoolSlice> {
        if size as u64 > self.capacity {
            return None;
        }
        let addr = self.next_addr;
        self.next_addr += size as u64;
        self.capacity -= size as u64;
        Some(PoolSlice { addr, mr_handle: 1, length: size })
    }

    fn free(&mut self, _slice: PoolSlice) {}
}

/// A fake [`ExecCtx`] that runs work items synchronously into a recorded
/// log instead of an actual event loop.
#[derive(Debug, Default)]
pub struct FakeExecCtx {
    pub posted: Vec<&'static str>,
    next_handle: u64,
    pub stopping: bool,
}

impl ExecCtx for FakeExecCtx {
    fn add_work(&mut self, tag: &'static str) -> WorkHandle {
        self.posted.push(tag);
        self.next_handle += 1;
        WorkHandle(self.next_handle)
    }

    fn add_delayed_work(&mut self, tag: &'static str, _delay_ms: u64) -> WorkHandle {
        self.add_work(tag)
    }

    fn remove_work(&mut self, _handle: WorkHandle) {}

    fn is_loop_stopping(&self) -> bool {
        self.stopping
    }
}

/// A fake [`SessionHooks`] with a monotonic sn counter and recorded
/// notifications, for asserting on the event sequence the engine produces.
#[derive(Debug, Default)]
pub struct FakeSession {
    next_sn: u32,
    pub msg_errors: Vec<(u32, MsgError)>,
    pub connection_closed: u32,
    pub teardowns: u32,
    pub delivered: Vec<u32>,
    pub no_queueing: bool,
}

impl crate::engine::iface::SessionHooks for FakeSession {
    fn next_sn(&mut self) -> u32 {
        let sn = self.next_sn;
        self.next_sn += 1;
        sn
    }

    fn is_valid_in_req(&self) -> bool {
        true
    }

    fn is_valid_out_msg(&self) -> bool {
        true
    }

    fn no_queueing_mode(&self) -> bool {
        self.no_queueing
    }

    fn notify_msg_error(&mut self, sn: u32, err: MsgError) {
        self.msg_errors.push((sn, err));
    }

    fn notify_connection_closed(&mut self) {
        self.connection_closed += 1;
    }

    fn notify_teardown(&mut self) {
        self.teardowns += 1;
    }

    fn notify_msg(&mut self, sn: u32) {
        self.delivered.push(sn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::iface::CompletionOpcode;

    #[test]
    fn fake_verbs_replays_injected_completions() {
        let mut verbs = FakeVerbs::default();
        verbs.complete(Completion {
            task_ltid: 3,
            opcode: CompletionOpcode::Send,
            success: true,
            is_flush_err: false,
            more_in_batch: false,
        });
        let mut out = Vec::new();
        let n = verbs.poll_cq(16, &mut out).unwrap();
        assert_eq!(n, 1);
        assert_eq!(out[0].task_ltid, 3);
    }

    #[test]
    fn fake_session_hooks_allocate_monotonic_sn() {
        let mut session = FakeSession::default();
        let a = crate::engine::iface::SessionHooks::next_sn(&mut session);
        let b = crate::engine::iface::SessionHooks::next_sn(&mut session);
        assert_eq!((a, b), (0, 1));
    }
}
