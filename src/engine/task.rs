//! Task pool and message buffer.
//!
//! A [`Task`] is the reusable unit of work backing every frame in flight.
//! The pool is fixed-capacity: acquiring from an empty pool fails with
//! [`TryError::PoolExhausted`](crate::engine::error::TryError::PoolExhausted)
//! rather than growing, so a caller that cannot get a task simply leaves its
//! message on a ready queue for the next scheduler tick.

use std::collections::VecDeque;

use crate::engine::config::XIO_MAX_IOV;
use crate::engine::error::TryError;
use crate::engine::wire::WireSge;

/// RDMA operation a task is staged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOp {
    Recv,
    Send,
    RdmaRead,
    RdmaWrite,
}

/// Whether a task carries application-visible work or exists only to shepherd
/// an intermediate work request through a segmented RDMA operation ("phantom
/// tasks").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Primary,
    /// Carries `remaining` more phantom siblings after it in the chain.
    Phantom { remaining: usize },
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Init,
    Delivered,
    Read,
    ResponseRecv,
    CancelPending,
}

/// Fixed-capacity scatter/gather list for one of the four directions a task
/// may carry descriptors for.
#[derive(Debug, Clone, Default)]
pub struct SgList {
    pub entries: Vec<WireSge>,
}

impl SgList {
    pub fn total_len(&self) -> usize {
        self.entries.iter().map(|e| e.length as u64).sum::<u64>() as usize
    }

    pub fn push(&mut self, sge: WireSge) -> Result<(), TryError> {
        if self.entries.len() >= XIO_MAX_IOV {
            return Err(TryError::PoolExhausted);
        }
        self.entries.push(sge);
        Ok(())
    }
}

/// The reusable unit of work.
#[derive(Debug)]
pub struct Task {
    /// Index into the owning pool's slab; stable for the task's lifetime.
    pub ltid: u32,
    /// Peer-assigned task id, learned once a response/ack references it.
    pub rtid: Option<u32>,
    pub kind: TaskKind,
    pub op: TaskOp,
    pub state: TaskState,
    pub sn: u32,
    /// Back-reference to the request task this response task answers, if
    /// any. Keeps the request from recycling until the response releases it.
    pub sender_ltid: Option<u32>,
    pub refcount: u32,

    /// Inline staging buffer for control/small messages.
    pub buf: Vec<u8>,
    pub write_cursor: usize,
    pub read_cursor: usize,

    pub send_sge: SgList,
    pub peer_read_sge: SgList,
    pub peer_write_sge: SgList,
    pub recv_sge: SgList,
}

impl Task {
    const INLINE_BUF_SIZE: usize = 8192;

    fn new(ltid: u32) -> Self {
        Self {
            ltid,
            rtid: None,
            kind: TaskKind::Primary,
            op: TaskOp::Recv,
            state: TaskState::Init,
            sn: 0,
            sender_ltid: None,
            refcount: 1,
            buf: vec![0u8; Self::INLINE_BUF_SIZE],
            write_cursor: 0,
            read_cursor: 0,
            send_sge: SgList::default(),
            peer_read_sge: SgList::default(),
            peer_write_sge: SgList::default(),
            recv_sge: SgList::default(),
        }
    }

    /// Reset a task to its just-acquired state before reuse, keeping its
    /// backing buffer allocation.
    fn reset(&mut self) {
        self.rtid = None;
        self.kind = TaskKind::Primary;
        self.op = TaskOp::Recv;
        self.state = TaskState::Init;
        self.sn = 0;
        self.sender_ltid = None;
        self.refcount = 1;
        self.write_cursor = 0;
        self.read_cursor = 0;
        self.send_sge.entries.clear();
        self.peer_read_sge.entries.clear();
        self.peer_write_sge.entries.clear();
        self.recv_sge.entries.clear();
    }

    pub fn mbuf_inc(&mut self, n: usize) {
        self.write_cursor += n;
    }

    pub fn is_phantom(&self) -> bool {
        matches!(self.kind, TaskKind::Phantom { .. })
    }

    /// Remaining phantom siblings after this one, or `0` for a primary task
    /// or the final (non-phantom) task of a segmented operation.
    pub fn phantom_remaining(&self) -> usize {
        match self.kind {
            TaskKind::Phantom { remaining } => remaining,
            TaskKind::Primary => 0,
        }
    }
}

/// Fixed-capacity pool of reusable [`Task`] records.
///
/// Each connection owns exactly one pool, sized at channel-up from the
/// negotiated `sq_depth`/`rq_depth`; the pool is never resized afterward.
#[derive(Debug)]
pub struct TaskPool {
    slab: Vec<Option<Task>>,
    free: VecDeque<u32>,
}

impl TaskPool {
    /// Allocate a pool with `capacity` task slots, all initially free.
    pub fn new(capacity: usize) -> Self {
        let mut slab = Vec::with_capacity(capacity);
        let mut free = VecDeque::with_capacity(capacity);
        for i in 0..capacity {
            slab.push(Some(Task::new(i as u32)));
            free.push_back(i as u32);
        }
        Self { slab, free }
    }

    pub fn capacity(&self) -> usize {
        self.slab.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Acquire a primary task from the pool, or `PoolExhausted` if none are
    /// free.
    pub fn acquire(&mut self) -> Result<u32, TryError> {
        let ltid = self.free.pop_front().ok_or(TryError::PoolExhausted)?;
        if let Some(task) = self.slab[ltid as usize].as_mut() {
            task.reset();
        }
        Ok(ltid)
    }

    /// Acquire a phantom task to carry an intermediate work request of a
    /// segmented RDMA operation. `remaining` is the
    /// count of phantom siblings still to come after this one.
    pub fn acquire_phantom(&mut self, remaining: usize) -> Result<u32, TryError> {
        let ltid = self.acquire()?;
        self.get_mut(ltid).kind = TaskKind::Phantom { remaining };
        Ok(ltid)
    }

    pub fn get(&self, ltid: u32) -> &Task {
        self.slab[ltid as usize]
            .as_ref()
            .expect("task slot must be occupied while its ltid is live")
    }

    pub fn get_mut(&mut self, ltid: u32) -> &mut Task {
        self.slab[ltid as usize]
            .as_mut()
            .expect("task slot must be occupied while its ltid is live")
    }

    /// Increment a task's refcount (taken by a response task that still
    /// references its original request).
    pub fn hold(&mut self, ltid: u32) {
        self.get_mut(ltid).refcount += 1;
    }

    /// Release a reference to a task; returns it to the free pool only once
    /// the refcount drops to zero.
    pub fn release(&mut self, ltid: u32) {
        let task = self.get_mut(ltid);
        debug_assert!(task.refcount > 0, "releasing an already-free task");
        task.refcount -= 1;
        if task.refcount == 0 {
            self.free.push_back(ltid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_returns_error_and_recovers_on_release() {
        let mut pool = TaskPool::new(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(TryError::PoolExhausted)));
        pool.release(a);
        let c = pool.acquire().unwrap();
        assert_eq!(c, a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn refcounted_response_keeps_request_alive() {
        let mut pool = TaskPool::new(1);
        let req = pool.acquire().unwrap();
        pool.hold(req); // response now also references it
        pool.release(req); // response releases: request task still held once
        assert_eq!(pool.free_count(), 0);
        pool.release(req); // request itself releases
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn phantom_index_counts_down_to_zero_at_final_task() {
        let mut pool = TaskPool::new(4);
        let rsize = 3usize;
        let mut ltids = Vec::new();
        for r in 0..rsize {
            let remaining = rsize - r - 1;
            if remaining == 0 {
                ltids.push(pool.acquire().unwrap());
            } else {
                ltids.push(pool.acquire_phantom(remaining).unwrap());
            }
        }
        assert_eq!(pool.get(ltids[0]).phantom_remaining(), 2);
        assert_eq!(pool.get(ltids[1]).phantom_remaining(), 1);
        assert!(!pool.get(ltids[2]).is_phantom());
    }
}
