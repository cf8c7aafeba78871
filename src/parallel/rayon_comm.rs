// rayon-based in-process communication
//
// Each rank is one thread of a dedicated rayon pool sized to the group, so
// blocking calls on one rank never starve another. Ranks share nothing but
// the `Group`: one mailbox per rank, the barrier and the abort signal.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use tracing::{debug, error};

use super::mailbox::{AbortSignal, Delivery, Envelope, Mailbox, Payload};
use super::{Comm, SendMode, StagingLedger, Tag, check_rank, check_scatter_len};
use crate::core::traits::Element;
use crate::error::{BenchError, TransportError};

/// Reserved tag for collective traffic.
const COLLECTIVE_TAG: Tag = 32_000;

#[derive(Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

struct Group {
    size: usize,
    mailboxes: Vec<Mailbox>,
    barrier: Mutex<BarrierState>,
    barrier_changed: Condvar,
    signal: AbortSignal,
    next_id: AtomicU64,
}

impl Group {
    fn new(size: usize) -> Self {
        Self {
            size,
            mailboxes: (0..size).map(|_| Mailbox::default()).collect(),
            barrier: Mutex::new(BarrierState::default()),
            barrier_changed: Condvar::new(),
            signal: AbortSignal::default(),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn abort(&self, code: i32) {
        self.signal.raise(code);
        for mailbox in &self.mailboxes {
            mailbox.wake_all();
        }
        let _state = self.barrier.lock().unwrap_or_else(PoisonError::into_inner);
        self.barrier_changed.notify_all();
    }
}

/// Launches a fixed-size group of in-process ranks.
pub struct RayonGroup {
    size: usize,
}

impl RayonGroup {
    pub fn new(size: usize) -> Result<Self, BenchError> {
        if size == 0 {
            return Err(BenchError::Launch("a process group needs at least one rank".into()));
        }
        Ok(Self { size })
    }

    /// Group sized to the machine's logical CPUs.
    pub fn with_all_cpus() -> Self {
        Self { size: num_cpus::get().max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `op` once on every rank and returns the per-rank results in rank
    /// order. A rank that panics aborts the rest of the group first.
    pub fn run<F, R>(&self, op: F) -> Result<Vec<R>, BenchError>
    where
        F: Fn(RayonComm) -> R + Sync,
        R: Send,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.size)
            .thread_name(|i| format!("rank-{i}"))
            .build()
            .map_err(|e| BenchError::Launch(e.to_string()))?;
        let group = Arc::new(Group::new(self.size));
        Ok(pool.broadcast(|ctx| {
            let _guard = AbortOnPanic(&group);
            op(RayonComm::new(ctx.index(), Arc::clone(&group)))
        }))
    }
}

struct AbortOnPanic<'a>(&'a Group);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort(101);
        }
    }
}

/// Handle of one in-process rank.
pub struct RayonComm {
    rank: usize,
    group: Arc<Group>,
    staging: RefCell<Option<StagingLedger>>,
}

impl RayonComm {
    fn new(rank: usize, group: Arc<Group>) -> Self {
        Self { rank, group, staging: RefCell::new(None) }
    }

    fn take_payload<T: Element>(payload: Payload, buf: &mut [T]) -> Result<(), BenchError> {
        let msg = payload
            .downcast::<Vec<T>>()
            .map_err(|_| TransportError::TypeMismatch)?;
        if msg.len() > buf.len() {
            return Err(TransportError::Truncated { len: msg.len(), capacity: buf.len() }.into());
        }
        buf[..msg.len()].copy_from_slice(&msg);
        Ok(())
    }
}

impl Comm for RayonComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn barrier(&self) -> Result<(), BenchError> {
        let group = &*self.group;
        let mut state = group.barrier.lock().unwrap_or_else(PoisonError::into_inner);
        group.signal.check()?;
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == group.size {
            state.arrived = 0;
            state.generation += 1;
            group.barrier_changed.notify_all();
            return Ok(());
        }
        while state.generation == generation {
            group.signal.check()?;
            state = group
                .barrier_changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    fn send<T: Element>(&self, buf: &[T], dest: usize, tag: Tag, mode: SendMode) -> Result<(), BenchError> {
        check_rank(dest, self.size())?;
        self.group.signal.check()?;
        if mode == SendMode::Buffered {
            let mut staging = self.staging.borrow_mut();
            let ledger = staging.as_mut().ok_or(BenchError::NoBufferAttached)?;
            ledger.reserve(StagingLedger::message_bytes::<T>(buf.len()))?;
        }

        let id = self.group.next_id();
        let envelope = Envelope {
            id,
            source: self.rank,
            tag,
            payload: Box::new(buf.to_vec()),
            synchronous: mode == SendMode::Synchronous,
        };
        let mailbox = &self.group.mailboxes[dest];
        match mailbox.deliver(envelope, mode == SendMode::Ready) {
            Delivery::NotPosted => {
                error!(rank = self.rank, dest, tag, "ready send without a posted receive");
                Err(TransportError::ReceiveNotPosted { dest, tag }.into())
            }
            Delivery::Queued if mode == SendMode::Synchronous => {
                debug!(rank = self.rank, dest, tag, "synchronous send waiting for its receive");
                mailbox.wait_matched(id, &self.group.signal)
            }
            Delivery::Matched | Delivery::Queued => Ok(()),
        }
    }

    fn receive<T: Element>(&self, buf: &mut [T], source: usize, tag: Tag) -> Result<(), BenchError> {
        check_rank(source, self.size())?;
        let mailbox = &self.group.mailboxes[self.rank];
        let id = self.group.next_id();
        mailbox.post(id, source, tag);
        let payload = mailbox.wait_posted(id, &self.group.signal)?;
        Self::take_payload(payload, buf)
    }

    fn receive_posted<T: Element>(
        &self,
        buf: &mut [T],
        source: usize,
        tag: Tag,
        meanwhile: &mut dyn FnMut() -> Result<bool, BenchError>,
    ) -> Result<bool, BenchError> {
        check_rank(source, self.size())?;
        let mailbox = &self.group.mailboxes[self.rank];
        let id = self.group.next_id();
        mailbox.post(id, source, tag);
        match meanwhile() {
            Ok(true) => {
                let payload = mailbox.wait_posted(id, &self.group.signal)?;
                Self::take_payload(payload, buf)?;
                Ok(true)
            }
            other => {
                mailbox.cancel(id);
                other
            }
        }
    }

    fn broadcast<T: Element>(&self, buf: &mut [T], root: usize) -> Result<(), BenchError> {
        check_rank(root, self.size())?;
        if self.rank == root {
            for dest in (0..self.size()).filter(|&r| r != root) {
                self.send(buf, dest, COLLECTIVE_TAG, SendMode::Standard)?;
            }
            Ok(())
        } else {
            self.receive(buf, root, COLLECTIVE_TAG)
        }
    }

    fn scatter<T: Element>(&self, global: &[T], out: &mut [T], root: usize) -> Result<(), BenchError> {
        check_rank(root, self.size())?;
        if self.rank != root {
            return self.receive(out, root, COLLECTIVE_TAG);
        }
        let chunk = out.len();
        check_scatter_len(global.len(), chunk, self.size())?;
        for dest in 0..self.size() {
            let block = &global[dest * chunk..(dest + 1) * chunk];
            if dest == root {
                out.copy_from_slice(block);
            } else {
                self.send(block, dest, COLLECTIVE_TAG, SendMode::Standard)?;
            }
        }
        Ok(())
    }

    fn gather<T: Element>(&self, local: &[T], out: &mut [T], root: usize) -> Result<(), BenchError> {
        check_rank(root, self.size())?;
        if self.rank != root {
            return self.send(local, root, COLLECTIVE_TAG, SendMode::Standard);
        }
        let chunk = local.len();
        for source in 0..self.size() {
            let block = &mut out[source * chunk..(source + 1) * chunk];
            if source == root {
                block.copy_from_slice(local);
            } else {
                self.receive(block, source, COLLECTIVE_TAG)?;
            }
        }
        Ok(())
    }

    fn attach_buffer(&self, bytes: usize) -> Result<(), BenchError> {
        let mut staging = self.staging.borrow_mut();
        if staging.is_some() {
            return Err(BenchError::BufferAlreadyAttached);
        }
        if bytes == 0 {
            return Err(BenchError::InvalidBufferSize);
        }
        *staging = Some(StagingLedger::new(bytes));
        Ok(())
    }

    fn detach_buffer(&self) -> Result<StagingLedger, BenchError> {
        self.staging.borrow_mut().take().ok_or(BenchError::NoBufferAttached)
    }

    fn abort(&self, code: i32) {
        error!(rank = self.rank, code, "aborting process group");
        self.group.abort(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_group_is_rejected() {
        assert!(matches!(RayonGroup::new(0), Err(BenchError::Launch(_))));
    }

    #[test]
    fn ranks_see_their_index_and_group_size() {
        let out = RayonGroup::new(3).unwrap().run(|comm| (comm.rank(), comm.size())).unwrap();
        assert_eq!(out, vec![(0, 3), (1, 3), (2, 3)]);
    }

    #[test]
    fn synchronous_send_pairs_with_receive() {
        let out = RayonGroup::new(2)
            .unwrap()
            .run(|comm| {
                let mut buf = [0i32; 3];
                if comm.rank() == 0 {
                    comm.send(&[4, 5, 6], 1, 0, SendMode::Synchronous).map(|_| buf)
                } else {
                    comm.receive(&mut buf, 0, 0).map(|_| buf)
                }
            })
            .unwrap();
        assert_eq!(out[1], Ok([4, 5, 6]));
    }

    #[test]
    fn barrier_can_be_reused() {
        let out = RayonGroup::new(4)
            .unwrap()
            .run(|comm| (0..5).try_for_each(|_| comm.barrier()))
            .unwrap();
        assert!(out.iter().all(Result::is_ok));
    }

    #[test]
    fn buffered_send_requires_an_attached_buffer() {
        let out = RayonGroup::new(1)
            .unwrap()
            .run(|comm| comm.send(&[1i32], 0, 0, SendMode::Buffered))
            .unwrap();
        assert_eq!(out[0], Err(BenchError::NoBufferAttached));
    }

    #[test]
    fn attach_and_detach_pair_exactly_once() {
        let out = RayonGroup::new(1)
            .unwrap()
            .run(|comm| {
                assert_eq!(comm.attach_buffer(0), Err(BenchError::InvalidBufferSize));
                assert_eq!(comm.detach_buffer(), Err(BenchError::NoBufferAttached));
                comm.attach_buffer(1024).unwrap();
                assert_eq!(comm.attach_buffer(1024), Err(BenchError::BufferAlreadyAttached));
                let ledger = comm.detach_buffer().unwrap();
                assert_eq!(comm.detach_buffer(), Err(BenchError::NoBufferAttached));
                ledger.capacity()
            })
            .unwrap();
        assert_eq!(out, vec![1024]);
    }

    #[test]
    fn abort_releases_blocked_ranks() {
        let out = RayonGroup::new(3)
            .unwrap()
            .run(|comm| {
                if comm.rank() == 2 {
                    comm.abort(7);
                    Err(BenchError::Aborted(7))
                } else {
                    let mut buf = [0i32; 1];
                    comm.receive(&mut buf, 2, 0)
                }
            })
            .unwrap();
        assert!(out.iter().all(|r| *r == Err(BenchError::Aborted(7))));
    }

    #[test]
    fn scatter_rejects_a_global_of_the_wrong_length() {
        let out = RayonGroup::new(1)
            .unwrap()
            .run(|comm| {
                let mut empty: [i32; 0] = [];
                let mut pair = [0i32; 2];
                (
                    comm.scatter(&[1, 2, 3], &mut empty, 0),
                    comm.scatter(&[1, 2, 3], &mut pair, 0),
                )
            })
            .unwrap();
        let (empty_out, short_out) = &out[0];
        assert_eq!(*empty_out, Err(TransportError::Truncated { len: 3, capacity: 0 }.into()));
        assert_eq!(*short_out, Err(TransportError::Truncated { len: 3, capacity: 2 }.into()));
    }

    #[test]
    fn scatter_of_empty_chunks_reaches_every_rank() {
        let out = RayonGroup::new(3)
            .unwrap()
            .run(|comm| {
                let mut chunk: [i32; 0] = [];
                comm.scatter(&[], &mut chunk, 0)
            })
            .unwrap();
        assert!(out.iter().all(Result::is_ok));
    }

    #[test]
    fn receive_rejects_oversized_message() {
        let out = RayonGroup::new(2)
            .unwrap()
            .run(|comm| {
                if comm.rank() == 0 {
                    comm.send(&[1i32, 2, 3], 1, 0, SendMode::Standard)
                } else {
                    let mut buf = [0i32; 2];
                    comm.receive(&mut buf, 0, 0)
                }
            })
            .unwrap();
        assert_eq!(out[1], Err(TransportError::Truncated { len: 3, capacity: 2 }.into()));
    }
}
