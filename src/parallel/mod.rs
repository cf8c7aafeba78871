//! Process-group communication.
//!
//! [`Comm`] is the context every component receives explicitly: it carries the
//! rank, the group size and the communication handle. Two backends implement
//! it:
//!
//! - [`RayonComm`] (feature `rayon`): every rank is a thread of a dedicated
//!   rayon pool, exchanging messages through per-rank mailboxes.
//! - [`MpiComm`] (feature `mpi`): one rank per MPI process.
//!
//! All calls are blocking from the caller's point of view. Every rank must
//! issue the same collective calls in the same order, otherwise the group
//! deadlocks.

use std::mem;

use crate::core::traits::Element;
use crate::error::{BenchError, TransportError};

#[cfg(not(any(feature = "mpi", feature = "rayon")))]
compile_error!("enable at least one of the `rayon` or `mpi` features");

/// Message tag.
pub type Tag = i32;

/// Tag carrying row blocks of the first operand.
pub const ROW_BLOCK_TAG: Tag = 0;

/// Per-message staging overhead, in elements, charged by every buffered send.
pub const BUFFERED_SEND_OVERHEAD: usize = 96;

/// Point-to-point completion discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Transport picks; used for collective plumbing.
    Standard,
    /// Returns once the matching receive has started.
    Synchronous,
    /// The matching receive must already be posted.
    Ready,
    /// Copies into the attached staging buffer and returns.
    Buffered,
}

/// Accounting for the staging buffer attached to one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingLedger {
    capacity: usize,
    used: usize,
    messages: usize,
}

impl StagingLedger {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, used: 0, messages: 0 }
    }

    /// Staging bytes one buffered send of `len` elements occupies.
    pub fn message_bytes<T>(len: usize) -> usize {
        (len + BUFFERED_SEND_OVERHEAD) * mem::size_of::<T>()
    }

    /// Charges one message; sends must fit cumulatively until detach.
    pub fn reserve(&mut self, bytes: usize) -> Result<(), TransportError> {
        let available = self.available();
        if bytes > available {
            return Err(TransportError::BufferOverflow {
                needed: bytes,
                available,
                capacity: self.capacity,
            });
        }
        self.used += bytes;
        self.messages += 1;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn used(&self) -> usize {
        self.used
    }
    pub fn messages(&self) -> usize {
        self.messages
    }
    pub fn available(&self) -> usize {
        self.capacity - self.used
    }
}

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    /// Blocks until every rank has called it.
    fn barrier(&self) -> Result<(), BenchError>;

    /// Sends `buf` to `dest` with the given completion discipline. When this
    /// returns, `buf` may be reused.
    fn send<T: Element>(&self, buf: &[T], dest: usize, tag: Tag, mode: SendMode) -> Result<(), BenchError>;

    /// Blocking receive of a message no longer than `buf`.
    fn receive<T: Element>(&self, buf: &mut [T], source: usize, tag: Tag) -> Result<(), BenchError>;

    /// Posts a receive into `buf`, runs `meanwhile`, then completes the
    /// receive if it returned `true` or cancels it otherwise.
    ///
    /// Returns whether the receive was completed.
    fn receive_posted<T: Element>(
        &self,
        buf: &mut [T],
        source: usize,
        tag: Tag,
        meanwhile: &mut dyn FnMut() -> Result<bool, BenchError>,
    ) -> Result<bool, BenchError>;

    /// `root`'s `buf` ends up in every rank's `buf`.
    fn broadcast<T: Element>(&self, buf: &mut [T], root: usize) -> Result<(), BenchError>;

    /// Chunk `i` of `global` (only read at `root`) lands in rank `i`'s `out`.
    /// The root fails with [`TransportError::Truncated`] unless `global`
    /// holds exactly `size()` chunks of `out.len()` entries.
    fn scatter<T: Element>(&self, global: &[T], out: &mut [T], root: usize) -> Result<(), BenchError>;

    /// Rank `i`'s `local` lands in chunk `i` of `out` at `root`. Non-root
    /// ranks pass an empty `out`.
    fn gather<T: Element>(&self, local: &[T], out: &mut [T], root: usize) -> Result<(), BenchError>;

    /// Attaches a staging buffer for buffered sends on this rank.
    fn attach_buffer(&self, bytes: usize) -> Result<(), BenchError>;

    /// Detaches the staging buffer, returning its final accounting.
    fn detach_buffer(&self) -> Result<StagingLedger, BenchError>;

    /// Terminates every rank of the group. MPI never returns from this; the
    /// in-process backend returns and every blocked rank fails with
    /// [`BenchError::Aborted`].
    fn abort(&self, code: i32);
}

pub(crate) fn check_rank(rank: usize, size: usize) -> Result<(), BenchError> {
    if rank >= size {
        return Err(TransportError::InvalidRank { rank, size }.into());
    }
    Ok(())
}

/// Root-side check that `global` splits into exactly one `chunk` per rank.
pub(crate) fn check_scatter_len(len: usize, chunk: usize, size: usize) -> Result<(), BenchError> {
    if len != chunk * size {
        return Err(TransportError::Truncated { len, capacity: chunk * size }.into());
    }
    Ok(())
}

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

#[cfg(feature = "rayon")]
mod mailbox;
#[cfg(feature = "rayon")]
pub mod rayon_comm;
#[cfg(feature = "rayon")]
pub use rayon_comm::{RayonComm, RayonGroup};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_charges_payload_plus_overhead() {
        assert_eq!(StagingLedger::message_bytes::<i32>(8), (8 + BUFFERED_SEND_OVERHEAD) * 4);
        let mut ledger = StagingLedger::new(2 * StagingLedger::message_bytes::<i32>(8));
        ledger.reserve(StagingLedger::message_bytes::<i32>(8)).unwrap();
        ledger.reserve(StagingLedger::message_bytes::<i32>(8)).unwrap();
        assert_eq!(ledger.available(), 0);
        assert_eq!(ledger.messages(), 2);
    }

    #[test]
    fn ledger_rejects_cumulative_overflow() {
        let one = StagingLedger::message_bytes::<i32>(4);
        let mut ledger = StagingLedger::new(2 * one - 1);
        ledger.reserve(one).unwrap();
        let err = ledger.reserve(one).unwrap_err();
        assert_eq!(
            err,
            TransportError::BufferOverflow { needed: one, available: one - 1, capacity: 2 * one - 1 }
        );
        assert_eq!(ledger.messages(), 1);
    }
}
