//! Staging buffer lifecycle for buffered-mode distribution.
//!
//! A [`StagingBuffer`] value exists exactly while a buffer is attached to
//! the coordinator: [`StagingBuffer::attach`] creates it and
//! [`StagingBuffer::detach`] consumes it, so a configuration cannot detach
//! twice. Attaching while another buffer is attached is rejected by the
//! transport.

use tracing::info;

use crate::distribute::decomposition::Decomposition;
use crate::error::BenchError;
use crate::parallel::{Comm, StagingLedger};

#[derive(Debug)]
pub struct StagingBuffer {
    capacity: usize,
}

impl StagingBuffer {
    /// Bytes needed for one buffered row block per non-coordinator rank.
    ///
    /// A single-rank group sends nothing but still gets one message of
    /// headroom so attach and detach pair up.
    pub fn required_bytes<T>(decomp: &Decomposition) -> usize {
        let messages = decomp.workers.saturating_sub(1).max(1);
        StagingLedger::message_bytes::<T>(decomp.block_len()) * messages
    }

    pub fn attach<C: Comm>(comm: &C, bytes: usize) -> Result<Self, BenchError> {
        comm.attach_buffer(bytes)?;
        info!(rank = comm.rank(), bytes, "staging buffer attached");
        Ok(Self { capacity: bytes })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Releases the buffer and returns its final accounting.
    pub fn detach<C: Comm>(self, comm: &C) -> Result<StagingLedger, BenchError> {
        let ledger = comm.detach_buffer()?;
        info!(
            rank = comm.rank(),
            capacity = ledger.capacity(),
            used = ledger.used(),
            messages = ledger.messages(),
            "staging buffer detached"
        );
        Ok(ledger)
    }
}
