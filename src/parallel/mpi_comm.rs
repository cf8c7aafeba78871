//! MPI-based process-group communication.
//!
//! This module provides an implementation of the `Comm` trait on top of the
//! `mpi` crate, one rank per MPI process. Point-to-point transfers map onto
//! the matching MPI send flavours (`MPI_Ssend`, `MPI_Rsend`, `MPI_Bsend`),
//! collectives onto MPI collectives, the staging buffer onto the universe's
//! attached buffered-send buffer, and abort onto `MPI_Abort`.
//!
//! The staging ledger is consulted before every buffered send so that an
//! undersized buffer surfaces as a [`crate::error::TransportError::BufferOverflow`] rather
//! than tripping MPI's fatal error handler.
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # {
//! use matmul_modes::parallel::{Comm, MpiComm};
//! let comm = MpiComm::new().unwrap();
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier().unwrap();
//! # }
//! ```

use std::cell::RefCell;

use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use tracing::debug;

use super::{Comm, SendMode, StagingLedger, Tag, check_rank, check_scatter_len};
use crate::core::traits::Element;
use crate::error::BenchError;

/// MPI world communicator wrapper.
///
/// Owns the MPI universe, so MPI is finalized when this is dropped.
pub struct MpiComm {
    universe: RefCell<Universe>,
    /// The MPI world communicator (all processes in the job).
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    staging: RefCell<Option<StagingLedger>>,
}

impl MpiComm {
    /// Initializes MPI and wraps the world communicator.
    pub fn new() -> Result<Self, BenchError> {
        let universe = mpi::initialize()
            .ok_or_else(|| BenchError::Launch("MPI has already been initialized".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm {
            universe: RefCell::new(universe),
            world,
            rank,
            size,
            staging: RefCell::new(None),
        })
    }
}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn barrier(&self) -> Result<(), BenchError> {
        self.world.barrier();
        Ok(())
    }

    fn send<T: Element>(&self, buf: &[T], dest: usize, tag: Tag, mode: SendMode) -> Result<(), BenchError> {
        check_rank(dest, self.size)?;
        let process = self.world.process_at_rank(dest as i32);
        match mode {
            SendMode::Standard => process.send_with_tag(buf, tag),
            SendMode::Synchronous => process.synchronous_send_with_tag(buf, tag),
            SendMode::Ready => process.ready_send_with_tag(buf, tag),
            SendMode::Buffered => {
                let mut staging = self.staging.borrow_mut();
                let ledger = staging.as_mut().ok_or(BenchError::NoBufferAttached)?;
                ledger.reserve(StagingLedger::message_bytes::<T>(buf.len()))?;
                process.buffered_send_with_tag(buf, tag)
            }
        }
        Ok(())
    }

    fn receive<T: Element>(&self, buf: &mut [T], source: usize, tag: Tag) -> Result<(), BenchError> {
        check_rank(source, self.size)?;
        self.world
            .process_at_rank(source as i32)
            .receive_into_with_tag(buf, tag);
        Ok(())
    }

    fn receive_posted<T: Element>(
        &self,
        buf: &mut [T],
        source: usize,
        tag: Tag,
        meanwhile: &mut dyn FnMut() -> Result<bool, BenchError>,
    ) -> Result<bool, BenchError> {
        check_rank(source, self.size)?;
        let process = self.world.process_at_rank(source as i32);
        mpi::request::scope(|scope| {
            let request = process.immediate_receive_into_with_tag(scope, buf, tag);
            match meanwhile() {
                Ok(true) => {
                    request.wait();
                    Ok(true)
                }
                other => {
                    request.cancel();
                    request.wait();
                    other
                }
            }
        })
    }

    fn broadcast<T: Element>(&self, buf: &mut [T], root: usize) -> Result<(), BenchError> {
        check_rank(root, self.size)?;
        self.world.process_at_rank(root as i32).broadcast_into(buf);
        Ok(())
    }

    fn scatter<T: Element>(&self, global: &[T], out: &mut [T], root: usize) -> Result<(), BenchError> {
        check_rank(root, self.size)?;
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank == root {
            check_scatter_len(global.len(), out.len(), self.size)?;
            root_process.scatter_into_root(global, out);
        } else {
            root_process.scatter_into(out);
        }
        Ok(())
    }

    fn gather<T: Element>(&self, local: &[T], out: &mut [T], root: usize) -> Result<(), BenchError> {
        check_rank(root, self.size)?;
        let root_process = self.world.process_at_rank(root as i32);
        if self.rank == root {
            root_process.gather_into_root(local, out);
        } else {
            root_process.gather_into(local);
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
        self.universe.borrow_mut().set_buffer_size(bytes);
        debug!(rank = self.rank, bytes, "MPI buffered-send buffer attached");
        *staging = Some(StagingLedger::new(bytes));
        Ok(())
    }

    fn detach_buffer(&self) -> Result<StagingLedger, BenchError> {
        let ledger = self.staging.borrow_mut().take().ok_or(BenchError::NoBufferAttached)?;
        // blocks until every buffered message has left the buffer
        self.universe.borrow_mut().detach_buffer();
        Ok(ledger)
    }

    fn abort(&self, code: i32) {
        self.world.abort(code)
    }
}
