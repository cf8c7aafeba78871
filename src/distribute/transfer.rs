//! Row-block transfer strategies.
//!
//! Each strategy delivers one row block of A from the coordinator to one
//! worker. All three share the same contract: when `send_block` returns, the
//! block's memory may be reused. They differ in when the transport actually
//! moves the data and in what they demand of the receiver.

use tracing::debug;

use crate::config::TransferMode;
use crate::core::traits::Element;
use crate::distribute::staging::StagingBuffer;
use crate::error::BenchError;
use crate::parallel::{Comm, ROW_BLOCK_TAG, SendMode};

pub trait RowBlockTransfer<C: Comm, T: Element> {
    fn mode(&self) -> TransferMode;

    /// Delivers `block` to rank `dest`.
    fn send_block(&mut self, comm: &C, block: &[T], dest: usize) -> Result<(), BenchError>;
}

/// Completes once the worker's receive has matched the block.
#[derive(Debug, Default)]
pub struct SynchronousTransfer;

impl<C: Comm, T: Element> RowBlockTransfer<C, T> for SynchronousTransfer {
    fn mode(&self) -> TransferMode {
        TransferMode::Synchronous
    }

    fn send_block(&mut self, comm: &C, block: &[T], dest: usize) -> Result<(), BenchError> {
        comm.send(block, dest, ROW_BLOCK_TAG, SendMode::Synchronous)
    }
}

/// Requires the worker's receive to be posted already; callers must order
/// every receive before the first send.
#[derive(Debug, Default)]
pub struct ReadyTransfer;

impl<C: Comm, T: Element> RowBlockTransfer<C, T> for ReadyTransfer {
    fn mode(&self) -> TransferMode {
        TransferMode::Ready
    }

    fn send_block(&mut self, comm: &C, block: &[T], dest: usize) -> Result<(), BenchError> {
        comm.send(block, dest, ROW_BLOCK_TAG, SendMode::Ready)
    }
}

/// Copies into the attached staging buffer and returns immediately.
///
/// Borrowing the [`StagingBuffer`] keeps every buffered send inside the
/// attach/detach window.
#[derive(Debug)]
pub struct BufferedTransfer<'a> {
    staging: &'a StagingBuffer,
}

impl<'a> BufferedTransfer<'a> {
    pub fn new(staging: &'a StagingBuffer) -> Self {
        Self { staging }
    }
}

impl<C: Comm, T: Element> RowBlockTransfer<C, T> for BufferedTransfer<'_> {
    fn mode(&self) -> TransferMode {
        TransferMode::Buffered
    }

    fn send_block(&mut self, comm: &C, block: &[T], dest: usize) -> Result<(), BenchError> {
        debug!(
            rank = comm.rank(),
            dest,
            capacity = self.staging.capacity(),
            "buffered row-block send"
        );
        comm.send(block, dest, ROW_BLOCK_TAG, SendMode::Buffered)
    }
}

/// Strategy for `mode`. Buffered mode needs the attached staging buffer.
pub fn select_transfer<'a, C: Comm, T: Element>(
    mode: TransferMode,
    staging: Option<&'a StagingBuffer>,
) -> Result<Box<dyn RowBlockTransfer<C, T> + 'a>, BenchError> {
    match mode {
        TransferMode::Synchronous => Ok(Box::new(SynchronousTransfer)),
        TransferMode::Ready => Ok(Box::new(ReadyTransfer)),
        TransferMode::Buffered => {
            let staging = staging.ok_or(BenchError::NoBufferAttached)?;
            Ok(Box::new(BufferedTransfer::new(staging)))
        }
    }
}

#[cfg(all(test, feature = "rayon"))]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::parallel::{RayonComm, RayonGroup};

    #[test]
    fn strategies_report_their_mode() {
        let out = RayonGroup::new(1)
            .unwrap()
            .run(|comm| {
                let staging = StagingBuffer::attach(&comm, 64).unwrap();
                let modes: Vec<_> = TransferMode::ALL
                    .into_iter()
                    .map(|mode| {
                        select_transfer::<RayonComm, i32>(mode, Some(&staging))
                            .unwrap()
                            .mode()
                    })
                    .collect();
                staging.detach(&comm).unwrap();
                modes
            })
            .unwrap();
        assert_eq!(out[0], TransferMode::ALL.to_vec());
    }

    #[test]
    fn buffered_selection_needs_a_staging_buffer() {
        let res = select_transfer::<RayonComm, i32>(TransferMode::Buffered, None);
        assert!(matches!(res, Err(BenchError::NoBufferAttached)));
    }

    #[test]
    fn ready_send_before_receive_is_detected() {
        let out = RayonGroup::new(2)
            .unwrap()
            .run(|comm| {
                let res = if comm.rank() == 0 {
                    let mut t = ReadyTransfer;
                    RowBlockTransfer::<_, i32>::send_block(&mut t, &comm, &[1, 2], 1)
                } else {
                    Ok(())
                };
                comm.barrier().unwrap();
                res
            })
            .unwrap();
        assert_eq!(
            out[0],
            Err(TransportError::ReceiveNotPosted { dest: 1, tag: ROW_BLOCK_TAG }.into())
        );
    }
}
