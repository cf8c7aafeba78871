//! Distributed row-block matrix multiplication.
//!
//! Per configuration every rank runs the same sequence:
//!
//! 1. validate the decomposition (failure aborts the group);
//! 2. workers post their row-block receive; in ready mode all ranks then meet
//!    at a barrier so no ready send can overtake a receive;
//! 3. the coordinator sends one row block of A per worker through the
//!    selected [`RowBlockTransfer`] (buffered mode attaches the staging
//!    buffer first) and keeps its own block locally;
//! 4. the coordinator broadcasts whether distribution succeeded and how many
//!    blocks it sent; workers whose block was sent complete their receive,
//!    the rest cancel it, so no block is left in flight on failure;
//! 5. B is broadcast, every rank multiplies its block, C is gathered;
//! 6. the coordinator detaches the staging buffer, if any.

pub mod collective;
pub mod decomposition;
pub mod staging;
pub mod transfer;

pub use collective::{broadcast_operand, gather_result};
pub use decomposition::{Decomposition, validate_or_abort};
pub use staging::StagingBuffer;
pub use transfer::{
    BufferedTransfer, ReadyTransfer, RowBlockTransfer, SynchronousTransfer, select_transfer,
};

use tracing::{debug, error};

use crate::config::TransferMode;
use crate::core::kernel::multiply_row_block;
use crate::core::traits::Element;
use crate::error::BenchError;
use crate::matrix::DenseMatrix;
use crate::parallel::{Comm, ROW_BLOCK_TAG, StagingLedger};

const DISTRIBUTION_OK: u64 = 0;
const DISTRIBUTION_FAILED: u64 = 1;

/// What one rank holds after a distributed multiply.
#[derive(Debug)]
pub struct DistributedProduct<T> {
    /// A×B, present only at the coordinator.
    pub result: Option<DenseMatrix<T>>,
    /// Final staging accounting for buffered mode, coordinator only.
    pub staging: Option<StagingLedger>,
}

/// Computes A×B across the group.
///
/// The coordinator passes `Some((a, b))`; workers pass `None`. The staging
/// buffer for buffered mode is sized from the decomposition, minus
/// `staging_shortfall` bytes.
///
/// Missing or misshapen operands at the coordinator abort the group, since
/// the workers are already waiting for their row blocks.
pub fn multiply_distributed<C: Comm, T: Element>(
    comm: &C,
    mode: TransferMode,
    order: usize,
    operands: Option<(&DenseMatrix<T>, &DenseMatrix<T>)>,
    staging_shortfall: usize,
) -> Result<DistributedProduct<T>, BenchError> {
    let decomp = validate_or_abort(comm, order)?;
    let mut local_a = vec![T::zero(); decomp.block_len()];

    if !comm.is_coordinator() {
        receive_row_block(comm, mode, &mut local_a)?;
        let mut b = vec![T::zero(); order * order];
        compute_and_gather(comm, &decomp, &local_a, &mut b, None)?;
        return Ok(DistributedProduct { result: None, staging: None });
    }

    let (a, b) = checked_operands(operands, order).map_err(|e| {
        error!(rank = comm.rank(), order, "{e}");
        comm.abort(1);
        e
    })?;

    if mode.needs_posted_receives() {
        comm.barrier()?;
    }
    let mut staging = None;
    let mut delivered = 0;
    let sent = send_row_blocks(
        comm,
        mode,
        &decomp,
        a,
        &mut staging,
        staging_shortfall,
        &mut delivered,
    );
    let mut status = [
        match &sent {
            Ok(()) => DISTRIBUTION_OK,
            Err(_) => DISTRIBUTION_FAILED,
        },
        delivered as u64,
    ];
    comm.broadcast(&mut status, 0)?;
    if let Err(e) = &sent {
        error!(rank = comm.rank(), %mode, order, "row-block distribution failed: {e}");
    }

    let product = sent.and_then(|()| {
        local_a.copy_from_slice(a.row_block(0, decomp.block_size));
        let mut b_local = b.as_slice().to_vec();
        let mut c = DenseMatrix::zeros(order);
        compute_and_gather(comm, &decomp, &local_a, &mut b_local, Some(&mut c))?;
        Ok(c)
    });

    let ledger = staging.map(|s| s.detach(comm)).transpose()?;
    product.map(|c| DistributedProduct { result: Some(c), staging: ledger })
}

fn checked_operands<'a, T: Element>(
    operands: Option<(&'a DenseMatrix<T>, &'a DenseMatrix<T>)>,
    order: usize,
) -> Result<(&'a DenseMatrix<T>, &'a DenseMatrix<T>), BenchError> {
    let (a, b) = operands.ok_or_else(|| {
        BenchError::InvalidMatrix("the coordinator must supply both operands".into())
    })?;
    if a.order() != order || b.order() != order {
        return Err(BenchError::InvalidMatrix(format!(
            "operands of order {} and {} for a run of order {order}",
            a.order(),
            b.order()
        )));
    }
    Ok((a, b))
}

/// Coordinator side of step 3. Leaves the attached staging buffer in
/// `staging` even when a send fails, so the caller can detach it, and counts
/// the blocks handed to the transport in `delivered`.
fn send_row_blocks<C: Comm, T: Element>(
    comm: &C,
    mode: TransferMode,
    decomp: &Decomposition,
    a: &DenseMatrix<T>,
    staging: &mut Option<StagingBuffer>,
    staging_shortfall: usize,
    delivered: &mut usize,
) -> Result<(), BenchError> {
    if mode == TransferMode::Buffered {
        let bytes = StagingBuffer::required_bytes::<T>(decomp).saturating_sub(staging_shortfall);
        *staging = Some(StagingBuffer::attach(comm, bytes)?);
    }
    let mut transfer = select_transfer::<C, T>(mode, staging.as_ref())?;
    for dest in 1..decomp.workers {
        debug!(rank = comm.rank(), dest, %mode, "sending row block");
        transfer.send_block(comm, a.row_block(dest, decomp.block_size), dest)?;
        *delivered += 1;
    }
    Ok(())
}

/// Worker side of steps 2 and 4.
///
/// A block the coordinator already sent is received and dropped even when
/// distribution failed; cancelling it could leave it queued for the next
/// configuration's receive.
fn receive_row_block<C: Comm, T: Element>(
    comm: &C,
    mode: TransferMode,
    local_a: &mut [T],
) -> Result<(), BenchError> {
    let mut status = [DISTRIBUTION_OK, 0];
    let completed = {
        let mut agree = || -> Result<bool, BenchError> {
            if mode.needs_posted_receives() {
                comm.barrier()?;
            }
            comm.broadcast(&mut status, 0)?;
            Ok(comm.rank() as u64 <= status[1])
        };
        comm.receive_posted(local_a, 0, ROW_BLOCK_TAG, &mut agree)?
    };
    if status[0] == DISTRIBUTION_OK {
        return Ok(());
    }
    debug!(rank = comm.rank(), completed, "discarding row block of a failed distribution");
    Err(BenchError::DistributionFailed)
}

fn compute_and_gather<C: Comm, T: Element>(
    comm: &C,
    decomp: &Decomposition,
    local_a: &[T],
    b: &mut [T],
    result: Option<&mut DenseMatrix<T>>,
) -> Result<(), BenchError> {
    broadcast_operand(comm, b)?;
    let mut local_c = vec![T::zero(); decomp.block_len()];
    multiply_row_block(local_a, b, decomp.order, &mut local_c);
    gather_result(comm, &local_c, result)
}
