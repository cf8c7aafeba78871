//! Broadcast of the second operand and gather of the result blocks.

use crate::core::traits::Element;
use crate::error::BenchError;
use crate::matrix::DenseMatrix;
use crate::parallel::Comm;

/// Coordinator's `b` becomes byte-identical on every rank. No rank returns
/// before it holds all of B.
pub fn broadcast_operand<C: Comm, T: Element>(comm: &C, b: &mut [T]) -> Result<(), BenchError> {
    comm.broadcast(b, 0)
}

/// Assembles every rank's result block into `result` at the coordinator in
/// rank order: rank `i`'s block becomes rows `[i*bs, (i+1)*bs)`. Workers
/// pass `None`.
pub fn gather_result<C: Comm, T: Element>(
    comm: &C,
    local_c: &[T],
    result: Option<&mut DenseMatrix<T>>,
) -> Result<(), BenchError> {
    match result {
        Some(c) => {
            let expected = local_c.len() * comm.size();
            if c.as_slice().len() != expected {
                return Err(BenchError::InvalidMatrix(format!(
                    "result holds {} entries, gather needs {expected}",
                    c.as_slice().len()
                )));
            }
            comm.gather(local_c, c.as_mut_slice(), 0)
        }
        None => comm.gather(local_c, &mut [], 0),
    }
}
