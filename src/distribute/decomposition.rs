//! Row-block decomposition of an order-N matrix over P ranks.

use std::ops::Range;

use tracing::error;

use crate::error::BenchError;
use crate::parallel::Comm;

/// Even split of N rows into P blocks of `block_size = N / P` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decomposition {
    pub order: usize,
    pub workers: usize,
    pub block_size: usize,
}

impl Decomposition {
    /// Fails unless `order` is evenly divisible by `workers`.
    pub fn new(order: usize, workers: usize) -> Result<Self, BenchError> {
        if workers == 0 || order % workers != 0 {
            return Err(BenchError::Indivisible { order, workers });
        }
        Ok(Self { order, workers, block_size: order / workers })
    }

    /// Entries in one row block.
    pub fn block_len(&self) -> usize {
        self.block_size * self.order
    }

    /// Rows owned by `rank`.
    pub fn rows(&self, rank: usize) -> Range<usize> {
        rank * self.block_size..(rank + 1) * self.block_size
    }
}

/// Validates the split for this group. Every rank reports a failure and
/// aborts the whole group; there is no defined behaviour for uneven blocks.
pub fn validate_or_abort<C: Comm>(comm: &C, order: usize) -> Result<Decomposition, BenchError> {
    Decomposition::new(order, comm.size()).map_err(|e| {
        error!(rank = comm.rank(), order, workers = comm.size(), "{e}");
        comm.abort(1);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_yields_block_size() {
        let d = Decomposition::new(768, 4).unwrap();
        assert_eq!(d.block_size, 192);
        assert_eq!(d.block_len(), 192 * 768);
        assert_eq!(d.rows(3), 576..768);
    }

    #[test]
    fn uneven_split_is_rejected() {
        assert_eq!(
            Decomposition::new(3, 2),
            Err(BenchError::Indivisible { order: 3, workers: 2 })
        );
        assert!(Decomposition::new(4, 0).is_err());
    }

    #[test]
    fn single_rank_owns_everything() {
        let d = Decomposition::new(5, 1).unwrap();
        assert_eq!(d.rows(0), 0..5);
    }
}
