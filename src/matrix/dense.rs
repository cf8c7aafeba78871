//! Dense square matrix stored row-major.
//!
//! Row blocks are contiguous: block `i` of size `b` is rows `[i*b, (i+1)*b)`,
//! which is exactly the slice `data[i*b*n .. (i+1)*b*n]`. Distribution and
//! gather work directly on these slices.

use std::ops::{Index, IndexMut};

use rand::Rng;

use crate::core::traits::Element;
use crate::error::BenchError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenseMatrix<T> {
    order: usize,
    data: Vec<T>,
}

impl<T: Element> DenseMatrix<T> {
    pub fn zeros(order: usize) -> Self {
        Self { order, data: vec![T::zero(); order * order] }
    }

    pub fn identity(order: usize) -> Self {
        let mut m = Self::zeros(order);
        for i in 0..order {
            m[(i, i)] = T::one();
        }
        m
    }

    /// Construct from raw row-major storage of `order * order` entries.
    pub fn from_raw(order: usize, data: Vec<T>) -> Result<Self, BenchError> {
        if data.len() != order * order {
            return Err(BenchError::InvalidMatrix(format!(
                "expected {} entries for order {order}, got {}",
                order * order,
                data.len()
            )));
        }
        Ok(Self { order, data })
    }

    /// Construct from a list of rows; every row must be as long as the list.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self, BenchError> {
        let order = rows.len();
        if let Some(row) = rows.iter().find(|r| r.len() != order) {
            return Err(BenchError::InvalidMatrix(format!(
                "row of length {} in a matrix of order {order}",
                row.len()
            )));
        }
        Ok(Self { order, data: rows.concat() })
    }

    /// Entries drawn uniformly from `0..=max_value`.
    pub fn random<R: Rng + ?Sized>(order: usize, max_value: u32, rng: &mut R) -> Result<Self, BenchError> {
        let data = (0..order * order)
            .map(|_| {
                let v = rng.gen_range(0..=max_value);
                <T as num_traits::NumCast>::from(v).ok_or_else(|| {
                    BenchError::InvalidMatrix(format!("entry {v} does not fit the element type"))
                })
            })
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Self { order, data })
    }
}

impl<T> DenseMatrix<T> {
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<T> {
        self.data
    }

    /// Rows `[index*block_size, (index+1)*block_size)` as one slice.
    pub fn row_block(&self, index: usize, block_size: usize) -> &[T] {
        let len = block_size * self.order;
        &self.data[index * len..(index + 1) * len]
    }

    pub fn row_block_mut(&mut self, index: usize, block_size: usize) -> &mut [T] {
        let len = block_size * self.order;
        &mut self.data[index * len..(index + 1) * len]
    }
}

impl<T> Index<(usize, usize)> for DenseMatrix<T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.data[i * self.order + j]
    }
}

impl<T> IndexMut<(usize, usize)> for DenseMatrix<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        &mut self.data[i * self.order + j]
    }
}
