//! Local compute kernel and the sequential reference product.

use crate::core::traits::Element;
use crate::error::BenchError;
use crate::matrix::DenseMatrix;

/// Row-block product: `c_block = a_block · b`.
///
/// `a_block` and `c_block` hold `rows × order` entries row-major, `b` is the
/// full `order × order` operand. The output block is overwritten, never
/// accumulated into.
pub fn multiply_row_block<T: Element>(a_block: &[T], b: &[T], order: usize, c_block: &mut [T]) {
    assert_eq!(b.len(), order * order);
    assert_eq!(a_block.len(), c_block.len());
    if order == 0 {
        return;
    }
    assert_eq!(a_block.len() % order, 0);

    c_block.fill(T::zero());
    // i-k-j order keeps the inner loop unit-stride over both b and c
    for (a_row, c_row) in a_block.chunks_exact(order).zip(c_block.chunks_exact_mut(order)) {
        for (k, &a_ik) in a_row.iter().enumerate() {
            if a_ik.is_zero() {
                continue;
            }
            let b_row = &b[k * order..(k + 1) * order];
            for (c_ij, &b_kj) in c_row.iter_mut().zip(b_row) {
                *c_ij = *c_ij + a_ik * b_kj;
            }
        }
    }
}

/// Single-process product of two full matrices.
///
/// Runs the same kernel as the workers over all rows at once; used as the
/// oracle the distributed result is checked against.
pub fn multiply_sequential<T: Element>(
    a: &DenseMatrix<T>,
    b: &DenseMatrix<T>,
) -> Result<DenseMatrix<T>, BenchError> {
    if a.order() != b.order() {
        return Err(BenchError::InvalidMatrix(format!(
            "operand orders differ: {} vs {}",
            a.order(),
            b.order()
        )));
    }
    let n = a.order();
    let mut c = DenseMatrix::zeros(n);
    multiply_row_block(a.as_slice(), b.as_slice(), n, c.as_mut_slice());
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_block_matches_hand_computation() {
        // A block = [[1,2],[3,4]], B = [[5,6],[7,8]]
        let a = [1i32, 2, 3, 4];
        let b = [5i32, 6, 7, 8];
        let mut c = [99i32; 4];
        multiply_row_block(&a, &b, 2, &mut c);
        assert_eq!(c, [19, 22, 43, 50]);
    }

    #[test]
    fn partial_block_uses_full_b() {
        // one row of a 3x3 product
        let a_row = [1i64, 0, 2];
        let b = [1i64, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut c = [0i64; 3];
        multiply_row_block(&a_row, &b, 3, &mut c);
        assert_eq!(c, [15, 18, 21]);
    }

    #[test]
    fn sequential_identity_is_neutral() {
        let a = DenseMatrix::from_raw(3, (1..=9).collect::<Vec<i32>>()).unwrap();
        let id = DenseMatrix::identity(3);
        assert_eq!(multiply_sequential(&a, &id).unwrap(), a);
        assert_eq!(multiply_sequential(&id, &a).unwrap(), a);
    }

    #[test]
    fn sequential_rejects_mismatched_orders() {
        let a = DenseMatrix::<i32>::zeros(2);
        let b = DenseMatrix::<i32>::zeros(3);
        assert!(matches!(multiply_sequential(&a, &b), Err(BenchError::InvalidMatrix(_))));
    }
}
