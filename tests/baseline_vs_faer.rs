//! Cross-checks the integer kernels against faer's floating-point product.
//!
//! Entries are small enough that every partial sum is exactly representable
//! in f64, so the comparison is exact.

use faer::Mat;
use matmul_modes::core::{multiply_row_block, multiply_sequential};
use matmul_modes::matrix::DenseMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn to_faer(m: &DenseMatrix<i32>) -> Mat<f64> {
    let n = m.order();
    Mat::from_fn(n, n, |i, j| m[(i, j)] as f64)
}

#[test]
fn sequential_baseline_matches_faer() {
    let mut rng = StdRng::seed_from_u64(2024);
    for n in [1, 2, 7, 16, 33] {
        let a = DenseMatrix::<i32>::random(n, 9, &mut rng).unwrap();
        let b = DenseMatrix::<i32>::random(n, 9, &mut rng).unwrap();
        let c = multiply_sequential(&a, &b).unwrap();
        let reference = &to_faer(&a) * &to_faer(&b);
        for i in 0..n {
            for j in 0..n {
                assert_eq!(c[(i, j)] as f64, reference[(i, j)], "order {n} at ({i}, {j})");
            }
        }
    }
}

/// Row blocks computed independently stitch together into the full product.
#[test]
fn row_blocks_stitch_into_the_full_product() {
    let n = 12;
    let mut rng = StdRng::seed_from_u64(5);
    let a = DenseMatrix::<i32>::random(n, 9, &mut rng).unwrap();
    let b = DenseMatrix::<i32>::random(n, 9, &mut rng).unwrap();
    let full = multiply_sequential(&a, &b).unwrap();
    for p in [1, 2, 3, 4, 6, 12] {
        let bs = n / p;
        let mut stitched = DenseMatrix::<i32>::zeros(n);
        for rank in 0..p {
            multiply_row_block(
                a.row_block(rank, bs),
                b.as_slice(),
                n,
                stitched.row_block_mut(rank, bs),
            );
        }
        assert_eq!(stitched, full, "P={p}");
    }
}
