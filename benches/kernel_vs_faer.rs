use criterion::{black_box, Criterion, criterion_group, criterion_main};
use faer::Mat;
use matmul_modes::config::TransferMode;
use matmul_modes::core::multiply_sequential;
use matmul_modes::distribute::multiply_distributed;
use matmul_modes::matrix::DenseMatrix;
use matmul_modes::parallel::{Comm, RayonGroup};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn bench_kernel_vs_faer(c: &mut Criterion) {
    let n = 192;
    let mut rng = StdRng::seed_from_u64(0);
    let a = DenseMatrix::<i32>::random(n, 9, &mut rng).unwrap();
    let b = DenseMatrix::<i32>::random(n, 9, &mut rng).unwrap();
    let af = Mat::from_fn(n, n, |i, j| a[(i, j)] as f64);
    let bf = Mat::from_fn(n, n, |i, j| b[(i, j)] as f64);

    c.bench_function("sequential kernel", |ben| {
        ben.iter(|| multiply_sequential(black_box(&a), black_box(&b)).unwrap())
    });

    c.bench_function("faer f64 matmul", |ben| {
        ben.iter(|| black_box(&af) * black_box(&bf))
    });

    let group = RayonGroup::new(4).unwrap();
    for mode in TransferMode::ALL {
        c.bench_function(&format!("distributed 4 ranks {mode}"), |ben| {
            ben.iter(|| {
                group
                    .run(|comm| {
                        let operands = comm.is_coordinator().then_some((&a, &b));
                        multiply_distributed(&comm, mode, n, operands, 0).unwrap();
                    })
                    .unwrap()
            })
        });
    }
}

criterion_group!(benches, bench_kernel_vs_faer);
criterion_main!(benches);
