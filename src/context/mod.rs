//! Benchmark driver context.
//!
//! Modules:
//! - [`bench_context`]: the `BenchContext` driver that sweeps configurations,
//!   times the distributed multiply and verifies it.

pub mod bench_context;
pub use bench_context::BenchContext;
