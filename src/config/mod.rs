//! Benchmark options, transfer modes and the configuration space.

pub mod options;
pub use options::{BenchOptions, BenchmarkConfiguration, TransferMode, TransferModes};
