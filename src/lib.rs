//! matmul-modes: transfer-mode benchmark for distributed dense matrix multiply
//!
//! This crate multiplies square integer matrices across a fixed group of
//! cooperating ranks, distributing row blocks of the first operand with
//! synchronous, ready or buffered point-to-point sends, and checks every
//! distributed product against a sequential baseline.

pub mod parallel;

pub mod config;
pub mod context;
pub mod core;
pub mod distribute;
pub mod error;
pub mod matrix;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use self::core::*;
pub use distribute::*;
pub use error::*;
pub use matrix::*;
pub use utils::*;
