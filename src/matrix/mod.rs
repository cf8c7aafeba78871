//! Matrix module: dense square row-major matrices and row-block views.

pub mod dense;
pub use dense::DenseMatrix;
