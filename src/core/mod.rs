//! Element type and the multiply-accumulate kernels.

pub mod kernel;
pub mod traits;

pub use kernel::{multiply_row_block, multiply_sequential};
pub use traits::Element;
