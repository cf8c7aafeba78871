//! Core element trait for matmul-modes.

use std::fmt;

use num_traits::PrimInt;

/// Matrix entry: a primitive integer that can cross rank boundaries.
///
/// Integer entries keep the distributed and sequential products bit-exact.
#[cfg(feature = "mpi")]
pub trait Element:
    PrimInt + Send + Sync + fmt::Debug + fmt::Display + 'static + mpi::datatype::Equivalence
{
}

#[cfg(feature = "mpi")]
impl<T> Element for T where
    T: PrimInt + Send + Sync + fmt::Debug + fmt::Display + 'static + mpi::datatype::Equivalence
{
}

/// Matrix entry: a primitive integer that can cross rank boundaries.
///
/// Integer entries keep the distributed and sequential products bit-exact.
#[cfg(not(feature = "mpi"))]
pub trait Element: PrimInt + Send + Sync + fmt::Debug + fmt::Display + 'static {}

#[cfg(not(feature = "mpi"))]
impl<T> Element for T where T: PrimInt + Send + Sync + fmt::Debug + fmt::Display + 'static {}
