use thiserror::Error;

// Unified error type for matmul-modes

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BenchError {
    #[error("matrix order {order} is not divisible by number of processes {workers}")]
    Indivisible { order: usize, workers: usize },
    #[error("invalid matrix: {0}")]
    InvalidMatrix(String),
    #[error("staging buffer already attached")]
    BufferAlreadyAttached,
    #[error("no staging buffer attached")]
    NoBufferAttached,
    #[error("staging buffer size must be positive")]
    InvalidBufferSize,
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("row-block distribution failed at the coordinator")]
    DistributionFailed,
    #[error("process group aborted with code {0}")]
    Aborted(i32),
    #[error("failed to launch process group: {0}")]
    Launch(String),
    #[error("unknown transfer mode `{0}`")]
    UnknownMode(String),
}

/// Failures reported by the point-to-point layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("buffered send needs {needed} bytes but only {available} of {capacity} staging bytes are free")]
    BufferOverflow { needed: usize, available: usize, capacity: usize },
    #[error("ready send to rank {dest} (tag {tag}) issued before a matching receive was posted")]
    ReceiveNotPosted { dest: usize, tag: i32 },
    #[error("message of {len} elements does not fit a receive buffer of {capacity}")]
    Truncated { len: usize, capacity: usize },
    #[error("message payload does not match the receive buffer type")]
    TypeMismatch,
    #[error("rank {rank} is outside a group of {size}")]
    InvalidRank { rank: usize, size: usize },
}

impl BenchError {
    /// Errors that must take the whole process group down.
    ///
    /// Everything else only fails the configuration that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BenchError::Indivisible { .. }
                | BenchError::InvalidMatrix(_)
                | BenchError::BufferAlreadyAttached
                | BenchError::NoBufferAttached
                | BenchError::Aborted(_)
                | BenchError::Launch(_)
        )
    }
}
