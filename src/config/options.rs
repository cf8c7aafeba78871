//! Command-line or API options for the benchmark.
//!
//! This module provides the `BenchOptions` struct, which selects the matrix
//! orders and transfer modes to sweep, how operands are generated, and an
//! optional staging shortfall used to provoke buffered-send failures.
//! Each (order, mode, worker count) triple becomes one
//! [`BenchmarkConfiguration`].

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use num_traits::NumCast;

use crate::core::traits::Element;
use crate::error::BenchError;

/// How row blocks of A are pushed from the coordinator to the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferMode {
    /// Send completes once the matching receive has started.
    Synchronous,
    /// Send assumes the matching receive is already posted.
    Ready,
    /// Send copies into the attached staging buffer and returns.
    Buffered,
}

impl TransferMode {
    /// All modes in table order.
    pub const ALL: [TransferMode; 3] = [
        TransferMode::Synchronous,
        TransferMode::Ready,
        TransferMode::Buffered,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransferMode::Synchronous => "sync",
            TransferMode::Ready => "ready",
            TransferMode::Buffered => "buffered",
        }
    }

    pub fn flag(self) -> TransferModes {
        match self {
            TransferMode::Synchronous => TransferModes::SYNCHRONOUS,
            TransferMode::Ready => TransferModes::READY,
            TransferMode::Buffered => TransferModes::BUFFERED,
        }
    }

    /// Whether every receive must be posted before the coordinator sends.
    pub fn needs_posted_receives(self) -> bool {
        matches!(self, TransferMode::Ready)
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TransferMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" | "synchronous" => Ok(TransferMode::Synchronous),
            "ready" => Ok(TransferMode::Ready),
            "buffered" => Ok(TransferMode::Buffered),
            other => Err(BenchError::UnknownMode(other.to_string())),
        }
    }
}

bitflags! {
    /// Set of transfer modes to sweep.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct TransferModes: u8 {
        const SYNCHRONOUS = 0b001;
        const READY       = 0b010;
        const BUFFERED    = 0b100;
    }
}

impl TransferModes {
    /// Selected modes in table order.
    pub fn modes(self) -> impl Iterator<Item = TransferMode> {
        TransferMode::ALL
            .into_iter()
            .filter(move |m| self.contains(m.flag()))
    }
}

impl FromIterator<TransferMode> for TransferModes {
    fn from_iter<I: IntoIterator<Item = TransferMode>>(iter: I) -> Self {
        iter.into_iter()
            .fold(TransferModes::empty(), |set, m| set | m.flag())
    }
}

/// One point of the outer iteration space. Configurations share no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkConfiguration {
    /// Matrix order N.
    pub order: usize,
    pub mode: TransferMode,
    /// Worker count P (group size, coordinator included).
    pub workers: usize,
}

/// Benchmark sweep parameters.
#[derive(Debug, Clone)]
pub struct BenchOptions {
    /// Matrix orders to run, in order.
    pub matrix_orders: Vec<usize>,

    /// Transfer modes to run for every order.
    pub modes: TransferModes,

    /// Operand entries are drawn uniformly from `0..=max_value`.
    pub max_value: u32,

    /// Fixed RNG seed; fresh entropy per run when `None`.
    pub seed: Option<u64>,

    /// Bytes removed from the computed staging buffer size.
    pub staging_shortfall: usize,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            matrix_orders: vec![192, 384, 768],
            modes: TransferModes::all(),
            max_value: 9,
            seed: None,
            staging_shortfall: 0,
        }
    }
}

impl BenchOptions {
    /// Expands the sweep for a group of `workers` ranks: every order, then
    /// every selected mode within it.
    pub fn configurations(&self, workers: usize) -> Vec<BenchmarkConfiguration> {
        self.matrix_orders
            .iter()
            .flat_map(|&order| {
                self.modes.modes().map(move |mode| BenchmarkConfiguration {
                    order,
                    mode,
                    workers,
                })
            })
            .collect()
    }

    /// Fails unless every product entry fits `T`. No partial sum exceeds
    /// `max_value² · N`, so checking that bound at the largest order covers
    /// every configuration.
    pub fn check_entry_range<T: Element>(&self) -> Result<(), BenchError> {
        let largest = self.matrix_orders.iter().copied().max().unwrap_or(0);
        let bound = <T as NumCast>::from(self.max_value)
            .and_then(|m| m.checked_mul(&m))
            .zip(<T as NumCast>::from(largest))
            .and_then(|(square, n)| square.checked_mul(&n));
        if bound.is_none() {
            return Err(BenchError::InvalidMatrix(format!(
                "entries up to {} at order {largest} overflow {}",
                self.max_value,
                std::any::type_name::<T>()
            )));
        }
        Ok(())
    }
}
