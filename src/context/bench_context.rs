//! Driver for the transfer-mode benchmark.
//!
//! This module provides the `BenchContext` struct, which walks the
//! configuration space of a [`BenchOptions`] on every rank of a process
//! group, times the distributed product of each configuration and checks it
//! against a sequential baseline computed at the coordinator.
//!
//! # Usage
//!
//! 1. Construct a `BenchContext` from `BenchOptions`.
//! 2. Call `run` on every rank with that rank's [`Comm`] handle.
//! 3. The coordinator prints the report table to `out` and gets one
//!    [`ConfigReport`] per configuration; workers get an empty list.
//!
//! # Failures
//!
//! - An order not divisible by the group size aborts the group before any
//!   configuration runs.
//! - A transport failure fails only its configuration; the row reads `No`
//!   and the sweep continues.
//! - A result that differs from the baseline reads `No`.

use std::io::Write;
use std::marker::PhantomData;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, warn};

use crate::config::{BenchOptions, BenchmarkConfiguration};
use crate::core::kernel::multiply_sequential;
use crate::core::traits::Element;
use crate::distribute::{multiply_distributed, validate_or_abort};
use crate::error::BenchError;
use crate::matrix::DenseMatrix;
use crate::parallel::Comm;
use crate::utils::report::{ConfigReport, Outcome, ReportTable};
use crate::utils::verify::verify;

/// Benchmark driver over matrices of element type `T`.
pub struct BenchContext<T = i32> {
    pub options: BenchOptions,
    _entry: PhantomData<T>,
}

impl<T: Element> BenchContext<T> {
    pub fn new(options: BenchOptions) -> Self {
        Self { options, _entry: PhantomData }
    }

    /// Runs every configuration in order on this rank.
    ///
    /// # Returns
    /// * `Ok(reports)`: one report per configuration at the coordinator,
    ///   empty on workers
    /// * `Err(BenchError)`: a fatal error; the group has been aborted
    pub fn run<C: Comm, W: Write>(&self, comm: &C, out: &mut W) -> Result<Vec<ConfigReport>, BenchError> {
        self.options
            .check_entry_range::<T>()
            .map_err(|e| abort_on_fatal(comm, e))?;
        let configs = self.options.configurations(comm.size());
        for config in &configs {
            validate_or_abort(comm, config.order)?;
        }

        let mut table = comm.is_coordinator().then(|| ReportTable::new(out));
        if let Some(table) = table.as_mut() {
            table.header();
        }

        let mut rng = comm.is_coordinator().then(|| match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        });
        let mut reports = Vec::new();
        for config in configs {
            if let Some(report) = self.run_configuration(comm, config, rng.as_mut())? {
                if let Some(table) = table.as_mut() {
                    table.row(&report);
                }
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Runs one configuration on fresh random operands drawn from `rng`,
    /// which only the coordinator holds. Only the coordinator gets a report
    /// back.
    pub fn run_configuration<C: Comm>(
        &self,
        comm: &C,
        config: BenchmarkConfiguration,
        rng: Option<&mut StdRng>,
    ) -> Result<Option<ConfigReport>, BenchError> {
        let operands = match rng {
            Some(rng) if comm.is_coordinator() => {
                let a = DenseMatrix::random(config.order, self.options.max_value, rng);
                let b = DenseMatrix::random(config.order, self.options.max_value, rng);
                let pair = a.and_then(|a| b.map(|b| (a, b)));
                Some(pair.map_err(|e| abort_on_fatal(comm, e))?)
            }
            None if comm.is_coordinator() => {
                let e = BenchError::InvalidMatrix("the coordinator needs a random source".into());
                return Err(abort_on_fatal(comm, e));
            }
            _ => None,
        };
        self.run_with_operands(comm, config, operands)
    }

    /// Runs one configuration on the given operands. The coordinator passes
    /// `Some((a, b))`, workers pass `None`.
    pub fn run_with_operands<C: Comm>(
        &self,
        comm: &C,
        config: BenchmarkConfiguration,
        operands: Option<(DenseMatrix<T>, DenseMatrix<T>)>,
    ) -> Result<Option<ConfigReport>, BenchError> {
        info!(rank = comm.rank(), order = config.order, mode = %config.mode, "starting configuration");
        let reference = match &operands {
            Some((a, b)) => Some(multiply_sequential(a, b).map_err(|e| abort_on_fatal(comm, e))?),
            None => None,
        };

        let start = Instant::now();
        let product = multiply_distributed(
            comm,
            config.mode,
            config.order,
            operands.as_ref().map(|(a, b)| (a, b)),
            self.options.staging_shortfall,
        );
        let seconds = start.elapsed().as_secs_f64();

        let outcome = match product {
            Ok(product) => match (product.result, reference) {
                (Some(c), Some(reference)) => Outcome::Checked(verify(&c, &reference)),
                _ => return Ok(None),
            },
            Err(e) if e.is_fatal() => return Err(abort_on_fatal(comm, e)),
            Err(e) => {
                error!(rank = comm.rank(), order = config.order, mode = %config.mode, "configuration failed: {e}");
                if !comm.is_coordinator() {
                    return Ok(None);
                }
                Outcome::TransportFailed(e.to_string())
            }
        };

        match &outcome {
            Outcome::Checked(v) if v.is_match() => {
                info!(order = config.order, mode = %config.mode, seconds, "distributed product verified")
            }
            Outcome::Checked(v) => {
                warn!(order = config.order, mode = %config.mode, verdict = ?v, "distributed product differs from baseline")
            }
            Outcome::TransportFailed(_) => {}
        }
        Ok(Some(ConfigReport { config, seconds, outcome }))
    }
}

/// Takes the group down for fatal errors not already followed by an abort.
fn abort_on_fatal<C: Comm>(comm: &C, e: BenchError) -> BenchError {
    if e.is_fatal() && !matches!(e, BenchError::Aborted(_) | BenchError::Indivisible { .. }) {
        error!(rank = comm.rank(), "fatal: {e}");
        comm.abort(1);
    }
    e
}
