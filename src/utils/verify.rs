//! Elementwise comparison of the distributed product against the baseline.
//!
//! Entries are integers, so exact equality is the only criterion.

use std::fmt;

use crate::core::traits::Element;
use crate::matrix::DenseMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    /// `differing` entries disagree; the first one is at `first`.
    Mismatch { first: (usize, usize), differing: usize },
    /// The matrices do not even have the same order.
    OrderMismatch { expected: usize, found: usize },
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Match)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(if self.is_match() { "Yes" } else { "No" })
    }
}

pub fn verify<T: Element>(result: &DenseMatrix<T>, reference: &DenseMatrix<T>) -> Verdict {
    if result.order() != reference.order() {
        return Verdict::OrderMismatch { expected: reference.order(), found: result.order() };
    }
    let n = reference.order();
    let mut diffs = result
        .as_slice()
        .iter()
        .zip(reference.as_slice())
        .enumerate()
        .filter(|(_, (r, e))| r != e)
        .map(|(idx, _)| idx);
    match diffs.next() {
        None => Verdict::Match,
        Some(idx) => Verdict::Mismatch {
            first: (idx / n, idx % n),
            differing: 1 + diffs.count(),
        },
    }
}
