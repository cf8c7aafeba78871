//! Result verification and reporting.

pub mod report;
pub mod verify;

pub use report::{ConfigReport, Outcome, ReportTable};
pub use verify::{Verdict, verify};
