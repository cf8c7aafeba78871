//! Per-configuration results and the coordinator's report table.

use std::io::Write;

use tracing::warn;

use crate::config::BenchmarkConfiguration;
use crate::utils::verify::Verdict;

/// How a configuration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The distributed product was compared against the baseline.
    Checked(Verdict),
    /// Distribution failed in the transport; nothing was compared.
    TransportFailed(String),
}

impl Outcome {
    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::Checked(v) if v.is_match())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigReport {
    pub config: BenchmarkConfiguration,
    /// Wall time of the distributed multiply at the coordinator.
    pub seconds: f64,
    pub outcome: Outcome,
}

pub const HEADER: &str =
    "Matrix Size | Transfer Mode | Number of Processes | Execution Time (sec) | Correctness";

/// Writes the report table. Output is best-effort: write failures are
/// logged and otherwise ignored.
pub struct ReportTable<'w, W: Write> {
    out: &'w mut W,
}

impl<'w, W: Write> ReportTable<'w, W> {
    pub fn new(out: &'w mut W) -> Self {
        Self { out }
    }

    pub fn header(&mut self) {
        let rule = "-".repeat(HEADER.len());
        self.emit(format_args!("{HEADER}\n{rule}"));
    }

    pub fn row(&mut self, report: &ConfigReport) {
        let verdict = if report.outcome.is_correct() { "Yes" } else { "No" };
        self.emit(format_args!(
            "{:<11} | {:<13} | {:<19} | {:<20.6} | {}",
            report.config.order,
            report.config.mode,
            report.config.workers,
            report.seconds,
            verdict
        ));
    }

    fn emit(&mut self, line: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            warn!("report output lost: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferMode;
    use std::io;

    fn report(outcome: Outcome) -> ConfigReport {
        ConfigReport {
            config: BenchmarkConfiguration { order: 192, mode: TransferMode::Buffered, workers: 4 },
            seconds: 0.25,
            outcome,
        }
    }

    #[test]
    fn rows_line_up_with_the_header() {
        let mut buf = Vec::new();
        let mut table = ReportTable::new(&mut buf);
        table.header();
        table.row(&report(Outcome::Checked(Verdict::Match)));
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].chars().all(|c| c == '-'));
        let cells: Vec<_> = lines[2].split(" | ").map(str::trim).collect();
        assert_eq!(cells, vec!["192", "buffered", "4", "0.250000", "Yes"]);
        assert_eq!(lines[2].find('|'), lines[0].find('|'));
    }

    #[test]
    fn failures_read_no() {
        assert!(!report(Outcome::TransportFailed("overflow".into())).outcome.is_correct());
        let mismatch = Outcome::Checked(Verdict::Mismatch { first: (0, 0), differing: 1 });
        let mut buf = Vec::new();
        ReportTable::new(&mut buf).row(&report(mismatch));
        assert!(String::from_utf8(buf).unwrap().trim_end().ends_with("| No"));
    }

    struct Broken;
    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lost_output_does_not_panic() {
        let mut out = Broken;
        let mut table = ReportTable::new(&mut out);
        table.header();
        table.row(&report(Outcome::Checked(Verdict::Match)));
    }
}
