//! Container validation.
//!
//! Provides [`RtmvFile::validate`](crate::RtmvFile::validate) which reviews
//! the scan results of a loaded file and returns a [`ValidationReport`]
//! describing its structure and any damage found.
//!
//! Nothing here repairs anything: non-monotonic timestamps and negative
//! section durations are reported as found.
//!
//! # Example
//!
//! ```no_run
//! use rtmv::{LoadOptions, RtmvFile};
//!
//! let file = RtmvFile::load("flight.rtmv", &LoadOptions::default())?;
//! let report = file.validate();
//! if !report.is_valid() {
//!     eprint!("{report}");
//! }
//! # Ok::<(), rtmv::RtmvError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::header::HEADER_LEN;
use crate::rtmv::RtmvFile;

/// Timestamp regressions listed individually before they are summarised.
const MAX_LISTED_REGRESSIONS: usize = 10;

/// Summary of container validation.
///
/// Produced by [`RtmvFile::validate`](crate::RtmvFile::validate).
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Informational notices (not problems).
    pub info: Vec<String>,
    /// Damage that was skipped over, or data that looks suspicious.
    pub warnings: Vec<String>,
    /// Problems that leave nothing to play or export.
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Returns `true` if no errors were found. Warnings do not count.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of entries (info + warnings + errors).
    pub fn issue_count(&self) -> usize {
        self.info.len() + self.warnings.len() + self.errors.len()
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for item in &self.info {
            writeln!(f, "[INFO] {item}")?;
        }
        for item in &self.warnings {
            writeln!(f, "[WARN] {item}")?;
        }
        for item in &self.errors {
            writeln!(f, "[ERROR] {item}")?;
        }
        if self.issue_count() == 0 {
            writeln!(f, "No issues found.")?;
        }
        Ok(())
    }
}

pub(crate) fn validate_file(file: &RtmvFile) -> ValidationReport {
    let mut report = ValidationReport::default();
    let table = file.container().table();

    // ── Package presence ───────────────────────────────────────────
    if table.is_empty() {
        report.errors.push("No RTMV packages found".to_string());
    } else {
        report.info.push(format!(
            "{} packages ({} video, {} image) in {} sections",
            table.len(),
            table.video_count(),
            table.image_count(),
            file.sections().len(),
        ));
    }

    // ── Sync runs and skipped candidates ───────────────────────────
    if table.sync_positions().len() > 1 {
        report.info.push(format!(
            "{} sync runs starting at offsets {:?}",
            table.sync_positions().len(),
            table.sync_positions(),
        ));
    }
    for segment in table.corrupt_segments() {
        report.warnings.push(format!(
            "Skipped candidate at offset {}: {}",
            segment.offset, segment.reason,
        ));
    }

    let covered: u64 = table
        .packages()
        .iter()
        .map(|package| u64::from(package.total_len))
        .sum();
    let uncovered = file.file_size() - covered;
    if uncovered > 0 && !table.is_empty() {
        report.warnings.push(format!(
            "{uncovered} of {} bytes are outside any package",
            file.file_size(),
        ));
    }

    // ── Header sanity ──────────────────────────────────────────────
    let odd_headers = table
        .packages()
        .iter()
        .filter(|package| usize::from(package.header.header_size) != HEADER_LEN)
        .count();
    if odd_headers > 0 {
        report.warnings.push(format!(
            "{odd_headers} headers declare a header size other than {HEADER_LEN}",
        ));
    }

    // ── Timestamps ─────────────────────────────────────────────────
    let regressions: Vec<usize> = table
        .packages()
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1].header.timestamp < pair[0].header.timestamp)
        .map(|(index, _)| index + 1)
        .collect();
    for &index in regressions.iter().take(MAX_LISTED_REGRESSIONS) {
        let packages = table.packages();
        report.warnings.push(format!(
            "Timestamp goes backwards at package {index} ({} -> {})",
            packages[index - 1].header.timestamp,
            packages[index].header.timestamp,
        ));
    }
    if regressions.len() > MAX_LISTED_REGRESSIONS {
        report.warnings.push(format!(
            "{} more timestamp regressions not listed",
            regressions.len() - MAX_LISTED_REGRESSIONS,
        ));
    }

    for section in file.sections() {
        if section.duration_seconds < 0.0 {
            report.warnings.push(format!(
                "{} section {}..={} has negative duration {:.3}s",
                section.kind, section.start_index, section.end_index, section.duration_seconds,
            ));
        }
    }

    report
}
