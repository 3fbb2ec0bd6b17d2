//! Bulk export of packages, payloads, headers and the flight route.
//!
//! [`dump`] writes a selection of packages from a loaded file in one of the
//! formats named by [`DumpOption`]. The option names accepted by
//! [`DumpOption::from_str`](std::str::FromStr) are the short forms used on
//! the command line (`payload`, `header`, `pkg_all`, ...).
//!
//! # Example
//!
//! ```no_run
//! use rtmv::{DumpOption, ExportOptions, LoadOptions, RtmvFile, dump};
//!
//! let file = RtmvFile::load("flight.rtmv", &LoadOptions::default())?;
//! let report = dump(&file, "flight.h264", DumpOption::PayloadVideo, None, &ExportOptions::default())?;
//! println!("{} bytes from {} packages", report.bytes_written, report.packages_written);
//! # Ok::<(), rtmv::RtmvError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::json;

use crate::config::ExportOptions;
use crate::error::RtmvError;
use crate::header::{HEADER_LAYOUT, PayloadType};
use crate::progress::{OperationType, ProgressTracker};
use crate::rtmv::RtmvFile;

/// Name of the position table written next to exported images.
pub const POSITION_FILE: &str = "pos.csv";

/// What [`dump`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DumpOption {
    /// Payloads of every selected package, concatenated into one file.
    Payload,
    /// One CSV row per package, one column per header field.
    Header,
    /// Complete packages (header and payload), forming a valid container.
    PackagesAll,
    /// Complete video packages only.
    PackagesVideo,
    /// Complete image packages only.
    PackagesImage,
    /// Video payloads only, concatenated into an elementary stream.
    PayloadVideo,
    /// Image payloads only, one file per image in a directory, plus
    /// [`POSITION_FILE`].
    PayloadImage,
    /// The flight route as a GeoJSON `FeatureCollection`.
    Route,
}

impl DumpOption {
    /// Every option, in the order of [`NAMES`](Self::NAMES).
    pub const ALL: [DumpOption; 8] = [
        DumpOption::Payload,
        DumpOption::Header,
        DumpOption::PackagesAll,
        DumpOption::PackagesVideo,
        DumpOption::PackagesImage,
        DumpOption::PayloadVideo,
        DumpOption::PayloadImage,
        DumpOption::Route,
    ];

    /// Short names accepted by `from_str`.
    pub const NAMES: [&'static str; 8] = [
        "payload",
        "header",
        "pkg_all",
        "pkg_vid",
        "pkg_pic",
        "payload_vid",
        "payload_pic",
        "route",
    ];

    /// Short name of this option.
    pub fn name(self) -> &'static str {
        let position = Self::ALL.iter().position(|&option| option == self);
        position.map_or("payload", |index| Self::NAMES[index])
    }

    fn selects(self, kind: PayloadType) -> bool {
        match self {
            DumpOption::PackagesVideo | DumpOption::PayloadVideo => kind == PayloadType::Video,
            DumpOption::PackagesImage | DumpOption::PayloadImage => kind == PayloadType::Image,
            _ => true,
        }
    }
}

impl Display for DumpOption {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for DumpOption {
    type Err = RtmvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(s.trim()))
            .map(|index| Self::ALL[index])
            .ok_or_else(|| RtmvError::UnknownDumpOption(s.to_string()))
    }
}

/// Summary of a finished [`dump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpReport {
    /// What was written.
    pub option: DumpOption,
    /// File or directory written to.
    pub target: PathBuf,
    /// Packages that contributed to the output.
    pub packages_written: usize,
    /// Bytes of package data written (payloads or whole packages); for the
    /// text formats, the size of the text.
    pub bytes_written: u64,
    /// Files created.
    pub files_written: usize,
}

/// Write packages `range` (all when `None`) of `file` to `target`.
///
/// # Errors
///
/// [`RtmvError::NoPackagesFound`] for a file without packages,
/// [`RtmvError::PackageOutOfRange`] / [`RtmvError::InvalidRange`] for a bad
/// range, [`RtmvError::Cancelled`] when the token in `options` fires, and
/// I/O errors from writing.
pub fn dump<P: AsRef<Path>>(
    file: &RtmvFile,
    target: P,
    option: DumpOption,
    range: Option<RangeInclusive<usize>>,
    options: &ExportOptions,
) -> Result<DumpReport, RtmvError> {
    let target = target.as_ref();
    let table = file.container().table();
    if table.is_empty() {
        return Err(RtmvError::NoPackagesFound);
    }

    let (start, end) = match range {
        Some(range) => (*range.start(), *range.end()),
        None => (0, table.len() - 1),
    };
    table.check_range(start, end)?;

    let selected: Vec<usize> = (start..=end)
        .filter(|&index| option.selects(table.packages()[index].payload_type()))
        .collect();
    log::debug!(
        "Dumping {} of packages {start}..={end} ({} selected) to {}",
        option,
        selected.len(),
        target.display(),
    );

    let mut exporter = Exporter {
        file,
        options,
        tracker: ProgressTracker::new(
            Arc::clone(&options.progress),
            OperationType::Export,
            Some(selected.len() as u64),
            options.batch_size,
        ),
        report: DumpReport {
            option,
            target: target.to_path_buf(),
            packages_written: 0,
            bytes_written: 0,
            files_written: 0,
        },
    };

    match option {
        DumpOption::Payload | DumpOption::PayloadVideo => {
            exporter.concatenate(target, &selected, false)?
        }
        DumpOption::PackagesAll | DumpOption::PackagesVideo | DumpOption::PackagesImage => {
            exporter.concatenate(target, &selected, true)?
        }
        DumpOption::PayloadImage => exporter.image_folder(target, &selected)?,
        DumpOption::Header => exporter.header_csv(target, &selected)?,
        DumpOption::Route => exporter.route(target, &selected)?,
    }

    exporter.tracker.finish();
    log::info!(
        "Dumped {} packages ({} bytes, {} files) to {}",
        exporter.report.packages_written,
        exporter.report.bytes_written,
        exporter.report.files_written,
        target.display(),
    );
    Ok(exporter.report)
}

struct Exporter<'a> {
    file: &'a RtmvFile,
    options: &'a ExportOptions,
    tracker: ProgressTracker,
    report: DumpReport,
}

impl<'a> Exporter<'a> {
    fn step(&mut self, bytes: u64) {
        self.report.packages_written += 1;
        self.report.bytes_written += bytes;
        self.tracker.advance(bytes);
    }

    fn check_cancelled(&self) -> Result<(), RtmvError> {
        if self.options.is_cancelled() {
            log::info!("Export to {} cancelled", self.report.target.display());
            return Err(RtmvError::Cancelled);
        }
        Ok(())
    }

    fn slice(&self, index: usize, whole_package: bool) -> Result<&'a [u8], RtmvError> {
        let container = self.file.container();
        let bytes = if whole_package {
            container.package_bytes(index)
        } else {
            container.payload(index)
        };
        bytes.ok_or(RtmvError::PackageOutOfRange {
            index,
            count: container.table().len(),
        })
    }

    fn concatenate(
        &mut self,
        target: &Path,
        selected: &[usize],
        whole_package: bool,
    ) -> Result<(), RtmvError> {
        let mut out = BufWriter::new(File::create(target)?);
        self.report.files_written = 1;
        for &index in selected {
            self.check_cancelled()?;
            let bytes = self.slice(index, whole_package)?;
            out.write_all(bytes)?;
            let len = bytes.len() as u64;
            self.step(len);
        }
        out.flush()?;
        Ok(())
    }

    fn image_folder(&mut self, target: &Path, selected: &[usize]) -> Result<(), RtmvError> {
        fs::create_dir_all(target)?;
        let mut positions = BufWriter::new(File::create(target.join(POSITION_FILE))?);
        self.report.files_written = 1;
        writeln!(
            positions,
            "index,file,timestamp,lat,long,alt,height,cam_roll,cam_pitch,cam_yaw"
        )?;

        for &index in selected {
            self.check_cancelled()?;
            let payload = self.slice(index, false)?;
            let name = format!("{index:06}.{}", image_extension(payload));
            fs::write(target.join(&name), payload)?;
            let len = payload.len() as u64;

            let header = &self.file.packages()[index].header;
            writeln!(
                positions,
                "{index},{name},{},{},{},{},{},{},{},{}",
                header.timestamp,
                header.latitude,
                header.longitude,
                header.altitude,
                header.height,
                header.cam_roll,
                header.cam_pitch,
                header.cam_yaw,
            )?;
            self.report.files_written += 1;
            self.step(len);
        }
        positions.flush()?;
        Ok(())
    }

    fn header_csv(&mut self, target: &Path, selected: &[usize]) -> Result<(), RtmvError> {
        let mut out = BufWriter::new(File::create(target)?);
        self.report.files_written = 1;

        let columns: Vec<&str> = HEADER_LAYOUT.iter().map(|field| field.name).collect();
        let line = format!("index,offset,{}\n", columns.join(","));
        out.write_all(line.as_bytes())?;

        for &index in selected {
            self.check_cancelled()?;
            let package = &self.file.packages()[index];
            let values: Vec<String> = package
                .header
                .field_values()
                .into_iter()
                .map(|(_, value)| csv_field(&value))
                .collect();
            let line = format!("{index},{},{}\n", package.file_offset, values.join(","));
            out.write_all(line.as_bytes())?;
            self.step(line.len() as u64);
        }
        out.flush()?;
        Ok(())
    }

    fn route(&mut self, target: &Path, selected: &[usize]) -> Result<(), RtmvError> {
        let mut coordinates = Vec::with_capacity(selected.len());
        for &index in selected {
            self.check_cancelled()?;
            let header = &self.file.packages()[index].header;
            coordinates.push(json!([header.longitude, header.latitude, header.altitude]));
            self.report.packages_written += 1;
            self.tracker.advance(0);
        }

        let packages = self.file.packages();
        let first = selected.first().map(|&index| &packages[index].header);
        let last = selected.last().map(|&index| &packages[index].header);
        let collection = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": coordinates,
                },
                "properties": {
                    "uav_name": first.map(|header| header.uav_name()),
                    "start_time": first.map(|header| header.timestamp),
                    "end_time": last.map(|header| header.timestamp),
                    "points": selected.len(),
                },
            }],
        });

        let text = serde_json::to_string_pretty(&collection)?;
        fs::write(target, &text)?;
        self.report.bytes_written = text.len() as u64;
        self.report.files_written = 1;
        Ok(())
    }
}

/// File extension for an image payload, `bin` when the format is unknown.
fn image_extension(payload: &[u8]) -> &'static str {
    image::guess_format(payload)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
