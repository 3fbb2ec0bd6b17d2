//! Loaded RTMV files.
//!
//! [`RtmvFile`] is the handle the CLI and other front ends work with: it owns
//! the raw buffer and its package table (through a shared [`Container`]),
//! the payload sections, and whatever metadata the prober could recover.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{FeederConfig, LoadOptions};
use crate::error::RtmvError;
use crate::feeder::Feeder;
use crate::header::PackageHeader;
use crate::parser::{Container, Package};
use crate::probe::annotate_sections;
use crate::section::{PayloadSection, segment};
use crate::validation::{ValidationReport, validate_file};

/// A parsed RTMV container with its sections.
///
/// The buffer and table are immutable; clones of [`container`](Self::container)
/// can be handed to any number of feeders and players.
#[derive(Debug, Clone)]
pub struct RtmvFile {
    path: Option<PathBuf>,
    container: Arc<Container>,
    sections: Vec<PayloadSection>,
}

impl RtmvFile {
    /// Read, scan, segment and probe the file at `path`.
    ///
    /// The size limit is checked against filesystem metadata before any byte
    /// is read.
    ///
    /// # Errors
    ///
    /// Returns [`RtmvError::FileOpen`] if the file cannot be read and
    /// [`RtmvError::FileTooLarge`] if it exceeds `options.parse.max_size`.
    /// A file without a single valid package loads successfully with no
    /// sections.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rtmv::{LoadOptions, RtmvFile};
    ///
    /// let file = RtmvFile::load("flight.rtmv", &LoadOptions::default())?;
    /// println!("{} packages in {} sections", file.package_count(), file.sections().len());
    /// # Ok::<(), rtmv::RtmvError>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self, RtmvError> {
        let path = path.as_ref();
        let open_error = |error: std::io::Error| RtmvError::FileOpen {
            path: path.to_path_buf(),
            reason: error.to_string(),
        };

        let size = fs::metadata(path).map_err(open_error)?.len();
        log::debug!("Opening RTMV file: {} ({size} bytes)", path.display());
        if size > options.parse.max_size {
            return Err(RtmvError::FileTooLarge {
                size,
                limit: options.parse.max_size,
            });
        }

        let data = fs::read(path).map_err(open_error)?;
        let mut file = Self::from_bytes(data, options)?;
        file.path = Some(path.to_path_buf());

        log::info!(
            "Loaded RTMV file: {} ({} packages, {} video, {} image, {} sections, {:.2}s)",
            path.display(),
            file.package_count(),
            file.video_count(),
            file.image_count(),
            file.sections.len(),
            file.duration(),
        );
        Ok(file)
    }

    /// Scan, segment and probe an in-memory buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RtmvError::FileTooLarge`] if `data` exceeds
    /// `options.parse.max_size`.
    pub fn from_bytes(data: Vec<u8>, options: &LoadOptions) -> Result<Self, RtmvError> {
        let container = Container::new(data, &options.parse)?;
        if container.table().is_empty() {
            log::warn!("{}", RtmvError::NoPackagesFound);
        }

        let mut sections = segment(container.table());
        annotate_sections(&container, &mut sections, options);

        Ok(Self {
            path: None,
            container: Arc::new(container),
            sections,
        })
    }

    /// Path the file was loaded from, if it came from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Size of the raw buffer in bytes.
    pub fn file_size(&self) -> u64 {
        self.container.data().len() as u64
    }

    /// Shared buffer and package table.
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// All packages in file order.
    pub fn packages(&self) -> &[Package] {
        self.container.table().packages()
    }

    /// Payload sections in file order.
    pub fn sections(&self) -> &[PayloadSection] {
        &self.sections
    }

    /// Number of packages.
    pub fn package_count(&self) -> usize {
        self.container.table().len()
    }

    /// Number of video packages.
    pub fn video_count(&self) -> usize {
        self.container.table().video_count()
    }

    /// Number of image packages.
    pub fn image_count(&self) -> usize {
        self.container.table().image_count()
    }

    /// Offsets at which a run of packages started.
    pub fn sync_positions(&self) -> &[u64] {
        self.container.table().sync_positions()
    }

    /// Timestamp of the first package.
    pub fn start_time(&self) -> Option<f64> {
        self.packages().first().map(|package| package.header.timestamp)
    }

    /// Last timestamp minus first timestamp; `0.0` for an empty file.
    pub fn duration(&self) -> f64 {
        match (self.packages().first(), self.packages().last()) {
            (Some(first), Some(last)) => last.header.timestamp - first.header.timestamp,
            _ => 0.0,
        }
    }

    /// Timestamp of package `end` minus timestamp of package `start`.
    pub fn duration_between(&self, start: usize, end: usize) -> Result<f64, RtmvError> {
        self.container.table().check_range(start, end)?;
        let packages = self.packages();
        Ok(packages[end].header.timestamp - packages[start].header.timestamp)
    }

    /// Latitude, longitude and altitude of the middle package.
    pub fn center_position(&self) -> Option<(f64, f64, f32)> {
        let packages = self.packages();
        let header = &packages.get(packages.len() / 2)?.header;
        Some((header.latitude, header.longitude, header.altitude))
    }

    /// Header of package `index`.
    pub fn header(&self, index: usize) -> Result<&PackageHeader, RtmvError> {
        self.container
            .table()
            .get(index)
            .map(|package| &package.header)
            .ok_or(RtmvError::PackageOutOfRange {
                index,
                count: self.package_count(),
            })
    }

    /// Payload bytes of package `index`.
    pub fn payload(&self, index: usize) -> Result<&[u8], RtmvError> {
        self.container
            .payload(index)
            .ok_or(RtmvError::PackageOutOfRange {
                index,
                count: self.package_count(),
            })
    }

    /// An idle feeder over packages `start..=end`.
    pub fn feeder(
        &self,
        start: usize,
        end: usize,
        config: FeederConfig,
    ) -> Result<Feeder, RtmvError> {
        Feeder::new(Arc::clone(&self.container), start, end, config)
    }

    /// Check the scan results for problems.
    pub fn validate(&self) -> ValidationReport {
        validate_file(self)
    }

    /// Release the buffer.
    ///
    /// Feeders and players still holding the container keep it alive until
    /// they finish.
    pub fn free(self) {
        match &self.path {
            Some(path) => log::debug!("Freeing RTMV file {}", path.display()),
            None => log::debug!("Freeing in-memory RTMV file"),
        }
    }
}
