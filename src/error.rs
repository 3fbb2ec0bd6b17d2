//! Error types for the `rtmv` crate.
//!
//! This module defines [`RtmvError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry the offsets, indices and
//! limits involved so callers can report them without extra logging.
//!
//! Parse-time corruption is deliberately absent from this enum: a damaged
//! region is skipped and recorded as a
//! [`CorruptSegment`](crate::parser::CorruptSegment) on the package table
//! instead of failing the load.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use image::ImageError;
use serde_json::Error as JsonError;
use thiserror::Error;

/// The unified error type for all `rtmv` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RtmvError {
    /// The container file could not be opened or read.
    #[error("Failed to open RTMV file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`RtmvFile::load`](crate::RtmvFile::load).
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The input exceeds the configured size limit. Nothing was scanned.
    #[error("Input of {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge {
        /// Size of the rejected input in bytes.
        size: u64,
        /// The configured limit.
        limit: u64,
    },

    /// The scan finished without finding a single valid package.
    #[error("No RTMV packages found")]
    NoPackagesFound,

    /// A slice handed to the header decoder is shorter than one header.
    #[error("Header needs {expected} bytes, got {actual}")]
    HeaderTooShort {
        /// Required number of bytes.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// A package index is past the end of the package table.
    #[error("Package {index} is out of range (table has {count} packages)")]
    PackageOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of packages in the table.
        count: usize,
    },

    /// A package range whose start lies after its end.
    #[error("Invalid package range: start ({start}) must not exceed end ({end})")]
    InvalidRange {
        /// First package index.
        start: usize,
        /// Last package index (inclusive).
        end: usize,
    },

    /// No consumer connected to the feeder before the accept timeout.
    #[error("No consumer connected within {0:?}")]
    ConnectTimeout(Duration),

    /// Every port tried by the feeder was already taken.
    #[error("Could not bind a local port after {attempts} attempts starting at {base_port}")]
    PortBindExhausted {
        /// First port that was tried.
        base_port: u16,
        /// Number of ports tried.
        attempts: u16,
    },

    /// The external demuxer could not make sense of the probed bytes.
    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    /// `start()` was called on a feeder that is already sending or paused.
    #[error("Feeder is already running")]
    AlreadyRunning,

    /// A playback command that is not valid in the current state.
    #[error("Cannot {action} while {from}")]
    InvalidTransition {
        /// The state the player was in.
        from: &'static str,
        /// The rejected command.
        action: &'static str,
    },

    /// A dump option name that is not recognised.
    #[error("Unknown dump option '{0}' (expected one of {options})", options = crate::export::DumpOption::NAMES.join(", "))]
    UnknownDumpOption(String),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An I/O error occurred while reading, writing or streaming.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while sniffing image payloads.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// Route or metadata serialisation failed.
    #[error("JSON error: {0}")]
    JsonError(#[from] JsonError),

    /// An error originating from the FFmpeg libraries.
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for RtmvError {
    fn from(error: ffmpeg_next::Error) -> Self {
        RtmvError::FfmpegError(error.to_string())
    }
}
