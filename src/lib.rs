//! # rtmv
//!
//! Read RTMV drone recordings: a flat sequence of packages, each a fixed
//! 128-byte telemetry header (GPS position, attitude, timestamps, stream
//! geometry) followed by a payload that is either a slice of a video
//! elementary stream or a complete still image.
//!
//! `rtmv` scans a recording with signature resynchronisation, so damaged
//! regions are skipped instead of failing the whole file, groups packages
//! into payload sections, probes section metadata, streams a package range
//! to a local consumer under pause/resume/stop control, and exports packages,
//! payloads, headers and the flight route.
//!
//! ## Quick Start
//!
//! ### Inspect a Recording
//!
//! ```no_run
//! use rtmv::{LoadOptions, RtmvFile};
//!
//! let file = RtmvFile::load("flight.rtmv", &LoadOptions::default())?;
//! for section in file.sections() {
//!     println!(
//!         "{} {}..={} ({:.1}s)",
//!         section.kind, section.start_index, section.end_index, section.duration_seconds
//!     );
//! }
//! # Ok::<(), rtmv::RtmvError>(())
//! ```
//!
//! ### Stream a Section to an External Decoder
//!
//! ```no_run
//! use rtmv::{FeederConfig, LoadOptions, RtmvFile};
//!
//! let file = RtmvFile::load("flight.rtmv", &LoadOptions::default())?;
//! let section = &file.sections()[0];
//! let mut feeder = file.feeder(section.start_index, section.end_index, FeederConfig::new())?;
//! let addr = feeder.start()?;
//! println!("ffplay -f h264 tcp://{addr}");
//! let outcome = feeder.wait();
//! # Ok::<(), rtmv::RtmvError>(())
//! ```
//!
//! ### Export the Flight Route
//!
//! ```no_run
//! use rtmv::{DumpOption, ExportOptions, LoadOptions, RtmvFile, dump};
//!
//! let file = RtmvFile::load("flight.rtmv", &LoadOptions::default())?;
//! dump(&file, "route.geojson", DumpOption::Route, None, &ExportOptions::default())?;
//! # Ok::<(), rtmv::RtmvError>(())
//! ```
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | `FfmpegDemuxer` probes video sections through FFmpeg, plus FFmpeg log-level control |
//! | `rayon` | Probe sections in parallel while loading |
//! | `full` | Enables all of the above |
//!
//! The library logs through the [`log`](https://crates.io/crates/log)
//! facade and never installs a logger itself.

pub mod config;
pub mod error;
pub mod export;
pub mod feeder;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod header;
pub mod metadata;
pub mod parser;
pub mod player;
pub mod probe;
pub mod progress;
pub mod rtmv;
pub mod section;
pub mod validation;

pub use config::{
    DEFAULT_MAX_SIZE, ExportOptions, FeederConfig, LoadOptions, ParseOptions, PlayerConfig,
    ProbeOptions,
};
pub use error::RtmvError;
pub use export::{DumpOption, DumpReport, dump};
pub use feeder::{FeedEvent, FeedObserver, FeedOutcome, Feeder, FeederState};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use header::{
    ByteOrder, HEADER_LAYOUT, HEADER_LEN, PackageHeader, PayloadType, SIGNATURE, encode_package,
};
pub use metadata::{ImageMeta, VideoMeta};
pub use parser::{
    Container, CorruptSegment, Package, PackageTable, SkipReason, parse, parse_default,
};
pub use player::{CountingStage, DecodeStage, Player, PlayerState, StageInput, WriterStage};
#[cfg(feature = "ffmpeg")]
pub use probe::FfmpegDemuxer;
pub use probe::{Demuxer, probe_image, probe_video, sniff_image};
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use rtmv::RtmvFile;
pub use section::{PayloadSection, segment};
pub use validation::ValidationReport;
