//! Operational configuration.
//!
//! Every tunable of the crate lives in one of the builder structs below.
//! All of them have defaults matching the behaviour of the recording
//! software that produces RTMV files, so `Default::default()` is always a
//! reasonable starting point.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use rtmv::{ByteOrder, FeederConfig, LoadOptions, ParseOptions};
//!
//! let options = LoadOptions::new()
//!     .with_parse(ParseOptions::new().with_byte_order(ByteOrder::Little));
//! let feeder = FeederConfig::new()
//!     .with_base_port(0)
//!     .with_accept_timeout(Duration::from_secs(1));
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use crate::feeder::{FeedObserver, NoOpObserver};
use crate::header::ByteOrder;
use crate::probe::Demuxer;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Default upper bound on the size of a container: 2 GiB.
pub const DEFAULT_MAX_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Settings for the container scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Inputs larger than this are rejected before scanning.
    pub max_size: u64,
    /// Byte order of the header fields.
    pub byte_order: ByteOrder,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseOptions {
    /// Defaults: 2 GiB limit, big-endian.
    pub fn new() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            byte_order: ByteOrder::Big,
        }
    }

    /// Set the maximum accepted input size in bytes.
    #[must_use]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the header byte order.
    #[must_use]
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }
}

/// Settings for the best-effort metadata prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Payload bytes handed to the demuxer on the first attempt.
    pub probe_size: usize,
    /// Maximum number of attempts. `None` keeps doubling the window until
    /// the whole section has been offered.
    pub max_attempts: Option<u32>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeOptions {
    /// Defaults: 1 MB initial window, unbounded attempts.
    pub fn new() -> Self {
        Self {
            probe_size: 1_000_000,
            max_attempts: None,
        }
    }

    /// Set the initial probe window in bytes (minimum 1).
    #[must_use]
    pub fn with_probe_size(mut self, bytes: usize) -> Self {
        self.probe_size = bytes.max(1);
        self
    }

    /// Bound the number of demux attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }
}

/// Settings for a [`Feeder`](crate::Feeder).
#[derive(Clone)]
pub struct FeederConfig {
    /// Interface the endpoint binds to.
    pub host: IpAddr,
    /// First port tried. `0` asks the OS for an ephemeral port.
    pub base_port: u16,
    /// How many consecutive ports to try before giving up.
    pub bind_attempts: u16,
    /// How long to wait for the consumer to connect.
    pub accept_timeout: Duration,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) observer: Arc<dyn FeedObserver>,
    pub(crate) batch_size: u64,
}

impl Debug for FeederConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FeederConfig")
            .field("host", &self.host)
            .field("base_port", &self.base_port)
            .field("bind_attempts", &self.bind_attempts)
            .field("accept_timeout", &self.accept_timeout)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FeederConfig {
    /// Defaults: loopback, ports 15000..15100, 5 s accept timeout.
    pub fn new() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 15000,
            bind_attempts: 100,
            accept_timeout: Duration::from_secs(5),
            progress: Arc::new(NoOpProgress),
            observer: Arc::new(NoOpObserver),
            batch_size: 1,
        }
    }

    /// Set the bind interface.
    #[must_use]
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Set the first port to try.
    #[must_use]
    pub fn with_base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    /// Set how many consecutive ports are probed (minimum 1).
    #[must_use]
    pub fn with_bind_attempts(mut self, attempts: u16) -> Self {
        self.bind_attempts = attempts.max(1);
        self
    }

    /// Set the accept timeout.
    #[must_use]
    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    /// Receive a progress report every [`batch_size`](Self::with_batch_size)
    /// packages sent.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Receive connection and completion events.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn FeedObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

/// Settings for [`RtmvFile::load`](crate::RtmvFile::load).
#[derive(Clone)]
pub struct LoadOptions {
    /// Scanner settings.
    pub parse: ParseOptions,
    /// Prober settings.
    pub probe: ProbeOptions,
    pub(crate) demuxer: Option<Arc<dyn Demuxer>>,
    /// Skip sniffing image sections when `false`.
    pub probe_images: bool,
}

impl Debug for LoadOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("LoadOptions")
            .field("parse", &self.parse)
            .field("probe", &self.probe)
            .field("has_demuxer", &self.demuxer.is_some())
            .field("probe_images", &self.probe_images)
            .finish()
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadOptions {
    /// Defaults: default parse and probe settings, image sniffing on, and
    /// the FFmpeg demuxer when the `ffmpeg` feature is enabled.
    pub fn new() -> Self {
        Self {
            parse: ParseOptions::new(),
            probe: ProbeOptions::new(),
            demuxer: default_demuxer(),
            probe_images: true,
        }
    }

    /// Set the scanner settings.
    #[must_use]
    pub fn with_parse(mut self, parse: ParseOptions) -> Self {
        self.parse = parse;
        self
    }

    /// Set the prober settings.
    #[must_use]
    pub fn with_probe(mut self, probe: ProbeOptions) -> Self {
        self.probe = probe;
        self
    }

    /// Use `demuxer` to probe video sections.
    #[must_use]
    pub fn with_demuxer(mut self, demuxer: Arc<dyn Demuxer>) -> Self {
        self.demuxer = Some(demuxer);
        self
    }

    /// Do not probe video sections at all.
    #[must_use]
    pub fn without_demuxer(mut self) -> Self {
        self.demuxer = None;
        self
    }

    /// Enable or disable image section sniffing.
    #[must_use]
    pub fn with_probe_images(mut self, enabled: bool) -> Self {
        self.probe_images = enabled;
        self
    }
}

#[cfg(feature = "ffmpeg")]
fn default_demuxer() -> Option<Arc<dyn Demuxer>> {
    Some(Arc::new(crate::probe::FfmpegDemuxer::new()))
}

#[cfg(not(feature = "ffmpeg"))]
fn default_demuxer() -> Option<Arc<dyn Demuxer>> {
    None
}

/// Settings for [`dump`](crate::export::dump).
#[derive(Clone)]
pub struct ExportOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
}

impl Debug for ExportOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExportOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportOptions {
    /// Defaults: no progress callback, no cancellation, batch size 1.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// Cancelling makes the export stop at the next package and return
    /// [`RtmvError::Cancelled`](crate::RtmvError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

/// Settings for a [`Player`](crate::Player).
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Feeder settings used for each playback session.
    pub feeder: FeederConfig,
    /// How long the player waits to connect to its own feeder.
    pub connect_timeout: Duration,
    /// Read timeout of the decode stage's input; bounds how long a pause or
    /// stop waits for the decode thread to notice.
    pub read_poll: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerConfig {
    /// Defaults: default feeder, 2 s connect timeout, 20 ms read poll.
    pub fn new() -> Self {
        Self {
            feeder: FeederConfig::new(),
            connect_timeout: Duration::from_secs(2),
            read_poll: Duration::from_millis(20),
        }
    }

    /// Set the feeder settings.
    #[must_use]
    pub fn with_feeder(mut self, feeder: FeederConfig) -> Self {
        self.feeder = feeder;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the decode input read poll interval (minimum 1 ms).
    #[must_use]
    pub fn with_read_poll(mut self, poll: Duration) -> Self {
        self.read_poll = poll.max(Duration::from_millis(1));
        self
    }
}
