//! Console verbosity of the FFmpeg libraries behind
//! [`FfmpegDemuxer`](crate::FfmpegDemuxer).
//!
//! Probing feeds FFmpeg partial elementary streams, so at its
//! default level it reports every window that turns
//! out to be too short. This only affects FFmpeg's own output; the crate's
//! diagnostics go through the `log` facade.
//!
//! ```no_run
//! rtmv::set_ffmpeg_log_level(rtmv::FfmpegLogLevel::Error);
//! ```

use std::str::FromStr;

use ffmpeg_next::util::log::{self, Level};

/// FFmpeg log verbosity, quietest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FfmpegLogLevel {
    /// No output at all.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Errors.
    Error,
    /// Errors and warnings. FFmpeg's default.
    Warning,
    /// Informational messages.
    Info,
    /// Everything, including decoder debugging.
    Debug,
}

impl FfmpegLogLevel {
    fn to_ffmpeg(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "debug" => Ok(FfmpegLogLevel::Debug),
            other => Err(format!("unknown FFmpeg log level '{other}'")),
        }
    }
}

/// Set FFmpeg's global log level.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    log::set_level(level.to_ffmpeg());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names() {
        assert_eq!("WARN".parse(), Ok(FfmpegLogLevel::Warning));
        assert_eq!("quiet".parse(), Ok(FfmpegLogLevel::Quiet));
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }

    #[test]
    fn ordered_quietest_first() {
        assert!(FfmpegLogLevel::Quiet < FfmpegLogLevel::Error);
        assert!(FfmpegLogLevel::Info < FfmpegLogLevel::Debug);
    }
}
