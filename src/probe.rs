//! Best-effort metadata probing of payload sections.
//!
//! Video sections are probed by handing a prefix of their concatenated
//! payload to a [`Demuxer`], the seam behind which an external media
//! library lives. When the demuxer cannot make sense of the prefix, the
//! window is doubled and the probe retried, until it succeeds, the attempt
//! budget runs out, or the whole section has been offered.
//!
//! Image sections are sniffed directly with the [`image`] crate.
//!
//! Probing never fails the caller: every function here returns `Option` and
//! logs what went wrong.
//!
//! # Example
//!
//! ```no_run
//! use rtmv::{Demuxer, LoadOptions, RtmvError, RtmvFile, VideoMeta};
//! use std::sync::Arc;
//!
//! struct AnnexBSniffer;
//!
//! impl Demuxer for AnnexBSniffer {
//!     fn open_for_read(&self, data: &[u8]) -> Result<VideoMeta, RtmvError> {
//!         if data.starts_with(&[0, 0, 0, 1]) {
//!             Ok(VideoMeta {
//!                 codec: "h264".into(),
//!                 width: 0,
//!                 height: 0,
//!                 pixel_format: "unknown".into(),
//!                 frame_rate: 0.0,
//!             })
//!         } else {
//!             Err(RtmvError::ProbeFailed("no start code".into()))
//!         }
//!     }
//! }
//!
//! let options = LoadOptions::new().with_demuxer(Arc::new(AnnexBSniffer));
//! let file = RtmvFile::load("flight.rtmv", &options)?;
//! # Ok::<(), RtmvError>(())
//! ```

use std::io::Cursor;

use image::ImageReader;

use crate::config::{LoadOptions, ProbeOptions};
use crate::error::RtmvError;
use crate::header::PayloadType;
use crate::metadata::{ImageMeta, VideoMeta};
use crate::parser::Container;
use crate::section::PayloadSection;

/// An external demuxer that can recover stream metadata from raw bytes.
///
/// Implementations must be [`Send`] and [`Sync`]: sections may be probed
/// from several threads at once.
pub trait Demuxer: Send + Sync {
    /// Open `data` for reading and describe its first video stream.
    ///
    /// # Errors
    ///
    /// Returns [`RtmvError::ProbeFailed`] (or any other error) when the
    /// bytes cannot be demuxed. The prober treats every error as "try again
    /// with more data".
    fn open_for_read(&self, data: &[u8]) -> Result<VideoMeta, RtmvError>;
}

/// Probe a video section with `demuxer`.
///
/// Returns `None` for image sections, and when every attempt failed.
pub fn probe_video(
    container: &Container,
    section: &PayloadSection,
    demuxer: &dyn Demuxer,
    options: &ProbeOptions,
) -> Option<VideoMeta> {
    if section.kind != PayloadType::Video {
        return None;
    }

    let mut window = options.probe_size.max(1);
    let mut buffer = Vec::with_capacity(window);
    let mut next = section.start_index;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        while next <= section.end_index && buffer.len() < window {
            buffer.extend_from_slice(container.payload(next)?);
            next += 1;
        }
        let exhausted = next > section.end_index;

        match demuxer.open_for_read(&buffer) {
            Ok(meta) => {
                log::debug!(
                    "Probed section {}..={} with {} bytes on attempt {attempts}: {} {}x{}",
                    section.start_index,
                    section.end_index,
                    buffer.len(),
                    meta.codec,
                    meta.width,
                    meta.height,
                );
                return Some(meta);
            }
            Err(error) => log::debug!(
                "Probe attempt {attempts} on section {}..={} with {} bytes failed: {error}",
                section.start_index,
                section.end_index,
                buffer.len(),
            ),
        }

        if exhausted || options.max_attempts.is_some_and(|max| attempts >= max) {
            log::info!(
                "Giving up probing section {}..={} after {attempts} attempts",
                section.start_index,
                section.end_index,
            );
            return None;
        }
        window = window.saturating_mul(2);
    }
}

/// Sniff the first payload of an image section.
pub fn probe_image(container: &Container, section: &PayloadSection) -> Option<ImageMeta> {
    if section.kind != PayloadType::Image {
        return None;
    }
    let payload = container.payload(section.start_index)?;
    match sniff_image(payload) {
        Ok(meta) => Some(meta),
        Err(error) => {
            log::debug!(
                "Image section {}..={} could not be sniffed: {error}",
                section.start_index,
                section.end_index,
            );
            None
        }
    }
}

/// Identify an image payload and read its dimensions without decoding it.
pub fn sniff_image(payload: &[u8]) -> Result<ImageMeta, RtmvError> {
    let reader = ImageReader::new(Cursor::new(payload)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| RtmvError::ProbeFailed("unrecognised image format".to_string()))?;
    let (width, height) = reader.into_dimensions()?;
    Ok(ImageMeta {
        format: format!("{format:?}").to_lowercase(),
        width,
        height,
    })
}

/// Fill in `metadata` for every section according to `options`.
pub(crate) fn annotate_sections(
    container: &Container,
    sections: &mut [PayloadSection],
    options: &LoadOptions,
) {
    let annotate = |section: &mut PayloadSection| {
        section.metadata = match section.kind {
            PayloadType::Video => options
                .demuxer
                .as_deref()
                .and_then(|demuxer| probe_video(container, section, demuxer, &options.probe))
                .map(|meta| meta.to_map()),
            PayloadType::Image if options.probe_images => {
                probe_image(container, section).map(|meta| meta.to_map())
            }
            PayloadType::Image => None,
        };
    };

    #[cfg(feature = "rayon")]
    {
        use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
        sections.par_iter_mut().for_each(annotate);
    }

    #[cfg(not(feature = "rayon"))]
    sections.iter_mut().for_each(annotate);
}

/// Metadata prober backed by FFmpeg.
///
/// FFmpeg wants something it can open, so each attempt writes the probe
/// window to a temporary file and opens that.
#[cfg(feature = "ffmpeg")]
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegDemuxer;

#[cfg(feature = "ffmpeg")]
impl FfmpegDemuxer {
    /// Create a new FFmpeg-backed demuxer.
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "ffmpeg")]
impl Demuxer for FfmpegDemuxer {
    fn open_for_read(&self, data: &[u8]) -> Result<VideoMeta, RtmvError> {
        use std::io::Write;

        use ffmpeg_next::{codec::context::Context as CodecContext, media::Type};

        ffmpeg_next::init()?;

        let mut file = tempfile::Builder::new()
            .prefix("rtmv-probe-")
            .suffix(".es")
            .tempfile()?;
        file.write_all(data)?;
        file.flush()?;
        let path = file.path().to_path_buf();

        let input = ffmpeg_next::format::input(&path)
            .map_err(|error| RtmvError::ProbeFailed(error.to_string()))?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| RtmvError::ProbeFailed("no video stream".to_string()))?;

        let decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let pixel_format = decoder
            .format()
            .descriptor()
            .map(|descriptor| descriptor.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let rate = stream.avg_frame_rate();
        let rate = if rate.denominator() != 0 { rate } else { stream.rate() };
        let frame_rate = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };

        Ok(VideoMeta {
            codec,
            width: decoder.width(),
            height: decoder.height(),
            pixel_format,
            frame_rate,
        })
    }
}
