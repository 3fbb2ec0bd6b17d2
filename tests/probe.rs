//! Metadata probing integration tests, driven through `RtmvFile`.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{IMAGE, RecordingBuilder, VIDEO, container, tiny_png};
use rtmv::{
    Demuxer, LoadOptions, PayloadType, ProbeOptions, RtmvError, RtmvFile, VideoMeta, probe_image,
    probe_video, segment, sniff_image,
};

/// Succeeds once it has seen a payload starting with `marker`.
struct MarkerDemuxer {
    marker: u8,
    calls: AtomicUsize,
    sizes: Mutex<Vec<usize>>,
}

impl MarkerDemuxer {
    fn new(marker: u8) -> Self {
        Self {
            marker,
            calls: AtomicUsize::new(0),
            sizes: Mutex::new(Vec::new()),
        }
    }
}

impl Demuxer for MarkerDemuxer {
    fn open_for_read(&self, data: &[u8]) -> Result<VideoMeta, RtmvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sizes.lock().unwrap().push(data.len());
        if data.contains(&self.marker) {
            Ok(VideoMeta {
                codec: "h264".to_string(),
                width: 1280,
                height: 720,
                pixel_format: "yuv420p".to_string(),
                frame_rate: 29.97,
            })
        } else {
            Err(RtmvError::ProbeFailed("no stream yet".to_string()))
        }
    }
}

// ── Video sections ─────────────────────────────────────────────────

#[test]
fn video_section_gets_metadata_once_the_window_is_large_enough() {
    let bytes = RecordingBuilder::new()
        .package_with(VIDEO, &[0u8; 100])
        .package_with(VIDEO, &[0u8; 100])
        .package_with(VIDEO, &[7u8; 100])
        .package_with(VIDEO, &[0u8; 100])
        .build();
    let demuxer = Arc::new(MarkerDemuxer::new(7));
    let options = LoadOptions::new()
        .with_demuxer(demuxer.clone())
        .with_probe(ProbeOptions::new().with_probe_size(100));

    let file = RtmvFile::from_bytes(bytes, &options).unwrap();
    let metadata = file.sections()[0].metadata.as_ref().unwrap();

    assert_eq!(metadata["codec"], "h264");
    assert_eq!(metadata["size"], "1280x720");
    assert_eq!(metadata["pix_fmt"], "yuv420p");
    assert_eq!(metadata["framerate"], "29.970");
    assert_eq!(*demuxer.sizes.lock().unwrap(), vec![100, 200, 400]);
}

#[test]
fn unrecognisable_video_section_has_no_metadata() {
    let bytes = RecordingBuilder::new()
        .package_with(VIDEO, &[0u8; 64])
        .package_with(VIDEO, &[0u8; 64])
        .package_with(IMAGE, &tiny_png())
        .build();
    let demuxer = Arc::new(MarkerDemuxer::new(7));
    let options = LoadOptions::new()
        .with_demuxer(demuxer.clone())
        .with_probe(ProbeOptions::new().with_probe_size(64));

    let file = RtmvFile::from_bytes(bytes, &options).unwrap();
    assert_eq!(file.sections().len(), 2);
    assert!(file.sections()[0].metadata.is_none());
    assert!(file.sections()[1].metadata.is_some());
    assert_eq!(demuxer.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn attempt_budget_is_respected() {
    let container = container(
        (0..16)
            .fold(RecordingBuilder::new(), |builder, _| {
                builder.package_with(VIDEO, &[0u8; 10])
            })
            .build(),
    );
    let section = segment(container.table()).remove(0);
    let demuxer = MarkerDemuxer::new(7);
    let options = ProbeOptions::new().with_probe_size(10).with_max_attempts(3);

    assert!(probe_video(&container, &section, &demuxer, &options).is_none());
    assert_eq!(*demuxer.sizes.lock().unwrap(), vec![10, 20, 40]);
}

#[test]
fn probe_video_ignores_image_sections() {
    let container = container(RecordingBuilder::new().package(IMAGE, 10).build());
    let section = segment(container.table()).remove(0);
    let demuxer = MarkerDemuxer::new(0);

    assert!(probe_video(&container, &section, &demuxer, &ProbeOptions::default()).is_none());
    assert_eq!(demuxer.calls.load(Ordering::SeqCst), 0);
}

// ── Image sections ─────────────────────────────────────────────────

#[test]
fn image_section_is_sniffed_from_its_first_payload() {
    let bytes = RecordingBuilder::new()
        .package(VIDEO, 32)
        .package_with(IMAGE, &tiny_png())
        .package_with(IMAGE, b"not an image")
        .build();
    let options = LoadOptions::new().without_demuxer();

    let file = RtmvFile::from_bytes(bytes, &options).unwrap();
    let image = &file.sections()[1];
    assert_eq!(image.kind, PayloadType::Image);

    let metadata = image.metadata.as_ref().unwrap();
    assert_eq!(metadata["format"], "png");
    assert_eq!(metadata["size"], "2x2");
    assert!(file.sections()[0].metadata.is_none());
}

#[test]
fn unreadable_image_payload_yields_none() {
    let container = container(
        RecordingBuilder::new()
            .package_with(IMAGE, b"definitely not a picture")
            .build(),
    );
    let section = segment(container.table()).remove(0);

    assert!(probe_image(&container, &section).is_none());
    assert!(matches!(
        sniff_image(b"definitely not a picture"),
        Err(RtmvError::ProbeFailed(_))
    ));
}

#[test]
fn image_sniffing_can_be_disabled() {
    let bytes = RecordingBuilder::new()
        .package_with(IMAGE, &tiny_png())
        .build();
    let options = LoadOptions::new()
        .without_demuxer()
        .with_probe_images(false);

    let file = RtmvFile::from_bytes(bytes, &options).unwrap();
    assert!(file.sections()[0].metadata.is_none());
}
