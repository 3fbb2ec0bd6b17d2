//! Synthetic recordings shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use rtmv::{ByteOrder, Container, LoadOptions, PackageHeader, ParseOptions, encode_package};

/// Codec id of a video package.
pub const VIDEO: i8 = 4;
/// Codec id of an image package.
pub const IMAGE: i8 = 1;

/// Builds a recording package by package.
#[derive(Debug, Default)]
pub struct RecordingBuilder {
    bytes: Vec<u8>,
    order: ByteOrder,
    count: usize,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn little_endian() -> Self {
        Self {
            order: ByteOrder::Little,
            ..Self::default()
        }
    }

    /// Append a package whose payload is `len` copies of its index byte.
    pub fn package(self, codec: i8, len: usize) -> Self {
        let fill = self.count as u8;
        self.package_with(codec, &vec![fill; len])
    }

    /// Append a package with an explicit payload.
    pub fn package_with(mut self, codec: i8, payload: &[u8]) -> Self {
        let header = PackageHeader {
            vid_codec: codec,
            timestamp: 1_000.0 + self.count as f64 * 0.5,
            latitude: 48.0 + self.count as f64 * 0.001,
            longitude: 11.0 + self.count as f64 * 0.001,
            altitude: 100.0 + self.count as f32,
            ..PackageHeader::default()
        };
        self.bytes.extend(encode_package(&header, payload, self.order));
        self.count += 1;
        self
    }

    /// Append a package built from `header`.
    pub fn header(mut self, header: &PackageHeader, payload: &[u8]) -> Self {
        self.bytes.extend(encode_package(header, payload, self.order));
        self.count += 1;
        self
    }

    /// Append raw bytes that are not a package.
    pub fn garbage(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// `count` video packages with payloads of `len` bytes.
pub fn video_packages(count: usize, len: usize) -> Vec<u8> {
    (0..count)
        .fold(RecordingBuilder::new(), |builder, _| builder.package(VIDEO, len))
        .build()
}

pub fn container(bytes: Vec<u8>) -> Arc<Container> {
    Arc::new(Container::new(bytes, &ParseOptions::default()).unwrap())
}

/// Load options that never touch FFmpeg or the image sniffer.
pub fn quiet_load_options() -> LoadOptions {
    LoadOptions::new().without_demuxer().with_probe_images(false)
}

/// A 2x2 PNG, for image sniffing.
pub fn tiny_png() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 0]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
