//! Fixed binary layout of an RTMV package header.
//!
//! Every package starts with a [`HEADER_LEN`]-byte header described field by
//! field in [`HEADER_LAYOUT`], immediately followed by `payload_size` bytes of
//! payload. The layout is fixed at compile time: the total length and the
//! offset of the `payload_size` field are derived from the table so that the
//! scanner can peek at a candidate's size without decoding the whole header.
//!
//! # Example
//!
//! ```
//! use rtmv::{ByteOrder, PackageHeader, PayloadType, encode_package};
//!
//! let header = PackageHeader { vid_codec: 4, timestamp: 12.5, ..PackageHeader::default() };
//! let bytes = encode_package(&header, &[0u8; 16], ByteOrder::Big);
//!
//! let decoded = PackageHeader::decode(&bytes, ByteOrder::Big)?;
//! assert_eq!(decoded.payload_size, 16);
//! assert_eq!(decoded.payload_type(), PayloadType::Video);
//! # Ok::<(), rtmv::RtmvError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::RtmvError;

/// The package signature as written by big-endian producers.
pub const SIGNATURE: [u8; 4] = *b"PaVE";

/// Codec id that marks a video elementary-stream payload.
pub const VIDEO_CODEC_ID: i8 = 4;

/// Scalar type of a header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Fixed-length byte string.
    Bytes,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

/// One named field of the header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderField {
    /// Field name, as used in header dumps and CSV exports.
    pub name: &'static str,
    /// Length on the wire in bytes.
    pub len: usize,
    /// Scalar type.
    pub kind: FieldKind,
}

const fn field(name: &'static str, len: usize, kind: FieldKind) -> HeaderField {
    HeaderField { name, len, kind }
}

/// The header layout in wire order. The signature is always first.
pub const HEADER_LAYOUT: &[HeaderField] = &[
    field("signature", 4, FieldKind::Bytes),
    field("version", 1, FieldKind::I8),
    field("ctrl_quality", 1, FieldKind::I8),
    field("vid_quality", 1, FieldKind::I8),
    field("header_size", 1, FieldKind::U8),
    field("timestamp", 8, FieldKind::F64),
    field("mission_state", 4, FieldKind::F32),
    field("velocity_x", 4, FieldKind::F32),
    field("velocity_y", 4, FieldKind::F32),
    field("velocity_z", 4, FieldKind::F32),
    field("lat", 8, FieldKind::F64),
    field("long", 8, FieldKind::F64),
    field("alt", 4, FieldKind::F32),
    field("height", 4, FieldKind::F32),
    field("hdop_h", 4, FieldKind::F32),
    field("hdop_v", 4, FieldKind::F32),
    field("sat_count", 4, FieldKind::I32),
    field("uav_roll", 4, FieldKind::F32),
    field("uav_pitch", 4, FieldKind::F32),
    field("uav_yaw", 4, FieldKind::F32),
    field("cam_roll", 4, FieldKind::F32),
    field("cam_pitch", 4, FieldKind::F32),
    field("cam_yaw", 4, FieldKind::F32),
    field("payload_size", 4, FieldKind::I32),
    field("vid_codec", 1, FieldKind::I8),
    field("frame_type", 1, FieldKind::I8),
    field("stream_w", 2, FieldKind::I16),
    field("stream_h", 2, FieldKind::I16),
    field("disp_w", 2, FieldKind::I16),
    field("disp_h", 2, FieldKind::I16),
    field("uav_name", 20, FieldKind::Bytes),
    field("reserved", 2, FieldKind::Bytes),
];

const fn layout_len(layout: &[HeaderField]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < layout.len() {
        total += layout[i].len;
        i += 1;
    }
    total
}

const fn same_name(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const fn field_offset(layout: &[HeaderField], name: &str) -> usize {
    let mut offset = 0;
    let mut i = 0;
    while i < layout.len() {
        if same_name(layout[i].name, name) {
            return offset;
        }
        offset += layout[i].len;
        i += 1;
    }
    panic!("field missing from header layout");
}

/// Total header length in bytes.
pub const HEADER_LEN: usize = layout_len(HEADER_LAYOUT);

/// Offset of the `payload_size` field from the start of a package.
pub const PAYLOAD_SIZE_OFFSET: usize = field_offset(HEADER_LAYOUT, "payload_size");

/// Byte order of the numeric header fields.
///
/// Little-endian producers also write the signature reversed (`"EVaP"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Network byte order. This is the default.
    #[default]
    Big,
    /// Little-endian.
    Little,
}

impl ByteOrder {
    /// The 4-byte sync marker as it appears on disk for this byte order.
    pub fn signature(self) -> [u8; 4] {
        match self {
            ByteOrder::Big => SIGNATURE,
            ByteOrder::Little => {
                let mut reversed = SIGNATURE;
                reversed.reverse();
                reversed
            }
        }
    }
}

/// Kind of payload carried by a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// Video elementary-stream bytes.
    Video,
    /// A still image.
    Image,
}

impl PayloadType {
    /// Map a `vid_codec` header value to a payload type.
    ///
    /// Only [`VIDEO_CODEC_ID`] is video; every other id is an image.
    pub fn from_codec(codec_id: i8) -> Self {
        if codec_id == VIDEO_CODEC_ID {
            PayloadType::Video
        } else {
            PayloadType::Image
        }
    }
}

impl Display for PayloadType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PayloadType::Video => write!(f, "video"),
            PayloadType::Image => write!(f, "image"),
        }
    }
}

/// One decoded package header. Immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageHeader {
    /// Raw signature bytes.
    pub signature: [u8; 4],
    pub version: i8,
    pub ctrl_quality: i8,
    pub vid_quality: i8,
    /// Header size as declared by the producer.
    pub header_size: u8,
    /// Acquisition time in seconds.
    pub timestamp: f64,
    pub mission_state: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub velocity_z: f32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f32,
    pub height: f32,
    /// Horizontal dilution of precision.
    pub hdop_h: f32,
    /// Vertical dilution of precision.
    pub hdop_v: f32,
    pub satellite_count: i32,
    pub uav_roll: f32,
    pub uav_pitch: f32,
    pub uav_yaw: f32,
    pub cam_roll: f32,
    pub cam_pitch: f32,
    pub cam_yaw: f32,
    /// Number of payload bytes following the header.
    pub payload_size: i32,
    /// Codec id; see [`PayloadType::from_codec`].
    pub vid_codec: i8,
    pub frame_type: i8,
    pub stream_width: i16,
    pub stream_height: i16,
    pub display_width: i16,
    pub display_height: i16,
    /// NUL-padded UAV identifier.
    pub uav_name: [u8; 20],
    pub reserved: [u8; 2],
}

impl Default for PackageHeader {
    fn default() -> Self {
        Self {
            signature: SIGNATURE,
            version: 1,
            ctrl_quality: 0,
            vid_quality: 0,
            header_size: HEADER_LEN as u8,
            timestamp: 0.0,
            mission_state: 0.0,
            velocity_x: 0.0,
            velocity_y: 0.0,
            velocity_z: 0.0,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            height: 0.0,
            hdop_h: 0.0,
            hdop_v: 0.0,
            satellite_count: 0,
            uav_roll: 0.0,
            uav_pitch: 0.0,
            uav_yaw: 0.0,
            cam_roll: 0.0,
            cam_pitch: 0.0,
            cam_yaw: 0.0,
            payload_size: 0,
            vid_codec: 0,
            frame_type: 0,
            stream_width: 0,
            stream_height: 0,
            display_width: 0,
            display_height: 0,
            uav_name: [0; 20],
            reserved: [0; 2],
        }
    }
}

impl PackageHeader {
    /// Decode a header from the first [`HEADER_LEN`] bytes of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`RtmvError::HeaderTooShort`] if fewer bytes are available.
    pub fn decode(bytes: &[u8], order: ByteOrder) -> Result<Self, RtmvError> {
        if bytes.len() < HEADER_LEN {
            return Err(RtmvError::HeaderTooShort {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let mut r = FieldReader {
            buf: &bytes[..HEADER_LEN],
            order,
        };
        Ok(Self {
            signature: r.array(),
            version: r.i8(),
            ctrl_quality: r.i8(),
            vid_quality: r.i8(),
            header_size: r.u8(),
            timestamp: r.f64(),
            mission_state: r.f32(),
            velocity_x: r.f32(),
            velocity_y: r.f32(),
            velocity_z: r.f32(),
            latitude: r.f64(),
            longitude: r.f64(),
            altitude: r.f32(),
            height: r.f32(),
            hdop_h: r.f32(),
            hdop_v: r.f32(),
            satellite_count: r.i32(),
            uav_roll: r.f32(),
            uav_pitch: r.f32(),
            uav_yaw: r.f32(),
            cam_roll: r.f32(),
            cam_pitch: r.f32(),
            cam_yaw: r.f32(),
            payload_size: r.i32(),
            vid_codec: r.i8(),
            frame_type: r.i8(),
            stream_width: r.i16(),
            stream_height: r.i16(),
            display_width: r.i16(),
            display_height: r.i16(),
            uav_name: r.array(),
            reserved: r.array(),
        })
    }

    /// Encode this header into exactly [`HEADER_LEN`] bytes.
    ///
    /// The signature written is always the marker for `order`, regardless of
    /// the `signature` field.
    pub fn encode(&self, order: ByteOrder) -> Vec<u8> {
        let mut w = FieldWriter {
            buf: BytesMut::with_capacity(HEADER_LEN),
            order,
        };
        w.bytes(&order.signature());
        w.i8(self.version);
        w.i8(self.ctrl_quality);
        w.i8(self.vid_quality);
        w.bytes(&[self.header_size]);
        w.f64(self.timestamp);
        w.f32(self.mission_state);
        w.f32(self.velocity_x);
        w.f32(self.velocity_y);
        w.f32(self.velocity_z);
        w.f64(self.latitude);
        w.f64(self.longitude);
        w.f32(self.altitude);
        w.f32(self.height);
        w.f32(self.hdop_h);
        w.f32(self.hdop_v);
        w.i32(self.satellite_count);
        w.f32(self.uav_roll);
        w.f32(self.uav_pitch);
        w.f32(self.uav_yaw);
        w.f32(self.cam_roll);
        w.f32(self.cam_pitch);
        w.f32(self.cam_yaw);
        w.i32(self.payload_size);
        w.i8(self.vid_codec);
        w.i8(self.frame_type);
        w.i16(self.stream_width);
        w.i16(self.stream_height);
        w.i16(self.display_width);
        w.i16(self.display_height);
        w.bytes(&self.uav_name);
        w.bytes(&self.reserved);
        w.buf.to_vec()
    }

    /// Payload type derived from `vid_codec`.
    pub fn payload_type(&self) -> PayloadType {
        PayloadType::from_codec(self.vid_codec)
    }

    /// The UAV name with trailing NUL padding removed.
    pub fn uav_name(&self) -> String {
        trimmed_text(&self.uav_name)
    }

    /// Set the UAV name, truncating to 20 bytes and NUL-padding the rest.
    pub fn set_uav_name(&mut self, name: &str) {
        self.uav_name = [0; 20];
        let bytes = name.as_bytes();
        let len = bytes.len().min(self.uav_name.len());
        self.uav_name[..len].copy_from_slice(&bytes[..len]);
    }

    /// Rendered `(field name, value)` pairs in [`HEADER_LAYOUT`] order.
    pub fn field_values(&self) -> Vec<(&'static str, String)> {
        let values = [
            trimmed_text(&self.signature),
            self.version.to_string(),
            self.ctrl_quality.to_string(),
            self.vid_quality.to_string(),
            self.header_size.to_string(),
            self.timestamp.to_string(),
            self.mission_state.to_string(),
            self.velocity_x.to_string(),
            self.velocity_y.to_string(),
            self.velocity_z.to_string(),
            self.latitude.to_string(),
            self.longitude.to_string(),
            self.altitude.to_string(),
            self.height.to_string(),
            self.hdop_h.to_string(),
            self.hdop_v.to_string(),
            self.satellite_count.to_string(),
            self.uav_roll.to_string(),
            self.uav_pitch.to_string(),
            self.uav_yaw.to_string(),
            self.cam_roll.to_string(),
            self.cam_pitch.to_string(),
            self.cam_yaw.to_string(),
            self.payload_size.to_string(),
            self.vid_codec.to_string(),
            self.frame_type.to_string(),
            self.stream_width.to_string(),
            self.stream_height.to_string(),
            self.display_width.to_string(),
            self.display_height.to_string(),
            trimmed_text(&self.uav_name),
            trimmed_text(&self.reserved),
        ];
        HEADER_LAYOUT
            .iter()
            .map(|field| field.name)
            .zip(values)
            .collect()
    }
}

/// Encode a complete package: header followed by `payload`.
///
/// `payload_size` is taken from `payload.len()`, overriding the header.
pub fn encode_package(header: &PackageHeader, payload: &[u8], order: ByteOrder) -> Vec<u8> {
    let mut header = header.clone();
    header.payload_size = payload.len() as i32;
    let mut bytes = header.encode(order);
    bytes.extend_from_slice(payload);
    bytes
}

/// Read the `payload_size` field of the package starting at `pos` without
/// decoding the rest of the header.
pub(crate) fn peek_payload_size(buffer: &[u8], pos: usize, order: ByteOrder) -> Option<i32> {
    let start = pos.checked_add(PAYLOAD_SIZE_OFFSET)?;
    let mut field = buffer.get(start..start.checked_add(4)?)?;
    Some(match order {
        ByteOrder::Big => field.get_i32(),
        ByteOrder::Little => field.get_i32_le(),
    })
}

fn trimmed_text(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Header fields read from a slice with the getters of `order`.
struct FieldReader<'a> {
    buf: &'a [u8],
    order: ByteOrder,
}

// Length was checked once in `decode`, so the fixed-size gets cannot fail.
impl FieldReader<'_> {
    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        out
    }

    fn u8(&mut self) -> u8 {
        self.buf.get_u8()
    }

    fn i8(&mut self) -> i8 {
        self.buf.get_i8()
    }

    fn i16(&mut self) -> i16 {
        match self.order {
            ByteOrder::Big => self.buf.get_i16(),
            ByteOrder::Little => self.buf.get_i16_le(),
        }
    }

    fn i32(&mut self) -> i32 {
        match self.order {
            ByteOrder::Big => self.buf.get_i32(),
            ByteOrder::Little => self.buf.get_i32_le(),
        }
    }

    fn f32(&mut self) -> f32 {
        match self.order {
            ByteOrder::Big => self.buf.get_f32(),
            ByteOrder::Little => self.buf.get_f32_le(),
        }
    }

    fn f64(&mut self) -> f64 {
        match self.order {
            ByteOrder::Big => self.buf.get_f64(),
            ByteOrder::Little => self.buf.get_f64_le(),
        }
    }
}

struct FieldWriter {
    buf: BytesMut,
    order: ByteOrder,
}

impl FieldWriter {
    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    fn i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    fn i16(&mut self, value: i16) {
        match self.order {
            ByteOrder::Big => self.buf.put_i16(value),
            ByteOrder::Little => self.buf.put_i16_le(value),
        }
    }

    fn i32(&mut self, value: i32) {
        match self.order {
            ByteOrder::Big => self.buf.put_i32(value),
            ByteOrder::Little => self.buf.put_i32_le(value),
        }
    }

    fn f32(&mut self, value: f32) {
        match self.order {
            ByteOrder::Big => self.buf.put_f32(value),
            ByteOrder::Little => self.buf.put_f32_le(value),
        }
    }

    fn f64(&mut self, value: f64) {
        match self.order {
            ByteOrder::Big => self.buf.put_f64(value),
            ByteOrder::Little => self.buf.put_f64_le(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> PackageHeader {
        let mut header = PackageHeader {
            timestamp: 1_612_600_000.25,
            latitude: 22.543_096,
            longitude: 114.057_865,
            altitude: 120.5,
            satellite_count: 14,
            cam_pitch: -90.0,
            vid_codec: VIDEO_CODEC_ID,
            stream_width: 1920,
            stream_height: 1080,
            payload_size: 64,
            ..PackageHeader::default()
        };
        header.set_uav_name("M300-A");
        header
    }

    #[test]
    fn layout_constants() {
        assert_eq!(HEADER_LEN, 128);
        assert_eq!(PAYLOAD_SIZE_OFFSET, 92);
        assert_eq!(HEADER_LAYOUT[0].name, "signature");
        assert_eq!(HEADER_LAYOUT[0].len, SIGNATURE.len());
    }

    #[test]
    fn encoded_header_has_layout_length() {
        assert_eq!(sample_header().encode(ByteOrder::Big).len(), HEADER_LEN);
        assert_eq!(sample_header().encode(ByteOrder::Little).len(), HEADER_LEN);
    }

    #[test]
    fn payload_size_sits_at_layout_offset() {
        let bytes = sample_header().encode(ByteOrder::Big);
        assert_eq!(peek_payload_size(&bytes, 0, ByteOrder::Big), Some(64));

        let bytes = sample_header().encode(ByteOrder::Little);
        assert_eq!(peek_payload_size(&bytes, 0, ByteOrder::Little), Some(64));
    }

    #[test]
    fn decode_restores_every_field() {
        for order in [ByteOrder::Big, ByteOrder::Little] {
            let mut header = sample_header();
            header.signature = order.signature();
            let decoded = PackageHeader::decode(&header.encode(order), order).unwrap();
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn fields_are_written_in_the_requested_order() {
        let header = sample_header();
        let big = header.encode(ByteOrder::Big);
        let little = header.encode(ByteOrder::Little);

        assert_eq!(&big[8..16], &1_612_600_000.25f64.to_be_bytes());
        assert_eq!(&little[8..16], &1_612_600_000.25f64.to_le_bytes());
        assert_eq!(&big[64..68], &14i32.to_be_bytes());
        assert_eq!(&little[64..68], &14i32.to_le_bytes());
        assert_eq!(&big[98..100], &1920i16.to_be_bytes());
        assert_eq!(&little[98..100], &1920i16.to_le_bytes());
        assert_eq!(&big[106..112], b"M300-A");
    }

    #[test]
    fn little_endian_signature_is_reversed() {
        assert_eq!(&ByteOrder::Little.signature(), b"EVaP");
        let bytes = sample_header().encode(ByteOrder::Little);
        assert_eq!(&bytes[..4], b"EVaP");
    }

    #[test]
    fn decode_rejects_short_input() {
        let error = PackageHeader::decode(&[0u8; 10], ByteOrder::Big).unwrap_err();
        assert!(matches!(
            error,
            RtmvError::HeaderTooShort { expected: 128, actual: 10 }
        ));
    }

    #[test]
    fn peek_out_of_bounds_is_none() {
        assert_eq!(peek_payload_size(&[0u8; 95], 0, ByteOrder::Big), None);
    }

    #[test]
    fn codec_mapping() {
        assert_eq!(PayloadType::from_codec(4), PayloadType::Video);
        assert_eq!(PayloadType::from_codec(1), PayloadType::Image);
        assert_eq!(PayloadType::from_codec(0), PayloadType::Image);
    }

    #[test]
    fn field_values_follow_layout() {
        let values = sample_header().field_values();
        assert_eq!(values.len(), HEADER_LAYOUT.len());
        assert_eq!(values[0], ("signature", "PaVE".to_string()));
        let name = values.iter().find(|(k, _)| *k == "uav_name").unwrap();
        assert_eq!(name.1, "M300-A");
        let size = values.iter().find(|(k, _)| *k == "payload_size").unwrap();
        assert_eq!(size.1, "64");
    }

    #[test]
    fn uav_name_is_truncated() {
        let mut header = PackageHeader::default();
        header.set_uav_name("a-very-long-aircraft-identifier");
        assert_eq!(header.uav_name().len(), 20);
    }
}
