//! Container scanning.
//!
//! [`parse`] walks a byte buffer looking for the 4-byte sync marker,
//! validates each candidate package, and builds a [`PackageTable`]. A
//! candidate is accepted when it ends exactly at the end of the buffer or
//! when the marker reappears exactly where the candidate says the next
//! package starts. Accepted packages are chained into *runs* without
//! searching again; when a run breaks, the failed candidate is recorded as a
//! [`CorruptSegment`] and the search resumes right after its marker.
//!
//! Corruption never aborts a scan. The only hard failure is an input larger
//! than [`ParseOptions::max_size`], which is rejected before any byte is
//! looked at.
//!
//! # Example
//!
//! ```
//! use rtmv::{ByteOrder, PackageHeader, ParseOptions, encode_package, parse};
//!
//! let video = PackageHeader { vid_codec: 4, ..PackageHeader::default() };
//! let image = PackageHeader { vid_codec: 1, ..PackageHeader::default() };
//! let mut bytes = encode_package(&video, &[0u8; 100], ByteOrder::Big);
//! bytes.extend(encode_package(&image, &[0u8; 50], ByteOrder::Big));
//!
//! let table = parse(&bytes, &ParseOptions::default())?;
//! assert_eq!(table.len(), 2);
//! assert_eq!((table.video_count(), table.image_count()), (1, 1));
//! # Ok::<(), rtmv::RtmvError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::Range;

use memchr::memmem::Finder;

use crate::config::ParseOptions;
use crate::error::RtmvError;
use crate::header::{
    ByteOrder, HEADER_LEN, PackageHeader, PayloadType, SIGNATURE, peek_payload_size,
};

/// One located package.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    /// Offset of the signature from the start of the buffer.
    pub file_offset: u64,
    /// Decoded header.
    pub header: PackageHeader,
    /// Header plus payload length in bytes.
    pub total_len: u32,
}

impl Package {
    /// Byte range of the payload inside the source buffer.
    pub fn payload_range(&self) -> Range<usize> {
        let start = self.file_offset as usize + HEADER_LEN;
        start..self.file_offset as usize + self.total_len as usize
    }

    /// Byte range of the whole package inside the source buffer.
    pub fn package_range(&self) -> Range<usize> {
        let start = self.file_offset as usize;
        start..start + self.total_len as usize
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.total_len as usize - HEADER_LEN
    }

    /// Payload type of this package.
    pub fn payload_type(&self) -> PayloadType {
        self.header.payload_type()
    }
}

/// Why a candidate package was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer bytes than one header remain after the marker.
    Truncated {
        /// Bytes left in the buffer.
        remaining: usize,
    },
    /// The bytes at the candidate position are not the marker.
    MissingSignature,
    /// The `payload_size` field is negative.
    NegativePayloadSize(i32),
    /// The declared package runs past the end of the buffer (or leaves a
    /// tail too short to hold another marker).
    IncompleteTail {
        /// Declared header + payload length.
        declared: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },
    /// The marker does not reappear where the next package should start.
    NoFollowingSignature {
        /// Where the next marker was expected.
        expected_at: u64,
    },
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SkipReason::Truncated { remaining } => {
                write!(f, "only {remaining} bytes left, shorter than a header")
            }
            SkipReason::MissingSignature => write!(f, "no signature at candidate"),
            SkipReason::NegativePayloadSize(size) => write!(f, "negative payload size {size}"),
            SkipReason::IncompleteTail {
                declared,
                remaining,
            } => write!(f, "declares {declared} bytes but {remaining} remain"),
            SkipReason::NoFollowingSignature { expected_at } => {
                write!(f, "no signature at offset {expected_at}")
            }
        }
    }
}

/// A rejected candidate: the scan skipped it and resynchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorruptSegment {
    /// Offset of the rejected marker.
    pub offset: u64,
    /// Why it was rejected.
    pub reason: SkipReason,
}

/// Ordered table of packages found in one buffer, with scan statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageTable {
    packages: Vec<Package>,
    video_count: usize,
    image_count: usize,
    sync_positions: Vec<u64>,
    corrupt_segments: Vec<CorruptSegment>,
}

impl PackageTable {
    /// All packages, ordered by strictly increasing `file_offset`.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    /// The package at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Package> {
        self.packages.get(index)
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// `true` when the scan found nothing.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Number of video packages.
    pub fn video_count(&self) -> usize {
        self.video_count
    }

    /// Number of image packages.
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    /// Offsets where a run of back-to-back packages started.
    pub fn sync_positions(&self) -> &[u64] {
        &self.sync_positions
    }

    /// Candidates that were rejected during the scan.
    pub fn corrupt_segments(&self) -> &[CorruptSegment] {
        &self.corrupt_segments
    }

    /// Check that `start..=end` is a valid inclusive range of this table.
    pub fn check_range(&self, start: usize, end: usize) -> Result<(), RtmvError> {
        if start > end {
            return Err(RtmvError::InvalidRange { start, end });
        }
        if end >= self.packages.len() {
            return Err(RtmvError::PackageOutOfRange {
                index: end,
                count: self.packages.len(),
            });
        }
        Ok(())
    }

    fn push(&mut self, package: Package) {
        match package.payload_type() {
            PayloadType::Video => self.video_count += 1,
            PayloadType::Image => self.image_count += 1,
        }
        self.packages.push(package);
    }

    fn skip(&mut self, offset: usize, reason: SkipReason) {
        log::warn!("Skipping candidate package at offset {offset}: {reason}");
        self.corrupt_segments.push(CorruptSegment {
            offset: offset as u64,
            reason,
        });
    }
}

/// Scan `buffer` and build its package table.
///
/// # Errors
///
/// Returns [`RtmvError::FileTooLarge`] when `buffer` is longer than
/// `options.max_size`. Damaged regions are skipped, never reported as errors.
pub fn parse(buffer: &[u8], options: &ParseOptions) -> Result<PackageTable, RtmvError> {
    let size = buffer.len() as u64;
    if size > options.max_size {
        return Err(RtmvError::FileTooLarge {
            size,
            limit: options.max_size,
        });
    }

    let order = options.byte_order;
    let signature = order.signature();
    let finder = Finder::new(&signature);
    let mut table = PackageTable::default();
    let mut pos = 0;

    while buffer.len() - pos >= HEADER_LEN {
        let Some(found) = finder.find(&buffer[pos..]) else {
            break;
        };
        let mut at = pos + found;

        let mut total_len = match check_candidate(buffer, at, order) {
            Ok(total_len) => total_len,
            Err(reason) => {
                table.skip(at, reason);
                pos = at + SIGNATURE.len();
                continue;
            }
        };

        log::debug!("Sync at offset {at}");
        table.sync_positions.push(at as u64);

        // Follow the run until it breaks or the buffer ends.
        loop {
            let header = PackageHeader::decode(&buffer[at..], order)?;
            table.push(Package {
                file_offset: at as u64,
                header,
                total_len,
            });
            at += total_len as usize;

            if at == buffer.len() {
                pos = at;
                break;
            }
            match check_candidate(buffer, at, order) {
                Ok(next) => total_len = next,
                Err(reason) => {
                    table.skip(at, reason);
                    pos = at + SIGNATURE.len();
                    break;
                }
            }
        }
    }

    log::info!(
        "Parsed {} packages ({} video, {} image) in {} runs, {} skipped candidates",
        table.len(),
        table.video_count,
        table.image_count,
        table.sync_positions.len(),
        table.corrupt_segments.len(),
    );

    Ok(table)
}

/// [`parse`] with [`ParseOptions::default`].
pub fn parse_default(buffer: &[u8]) -> Result<PackageTable, RtmvError> {
    parse(buffer, &ParseOptions::default())
}

/// Validate the candidate at `pos` and return its total length.
fn check_candidate(buffer: &[u8], pos: usize, order: ByteOrder) -> Result<u32, SkipReason> {
    let signature = order.signature();
    let remaining = buffer.len() - pos;
    if remaining < HEADER_LEN {
        return Err(SkipReason::Truncated { remaining });
    }
    if buffer[pos..pos + signature.len()] != signature {
        return Err(SkipReason::MissingSignature);
    }

    let payload_size =
        peek_payload_size(buffer, pos, order).ok_or(SkipReason::Truncated { remaining })?;
    if payload_size < 0 {
        return Err(SkipReason::NegativePayloadSize(payload_size));
    }

    let declared = HEADER_LEN + payload_size as usize;
    if remaining == declared {
        return Ok(declared as u32);
    }
    if remaining < declared + signature.len() {
        return Err(SkipReason::IncompleteTail {
            declared,
            remaining,
        });
    }

    let next = pos + declared;
    if buffer[next..next + signature.len()] == signature {
        Ok(declared as u32)
    } else {
        Err(SkipReason::NoFollowingSignature {
            expected_at: next as u64,
        })
    }
}

/// A raw buffer together with its package table.
///
/// Both are immutable after construction, so a `Container` can be shared
/// through an [`Arc`](std::sync::Arc) between any number of feeders and
/// probers without locking.
#[derive(Debug, Clone)]
pub struct Container {
    data: Vec<u8>,
    table: PackageTable,
    byte_order: ByteOrder,
}

impl Container {
    /// Parse `data` and keep it alongside the resulting table.
    pub fn new(data: Vec<u8>, options: &ParseOptions) -> Result<Self, RtmvError> {
        let table = parse(&data, options)?;
        Ok(Self {
            data,
            table,
            byte_order: options.byte_order,
        })
    }

    /// The package table.
    pub fn table(&self) -> &PackageTable {
        &self.table
    }

    /// The whole source buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Byte order the buffer was parsed with.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Payload bytes of package `index`.
    pub fn payload(&self, index: usize) -> Option<&[u8]> {
        let package = self.table.get(index)?;
        self.data.get(package.payload_range())
    }

    /// Header and payload bytes of package `index`.
    pub fn package_bytes(&self, index: usize) -> Option<&[u8]> {
        let package = self.table.get(index)?;
        self.data.get(package.package_range())
    }

    /// Payload slices of packages `start..=end`, in order.
    pub fn payloads(&self, start: usize, end: usize) -> Result<Vec<&[u8]>, RtmvError> {
        self.table.check_range(start, end)?;
        Ok(self.table.packages()[start..=end]
            .iter()
            .map(|package| &self.data[package.payload_range()])
            .collect())
    }
}
