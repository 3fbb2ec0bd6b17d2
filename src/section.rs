//! Payload sections.
//!
//! A payload section is a maximal run of consecutive packages that carry the
//! same [`PayloadType`]. Sections partition the package table: they are
//! ordered, contiguous, non-empty, and neighbouring sections always differ
//! in kind.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::header::PayloadType;
use crate::parser::PackageTable;

/// A run of packages sharing one payload type.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadSection {
    /// Index of the first package.
    pub start_index: usize,
    /// Index of the last package (inclusive).
    pub end_index: usize,
    /// Payload type shared by every package in the section.
    pub kind: PayloadType,
    /// Timestamp of the last package minus timestamp of the first.
    ///
    /// Timestamps are taken as recorded; a clock reset inside the section
    /// makes this negative.
    pub duration_seconds: f64,
    /// Stream metadata, when a probe succeeded.
    pub metadata: Option<BTreeMap<String, String>>,
}

impl PayloadSection {
    /// Number of packages in the section.
    pub fn len(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    /// Sections are never empty; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The package indices covered by this section.
    pub fn indices(&self) -> RangeInclusive<usize> {
        self.start_index..=self.end_index
    }

    /// `true` if package `index` belongs to this section.
    pub fn contains(&self, index: usize) -> bool {
        self.indices().contains(&index)
    }
}

/// Split `table` into payload sections in a single forward pass.
///
/// An empty table yields no sections.
pub fn segment(table: &PackageTable) -> Vec<PayloadSection> {
    let packages = table.packages();
    let Some(first) = packages.first() else {
        return Vec::new();
    };

    let close = |start: usize, end: usize, kind: PayloadType| PayloadSection {
        start_index: start,
        end_index: end,
        kind,
        duration_seconds: packages[end].header.timestamp - packages[start].header.timestamp,
        metadata: None,
    };

    let mut sections = Vec::new();
    let mut start = 0;
    let mut kind = first.payload_type();

    for (index, package) in packages.iter().enumerate().skip(1) {
        let current = package.payload_type();
        if current != kind {
            sections.push(close(start, index - 1, kind));
            start = index;
            kind = current;
        }
    }
    sections.push(close(start, packages.len() - 1, kind));

    log::debug!("Segmented {} packages into {} sections", packages.len(), sections.len());
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseOptions;
    use crate::header::{ByteOrder, PackageHeader, encode_package};
    use crate::parser::parse;

    fn table_of(kinds: &[(i8, f64)]) -> PackageTable {
        let mut bytes = Vec::new();
        for &(codec, timestamp) in kinds {
            let header = PackageHeader {
                vid_codec: codec,
                timestamp,
                ..PackageHeader::default()
            };
            bytes.extend(encode_package(&header, &[0u8; 8], ByteOrder::Big));
        }
        parse(&bytes, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn empty_table_has_no_sections() {
        assert!(segment(&PackageTable::default()).is_empty());
    }

    #[test]
    fn mixed_runs_are_split() {
        let table = table_of(&[(4, 0.0), (4, 1.0), (4, 2.0), (1, 3.0), (1, 4.5), (4, 5.0)]);
        let sections = segment(&table);

        let ranges: Vec<_> = sections
            .iter()
            .map(|s| (s.start_index, s.end_index, s.kind))
            .collect();
        assert_eq!(
            ranges,
            vec![
                (0, 2, PayloadType::Video),
                (3, 4, PayloadType::Image),
                (5, 5, PayloadType::Video),
            ]
        );
        assert_eq!(sections[0].duration_seconds, 2.0);
        assert_eq!(sections[1].duration_seconds, 1.5);
        assert_eq!(sections[2].duration_seconds, 0.0);
    }

    #[test]
    fn single_kind_is_one_section() {
        let table = table_of(&[(2, 0.0), (3, 1.0), (1, 2.0)]);
        let sections = segment(&table);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].len(), 3);
        assert_eq!(sections[0].kind, PayloadType::Image);
    }

    #[test]
    fn clock_reset_gives_negative_duration() {
        let table = table_of(&[(4, 10.0), (4, 2.0)]);
        assert_eq!(segment(&table)[0].duration_seconds, -8.0);
    }

    #[test]
    fn contains_and_indices() {
        let table = table_of(&[(4, 0.0), (1, 0.0), (1, 0.0)]);
        let sections = segment(&table);
        assert!(sections[1].contains(2));
        assert!(!sections[1].contains(0));
        assert_eq!(sections[1].indices(), 1..=2);
    }
}
