//! Section segmentation integration tests.

mod common;

use common::{IMAGE, RecordingBuilder, VIDEO, quiet_load_options};
use rtmv::{PackageHeader, PayloadType, RtmvFile, parse_default, segment};

fn recording(kinds: &[i8]) -> Vec<u8> {
    kinds
        .iter()
        .fold(RecordingBuilder::new(), |builder, &codec| builder.package(codec, 8))
        .build()
}

#[test]
fn video_image_video_pattern() {
    let bytes = recording(&[VIDEO, VIDEO, VIDEO, IMAGE, IMAGE, VIDEO]);
    let sections = segment(&parse_default(&bytes).unwrap());

    let summary: Vec<_> = sections
        .iter()
        .map(|s| (s.start_index, s.end_index, s.kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, 2, PayloadType::Video),
            (3, 4, PayloadType::Image),
            (5, 5, PayloadType::Video),
        ]
    );
}

#[test]
fn sections_partition_the_table() {
    let patterns: &[&[i8]] = &[
        &[VIDEO],
        &[IMAGE, IMAGE],
        &[VIDEO, IMAGE, VIDEO, IMAGE],
        &[IMAGE, VIDEO, VIDEO, VIDEO, IMAGE, 2, 3, VIDEO],
    ];

    for kinds in patterns {
        let table = parse_default(&recording(kinds)).unwrap();
        let sections = segment(&table);

        assert_eq!(sections.first().unwrap().start_index, 0);
        assert_eq!(sections.last().unwrap().end_index, kinds.len() - 1);
        for pair in sections.windows(2) {
            assert_eq!(pair[0].end_index + 1, pair[1].start_index);
            assert_ne!(pair[0].kind, pair[1].kind);
        }
        for section in &sections {
            assert!(!section.is_empty());
            for index in section.indices() {
                assert_eq!(table.get(index).unwrap().payload_type(), section.kind);
            }
        }
    }
}

#[test]
fn non_video_codecs_all_count_as_images() {
    let bytes = recording(&[0, 1, 2, 3, 5, -1]);
    let sections = segment(&parse_default(&bytes).unwrap());
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].kind, PayloadType::Image);
    assert_eq!(sections[0].len(), 6);
}

#[test]
fn durations_come_from_timestamps() {
    let header = |codec: i8, timestamp: f64| PackageHeader {
        vid_codec: codec,
        timestamp,
        ..PackageHeader::default()
    };
    let bytes = RecordingBuilder::new()
        .header(&header(VIDEO, 10.0), &[0; 4])
        .header(&header(VIDEO, 12.5), &[0; 4])
        .header(&header(IMAGE, 13.0), &[0; 4])
        .header(&header(VIDEO, 20.0), &[0; 4])
        .header(&header(VIDEO, 18.0), &[0; 4])
        .build();

    let file = RtmvFile::from_bytes(bytes, &quiet_load_options()).unwrap();
    let durations: Vec<f64> = file.sections().iter().map(|s| s.duration_seconds).collect();
    assert_eq!(durations, vec![2.5, 0.0, -2.0]);
    assert_eq!(file.duration(), 8.0);
}
