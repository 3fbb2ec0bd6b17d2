//! Dump integration tests. Every test writes into its own temp directory.

mod common;

use std::fs;

use common::{IMAGE, RecordingBuilder, VIDEO, quiet_load_options, tiny_png};
use rtmv::{
    CancellationToken, DumpOption, ExportOptions, HEADER_LAYOUT, LoadOptions, RtmvError, RtmvFile,
    dump,
};
use tempfile::tempdir;

/// video, video, image (png), video, image (unknown bytes)
fn mixed_file() -> RtmvFile {
    let bytes = RecordingBuilder::new()
        .package(VIDEO, 100)
        .package(VIDEO, 120)
        .package_with(IMAGE, &tiny_png())
        .package(VIDEO, 80)
        .package_with(IMAGE, b"raw sensor frame")
        .build();
    RtmvFile::from_bytes(bytes, &quiet_load_options()).unwrap()
}

fn payloads(file: &RtmvFile, indices: &[usize]) -> Vec<u8> {
    indices
        .iter()
        .flat_map(|&index| file.payload(index).unwrap().to_vec())
        .collect()
}

// ── Binary dumps ───────────────────────────────────────────────────

#[test]
fn video_payloads_form_one_stream() {
    let file = mixed_file();
    let dir = tempdir().unwrap();
    let target = dir.path().join("flight.h264");

    let report = dump(
        &file,
        &target,
        DumpOption::PayloadVideo,
        None,
        &ExportOptions::default(),
    )
    .unwrap();

    assert_eq!(report.packages_written, 3);
    assert_eq!(report.bytes_written, 300);
    assert_eq!(report.files_written, 1);
    assert_eq!(fs::read(&target).unwrap(), payloads(&file, &[0, 1, 3]));
}

#[test]
fn payload_dump_honours_the_range() {
    let file = mixed_file();
    let dir = tempdir().unwrap();
    let target = dir.path().join("slice.bin");

    let report = dump(
        &file,
        &target,
        DumpOption::Payload,
        Some(1..=3),
        &ExportOptions::default(),
    )
    .unwrap();

    assert_eq!(report.packages_written, 3);
    assert_eq!(fs::read(&target).unwrap(), payloads(&file, &[1, 2, 3]));
}

#[test]
fn package_dump_is_itself_a_valid_recording() {
    let file = mixed_file();
    let dir = tempdir().unwrap();
    let target = dir.path().join("images.rtmv");

    dump(
        &file,
        &target,
        DumpOption::PackagesImage,
        None,
        &ExportOptions::default(),
    )
    .unwrap();

    let reloaded = RtmvFile::load(&target, &quiet_load_options()).unwrap();
    assert_eq!(reloaded.package_count(), 2);
    assert_eq!(reloaded.image_count(), 2);
    assert_eq!(reloaded.payload(0).unwrap(), file.payload(2).unwrap());
    assert_eq!(reloaded.header(1).unwrap(), file.header(4).unwrap());
}

// ── Text and folder dumps ──────────────────────────────────────────

#[test]
fn image_folder_holds_images_and_positions() {
    let file = mixed_file();
    let dir = tempdir().unwrap();
    let target = dir.path().join("images");

    let report = dump(
        &file,
        &target,
        DumpOption::PayloadImage,
        None,
        &ExportOptions::default(),
    )
    .unwrap();

    assert_eq!(report.packages_written, 2);
    assert_eq!(report.files_written, 3);
    assert_eq!(fs::read(target.join("000002.png")).unwrap(), tiny_png());
    assert_eq!(
        fs::read(target.join("000004.bin")).unwrap(),
        b"raw sensor frame"
    );

    let positions = fs::read_to_string(target.join("pos.csv")).unwrap();
    let lines: Vec<&str> = positions.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("index,file,timestamp,lat,long"));
    assert!(lines[1].starts_with("2,000002.png,1001,"));
    assert!(lines[2].starts_with("4,000004.bin,1002,"));
}

#[test]
fn header_csv_has_one_column_per_field() {
    let file = mixed_file();
    let dir = tempdir().unwrap();
    let target = dir.path().join("headers.csv");

    dump(
        &file,
        &target,
        DumpOption::Header,
        Some(0..=1),
        &ExportOptions::default(),
    )
    .unwrap();

    let text = fs::read_to_string(&target).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);

    let columns = lines[0].split(',').count();
    assert_eq!(columns, HEADER_LAYOUT.len() + 2);
    assert!(lines[0].starts_with("index,offset,"));
    assert!(lines[2].starts_with("1,228,"));
}

#[test]
fn route_is_geojson_in_lon_lat_alt_order() {
    let file = mixed_file();
    let dir = tempdir().unwrap();
    let target = dir.path().join("route.geojson");

    let report = dump(
        &file,
        &target,
        DumpOption::Route,
        None,
        &ExportOptions::default(),
    )
    .unwrap();
    assert_eq!(report.packages_written, 5);

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(value["type"], "FeatureCollection");

    let feature = &value["features"][0];
    assert_eq!(feature["geometry"]["type"], "LineString");
    let coordinates = feature["geometry"]["coordinates"].as_array().unwrap();
    assert_eq!(coordinates.len(), 5);
    assert!((coordinates[1][0].as_f64().unwrap() - 11.001).abs() < 1e-9);
    assert!((coordinates[1][1].as_f64().unwrap() - 48.001).abs() < 1e-9);
    assert_eq!(coordinates[1][2].as_f64().unwrap(), 101.0);

    assert_eq!(feature["properties"]["points"], 5);
    assert_eq!(feature["properties"]["start_time"], 1000.0);
    assert_eq!(feature["properties"]["end_time"], 1002.0);
}

// ── Failures ───────────────────────────────────────────────────────

#[test]
fn bad_ranges_are_rejected() {
    let file = mixed_file();
    let dir = tempdir().unwrap();
    let target = dir.path().join("out.bin");
    let options = ExportOptions::default();

    assert!(matches!(
        dump(&file, &target, DumpOption::Payload, Some(2..=9), &options),
        Err(RtmvError::PackageOutOfRange { index: 9, count: 5 })
    ));
    #[allow(clippy::reversed_empty_ranges)]
    let reversed = 3..=1;
    assert!(matches!(
        dump(&file, &target, DumpOption::Payload, Some(reversed), &options),
        Err(RtmvError::InvalidRange { start: 3, end: 1 })
    ));
}

#[test]
fn empty_file_has_nothing_to_dump() {
    let file = RtmvFile::from_bytes(vec![0u8; 64], &LoadOptions::new().without_demuxer()).unwrap();
    let dir = tempdir().unwrap();

    assert!(matches!(
        dump(
            &file,
            dir.path().join("out.bin"),
            DumpOption::Payload,
            None,
            &ExportOptions::default()
        ),
        Err(RtmvError::NoPackagesFound)
    ));
}

#[test]
fn cancelled_export_stops() {
    let file = mixed_file();
    let dir = tempdir().unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let options = ExportOptions::new().with_cancellation(token);

    assert!(matches!(
        dump(
            &file,
            dir.path().join("out.bin"),
            DumpOption::PackagesAll,
            None,
            &options
        ),
        Err(RtmvError::Cancelled)
    ));
}
