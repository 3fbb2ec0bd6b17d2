//! Progress and cancellation integration tests.

mod common;

use std::sync::{Arc, Mutex};

use common::{quiet_load_options, video_packages};
use rtmv::{
    CancellationToken, DumpOption, ExportOptions, OperationType, ProgressCallback, ProgressInfo,
    RtmvError, RtmvFile, dump,
};

#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressInfo>>);

impl ProgressCallback for Recorder {
    fn on_progress(&self, info: &ProgressInfo) {
        self.0.lock().unwrap().push(info.clone());
    }
}

/// Cancels `token` after `after` reports.
struct CancelAfter {
    token: CancellationToken,
    after: usize,
    seen: Mutex<usize>,
}

impl ProgressCallback for CancelAfter {
    fn on_progress(&self, _info: &ProgressInfo) {
        let mut seen = self.seen.lock().unwrap();
        *seen += 1;
        if *seen >= self.after {
            self.token.cancel();
        }
    }
}

// ── CancellationToken ──────────────────────────────────────────────

#[test]
fn cancellation_token_default_not_cancelled() {
    let token = CancellationToken::default();
    assert!(!token.is_cancelled());
}

#[test]
fn cancellation_token_clones_share_state() {
    let token = CancellationToken::new();
    let clone = token.clone();
    clone.cancel();
    assert!(token.is_cancelled());
}

// ── Export progress ────────────────────────────────────────────────

#[test]
fn export_reports_batches_and_a_final_update() {
    let file = RtmvFile::from_bytes(video_packages(10, 16), &quiet_load_options()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let options = ExportOptions::new()
        .with_progress(recorder.clone())
        .with_batch_size(4);

    dump(
        &file,
        dir.path().join("out.bin"),
        DumpOption::Payload,
        None,
        &options,
    )
    .unwrap();

    let reports = recorder.0.lock().unwrap();
    let currents: Vec<u64> = reports.iter().map(|info| info.current).collect();
    assert_eq!(currents, vec![4, 8, 10]);

    let last = reports.last().unwrap();
    assert_eq!(last.operation, OperationType::Export);
    assert_eq!(last.total, Some(10));
    assert_eq!(last.bytes, 160);
    assert_eq!(last.percentage, Some(100.0));
    assert_eq!(last.estimated_remaining, Some(std::time::Duration::ZERO));
}

#[test]
fn cancelling_from_a_callback_stops_the_export() {
    let file = RtmvFile::from_bytes(video_packages(20, 16), &quiet_load_options()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let token = CancellationToken::new();
    let callback = Arc::new(CancelAfter {
        token: token.clone(),
        after: 3,
        seen: Mutex::new(0),
    });
    let options = ExportOptions::new()
        .with_progress(callback)
        .with_cancellation(token.clone());

    let result = dump(
        &file,
        dir.path().join("out.bin"),
        DumpOption::PackagesAll,
        None,
        &options,
    );

    assert!(matches!(result, Err(RtmvError::Cancelled)));
    assert!(token.is_cancelled());
    let written = std::fs::metadata(dir.path().join("out.bin")).unwrap().len();
    assert!(written < 20 * (128 + 16));
}
