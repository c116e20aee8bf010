use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::tempdir;

use hashkeeper_core::hasher::digest_bytes;
use hashkeeper_core::storage::Database;
use hashkeeper_core::{
    AlgorithmProfile, AppConfig, DiffStatus, Error, HashAlgorithm, ResultLabel, ScanEngine,
    ScanProgress, ScanSummary,
};

fn new_engine(config: AppConfig) -> ScanEngine {
    ScanEngine::new(config, Database::open_in_memory().unwrap())
}

/// Collect every notification of `scan_id` up to and including `Complete`.
fn drain_scan(rx: &Receiver<ScanProgress>, scan_id: u64) -> Vec<ScanProgress> {
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut messages = Vec::new();
    loop {
        assert!(
            Instant::now() < deadline,
            "scan {scan_id} did not complete within 30s"
        );
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(msg) => {
                if msg.scan_id() != scan_id {
                    continue;
                }
                let done = msg.is_complete();
                messages.push(msg);
                if done {
                    return messages;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => panic!("progress channel disconnected"),
        }
    }
}

fn run_scan(engine: &ScanEngine, root: &Path) -> Vec<ScanProgress> {
    let rx = engine.progress();
    let scan_id = engine.start_scan(root).unwrap();
    drain_scan(&rx, scan_id)
}

fn scanned_paths(messages: &[ScanProgress]) -> Vec<PathBuf> {
    messages
        .iter()
        .filter_map(|m| match m {
            ScanProgress::File { record, .. } => Some(record.path.clone()),
            _ => None,
        })
        .collect()
}

fn summary_of(messages: &[ScanProgress]) -> &ScanSummary {
    match messages.last() {
        Some(ScanProgress::Complete { summary, .. }) => summary,
        other => panic!("expected Complete as last message, got {other:?}"),
    }
}

/// Layout:
///   root/
///     a.txt            ("alpha")
///     b.txt            ("bravo")
///     nested/
///       c.txt          ("charlie")
///       copy_of_a.txt  ("alpha")   <- same content as a.txt
fn create_test_tree(root: &Path) {
    fs::create_dir_all(root.join("nested")).unwrap();
    fs::write(root.join("a.txt"), "alpha").unwrap();
    fs::write(root.join("b.txt"), "bravo").unwrap();
    fs::write(root.join("nested/c.txt"), "charlie").unwrap();
    fs::write(root.join("nested/copy_of_a.txt"), "alpha").unwrap();
}

#[test]
fn test_full_scan_pipeline() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join("scan_root");
    create_test_tree(&root);

    let engine = new_engine(AppConfig::default());
    let messages = run_scan(&engine, &root);

    assert!(matches!(messages.first(), Some(ScanProgress::Started { .. })));
    assert_eq!(
        scanned_paths(&messages),
        vec![
            root.join("a.txt"),
            root.join("b.txt"),
            root.join("nested/c.txt"),
            root.join("nested/copy_of_a.txt"),
        ]
    );

    let summary = summary_of(&messages);
    assert_eq!(summary.root, root);
    assert_eq!(summary.total_files, 4);
    assert_eq!(summary.total_bytes, 5 + 5 + 7 + 5);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.persistence_failures, 0);

    // The flag is cleared before Complete goes out.
    assert!(!engine.is_scanning());

    let record = messages
        .iter()
        .find_map(|m| match m {
            ScanProgress::File { record, .. } if record.path.ends_with("a.txt") => Some(record),
            _ => None,
        })
        .unwrap();
    assert_eq!(record.hash, digest_bytes(b"alpha", HashAlgorithm::Sha256));
    assert_eq!(record.extension, "txt");
    assert_eq!(record.size_bytes, 5);

    let history = engine.query_history(None, 100).unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|e| e.label == ResultLabel::AutoScan));
    // Most recent first.
    assert_eq!(history[0].path, root.join("nested/copy_of_a.txt"));
}

#[test]
fn test_metrics_grow_per_file() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());

    let engine = new_engine(AppConfig::default());
    let messages = run_scan(&engine, tmp.path());
    let counts: Vec<u64> = messages
        .iter()
        .filter_map(|m| match m {
            ScanProgress::File { metrics, .. } => Some(metrics.files_scanned),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![1, 2, 3, 4]);

    let status = engine.status();
    assert!(!status.is_scanning);
    assert_eq!(status.files_scanned, 4);
    assert_eq!(status.current_root.as_deref(), Some(tmp.path()));
}

#[test]
fn test_noise_filter_skips_log_files() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("run.log"), "noise").unwrap();
    fs::write(tmp.path().join("run.txt"), "signal").unwrap();

    let config = AppConfig {
        noise_filter: true,
        ..AppConfig::default()
    };
    let engine = new_engine(config);
    let messages = run_scan(&engine, tmp.path());

    assert_eq!(scanned_paths(&messages), vec![tmp.path().join("run.txt")]);
    let history = engine.query_history(None, 100).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].path, tmp.path().join("run.txt"));
}

#[test]
fn test_noise_filter_toggle_applies_to_next_scan() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("build.o"), "obj").unwrap();
    fs::write(tmp.path().join("main.c"), "int main;").unwrap();

    let engine = new_engine(AppConfig::default());
    assert_eq!(scanned_paths(&run_scan(&engine, tmp.path())).len(), 2);

    engine.set_noise_filter(true);
    assert_eq!(
        scanned_paths(&run_scan(&engine, tmp.path())),
        vec![tmp.path().join("main.c")]
    );
}

#[test]
fn test_baseline_round_trip_is_clean() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let root = tmp.path();

    let engine = new_engine(AppConfig::default());
    run_scan(&engine, root);
    let id = engine.create_snapshot("initial", root).unwrap();
    assert_eq!(engine.snapshot_entries(id).unwrap().len(), 4);

    run_scan(&engine, root);
    assert!(engine.compare_to_baseline(root).unwrap().is_empty());
}

// Linux accepts arbitrary bytes in file names; macOS and Windows do not.
#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_names_survive_baseline_round_trip() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::write(root.join(OsStr::from_bytes(b"report\xff.txt")), "quarterly").unwrap();
    fs::write(root.join(OsStr::from_bytes(b"a\xff")), "same bytes").unwrap();
    fs::write(root.join(OsStr::from_bytes(b"a\xfe")), "same bytes").unwrap();

    let engine = new_engine(AppConfig::default());
    assert_eq!(scanned_paths(&run_scan(&engine, root)).len(), 3);
    let id = engine.create_snapshot("bytes", root).unwrap();
    assert_eq!(engine.snapshot_entries(id).unwrap().len(), 3);

    run_scan(&engine, root);
    let comparison = engine.compare_with_summary(root).unwrap();
    assert!(comparison.entries.is_empty(), "{:?}", comparison.entries);
    assert_eq!(comparison.summary.unchanged, 3);

    let groups = engine.list_duplicates().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count, 2);
}

#[test]
fn test_drift_is_classified() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::write(root.join("a.txt"), "one").unwrap();
    fs::write(root.join("b.txt"), "two").unwrap();

    let engine = new_engine(AppConfig::default());
    run_scan(&engine, root);
    engine.create_snapshot("before", root).unwrap();

    fs::remove_file(root.join("b.txt")).unwrap();
    fs::write(root.join("c.txt"), "three").unwrap();
    run_scan(&engine, root);

    let comparison = engine.compare_with_summary(root).unwrap();
    let entries: Vec<(DiffStatus, PathBuf)> = comparison
        .entries
        .iter()
        .map(|e| (e.status, e.path.clone()))
        .collect();
    assert_eq!(
        entries,
        vec![
            (DiffStatus::Added, root.join("c.txt")),
            (DiffStatus::Removed, root.join("b.txt")),
        ]
    );
    assert_eq!(comparison.summary.unchanged, 1);
    assert_eq!(comparison.snapshot.description, "before");

    fs::write(root.join("a.txt"), "one, edited").unwrap();
    run_scan(&engine, root);
    let modified: Vec<_> = engine
        .compare_to_baseline(root)
        .unwrap()
        .into_iter()
        .filter(|e| e.status == DiffStatus::Modified)
        .collect();
    assert_eq!(modified.len(), 1);
    assert_eq!(modified[0].path, root.join("a.txt"));
    assert_ne!(modified[0].baseline_hash, modified[0].current_hash);
}

#[test]
fn test_request_errors_are_surfaced() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::write(root.join("f"), "x").unwrap();
    let engine = new_engine(AppConfig::default());

    assert!(matches!(
        engine.create_snapshot("early", root),
        Err(Error::NoPriorScan(_))
    ));
    assert!(matches!(
        engine.compare_to_baseline(root),
        Err(Error::NoBaseline(_))
    ));

    run_scan(&engine, root);
    engine.create_snapshot("base", root).unwrap();

    // Scanned with a different algorithm: every hash would differ.
    engine.set_algorithm(AlgorithmProfile::Strong);
    run_scan(&engine, root);
    assert!(matches!(
        engine.compare_to_baseline(root),
        Err(Error::AlgorithmMismatch {
            baseline: HashAlgorithm::Sha256,
            current: HashAlgorithm::Blake3,
        })
    ));
}

#[test]
fn test_duplicates_from_history() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());

    let engine = new_engine(AppConfig::default());
    run_scan(&engine, tmp.path());
    // A rescan adds events but no new distinct paths.
    run_scan(&engine, tmp.path());

    let groups = engine.list_duplicates().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].count, 2);
    assert_eq!(groups[0].hash, digest_bytes(b"alpha", HashAlgorithm::Sha256));
    assert_eq!(
        groups[0].sample_paths,
        vec![tmp.path().join("a.txt"), tmp.path().join("nested/copy_of_a.txt")]
    );
}

#[test]
fn test_persistence_failure_is_a_warning_not_an_abort() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());

    let engine = new_engine(AppConfig::default());
    engine
        .database()
        .connection()
        .execute_batch("DROP TABLE history;")
        .unwrap();

    let messages = run_scan(&engine, tmp.path());
    assert!(messages
        .iter()
        .any(|m| matches!(m, ScanProgress::Warning { .. })));
    let summary = summary_of(&messages);
    assert_eq!(summary.total_files, 4);
    assert_eq!(summary.persistence_failures, 4);
    assert!(matches!(engine.query_history(None, 10), Err(Error::Persistence(_))));
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempdir().unwrap();
    let root = tmp.path();
    fs::write(root.join("visible.txt"), "v").unwrap();
    let locked = root.join("locked");
    fs::create_dir(&locked).unwrap();
    fs::write(locked.join("hidden.txt"), "h").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read the directory anyway; nothing to check then.
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let engine = new_engine(AppConfig::default());
    let messages = run_scan(&engine, root);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(scanned_paths(&messages), vec![root.join("visible.txt")]);
    assert!(messages.iter().any(|m| matches!(
        m,
        ScanProgress::Skipped { path, .. } if path == &locked
    )));
    assert_eq!(summary_of(&messages).skipped, 1);
}

#[cfg(unix)]
#[test]
fn test_scan_hashes_linked_files_and_survives_link_cycles() {
    use std::os::unix::fs::symlink;

    let tmp = tempdir().unwrap();
    let outside = tempdir().unwrap();
    let root = tmp.path();
    fs::write(outside.path().join("target.txt"), "through a link").unwrap();
    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub/real.txt"), "real").unwrap();
    symlink(outside.path().join("target.txt"), root.join("linked.txt")).unwrap();
    symlink(root, root.join("sub/back_to_root")).unwrap();

    let engine = new_engine(AppConfig::default());
    let messages = run_scan(&engine, root);

    assert_eq!(
        scanned_paths(&messages),
        vec![root.join("linked.txt"), root.join("sub/real.txt")]
    );
    let linked_hash = messages.iter().find_map(|m| match m {
        ScanProgress::File { record, .. } if record.path == root.join("linked.txt") => {
            Some(record.hash.clone())
        }
        _ => None,
    });
    assert_eq!(
        linked_hash,
        Some(digest_bytes(b"through a link", HashAlgorithm::Sha256))
    );
    assert!(messages.iter().any(|m| matches!(
        m,
        ScanProgress::Skipped { path, .. } if path == &root.join("sub/back_to_root")
    )));
    assert_eq!(summary_of(&messages).skipped, 1);
    assert_eq!(summary_of(&messages).total_files, 2);
}

#[test]
fn test_checksum_save_and_verify() {
    let tmp = tempdir().unwrap();
    let file = tmp.path().join("payload.bin");
    let sum = tmp.path().join("payload.sha256");
    fs::write(&file, "payload v1").unwrap();

    let engine = new_engine(AppConfig::default());
    let saved = engine.save_checksum(&file, &sum).unwrap();
    assert_eq!(
        fs::read_to_string(&sum).unwrap().trim_end(),
        saved.hash
    );

    let ok = engine.verify_checksum(&file, &sum).unwrap();
    assert!(ok.matched);

    fs::write(&file, "payload v2").unwrap();
    let bad = engine.verify_checksum(&file, &sum).unwrap();
    assert!(!bad.matched);
    assert_eq!(bad.expected, saved.hash);

    let timeline = engine.file_timeline(&file, 20).unwrap();
    let labels: Vec<_> = timeline.iter().map(|e| e.label).collect();
    assert_eq!(
        labels,
        vec![
            ResultLabel::SavedHash,
            ResultLabel::VerifiedMatch,
            ResultLabel::VerifiedFail,
        ]
    );

    let stats = engine.verification_stats().unwrap();
    assert_eq!(stats.saved_hash, 1);
    assert_eq!(stats.verified_match, 1);
    assert_eq!(stats.verified_fail, 1);
}

#[test]
fn test_verify_accepts_uppercase_md5_from_other_tools() {
    let tmp = tempdir().unwrap();
    let file = tmp.path().join("abc.txt");
    let sum = tmp.path().join("abc.md5");
    fs::write(&file, "abc").unwrap();
    fs::write(&sum, "900150983CD24FB0D6963F7D28E17F72  abc.txt\r\n").unwrap();

    // Current algorithm is sha256; the digest length selects md5.
    let engine = new_engine(AppConfig::default());
    let verification = engine.verify_checksum(&file, &sum).unwrap();
    assert!(verification.matched);
    assert_eq!(verification.algorithm, HashAlgorithm::Md5);
}

#[test]
fn test_verify_rejects_empty_checksum_file() {
    let tmp = tempdir().unwrap();
    let file = tmp.path().join("f");
    let sum = tmp.path().join("f.sum");
    fs::write(&file, "x").unwrap();
    fs::write(&sum, "\n").unwrap();

    let engine = new_engine(AppConfig::default());
    assert!(matches!(
        engine.verify_checksum(&file, &sum),
        Err(Error::InvalidChecksumFile(_))
    ));
    assert!(engine.query_history(None, 10).unwrap().is_empty());
}

#[test]
fn test_compute_files_keeps_order_and_logs_successes() {
    let tmp = tempdir().unwrap();
    let a = tmp.path().join("a.md");
    let b = tmp.path().join("b.md");
    fs::write(&a, "# a").unwrap();
    fs::write(&b, "# b").unwrap();
    let missing = tmp.path().join("missing.md");

    let engine = new_engine(AppConfig::default());
    engine.set_algorithm(HashAlgorithm::Xxh64);
    let results = engine
        .compute_files(&[b.clone(), missing.clone(), a.clone()])
        .unwrap();

    assert_eq!(results[0].as_ref().unwrap().path, b);
    assert_eq!(results[0].as_ref().unwrap().size_bytes, 3);
    assert!(matches!(&results[1], Err(Error::Unreadable { path, .. }) if path == &missing));
    assert_eq!(results[2].as_ref().unwrap().hash.len(), 16);

    let history = engine.query_history(None, 10).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e.label == ResultLabel::Computed));
    assert!(history.iter().all(|e| e.algorithm == HashAlgorithm::Xxh64));
}

#[test]
fn test_only_recent_roots_keep_scan_results() {
    let tmp = tempdir().unwrap();
    let roots: Vec<PathBuf> = ["one", "two", "three"]
        .iter()
        .map(|name| {
            let root = tmp.path().join(name);
            fs::create_dir(&root).unwrap();
            fs::write(root.join("f.txt"), name).unwrap();
            root
        })
        .collect();

    let engine = new_engine(AppConfig::default());
    for root in &roots {
        run_scan(&engine, root);
    }

    assert!(engine.last_scan(&roots[0]).is_none());
    assert!(matches!(
        engine.create_snapshot("too old", &roots[0]),
        Err(Error::NoPriorScan(_))
    ));
    assert_eq!(engine.last_scan(&roots[1]).unwrap().len(), 1);
    assert_eq!(engine.last_scan(&roots[2]).unwrap().len(), 1);

    // Rescanning a retained root refreshes it instead of taking a second slot.
    run_scan(&engine, &roots[1]);
    assert!(engine.last_scan(&roots[2]).is_some());
    run_scan(&engine, &roots[0]);
    assert!(engine.last_scan(&roots[2]).is_none());
    assert!(engine.last_scan(&roots[1]).is_some());
    engine.create_snapshot("fresh", &roots[0]).unwrap();
}
