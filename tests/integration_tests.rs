//! Integration tests for dsp-batch
//!
//! Closure transforms stand in for the external DSP program so the full
//! discover/dispatch cycle runs against temporary directories.

use dsp_batch::config::ErrorPolicy;
use dsp_batch::error::{BatchError, TransformError};
use dsp_batch::{
    BatchCoordinator, ChannelCatalog, CommandTransform, RunConfig, TierMapping, Transform,
    TransformRequest,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"raw").unwrap();
}

/// Raw tree from the documented example: run001/raw_001.dat, run001/raw_002.dat
fn example_tree(root: &Path) -> (PathBuf, PathBuf, RunConfig) {
    let raw = root.join("raw");
    let dsp = root.join("dsp");
    touch(&raw.join("run001/raw_001.dat"));
    touch(&raw.join("run001/raw_002.dat"));
    let config_file = root.join("dsp.json");
    fs::write(&config_file, "{}").unwrap();

    let mut config = RunConfig::new(TierMapping::new(&raw, &dsp, "raw", "dsp"), config_file);
    config.extension = "dat".into();
    (raw, dsp, config)
}

/// Writes the input's content, tagged, to the requested output
fn copy_transform() -> Arc<dyn Transform> {
    Arc::new(|req: &TransformRequest<'_>| {
        let data = fs::read(req.input).map_err(|e| TransformError::Other(e.to_string()))?;
        fs::write(req.output, [b"dsp:".as_slice(), &data].concat())
            .map_err(|e| TransformError::Other(e.to_string()))
    })
}

fn tree(root: &Path, count: usize) -> (PathBuf, RunConfig) {
    let raw = root.join("tier_raw");
    let dsp = root.join("tier_dsp");
    for n in 0..count {
        touch(&raw.join(format!("p15/r{:03}/l200-r{:03}-tier_raw.lh5", n % 4, n)));
    }
    let config = RunConfig::new(
        TierMapping::new(&raw, &dsp, "tier_raw", "tier_dsp"),
        root.join("dsp.json"),
    );
    (dsp, config)
}

#[test]
fn test_example_tree_first_run_and_rerun() {
    let dir = tempdir().unwrap();
    let (_, dsp, config) = example_tree(dir.path());

    let first = BatchCoordinator::new(config.clone(), copy_transform())
        .run(|_, _| {})
        .unwrap();
    assert_eq!(first.converted, 2);
    assert!(dsp.join("run001").is_dir());
    assert_eq!(fs::read(dsp.join("run001/dsp_001.dat")).unwrap(), b"dsp:raw");
    assert!(dsp.join("run001/dsp_002.dat").is_file());

    let second = BatchCoordinator::new(config, copy_transform())
        .run(|_, _| {})
        .unwrap();
    assert_eq!(second.converted, 0);
    assert_eq!(second.skipped, 2);
    assert!(second.is_success());
}

#[test]
fn test_discovery_pairs() {
    let dir = tempdir().unwrap();
    let (raw, dsp, config) = example_tree(dir.path());

    let discovery = BatchCoordinator::new(config, copy_transform()).discover().unwrap();
    let pairs: Vec<(PathBuf, PathBuf)> = discovery
        .items
        .into_iter()
        .map(|i| (i.input, i.output))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (raw.join("run001/raw_001.dat"), dsp.join("run001/dsp_001.dat")),
            (raw.join("run001/raw_002.dat"), dsp.join("run001/dsp_002.dat")),
        ]
    );
}

#[test]
fn test_force_reconverts_existing_outputs() {
    let dir = tempdir().unwrap();
    let (_, dsp, mut config) = example_tree(dir.path());
    fs::create_dir_all(dsp.join("run001")).unwrap();
    fs::write(dsp.join("run001/dsp_001.dat"), b"stale").unwrap();

    let summary = BatchCoordinator::new(config.clone(), copy_transform())
        .run(|_, _| {})
        .unwrap();
    assert_eq!(summary.converted, 1);
    assert_eq!(fs::read(dsp.join("run001/dsp_001.dat")).unwrap(), b"stale");

    config.force = true;
    let summary = BatchCoordinator::new(config, copy_transform())
        .run(|_, _| {})
        .unwrap();
    assert_eq!(summary.converted, 2);
    assert_eq!(fs::read(dsp.join("run001/dsp_001.dat")).unwrap(), b"dsp:raw");
}

#[test]
fn test_every_input_gets_an_output() {
    let dir = tempdir().unwrap();
    let (dsp, mut config) = tree(dir.path(), 40);
    config.worker_count = 8;

    let summary = BatchCoordinator::new(config, copy_transform())
        .run(|_, _| {})
        .unwrap();
    assert_eq!(summary.discovered, 40);
    assert_eq!(summary.converted, 40);
    assert!(summary.completed);

    for n in 0..40 {
        let out = dsp.join(format!("p15/r{:03}/l200-r{:03}-tier_dsp.lh5", n % 4, n));
        assert!(out.is_file(), "missing {}", out.display());
    }
}

#[test]
fn test_result_independent_of_pool_size() {
    let converted_set = |workers: usize| {
        let dir = tempdir().unwrap();
        let (_, mut config) = tree(dir.path(), 17);
        config.worker_count = workers;
        let seen = Arc::new(Mutex::new(BTreeSet::new()));
        let seen_clone = Arc::clone(&seen);
        let root = dir.path().to_path_buf();

        let summary = BatchCoordinator::new(config, copy_transform())
            .run(move |report, _| {
                if report.outcome.is_converted() {
                    let rel = report.item.output.strip_prefix(&root).unwrap().to_path_buf();
                    seen_clone.lock().unwrap().insert(rel);
                }
            })
            .unwrap();
        assert_eq!(summary.converted, 17);
        let set = seen.lock().unwrap().clone();
        set
    };

    assert_eq!(converted_set(1), converted_set(10));
}

#[test]
fn test_continue_policy_isolates_failure() {
    let dir = tempdir().unwrap();
    let (_, dsp, config) = example_tree(dir.path());
    let transform: Arc<dyn Transform> = Arc::new(|req: &TransformRequest<'_>| {
        fs::write(req.output, b"partial").unwrap();
        if req.input.ends_with("raw_002.dat") {
            return Err(TransformError::Other("corrupt event block".into()));
        }
        Ok(())
    });

    let summary = BatchCoordinator::new(config, transform)
        .run(|_, _| {})
        .unwrap();
    assert_eq!(summary.converted, 1);
    assert_eq!(summary.failed, 1);
    assert!(summary.completed);
    assert!(!summary.is_success());
    assert_eq!(summary.failures[0].reason, "corrupt event block");

    let files: Vec<_> = fs::read_dir(dsp.join("run001"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(files, vec!["dsp_001.dat".to_string()]);
}

#[test]
fn test_failed_item_is_retried_on_next_run() {
    let dir = tempdir().unwrap();
    let (_, _, config) = example_tree(dir.path());
    let failing: Arc<dyn Transform> = Arc::new(|req: &TransformRequest<'_>| {
        if req.input.ends_with("raw_002.dat") {
            return Err(TransformError::Other("transient".into()));
        }
        fs::write(req.output, b"dsp").map_err(|e| TransformError::Other(e.to_string()))
    });

    let first = BatchCoordinator::new(config.clone(), failing)
        .run(|_, _| {})
        .unwrap();
    assert_eq!(first.failed, 1);

    let second = BatchCoordinator::new(config, copy_transform())
        .run(|_, _| {})
        .unwrap();
    assert_eq!(second.converted, 1);
    assert_eq!(second.skipped, 1);
}

#[test]
fn test_abort_policy_stops_run() {
    let dir = tempdir().unwrap();
    let (_, mut config) = tree(dir.path(), 8);
    config.worker_count = 1;
    config.error_policy = ErrorPolicy::Abort;
    let transform: Arc<dyn Transform> = Arc::new(|_: &TransformRequest<'_>| -> Result<(), TransformError> {
        Err(TransformError::Other("no such channel".into()))
    });

    let err = BatchCoordinator::new(config, transform)
        .run(|_, _| {})
        .unwrap_err();
    match err {
        BatchError::Aborted { converted, reason, .. } => {
            assert_eq!(converted, 0);
            assert_eq!(reason, "no such channel");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_retries_recover_transient_failure() {
    let dir = tempdir().unwrap();
    let (_, _, mut config) = example_tree(dir.path());
    config.retries = 1;
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = Arc::clone(&calls);
    let transform: Arc<dyn Transform> = Arc::new(move |req: &TransformRequest<'_>| {
        if req.input.ends_with("raw_001.dat") && calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(TransformError::Other("lock held".into()));
        }
        fs::write(req.output, b"dsp").map_err(|e| TransformError::Other(e.to_string()))
    });

    let summary = BatchCoordinator::new(config, transform)
        .run(|_, _| {})
        .unwrap();
    assert_eq!(summary.converted, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_panicking_transform_is_a_failed_item() {
    let dir = tempdir().unwrap();
    let (_, _, mut config) = example_tree(dir.path());
    config.worker_count = 2;
    let transform: Arc<dyn Transform> = Arc::new(|req: &TransformRequest<'_>| {
        if req.input.ends_with("raw_001.dat") {
            panic!("unexpected trace length");
        }
        fs::write(req.output, b"dsp").map_err(|e| TransformError::Other(e.to_string()))
    });

    let summary = BatchCoordinator::new(config, transform)
        .run(|_, _| {})
        .unwrap();
    assert_eq!(summary.converted, 1);
    assert_eq!(summary.failed, 1);
    assert!(summary.failures[0].reason.contains("unexpected trace length"));
}

#[test]
fn test_stale_partial_output_is_replaced() {
    let dir = tempdir().unwrap();
    let (_, dsp, config) = example_tree(dir.path());
    fs::create_dir_all(dsp.join("run001")).unwrap();
    fs::write(dsp.join("run001/.dsp_001.dat.partial"), b"half").unwrap();

    let summary = BatchCoordinator::new(config, copy_transform())
        .run(|_, _| {})
        .unwrap();
    assert_eq!(summary.converted, 2);
    assert!(!dsp.join("run001/.dsp_001.dat.partial").exists());
    assert_eq!(fs::read(dsp.join("run001/dsp_001.dat")).unwrap(), b"dsp:raw");
}

#[test]
fn test_nested_output_spelled_differently_is_not_rescanned() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("p15");
    touch(&raw.join("r001/l200-r001-tier_raw.lh5"));

    let dsp = raw.join("../p15/dsp");
    let config = RunConfig::new(
        TierMapping::new(&raw, &dsp, "tier_raw", "tier_dsp"),
        dir.path().join("dsp.json"),
    );

    let runs: Vec<(u64, u64)> = (0..3)
        .map(|_| {
            let summary = BatchCoordinator::new(config.clone(), copy_transform())
                .run(|_, _| {})
                .unwrap();
            (summary.discovered, summary.converted)
        })
        .collect();

    assert_eq!(runs, vec![(1, 1), (1, 0), (1, 0)]);
    assert!(raw.join("dsp/r001/l200-r001-tier_dsp.lh5").is_file());
    assert!(!raw.join("dsp/dsp").exists());
}

#[test]
fn test_shared_tree_never_converts_outputs() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("p15");
    touch(&root.join("r001/l200-r001-tier_raw.lh5"));

    let mut config = RunConfig::new(
        TierMapping::new(&root, &root, "tier_raw", "tier_dsp"),
        dir.path().join("dsp.json"),
    );
    config.force = true;

    for _ in 0..2 {
        let summary = BatchCoordinator::new(config.clone(), copy_transform())
            .run(|_, _| {})
            .unwrap();
        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.converted, 1);
    }
    assert_eq!(
        fs::read(root.join("r001/l200-r001-tier_dsp.lh5")).unwrap(),
        b"dsp:raw"
    );
}

#[test]
fn test_tables_from_selection_or_catalog() {
    let dir = tempdir().unwrap();
    let (_, _, mut config) = example_tree(dir.path());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let recording = |seen: Arc<Mutex<Vec<Vec<String>>>>| -> Arc<dyn Transform> {
        Arc::new(move |req: &TransformRequest<'_>| {
            seen.lock().unwrap().push(req.tables.to_vec());
            fs::write(req.output, b"dsp").map_err(|e| TransformError::Other(e.to_string()))
        })
    };

    config.catalog = ChannelCatalog::new(["S001", "S002", "S003"]);
    config.worker_count = 1;
    BatchCoordinator::new(config.clone(), recording(Arc::clone(&seen)))
        .run(|_, _| {})
        .unwrap();
    assert!(seen.lock().unwrap().iter().all(|t| t == &["S001", "S002", "S003"]));

    seen.lock().unwrap().clear();
    config.force = true;
    config.selection = Some(vec!["S002".into()]);
    BatchCoordinator::new(config, recording(Arc::clone(&seen)))
        .run(|_, _| {})
        .unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|t| t == &["S002"]));
}

#[test]
fn test_interrupted_run_leaves_items_pending() {
    let dir = tempdir().unwrap();
    let (_, config) = tree(dir.path(), 5);
    let coordinator = BatchCoordinator::new(config, copy_transform());
    coordinator.shutdown_flag().store(true, Ordering::SeqCst);

    let summary = coordinator.run(|_, _| {}).unwrap();
    assert_eq!(summary.discovered, 5);
    assert_eq!(summary.pending, 5);
    assert!(!summary.completed);
    assert!(!summary.is_success());
}

#[cfg(unix)]
#[test]
fn test_command_transform_end_to_end() {
    let dir = tempdir().unwrap();
    let (_, dsp, mut config) = example_tree(dir.path());
    config.selection = Some(vec!["S061".into(), "S055".into()]);

    // Writes "<tables> <write-mode>" into the output file
    let script = r#"
        while [ $# -gt 0 ]; do
            case "$1" in
                --input) in="$2"; shift 2 ;;
                --output) out="$2"; shift 2 ;;
                --tables) tables="$2"; shift 2 ;;
                --write-mode) mode="$2"; shift 2 ;;
                *) shift ;;
            esac
        done
        [ -f "$in" ] || exit 2
        printf '%s %s' "$tables" "$mode" > "$out"
    "#;
    let transform = CommandTransform::new("sh").with_args(["-c", script, "build_dsp"]);

    let summary = BatchCoordinator::new(config, Arc::new(transform))
        .run(|_, _| {})
        .unwrap();
    assert_eq!(summary.converted, 2);
    assert_eq!(
        fs::read_to_string(dsp.join("run001/dsp_002.dat")).unwrap(),
        "S061,S055 overwrite"
    );
}

#[cfg(unix)]
#[test]
fn test_command_transform_failure_is_recorded() {
    let dir = tempdir().unwrap();
    let (_, dsp, config) = example_tree(dir.path());
    let transform = CommandTransform::new("sh").with_args(["-c", "echo 'bad dsp config' >&2; exit 1", "build_dsp"]);

    let summary = BatchCoordinator::new(config, Arc::new(transform))
        .run(|_, _| {})
        .unwrap();
    assert_eq!(summary.failed, 2);
    assert!(summary.failures.iter().all(|f| f.reason.contains("bad dsp config")));
    assert!(!dsp.join("run001/dsp_001.dat").exists());
}
