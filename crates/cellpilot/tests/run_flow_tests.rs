//! Integration tests for the `cellpilot run` flow
//!
//! Wires a workbook file, a path probe and a file reporter together the way
//! the run command does and checks what ends up on disk.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use cellpilot_core::coordinator::{ExecutionCoordinator, SessionOutcome};
use cellpilot_core::liveness::PathProbe;
use cellpilot_core::report::FileFailureReporter;
use cellpilot_core::retry::{retry_blocking, RetryError};
use cellpilot_core::types::{CellpilotConfig, CoordinatorSettings, RetryPolicy};
use tempfile::TempDir;

fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        poll_interval_ms: 5,
        progress_interval_ms: 10,
        milestone_interval_ms: 100,
        liveness_interval_ms: 5,
        abandon_join_timeout_ms: 500,
    }
}

fn create_workbook() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let workbook = temp_dir.path().join("portfolio.xlsm");
    fs::write(&workbook, b"cells").unwrap();
    (temp_dir, workbook)
}

fn log_files(dir: &Path) -> Vec<std::path::PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_exhausted_task_writes_log_beside_workbook() {
    let (temp_dir, workbook) = create_workbook();
    let probe = PathProbe::new(&workbook);
    let mut coordinator = ExecutionCoordinator::new(settings())
        .with_reporter(FileFailureReporter::beside(&workbook, "logs"));

    let policy = RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 1,
        backoff_multiplier: 2.0,
        jitter_fraction: 0.0,
        max_delay_ms: None,
    };

    let outcome = coordinator
        .session("perf", &probe)
        .run(move || {
            retry_blocking(&policy, || -> Result<(), io::Error> {
                Err(io::Error::other("call was rejected by callee"))
            })
        })
        .await;

    assert!(matches!(outcome, SessionOutcome::Failed(RetryError::Exhausted { .. })));

    let logs = log_files(&temp_dir.path().join("logs"));
    assert_eq!(logs.len(), 1);
    assert_eq!(coordinator.last_report(), Some(logs[0].as_path()));

    let content = fs::read_to_string(&logs[0]).unwrap();
    assert!(content.starts_with("Exception occurred at "));
    assert!(content.contains("Operation: perf"));
    assert!(content.contains("call was rejected by callee"));
    assert!(content.contains("1. Error: call was rejected by callee"));
    assert!(content.contains("2. Error: call was rejected by callee"));
}

#[tokio::test]
async fn test_missing_workbook_aborts_without_log() {
    let (temp_dir, workbook) = create_workbook();
    fs::remove_file(&workbook).unwrap();

    let probe = PathProbe::new(&workbook);
    let mut coordinator = ExecutionCoordinator::new(settings())
        .with_reporter(FileFailureReporter::beside(&workbook, "logs"));

    let outcome = coordinator
        .session("optim", &probe)
        .run(|| -> Result<(), RetryError<io::Error>> { Ok(()) })
        .await;

    assert!(outcome.is_aborted());
    assert!(!temp_dir.path().join("logs").exists());
}

#[tokio::test]
async fn test_workbook_deleted_mid_run_aborts() {
    let (_temp_dir, workbook) = create_workbook();
    let probe = PathProbe::new(&workbook);
    let mut coordinator = ExecutionCoordinator::new(settings());

    let doomed = workbook.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        fs::remove_file(doomed).unwrap();
    });

    let outcome = coordinator
        .session("scenario", &probe)
        .run(|| {
            std::thread::sleep(Duration::from_millis(300));
            Ok::<_, RetryError<io::Error>>(())
        })
        .await;

    assert!(outcome.is_aborted());
    assert_eq!(coordinator.reap(Duration::from_secs(2)).await, 0);
}

#[test]
fn test_default_catalog_has_both_groups() {
    let config = CellpilotConfig::default();

    for name in ["stocks", "correl", "risk"] {
        assert_eq!(config.task(name).unwrap().group, "Market");
    }
    for name in ["perf", "scenario", "optim", "report"] {
        assert_eq!(config.task(name).unwrap().group, "Portfolio");
    }
    assert!(config.task("STOCKS").is_ok());
    assert!(config.task("unknown").is_err());
}
