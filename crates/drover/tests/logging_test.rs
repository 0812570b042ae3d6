//! The subscriber is process-global, so this binary installs it once.

use std::fs;

use tempfile::TempDir;

use drover::config::LoggingConfig;
use drover::logging::{self, LOG_FILE_PREFIX};

#[test]
fn test_json_log_file_is_written() {
    let dir = TempDir::new().unwrap();
    let log_dir = dir.path().join("logs");
    let config = LoggingConfig {
        level: "warn".to_string(),
        json_dir: Some(log_dir.clone()),
    };

    let guard = logging::init(&config).unwrap();
    assert!(guard.is_some());
    tracing::info!(target: "drover_session", attempt_id = 7, "Session attempt created");
    drop(guard);

    let files: Vec<_> = fs::read_dir(&log_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .collect();
    assert_eq!(files.len(), 1);
    let contents = fs::read_to_string(&files[0]).unwrap();
    assert!(contents.contains("Session attempt created"));
    assert!(contents.contains("\"attempt_id\":7"));

    // a second subscriber cannot be installed
    assert!(logging::init(&LoggingConfig::default()).is_err());
}
