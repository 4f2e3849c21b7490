//! Configuration loading from disk.

use sluice::config::{Config, DestinationConfig, SourceConfig};
use sluice::error::{ConfigError, DedupError};
use sluice::pipeline::PipelineBuilder;
use sluice::{Pipeline, Record};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_config(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("pipeline.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_from_file_interpolates_env() {
    let dir = TempDir::new().unwrap();
    // SAFETY: the variable name is unique to this test.
    unsafe { std::env::set_var("SLUICE_IT_INPUT", "/data/in.jsonl") };

    let path = write_config(
        &dir,
        r#"
pipeline:
  max_concurrent_tasks: ${SLUICE_IT_CONCURRENCY:-4}
sources:
  - type: file
    path: ${SLUICE_IT_INPUT}
    format: jsonl
destinations:
  - type: file
    path: "$${HOME}/out.jsonl"
"#,
    );

    let config = Config::from_file(&path).unwrap();
    unsafe { std::env::remove_var("SLUICE_IT_INPUT") };

    assert_eq!(config.pipeline.max_concurrent_tasks, 4);
    assert!(matches!(
        &config.sources[0],
        SourceConfig::File { path, .. } if path.to_str() == Some("/data/in.jsonl")
    ));
    assert!(matches!(
        &config.destinations[0],
        DestinationConfig::File { path, .. } if path.to_str() == Some("${HOME}/out.jsonl")
    ));
}

#[test]
fn test_missing_env_var_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "sources:\n  - type: http\n    url: ${SLUICE_IT_DEFINITELY_UNSET}\n",
    );

    let err = Config::from_file(&path).unwrap_err();
    match err {
        ConfigError::EnvInterpolation { message } => {
            assert!(message.contains("SLUICE_IT_DEFINITELY_UNSET"));
        }
        other => panic!("expected EnvInterpolation, got {other:?}"),
    }
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = Config::from_file(dir.path().join("nope.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
}

#[test]
fn test_pipeline_from_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
sources:
  - type: file
    path: a.txt
  - type: http
    url: http://localhost:1/feed
transformers:
  - type: uppercase
  - type: dedup
    capacity: 1000
destinations:
  - type: file
    path: out.jsonl
"#,
    );
    let config = Config::from_file_with_options(&path, false).unwrap();

    let pipeline = Pipeline::from_config(&config, CancellationToken::new()).unwrap();
    assert_eq!(pipeline.config().max_concurrent_tasks, 10);
}

#[test]
fn test_encryption_needs_registered_cipher() {
    let yaml = r#"
pipeline:
  encryption:
    enabled: true
    key: k
sources:
  - type: file
    path: a.txt
"#;
    let config = Config::from_yaml(yaml).unwrap();

    let err = Pipeline::from_config(&config, CancellationToken::new())
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::MissingCipher));

    let built = PipelineBuilder::from_config(&config)
        .unwrap()
        .cipher(Arc::new(|record: &Record| {
            Ok::<_, sluice::error::CipherError>(record.clone())
        }))
        .build();
    assert!(built.is_ok());
}

#[test]
fn test_oversized_dedup_rejected_at_load() {
    let yaml = r#"
sources:
  - type: file
    path: a.txt
transformers:
  - type: dedup
    capacity: 1000000000000000
"#;
    let err = Config::from_yaml(yaml).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidDedup {
            source: DedupError::TooLarge { .. }
        }
    ));
}

#[test]
fn test_cipher_built_from_configured_key() {
    let yaml = r#"
pipeline:
  encryption:
    enabled: true
    key: s3cret
sources:
  - type: file
    path: a.txt
"#;
    let config = Config::from_yaml(yaml).unwrap();

    let mut seen_key = None;
    let built = PipelineBuilder::from_config(&config)
        .unwrap()
        .cipher_with(|key| {
            seen_key = Some(key.to_string());
            let key = key.to_string();
            Arc::new(move |record: &Record| {
                let mut sealed = record.clone();
                sealed.insert("sealed_with", key.clone().into());
                Ok::<_, sluice::error::CipherError>(sealed)
            })
        })
        .build();

    assert!(built.is_ok());
    assert_eq!(seen_key.as_deref(), Some("s3cret"));
}

#[test]
fn test_cipher_factory_skipped_when_disabled() {
    let yaml = r#"
pipeline:
  encryption:
    enabled: false
    key: unused
sources:
  - type: file
    path: a.txt
"#;
    let config = Config::from_yaml(yaml).unwrap();

    let mut called = false;
    let built = PipelineBuilder::from_config(&config)
        .unwrap()
        .cipher_with(|_| {
            called = true;
            Arc::new(|record: &Record| Ok::<_, sluice::error::CipherError>(record.clone()))
        })
        .build();

    assert!(built.is_ok());
    assert!(!called);
}
