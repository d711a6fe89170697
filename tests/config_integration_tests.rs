//! Configuration loading, persistence, and pre-scan validation.

use camino::Utf8Path;
use std::fs;
use swepscan::models::{DeletionRule, ScanConfig};
use swepscan::services::{ScanError, ScanOrchestrator};
use swepscan::ConfigManager;
use tempfile::TempDir;

#[test]
fn test_first_run_writes_defaults() {
    let dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(Utf8Path::from_path(dir.path()).unwrap()).unwrap();

    let config = manager.load().unwrap();
    assert_eq!(config, ScanConfig::default());

    // The written file is valid YAML that reloads to the same config.
    let reloaded = manager.load().unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_hand_edited_config_parses() {
    let dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(Utf8Path::from_path(dir.path()).unwrap()).unwrap();
    fs::write(
        manager.config_path(),
        r#"
scan_root: "/games/GarrysMod"
output_dir: "/tmp/materials"
worker_threads: 8
deletion_rules:
  skybox:
    enabled: true
    patterns:
      - "skybox/"
colorization_rules:
  pistols:
    color: "[1.0 0.5 0.5]"
    glow: "[0.3 0.1 0.1]"
"#,
    )
    .unwrap();

    let config = manager.load().unwrap();
    assert_eq!(config.scan_root, "/games/GarrysMod");
    assert_eq!(config.worker_threads, 8);
    assert!(config.deletion_rules["skybox"].enabled);
    // Unspecified budgets keep their defaults.
    assert_eq!(config.pattern_budget_ms, 500);
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn test_contradictory_rules_abort_with_no_partial_output() {
    let dir = TempDir::new().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap();
    fs::write(root.join("weapon_x.lua"), "SWEP.PrintName = \"X\"\n").unwrap();

    let mut config = ScanConfig {
        scan_root: root.to_string(),
        ..ScanConfig::default()
    };
    for category in ["a", "b"] {
        config.deletion_rules.insert(
            category.to_string(),
            DeletionRule {
                enabled: true,
                patterns: vec!["glass/".to_string()],
            },
        );
    }

    let orchestrator = ScanOrchestrator::new(config);
    let result = orchestrator.run_scan().await;
    assert!(matches!(result, Err(ScanError::ConfigurationInvalid(_))));

    // No work started: nothing discovered, nothing decoded.
    let stats = orchestrator.metrics().snapshot();
    assert_eq!(stats.files_discovered, 0);
    assert_eq!(stats.files_decoded, 0);
}

#[tokio::test]
async fn test_zero_budget_rejected_before_scan() {
    let config = ScanConfig {
        scan_root: "/anywhere".to_string(),
        max_decompressed_bytes: 0,
        ..ScanConfig::default()
    };
    let result = ScanOrchestrator::new(config).run_scan().await;
    assert!(matches!(result, Err(ScanError::ConfigurationInvalid(_))));
}
