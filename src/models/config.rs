use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A deletion rule: when enabled, texture references matching any of its
/// substring patterns yield a `delete` material action instead of `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRule {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Color and glow parameters applied to generated weapon materials of one
/// category. Values are VMT vector literals, e.g. `[1.2 0.5 0.5]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRule {
    pub color: String,
    pub glow: String,
}

/// Scan configuration from `swepscan.yaml`.
///
/// Paths are plain strings so the file stays hand-editable; they are
/// converted to `Utf8PathBuf` at orchestration start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Game installation root to scan (e.g. the GarrysMod directory).
    #[serde(default)]
    pub scan_root: String,

    /// Directory material definitions are written to. Empty disables the
    /// write-out; synthesized actions are still returned.
    #[serde(default)]
    pub output_dir: String,

    #[serde(default = "default_true")]
    pub extraction_enabled: bool,

    #[serde(default = "default_true")]
    pub classification_enabled: bool,

    /// Worker pool size; 0 selects the number of available CPUs.
    #[serde(default)]
    pub worker_threads: usize,

    /// Hard cap on a decompressed cache payload, in bytes.
    #[serde(default = "default_max_decompressed")]
    pub max_decompressed_bytes: u64,

    /// Wall-clock budget for pattern matching over one file, in milliseconds.
    #[serde(default = "default_pattern_budget")]
    pub pattern_budget_ms: u64,

    /// Files larger than this are skipped outright.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default)]
    pub deletion_rules: IndexMap<String, DeletionRule>,

    #[serde(default)]
    pub colorization_rules: IndexMap<String, ColorRule>,
}

fn default_true() -> bool {
    true
}

fn default_max_decompressed() -> u64 {
    16 * 1024 * 1024
}

fn default_pattern_budget() -> u64 {
    500
}

fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for ScanConfig {
    fn default() -> Self {
        let mut deletion_rules = IndexMap::new();
        deletion_rules.insert(
            "skybox".to_string(),
            DeletionRule {
                enabled: false,
                patterns: vec!["skybox/".to_string()],
            },
        );
        deletion_rules.insert(
            "effects".to_string(),
            DeletionRule {
                enabled: false,
                patterns: vec!["effects/".to_string(), "particle/".to_string()],
            },
        );

        let mut colorization_rules = IndexMap::new();
        colorization_rules.insert(
            "pistols".to_string(),
            ColorRule {
                color: "[1.2 0.6 0.6]".to_string(),
                glow: "[0.4 0.2 0.2]".to_string(),
            },
        );
        colorization_rules.insert(
            "rifles".to_string(),
            ColorRule {
                color: "[0.6 0.6 1.2]".to_string(),
                glow: "[0.2 0.2 0.4]".to_string(),
            },
        );

        Self {
            scan_root: String::new(),
            output_dir: String::new(),
            extraction_enabled: true,
            classification_enabled: true,
            worker_threads: 0,
            max_decompressed_bytes: default_max_decompressed(),
            pattern_budget_ms: default_pattern_budget(),
            max_file_bytes: default_max_file_bytes(),
            deletion_rules,
            colorization_rules,
        }
    }
}

impl ScanConfig {
    /// Check the configuration before any work starts.
    ///
    /// Returns a human-readable description of the first problem found.
    /// This is the only error class surfaced before the scan; everything
    /// downstream is per-file and non-fatal.
    pub fn validate(&self) -> Result<(), String> {
        if self.scan_root.trim().is_empty() {
            return Err("scan_root is not set".to_string());
        }
        if self.max_decompressed_bytes == 0 {
            return Err("max_decompressed_bytes must be non-zero".to_string());
        }
        if self.pattern_budget_ms == 0 {
            return Err("pattern_budget_ms must be non-zero".to_string());
        }
        if self.max_file_bytes == 0 {
            return Err("max_file_bytes must be non-zero".to_string());
        }

        // An enabled deletion rule with no patterns can never match anything
        // and is almost certainly a mistake.
        for (category, rule) in &self.deletion_rules {
            if rule.enabled && rule.patterns.is_empty() {
                return Err(format!(
                    "deletion rule '{category}' is enabled but has no patterns"
                ));
            }
        }

        // The same pattern in two enabled rules makes category attribution
        // ambiguous.
        let mut seen: IndexMap<&str, &str> = IndexMap::new();
        for (category, rule) in &self.deletion_rules {
            if !rule.enabled {
                continue;
            }
            for pattern in &rule.patterns {
                if let Some(other) = seen.insert(pattern.as_str(), category.as_str()) {
                    if other != category.as_str() {
                        return Err(format!(
                            "deletion pattern '{pattern}' appears in both '{other}' and '{category}'"
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ScanConfig {
        ScanConfig {
            scan_root: "/games/gmod".to_string(),
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert!(config.extraction_enabled);
        assert!(config.classification_enabled);
        assert_eq!(config.max_decompressed_bytes, 16 * 1024 * 1024);
        assert_eq!(config.pattern_budget_ms, 500);
        assert!(config.deletion_rules.contains_key("skybox"));
    }

    #[test]
    fn test_validate_requires_scan_root() {
        let config = ScanConfig::default();
        assert!(config.validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        let mut config = valid_config();
        config.pattern_budget_ms = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.max_decompressed_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_enabled_rule_without_patterns() {
        let mut config = valid_config();
        config.deletion_rules.insert(
            "broken".to_string(),
            DeletionRule {
                enabled: true,
                patterns: vec![],
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ambiguous_patterns() {
        let mut config = valid_config();
        config.deletion_rules.insert(
            "a".to_string(),
            DeletionRule {
                enabled: true,
                patterns: vec!["glass/".to_string()],
            },
        );
        config.deletion_rules.insert(
            "b".to_string(),
            DeletionRule {
                enabled: true,
                patterns: vec!["glass/".to_string()],
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled_rules_do_not_conflict() {
        let mut config = valid_config();
        config.deletion_rules.insert(
            "a".to_string(),
            DeletionRule {
                enabled: true,
                patterns: vec!["glass/".to_string()],
            },
        );
        config.deletion_rules.insert(
            "b".to_string(),
            DeletionRule {
                enabled: false,
                patterns: vec!["glass/".to_string()],
            },
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = valid_config();
        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        let parsed: ScanConfig = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
