//! Texture and model reference extraction.
//!
//! Decoded content is scanned line-wise against a fixed set of precompiled
//! patterns: literal `materials/`/`models/` asset paths plus the engine call
//! shapes that carry them (`Material(...)`, `SetMaterial(...)`,
//! `SetModel(...)`, view/world-model assignments). The pass runs under a
//! wall-clock budget; hitting the deadline keeps the partial result and
//! flags the file instead of hanging a worker on pathological input.

use crate::models::ReferenceKind;
use regex::Regex;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Lines scanned between deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 64;

/// One matched asset token before aggregate-level attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    /// Token exactly as matched in the source.
    pub raw: String,
    /// Normalized path (lower-case, forward slashes, `materials/` stripped).
    pub path: String,
    pub kind: ReferenceKind,
}

/// Result of one extraction pass.
#[derive(Debug, Clone, Default)]
pub struct ExtractorOutput {
    pub references: Vec<RawReference>,
    /// Set when the wall-clock budget expired before the content was fully
    /// scanned; `references` holds everything matched up to that point.
    pub timed_out: bool,
}

struct Matcher {
    regex: Regex,
    kind: ReferenceKind,
}

/// Pattern-based extractor with a per-file time budget.
pub struct ReferenceExtractor {
    matchers: Vec<Matcher>,
    budget: Duration,
}

impl ReferenceExtractor {
    pub fn new(pattern_budget_ms: u64) -> Self {
        let texture = [
            // Literal material asset paths.
            r#"(?i)materials/[a-z0-9_\-./\\]+\.(?:vmt|vtf)"#,
            // Material("path/to/texture")
            r#"(?i)\bMaterial\s*\(\s*["']([^"']+)["']"#,
            // self:SetMaterial("...") / ent:SetSubMaterial(1, "...")
            r#"(?i)\bSet(?:Sub)?Material\s*\(\s*(?:\d+\s*,\s*)?["']([^"']+)["']"#,
        ];
        let model = [
            // Literal model asset paths.
            r#"(?i)models/[a-z0-9_\-./\\]+\.mdl"#,
            // ViewModel = "..." in both table and SWEP.Field styles.
            r#"(?i)\b(?:ViewModel|WorldModel)\s*=\s*["']([^"']+)["']"#,
            // ent:SetModel("...")
            r#"(?i)\bSetModel\s*\(\s*["']([^"']+)["']"#,
        ];

        let mut matchers = Vec::new();
        for pattern in texture {
            matchers.push(Matcher {
                regex: Regex::new(pattern).expect("invalid built-in texture pattern"),
                kind: ReferenceKind::Texture,
            });
        }
        for pattern in model {
            matchers.push(Matcher {
                regex: Regex::new(pattern).expect("invalid built-in model pattern"),
                kind: ReferenceKind::Model,
            });
        }

        Self {
            matchers,
            budget: Duration::from_millis(pattern_budget_ms),
        }
    }

    /// Scan decoded text for asset references.
    ///
    /// Duplicate (normalized path, kind) pairs collapse within one pass; the
    /// orchestrator deduplicates again across files.
    pub fn extract(&self, content: &str) -> ExtractorOutput {
        let deadline = Instant::now() + self.budget;
        let mut seen: HashSet<(String, ReferenceKind)> = HashSet::new();
        let mut output = ExtractorOutput::default();

        for (line_no, line) in content.lines().enumerate() {
            if line_no % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
                output.timed_out = true;
                break;
            }
            for matcher in &self.matchers {
                for caps in matcher.regex.captures_iter(line) {
                    let token = caps
                        .get(1)
                        .or_else(|| caps.get(0))
                        .map(|m| m.as_str())
                        .unwrap_or_default();
                    let Some(path) = normalize(token) else {
                        continue;
                    };
                    if seen.insert((path.clone(), matcher.kind)) {
                        output.references.push(RawReference {
                            raw: token.to_string(),
                            path,
                            kind: matcher.kind,
                        });
                    }
                }
            }
        }

        output
    }
}

/// Normalize an asset token to its canonical scan form.
///
/// Lower-cases, flips backslashes, strips one leading `materials/` segment,
/// and rejects empty results and any path whose `..` components would climb
/// out of the root it was found under.
pub fn normalize(token: &str) -> Option<String> {
    let mut path = token.trim().to_lowercase().replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    path = path.trim_start_matches('/').to_string();
    if let Some(rest) = path.strip_prefix("materials/") {
        path = rest.to_string();
    }
    if path.is_empty() {
        return None;
    }

    let mut depth: i32 = 0;
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => depth += 1,
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ReferenceExtractor {
        ReferenceExtractor::new(500)
    }

    #[test]
    fn test_literal_paths() {
        let out = extractor().extract(
            "resource.AddFile(\"materials/models/weapons/knife.vmt\")\n\
             util.PrecacheModel(\"models/weapons/w_knife_ct.mdl\")\n",
        );
        let paths: Vec<(&str, ReferenceKind)> = out
            .references
            .iter()
            .map(|r| (r.path.as_str(), r.kind))
            .collect();
        assert!(paths.contains(&("models/weapons/knife.vmt", ReferenceKind::Texture)));
        assert!(paths.contains(&("models/weapons/w_knife_ct.mdl", ReferenceKind::Model)));
        assert!(!out.timed_out);
    }

    #[test]
    fn test_call_shapes() {
        let out = extractor().extract(
            "local mat = Material(\"models/weapons/v_pistol\")\n\
             self:SetSubMaterial(2, \"models/weapons/skin2\")\n\
             ent:SetModel(\"models/props/crate.mdl\")\n",
        );
        assert!(out
            .references
            .iter()
            .any(|r| r.path == "models/weapons/v_pistol" && r.kind == ReferenceKind::Texture));
        assert!(out
            .references
            .iter()
            .any(|r| r.path == "models/weapons/skin2" && r.kind == ReferenceKind::Texture));
        assert!(out
            .references
            .iter()
            .any(|r| r.path == "models/props/crate.mdl" && r.kind == ReferenceKind::Model));
    }

    #[test]
    fn test_model_assignments() {
        let out = extractor().extract(
            "SWEP.ViewModel = \"models/weapons/v_smg1.mdl\"\n\
             WorldModel = \"models/weapons/w_smg1.mdl\",\n",
        );
        let models: Vec<&str> = out
            .references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Model)
            .map(|r| r.path.as_str())
            .collect();
        assert!(models.contains(&"models/weapons/v_smg1.mdl"));
        assert!(models.contains(&"models/weapons/w_smg1.mdl"));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(
            normalize("Materials\\Models\\Weapons\\V_Pistol.VMT"),
            Some("models/weapons/v_pistol.vmt".to_string())
        );
        // Only one leading materials/ segment is stripped.
        assert_eq!(
            normalize("materials/materials/x.vtf"),
            Some("materials/x.vtf".to_string())
        );
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("../../../etc/passwd"), None);
        assert_eq!(
            normalize("models/a/../b.mdl"),
            Some("models/a/../b.mdl".to_string())
        );
    }

    #[test]
    fn test_duplicates_collapse_within_file() {
        let src = "Material(\"models/weapons/v_pistol\")\n".repeat(10);
        let out = extractor().extract(&src);
        assert_eq!(out.references.len(), 1);
    }

    #[test]
    fn test_budget_keeps_partial_result() {
        let big: String = (0..10_000)
            .map(|i| format!("Material(\"models/weapons/tex_{i}\")\n"))
            .collect();
        let out = ReferenceExtractor::new(0).extract(&big);
        assert!(out.timed_out);
        // The deadline is checked between chunks of lines, so whatever was
        // matched before the check survives.
        assert!(out.references.len() < 10_000);
    }
}
