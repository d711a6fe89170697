//! VMT material synthesis.
//!
//! Maps the deduplicated texture reference set to ordered material actions:
//! references matched by an enabled deletion rule become `Delete` actions,
//! everything else becomes a `Create` carrying a generated `UnlitGeneric`
//! VMT body. Weapons whose category matches a colorization rule get the
//! rule's `$color2`/`$selfillumtint` glow block; anything else gets the
//! translucent defaults. Output ordering is stable so identical input
//! always produces byte-identical files.

use crate::models::{
    ColorRule, DeletionRule, MaterialAction, MaterialDefinition, Reference, ReferenceKind,
    ScanConfig, SwepRecord,
};
use crate::services::ScanError;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fs;

pub struct MaterialSynthesizer {
    deletion_rules: IndexMap<String, DeletionRule>,
    colorization_rules: IndexMap<String, ColorRule>,
}

impl MaterialSynthesizer {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            deletion_rules: config.deletion_rules.clone(),
            colorization_rules: config.colorization_rules.clone(),
        }
    }

    /// Produce the ordered action list for one scan's aggregate.
    ///
    /// Only texture references yield materials. Sorting is by normalized
    /// path, ties by kind then discovery order; two references mapping to
    /// the same `.vmt` target collapse to the first.
    pub fn synthesize(
        &self,
        references: &[Reference],
        records: &[SwepRecord],
    ) -> Vec<MaterialDefinition> {
        // First record per class name wins attribution conflicts.
        let mut by_class: HashMap<String, &SwepRecord> = HashMap::new();
        for record in records {
            by_class
                .entry(record.class_name.to_lowercase())
                .or_insert(record);
        }

        let mut textures: Vec<(usize, &Reference)> = references
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind == ReferenceKind::Texture)
            .collect();
        textures.sort_by(|(ia, a), (ib, b)| {
            a.path
                .cmp(&b.path)
                .then(a.kind.cmp(&b.kind))
                .then(ia.cmp(ib))
        });

        let mut actions = Vec::new();
        let mut seen_targets: HashSet<Utf8PathBuf> = HashSet::new();
        for (_, reference) in textures {
            let target = vmt_target(&reference.path);
            if !seen_targets.insert(target.clone()) {
                continue;
            }

            if let Some(category) = self.deletion_category(&reference.path) {
                actions.push(MaterialDefinition {
                    target,
                    action: MaterialAction::Delete,
                    category: Some(category.to_string()),
                    body: None,
                });
                continue;
            }

            let owner = reference
                .owner
                .as_ref()
                .and_then(|c| by_class.get(&c.to_lowercase()).copied());
            let color = owner.and_then(|rec| self.color_rule_for(rec));
            actions.push(MaterialDefinition {
                target,
                action: MaterialAction::Create,
                category: color.map(|(cat, _)| cat.to_string()),
                body: Some(vmt_body(&reference.path, color.map(|(_, r)| r))),
            });
        }

        actions
    }

    /// Materialize the actions under `output_dir`.
    ///
    /// An inaccessible output directory aborts only this stage; the caller
    /// still has the synthesized actions. Returns (created, deleted) counts.
    pub fn write_actions(
        &self,
        actions: &[MaterialDefinition],
        output_dir: &Utf8Path,
    ) -> Result<(u64, u64), ScanError> {
        fs::create_dir_all(output_dir)
            .map_err(|_| ScanError::IoAccessDenied(output_dir.to_path_buf()))?;

        let mut created = 0u64;
        let mut deleted = 0u64;
        for action in actions {
            let full = output_dir.join(&action.target);
            match action.action {
                MaterialAction::Create => {
                    if let Some(parent) = full.parent() {
                        fs::create_dir_all(parent)
                            .map_err(|_| ScanError::IoAccessDenied(parent.to_path_buf()))?;
                    }
                    let body = action.body.as_deref().unwrap_or_default();
                    fs::write(&full, body)
                        .map_err(|_| ScanError::IoAccessDenied(full.clone()))?;
                    created += 1;
                }
                MaterialAction::Delete => match fs::remove_file(&full) {
                    Ok(()) => deleted += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(_) => return Err(ScanError::IoAccessDenied(full.clone())),
                },
            }
        }
        Ok((created, deleted))
    }

    /// First enabled deletion rule with a pattern matching the path.
    fn deletion_category(&self, path: &str) -> Option<&str> {
        self.deletion_rules
            .iter()
            .filter(|(_, rule)| rule.enabled)
            .find(|(_, rule)| rule.patterns.iter().any(|p| path.contains(p.as_str())))
            .map(|(category, _)| category.as_str())
    }

    /// Colorization rule for the owning weapon, keyed on its category field.
    fn color_rule_for<'a>(&'a self, record: &SwepRecord) -> Option<(&'a str, &'a ColorRule)> {
        let category = record.category.as_ref()?.to_lowercase();
        self.colorization_rules
            .iter()
            .find(|(key, _)| category.contains(key.as_str()))
            .map(|(key, rule)| (key.as_str(), rule))
    }
}

/// Map a normalized texture path to its `.vmt` target.
fn vmt_target(path: &str) -> Utf8PathBuf {
    let stem = path
        .strip_suffix(".vtf")
        .or_else(|| path.strip_suffix(".vmt"))
        .unwrap_or(path);
    Utf8PathBuf::from(format!("{stem}.vmt"))
}

fn vmt_body(path: &str, color: Option<&ColorRule>) -> String {
    let base = path
        .strip_suffix(".vtf")
        .or_else(|| path.strip_suffix(".vmt"))
        .unwrap_or(path);
    match color {
        Some(rule) => format!(
            "\"UnlitGeneric\"\n{{\n\t\"$basetexture\" \"{base}\"\n\t\"$model\" 1\n\t\"$color2\" \"{}\"\n\t\"$selfillum\" 1\n\t\"$selfillumtint\" \"{}\"\n}}\n",
            rule.color, rule.glow
        ),
        None => format!(
            "\"UnlitGeneric\"\n{{\n\t\"$basetexture\" \"{base}\"\n\t\"$translucent\" 1\n\t\"$alpha\" 0.8\n}}\n"
        ),
    }
}
