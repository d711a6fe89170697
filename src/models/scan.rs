use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Kind of location a scan root points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootKind {
    Directory,
    Archive,
}

/// How a scan root was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootOrigin {
    /// Named in the configuration.
    Explicit,
    /// Found by probing the fixed fallback install locations.
    Fallback,
}

/// A directory or addon archive selected for scanning.
///
/// Roots are created once at orchestration start and are immutable for the
/// duration of the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRoot {
    pub path: Utf8PathBuf,
    pub kind: RootKind,
    pub origin: RootOrigin,
}

/// Whether a discovered path names a texture or a model asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceKind {
    Texture,
    Model,
}

/// A texture or model path discovered in decoded content.
///
/// The `path` field is the normalized form: lower-cased, forward-slashed,
/// with a single leading `materials/` segment stripped. Two references with
/// the same normalized path and kind collapse to one entry in the aggregate;
/// the first discovery in enumeration order wins, and an unowned first
/// discovery picks up the owner from a later owned one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// The token exactly as it appeared in the source.
    pub raw: String,
    /// Normalized path used for deduplication and material synthesis.
    pub path: String,
    pub kind: ReferenceKind,
    /// Origin description: loose file path or `archive.gma:entry/name.lua`.
    pub source: String,
    /// Class name of the SWEP this reference was extracted from, if any.
    pub owner: Option<String>,
}

impl Reference {
    /// Key used for aggregate-level deduplication.
    pub fn dedup_key(&self) -> (String, ReferenceKind) {
        (self.path.clone(), self.kind)
    }
}

/// How a SWEP definition announced itself in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Registration {
    /// `SWEP = { ... }` table literal.
    TableLiteral,
    /// `weapons.Register(tbl, "name")` call.
    WeaponsRegister,
    /// Flat `SWEP.Field = value` assignment style.
    FieldAssignments,
}

/// A classified scripted weapon definition.
///
/// Fields absent from the definition stay `None` rather than erroring.
/// `base_unresolved` is set when the base-class chain cycles or exceeds the
/// resolution depth bound; the record itself is always kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwepRecord {
    pub class_name: String,
    pub print_name: Option<String>,
    pub base: Option<String>,
    pub category: Option<String>,
    pub view_model: Option<String>,
    pub world_model: Option<String>,
    /// Custom material paths assigned inside the definition block.
    pub materials: Vec<String>,
    /// Gamemode tag from signature matching, or `"generic"`.
    pub gamemode: String,
    pub registration: Registration,
    /// Origin description of the file the block was found in.
    pub source: String,
    pub base_unresolved: bool,
}

impl SwepRecord {
    pub fn new(
        class_name: impl Into<String>,
        registration: Registration,
        source: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            print_name: None,
            base: None,
            category: None,
            view_model: None,
            world_model: None,
            materials: Vec::new(),
            gamemode: "generic".to_string(),
            registration,
            source: source.into(),
            base_unresolved: false,
        }
    }
}

/// Action the Material Synthesizer decided for one texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MaterialAction {
    Create,
    Delete,
}

/// One generated or removed material definition file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialDefinition {
    /// Path relative to the output directory, always `.vmt`.
    pub target: Utf8PathBuf,
    pub action: MaterialAction,
    /// Deletion-rule or colorization category that matched, if any.
    pub category: Option<String>,
    /// VMT body for `Create` actions, `None` for `Delete`.
    pub body: Option<String>,
}

/// Counters and timings per pipeline stage.
///
/// This is the serializable snapshot of [`crate::metrics::ScanMetrics`],
/// taken by the orchestrator's aggregator and embedded in the final report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStats {
    pub files_discovered: u64,
    pub files_decoded: u64,
    pub files_failed: u64,
    pub files_skipped: u64,
    pub unknown_format: u64,
    pub corrupt_payloads: u64,
    pub extraction_timeouts: u64,
    pub textures_found: u64,
    pub models_found: u64,
    pub sweps_classified: u64,
    pub base_unresolved: u64,
    pub archives_scanned: u64,
    pub archive_entries_recovered: u64,
    pub archive_entries_skipped: u64,
    pub materials_created: u64,
    pub materials_deleted: u64,
    pub synthesis_aborted: bool,
    pub elapsed_ms: u64,
}

/// Complete result of one scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub references: Vec<Reference>,
    pub swep_records: Vec<SwepRecord>,
    pub material_actions: Vec<MaterialDefinition>,
    pub stats: ModuleStats,
}

impl ScanResult {
    /// Build the structured report consumed by the standalone analysis
    /// entry point and the reporting collaborators.
    pub fn to_report(&self) -> ScanReport {
        let mut gamemodes: IndexMap<String, usize> = IndexMap::new();
        let mut bases: IndexMap<String, usize> = IndexMap::new();

        for record in &self.swep_records {
            *gamemodes.entry(record.gamemode.clone()).or_insert(0) += 1;
            let base = record.base.clone().unwrap_or_else(|| "<none>".to_string());
            *bases.entry(base).or_insert(0) += 1;
        }

        ScanReport {
            texture_references: self
                .references
                .iter()
                .filter(|r| r.kind == ReferenceKind::Texture)
                .map(|r| r.path.clone())
                .collect(),
            model_references: self
                .references
                .iter()
                .filter(|r| r.kind == ReferenceKind::Model)
                .map(|r| r.path.clone())
                .collect(),
            sweps: self.swep_records.clone(),
            gamemode_breakdown: gamemodes,
            base_class_breakdown: bases,
            stats: self.stats.clone(),
        }
    }
}

/// JSON-serializable per-scan report with gamemode and base-class breakdowns.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub texture_references: Vec<String>,
    pub model_references: Vec<String>,
    pub sweps: Vec<SwepRecord>,
    pub gamemode_breakdown: IndexMap<String, usize>,
    pub base_class_breakdown: IndexMap<String, usize>,
    pub stats: ModuleStats,
}

/// Marker set used to classify which gamemode family a SWEP belongs to.
///
/// Signatures are static configuration: loaded once per scan and passed by
/// reference into workers. Matching checks content keywords first, then
/// base-class and category hints, then the source path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamemodeSignature {
    pub name: String,
    /// Content markers, matched case-insensitively against the block text.
    pub keywords: Vec<String>,
    /// Substrings matched against the base class and category fields.
    pub base_hints: Vec<String>,
    /// Substrings matched against the source path.
    pub dir_hints: Vec<String>,
}

impl GamemodeSignature {
    pub fn matches(
        &self,
        block: &str,
        base: Option<&str>,
        category: Option<&str>,
        source: &str,
    ) -> bool {
        let block_lower = block.to_lowercase();
        if self
            .keywords
            .iter()
            .any(|k| block_lower.contains(&k.to_lowercase()))
        {
            return true;
        }

        for field in [base, category].into_iter().flatten() {
            let field_lower = field.to_lowercase();
            if self.base_hints.iter().any(|h| field_lower.contains(h)) {
                return true;
            }
        }

        let source_lower = source.to_lowercase();
        self.dir_hints.iter().any(|h| source_lower.contains(h))
    }

    /// The built-in signature set, in fixed priority order. The first match
    /// wins; anything unmatched is tagged `generic`.
    pub fn defaults() -> Vec<GamemodeSignature> {
        vec![
            GamemodeSignature {
                name: "ttt".to_string(),
                keywords: vec![
                    "SWEP.Kind = WEAPON_".to_string(),
                    "SWEP.CanBuy".to_string(),
                    "ROLE_TRAITOR".to_string(),
                    "ROLE_DETECTIVE".to_string(),
                    "EquipMenuData".to_string(),
                ],
                base_hints: vec!["ttt".to_string(), "terror".to_string()],
                dir_hints: vec!["/ttt".to_string(), "terrortown".to_string()],
            },
            GamemodeSignature {
                name: "darkrp".to_string(),
                keywords: vec![
                    "SWEP.jobName".to_string(),
                    "DarkRP.".to_string(),
                    "AddCustomShipment".to_string(),
                ],
                base_hints: vec!["darkrp".to_string()],
                dir_hints: vec!["darkrp".to_string()],
            },
            GamemodeSignature {
                name: "murder".to_string(),
                keywords: vec![
                    "SWEP.IsMurdererWeapon".to_string(),
                    "SWEP.IsKnife".to_string(),
                ],
                base_hints: vec!["murder".to_string()],
                dir_hints: vec!["/murder".to_string()],
            },
            GamemodeSignature {
                name: "prophunt".to_string(),
                keywords: vec![
                    "SWEP.IsPropHuntWeapon".to_string(),
                    "TEAM_PROPS".to_string(),
                    "TEAM_HUNTERS".to_string(),
                ],
                base_hints: vec!["prophunt".to_string()],
                dir_hints: vec!["prop_hunt".to_string(), "prophunt".to_string()],
            },
            GamemodeSignature {
                name: "sandbox".to_string(),
                keywords: vec!["SWEP.Spawnable".to_string()],
                base_hints: vec!["weapon_base".to_string()],
                dir_hints: vec!["lua/weapons".to_string()],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_dedup_key() {
        let a = Reference {
            raw: "Materials/Models/Weapons/V_Pistol".to_string(),
            path: "models/weapons/v_pistol".to_string(),
            kind: ReferenceKind::Texture,
            source: "a.lua".to_string(),
            owner: None,
        };
        let b = Reference {
            raw: "models/weapons/v_pistol".to_string(),
            path: "models/weapons/v_pistol".to_string(),
            kind: ReferenceKind::Texture,
            source: "b.lua".to_string(),
            owner: Some("weapon_x".to_string()),
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_signature_matches_keyword() {
        let sigs = GamemodeSignature::defaults();
        let ttt = &sigs[0];
        assert!(ttt.matches("SWEP.CanBuy = {ROLE_TRAITOR}", None, None, "x.lua"));
        assert!(!ttt.matches("SWEP.Spawnable = true", None, None, "x.lua"));
    }

    #[test]
    fn test_signature_matches_base_and_dir() {
        let sigs = GamemodeSignature::defaults();
        let ttt = &sigs[0];
        assert!(ttt.matches("", Some("weapon_tttbase"), None, "x.lua"));
        assert!(ttt.matches("", None, None, "addons/mod/lua/weapons/ttt/x.lua"));
    }

    #[test]
    fn test_report_breakdowns() {
        let mut rec_a = SwepRecord::new("weapon_a", Registration::TableLiteral, "a.lua");
        rec_a.gamemode = "ttt".to_string();
        rec_a.base = Some("weapon_tttbase".to_string());
        let mut rec_b = SwepRecord::new("weapon_b", Registration::FieldAssignments, "b.lua");
        rec_b.gamemode = "ttt".to_string();

        let result = ScanResult {
            references: vec![],
            swep_records: vec![rec_a, rec_b],
            material_actions: vec![],
            stats: ModuleStats::default(),
        };

        let report = result.to_report();
        assert_eq!(report.gamemode_breakdown.get("ttt"), Some(&2));
        assert_eq!(report.base_class_breakdown.get("weapon_tttbase"), Some(&1));
        assert_eq!(report.base_class_breakdown.get("<none>"), Some(&1));
    }
}
