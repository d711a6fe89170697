//! SWEP definition classification.
//!
//! Scripted weapons announce themselves in three styles: a `SWEP = { ... }`
//! table literal, a `weapons.Register(tbl, "class")` call, or flat
//! `SWEP.Field = value` assignments. Blocks are located with a balanced
//! delimiter scan under depth and span bounds so malformed sources are
//! abandoned rather than parsed forever. Classified records get a gamemode
//! tag from the fixed-priority signature list and, after collection across
//! all files, a base-class chain resolution pass.

use crate::models::{GamemodeSignature, Registration, SwepRecord};
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Nesting bound for the balanced-delimiter scan.
const MAX_BLOCK_DEPTH: usize = 32;
/// Span bound for one definition block, in bytes.
const MAX_BLOCK_SPAN: usize = 64 * 1024;
/// Base-class chain resolution bound.
const MAX_BASE_CHAIN_DEPTH: usize = 16;

pub struct SwepClassifier {
    signatures: Vec<GamemodeSignature>,
    re_table_literal: Regex,
    re_register: Regex,
    re_register_var: Regex,
    re_register_name: Regex,
    re_flat_field: Regex,
    re_print_name: Regex,
    re_base: Regex,
    re_category: Regex,
    re_view_model: Regex,
    re_world_model: Regex,
    re_material_field: Regex,
}

impl SwepClassifier {
    pub fn new() -> Self {
        Self::with_signatures(GamemodeSignature::defaults())
    }

    pub fn with_signatures(signatures: Vec<GamemodeSignature>) -> Self {
        Self {
            signatures,
            re_table_literal: Regex::new(r"\bSWEP\s*=\s*\{").expect("invalid pattern"),
            re_register: Regex::new(r"weapons\.Register\s*\(").expect("invalid pattern"),
            re_register_var: Regex::new(
                r#"weapons\.Register\s*\(\s*[A-Za-z_]\w*\s*,\s*["']([^"']+)["']"#,
            )
            .expect("invalid pattern"),
            re_register_name: Regex::new(r#"^\s*,\s*["']([^"']+)["']"#).expect("invalid pattern"),
            re_flat_field: Regex::new(r"\bSWEP\.\w+\s*=").expect("invalid pattern"),
            re_print_name: Regex::new(r#"(?i)\bPrintName\s*=\s*["']([^"']+)["']"#)
                .expect("invalid pattern"),
            re_base: Regex::new(r#"(?i)\bBase\s*=\s*["']([^"']+)["']"#).expect("invalid pattern"),
            re_category: Regex::new(r#"(?i)\bCategory\s*=\s*["']([^"']+)["']"#)
                .expect("invalid pattern"),
            re_view_model: Regex::new(r#"(?i)\bViewModel\s*=\s*["']([^"']+)["']"#)
                .expect("invalid pattern"),
            re_world_model: Regex::new(r#"(?i)\bWorldModel\s*=\s*["']([^"']+)["']"#)
                .expect("invalid pattern"),
            re_material_field: Regex::new(
                r#"(?i)\b(?:ViewModelMaterial|WorldModelMaterial|Material)\s*=\s*["']([^"']+)["']"#,
            )
            .expect("invalid pattern"),
        }
    }

    /// Classify every SWEP definition found in one decoded file.
    ///
    /// `source` is the origin description used for class-name derivation and
    /// directory-hint signature matching. Base-chain resolution happens
    /// later, once records from all files are collected.
    pub fn classify(&self, content: &str, source: &str) -> Vec<SwepRecord> {
        let mut records = Vec::new();

        for m in self.re_register.find_iter(content) {
            if let Some(record) = self.classify_register_call(content, m.start(), m.end(), source)
            {
                records.push(record);
            }
        }

        for m in self.re_table_literal.find_iter(content) {
            // The match ends on the opening brace.
            let open = m.end() - 1;
            let Some(block) = balanced_block(content, open) else {
                tracing::debug!("Abandoning unbalanced SWEP table in {source}");
                continue;
            };
            let mut record =
                SwepRecord::new(class_from_source(source), Registration::TableLiteral, source);
            self.fill_fields(&mut record, block);
            record.gamemode = self.match_gamemode(block, &record, source);
            records.push(record);
        }

        if records.is_empty() && self.re_flat_field.is_match(content) {
            let mut record = SwepRecord::new(
                class_from_source(source),
                Registration::FieldAssignments,
                source,
            );
            self.fill_fields(&mut record, content);
            record.gamemode = self.match_gamemode(content, &record, source);
            records.push(record);
        }

        records
    }

    fn classify_register_call(
        &self,
        content: &str,
        call_start: usize,
        after_paren: usize,
        source: &str,
    ) -> Option<SwepRecord> {
        let rest = &content[after_paren..];
        let first = rest.trim_start().chars().next()?;

        let (block, class_name) = if first == '{' {
            // Inline table argument; the class name trails the block.
            let open = after_paren + (rest.len() - rest.trim_start().len());
            let block = balanced_block(content, open)?;
            let tail = &content[open + block.len()..];
            let class_name = self.re_register_name.captures(tail)?.get(1)?.as_str();
            (block, class_name.to_string())
        } else {
            // Table passed by variable; fields live elsewhere in the file.
            let caps = self.re_register_var.captures(&content[call_start..])?;
            let class_name = caps.get(1)?.as_str().to_string();
            (content, class_name)
        };

        let mut record = SwepRecord::new(class_name, Registration::WeaponsRegister, source);
        self.fill_fields(&mut record, block);
        record.gamemode = self.match_gamemode(block, &record, source);
        Some(record)
    }

    fn fill_fields(&self, record: &mut SwepRecord, block: &str) {
        record.print_name = capture_first(&self.re_print_name, block);
        record.base = capture_first(&self.re_base, block);
        record.category = capture_first(&self.re_category, block);
        record.view_model = capture_first(&self.re_view_model, block);
        record.world_model = capture_first(&self.re_world_model, block);
        for caps in self.re_material_field.captures_iter(block) {
            if let Some(m) = caps.get(1) {
                let value = m.as_str().to_string();
                if !record.materials.contains(&value) {
                    record.materials.push(value);
                }
            }
        }
    }

    fn match_gamemode(&self, block: &str, record: &SwepRecord, source: &str) -> String {
        self.signatures
            .iter()
            .find(|sig| {
                sig.matches(
                    block,
                    record.base.as_deref(),
                    record.category.as_deref(),
                    source,
                )
            })
            .map(|sig| sig.name.clone())
            .unwrap_or_else(|| "generic".to_string())
    }

    /// Resolve base-class chains across the collected record set.
    ///
    /// A chain terminates when the base names a class with no record of its
    /// own (an engine or addon-provided base). A cycle or a chain deeper
    /// than the bound marks the record `base_unresolved`; the record stays.
    pub fn resolve_base_chains(records: &mut [SwepRecord]) {
        let bases: HashMap<String, Option<String>> = records
            .iter()
            .map(|r| {
                (
                    r.class_name.to_lowercase(),
                    r.base.as_ref().map(|b| b.to_lowercase()),
                )
            })
            .collect();

        for record in records.iter_mut() {
            let Some(base) = record.base.as_ref() else {
                continue;
            };
            let mut current = base.to_lowercase();
            let mut visited: HashSet<String> = HashSet::new();
            visited.insert(record.class_name.to_lowercase());

            let mut resolved = false;
            for _ in 0..MAX_BASE_CHAIN_DEPTH {
                if !visited.insert(current.clone()) {
                    break; // cycle
                }
                match bases.get(&current) {
                    Some(Some(next)) => current = next.clone(),
                    // No further base, or base unknown to the record set:
                    // the chain bottoms out here.
                    Some(None) | None => {
                        resolved = true;
                        break;
                    }
                }
            }
            if !resolved {
                tracing::debug!(
                    "Base chain unresolved for {} (starting at {})",
                    record.class_name,
                    base
                );
                record.base_unresolved = true;
            }
        }
    }
}

impl Default for SwepClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn capture_first(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Balanced-brace block starting at `open` (which must index a `{`).
///
/// Returns the block including both braces, or `None` when nesting exceeds
/// the depth bound, the span bound is hit, or the block never closes.
fn balanced_block(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    debug_assert_eq!(bytes.get(open), Some(&b'{'));

    let mut depth = 0usize;
    let mut in_string: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if i - open > MAX_BLOCK_SPAN {
            return None;
        }
        if let Some(quote) = in_string {
            if b == quote && bytes.get(i - 1) != Some(&b'\\') {
                in_string = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => in_string = Some(b),
            b'{' => {
                depth += 1;
                if depth > MAX_BLOCK_DEPTH {
                    return None;
                }
            }
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Derive a class name from the last path segment of the origin description.
fn class_from_source(source: &str) -> String {
    let segment = source
        .rsplit(['/', '\\', ':'])
        .next()
        .unwrap_or(source);
    let stem = segment.split('.').next().unwrap_or(segment);
    if stem.is_empty() {
        "unknown_swep".to_string()
    } else {
        stem.to_lowercase()
    }
}
