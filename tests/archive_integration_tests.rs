//! Scans over GMA addon archives, including damaged ones.

use camino::Utf8Path;
use std::fs;
use swepscan::models::ScanConfig;
use swepscan::services::{ArchiveReader, ScanOrchestrator};
use tempfile::TempDir;

/// Assemble a well-formed version-3 GMA archive from (name, body) pairs.
fn build_gma(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"GMAD");
    buf.push(3);
    buf.extend_from_slice(&0u64.to_le_bytes()); // steamid
    buf.extend_from_slice(&0u64.to_le_bytes()); // timestamp
    buf.push(0); // empty required-content list
    buf.extend_from_slice(b"integration addon\0");
    buf.extend_from_slice(b"desc\0");
    buf.extend_from_slice(b"author\0");
    buf.extend_from_slice(&1i32.to_le_bytes());

    for (i, (name, body)) in entries.iter().enumerate() {
        buf.extend_from_slice(&(i as u32 + 1).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&(body.len() as i64).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // crc
    }
    buf.extend_from_slice(&0u32.to_le_bytes()); // index terminator

    for (_, body) in entries {
        buf.extend_from_slice(body);
    }
    buf
}

const KNIFE_LUA: &[u8] = br#"
SWEP.PrintName = "Murder Knife"
SWEP.Base = "weapon_mu_base"
SWEP.IsKnife = true
SWEP.ViewModel = "models/weapons/v_knife_t.mdl"
"#;

const PISTOL_LUA: &[u8] = br#"
SWEP.PrintName = "Loot Pistol"
SWEP.Base = "weapon_base"
SWEP.Spawnable = true
SWEP.WorldModel = "models/weapons/w_pistol.mdl"
"#;

#[tokio::test]
async fn test_scan_root_pointing_at_archive() {
    let dir = TempDir::new().unwrap();
    let gma = Utf8Path::from_path(dir.path()).unwrap().join("murder_pack.gma");
    fs::write(
        &gma,
        build_gma(&[
            ("lua/weapons/mu_knife.lua", KNIFE_LUA),
            ("lua/weapons/loot_pistol.lua", PISTOL_LUA),
            ("materials/vgui/icon.png", &[0x89, 0x50]),
        ]),
    )
    .unwrap();

    let config = ScanConfig {
        scan_root: gma.to_string(),
        ..ScanConfig::default()
    };
    let result = ScanOrchestrator::new(config).run_scan().await.unwrap();

    assert_eq!(result.stats.archives_scanned, 1);
    assert_eq!(result.stats.files_skipped, 1); // the png entry
    assert_eq!(result.swep_records.len(), 2);

    let knife = result
        .swep_records
        .iter()
        .find(|r| r.class_name == "mu_knife")
        .unwrap();
    assert_eq!(knife.gamemode, "murder");
    assert_eq!(knife.source, format!("{gma}:lua/weapons/mu_knife.lua"));

    assert!(result
        .references
        .iter()
        .any(|r| r.path == "models/weapons/v_knife_t.mdl"));
}

#[tokio::test]
async fn test_archives_found_during_directory_walk() {
    let dir = TempDir::new().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap();
    let addons = root.join("garrysmod/addons");
    fs::create_dir_all(&addons).unwrap();
    fs::write(
        addons.join("pack.gma"),
        build_gma(&[("lua/weapons/loot_pistol.lua", PISTOL_LUA)]),
    )
    .unwrap();

    let config = ScanConfig {
        scan_root: root.to_string(),
        ..ScanConfig::default()
    };
    let result = ScanOrchestrator::new(config).run_scan().await.unwrap();

    assert_eq!(result.stats.archives_scanned, 1);
    assert_eq!(result.swep_records.len(), 1);
    assert_eq!(result.swep_records[0].class_name, "loot_pistol");
}

#[tokio::test]
async fn test_uppercase_archive_extension_recognized() {
    let dir = TempDir::new().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap();
    let addons = root.join("garrysmod/addons");
    fs::create_dir_all(&addons).unwrap();
    fs::write(
        addons.join("PACK.GMA"),
        build_gma(&[("lua/weapons/loot_pistol.lua", PISTOL_LUA)]),
    )
    .unwrap();

    let config = ScanConfig {
        scan_root: root.to_string(),
        ..ScanConfig::default()
    };
    let result = ScanOrchestrator::new(config).run_scan().await.unwrap();

    // Extension matching is case-insensitive; the file must be opened as an
    // archive, never decoded as a loose file.
    assert_eq!(result.stats.archives_scanned, 1);
    assert_eq!(result.stats.unknown_format, 0);
    assert_eq!(result.swep_records.len(), 1);
    assert_eq!(result.swep_records[0].class_name, "loot_pistol");
}

#[tokio::test]
async fn test_truncated_archive_still_yields_recoverable_entries() {
    let dir = TempDir::new().unwrap();
    let gma = Utf8Path::from_path(dir.path()).unwrap().join("damaged.gma");
    let mut data = build_gma(&[
        ("lua/weapons/mu_knife.lua", KNIFE_LUA),
        ("lua/weapons/loot_pistol.lua", PISTOL_LUA),
    ]);
    // Cut into the last entry's body so the strict index layout no longer
    // fits the file.
    data.truncate(data.len() - 8);
    fs::write(&gma, data).unwrap();

    let config = ScanConfig {
        scan_root: gma.to_string(),
        ..ScanConfig::default()
    };
    let result = ScanOrchestrator::new(config).run_scan().await.unwrap();

    // The intact entry was recovered and classified; the unreadable one was
    // counted as skipped rather than failing the archive.
    assert_eq!(result.stats.archive_entries_recovered, 1);
    assert_eq!(result.stats.archive_entries_skipped, 1);
    assert_eq!(result.swep_records.len(), 1);
    assert_eq!(result.swep_records[0].class_name, "mu_knife");
}

#[test]
fn test_open_from_disk() {
    let dir = TempDir::new().unwrap();
    let gma = Utf8Path::from_path(dir.path()).unwrap().join("pack.gma");
    fs::write(&gma, build_gma(&[("lua/autorun/hello.lua", b"print(1)")])).unwrap();

    let reader = ArchiveReader::open(&gma).unwrap();
    assert!(!reader.recovered_via_fallback());
    assert_eq!(reader.read_entry("lua/autorun/hello.lua").unwrap(), b"print(1)");
}
