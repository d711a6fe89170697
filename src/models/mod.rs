//! Data models for the swepscan pipeline.
//!
//! This module contains the core data structures used throughout the scanner:
//! - [`ScanConfig`]: scan roots, output directory, budgets, and rule tables
//!   loaded from `swepscan.yaml`
//! - [`Reference`] / [`SwepRecord`] / [`MaterialDefinition`]: the aggregate a
//!   scan produces
//! - [`GamemodeSignature`]: the static marker sets used to classify SWEPs
//! - [`ModuleStats`] / [`ScanResult`] / [`ScanReport`]: per-stage counters
//!   and the serializable scan report
//!
//! # Architecture Note
//!
//! Config and report structs derive `Serialize`/`Deserialize` for YAML/JSON
//! persistence. Signature tables are immutable for the duration of one scan
//! and shared by reference across workers; the mutable aggregate is owned by
//! the orchestrator and only touched through its accumulation path.

pub mod config;
pub mod scan;

pub use config::{ColorRule, DeletionRule, ScanConfig};
pub use scan::{
    GamemodeSignature, MaterialAction, MaterialDefinition, ModuleStats, Reference, ReferenceKind,
    Registration, RootKind, RootOrigin, ScanReport, ScanResult, ScanRoot, SwepRecord,
};
