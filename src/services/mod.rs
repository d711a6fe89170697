//! Services module - the asset-reference extraction and classification pipeline.
//!
//! This module contains all the core business logic for scanning a game
//! installation for SWEP definitions and texture/model references. The
//! services are **framework-agnostic** and have no dependencies on any UI
//! layer, making them testable and reusable.
//!
//! # Components
//!
//! - [`ArchiveReader`]: opens GMA addon archives, lists entries, yields entry
//!   bytes on demand; tolerates damaged indexes via a linear fallback scan
//! - [`CacheDecoder`]: classifies raw bytes as plain script text, compressed
//!   cache payload, or binary string table, and normalizes them to text
//! - [`ReferenceExtractor`]: pattern-scans decoded content for texture and
//!   model path references under a wall-clock budget
//! - [`SwepClassifier`]: parses SWEP definition blocks, assigns gamemode
//!   tags, and resolves base-class chains
//! - [`MaterialSynthesizer`]: maps the deduplicated reference set to created
//!   or deleted VMT material definitions
//! - [`ScanOrchestrator`]: discovers scan roots, fans files out to a worker
//!   pool, aggregates results, reports progress, honors cancellation
//!
//! # Design Philosophy
//!
//! - **Per-file isolation**: a failure decoding or classifying one file is
//!   recorded and never aborts the scan
//! - **Bounded execution**: decompression and pattern matching carry explicit
//!   size and time budgets so adversarial inputs cannot hang a worker
//! - **Order independence**: workers may complete in any order; results are
//!   folded in enumeration order, so dedup, attribution, and synthesis never
//!   depend on scheduling

pub mod archive;
pub mod classifier;
pub mod decoder;
pub mod extractor;
pub mod orchestrator;
pub mod synthesizer;

pub use archive::{ArchiveReader, EntryDescriptor};
pub use classifier::SwepClassifier;
pub use decoder::{CacheDecoder, CacheFormat, DecodedSource};
pub use extractor::{ExtractorOutput, RawReference, ReferenceExtractor};
pub use orchestrator::{ScanEvent, ScanOrchestrator};
pub use synthesizer::MaterialSynthesizer;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur in the scan pipeline.
///
/// Per-file classes (`ArchiveCorrupt`, `EntryNotFound`, `UnknownFormat`,
/// `CorruptPayload`, `ExtractionTimeout`, I/O) are caught at the worker
/// boundary and recorded into the scan metrics; they never abort the scan.
/// `ConfigurationInvalid` is checked before any work starts and is the only
/// hard failure with no partial output. `IoAccessDenied` on the output
/// directory aborts the synthesis stage only.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("archive corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("archive entry not found: {0}")]
    EntryNotFound(String),

    #[error("unrecognized cache format")]
    UnknownFormat,

    #[error("corrupt compressed payload: {0}")]
    CorruptPayload(String),

    #[error("pattern matching exceeded its time budget")]
    ExtractionTimeout,

    #[error("base-class chain unresolved for {0}")]
    ClassificationUnresolved(String),

    #[error("access denied: {0}")]
    IoAccessDenied(Utf8PathBuf),

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ScanError::ExtractionTimeout.to_string(),
            "pattern matching exceeded its time budget"
        );
        assert_eq!(
            ScanError::ClassificationUnresolved("weapon_x".to_string()).to_string(),
            "base-class chain unresolved for weapon_x"
        );
        assert_eq!(
            ScanError::CorruptPayload("bad stream".to_string()).to_string(),
            "corrupt compressed payload: bad stream"
        );
    }
}
