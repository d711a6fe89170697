// Scan metrics module
//
// Provides lightweight metrics tracking for monitoring scan performance

use crate::models::ModuleStats;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

/// Per-scan pipeline metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// Workers never touch these directly; the orchestrator's aggregator records
/// each per-file outcome as it folds the result in, and progress reporting
/// reads the counters. A serializable snapshot is taken at scan end via
/// [`snapshot`](Self::snapshot).
#[derive(Debug)]
pub struct ScanMetrics {
    /// Candidate files enumerated across all scan roots
    pub files_discovered: AtomicU64,

    /// Files successfully normalized by the cache decoder
    pub files_decoded: AtomicU64,

    /// Files whose processing failed outright (I/O, decode, classify)
    pub files_failed: AtomicU64,

    /// Files filtered out before decoding (junk extension, empty, oversized)
    pub files_skipped: AtomicU64,

    /// Decode failures classified as unrecognized content
    pub unknown_format: AtomicU64,

    /// Decode failures from bad or cap-exceeding compressed payloads
    pub corrupt_payloads: AtomicU64,

    /// Pattern-matching passes that hit their wall-clock budget
    pub extraction_timeouts: AtomicU64,

    /// Deduplicated texture references in the aggregate
    pub textures_found: AtomicU64,

    /// Deduplicated model references in the aggregate
    pub models_found: AtomicU64,

    /// SWEP records classified
    pub sweps_classified: AtomicU64,

    /// SWEP records whose base-class chain could not be resolved
    pub base_unresolved: AtomicU64,

    /// Addon archives opened
    pub archives_scanned: AtomicU64,

    /// Archive entries recovered through the linear fallback scan
    pub archive_entries_recovered: AtomicU64,

    /// Archive entries that could not be recovered
    pub archive_entries_skipped: AtomicU64,

    /// Material definitions written
    pub materials_created: AtomicU64,

    /// Material definitions removed
    pub materials_deleted: AtomicU64,

    /// Set when the synthesis stage aborted on an inaccessible output path
    pub synthesis_aborted: AtomicBool,

    /// Scan start time
    start_time: Instant,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            files_discovered: AtomicU64::new(0),
            files_decoded: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            unknown_format: AtomicU64::new(0),
            corrupt_payloads: AtomicU64::new(0),
            extraction_timeouts: AtomicU64::new(0),
            textures_found: AtomicU64::new(0),
            models_found: AtomicU64::new(0),
            sweps_classified: AtomicU64::new(0),
            base_unresolved: AtomicU64::new(0),
            archives_scanned: AtomicU64::new(0),
            archive_entries_recovered: AtomicU64::new(0),
            archive_entries_skipped: AtomicU64::new(0),
            materials_created: AtomicU64::new(0),
            materials_deleted: AtomicU64::new(0),
            synthesis_aborted: AtomicBool::new(false),
            start_time: Instant::now(),
        }
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a serializable snapshot of the current counters.
    pub fn snapshot(&self) -> ModuleStats {
        ModuleStats {
            files_discovered: self.files_discovered.load(Ordering::Relaxed),
            files_decoded: self.files_decoded.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            unknown_format: self.unknown_format.load(Ordering::Relaxed),
            corrupt_payloads: self.corrupt_payloads.load(Ordering::Relaxed),
            extraction_timeouts: self.extraction_timeouts.load(Ordering::Relaxed),
            textures_found: self.textures_found.load(Ordering::Relaxed),
            models_found: self.models_found.load(Ordering::Relaxed),
            sweps_classified: self.sweps_classified.load(Ordering::Relaxed),
            base_unresolved: self.base_unresolved.load(Ordering::Relaxed),
            archives_scanned: self.archives_scanned.load(Ordering::Relaxed),
            archive_entries_recovered: self.archive_entries_recovered.load(Ordering::Relaxed),
            archive_entries_skipped: self.archive_entries_skipped.load(Ordering::Relaxed),
            materials_created: self.materials_created.load(Ordering::Relaxed),
            materials_deleted: self.materials_deleted.load(Ordering::Relaxed),
            synthesis_aborted: self.synthesis_aborted.load(Ordering::Relaxed),
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
        }
    }

    /// Log a metrics summary at scan end.
    pub fn log_summary(&self) {
        let stats = self.snapshot();
        tracing::info!("=== Scan Metrics Summary ===");
        tracing::info!(
            "Files: {} discovered, {} decoded, {} failed, {} skipped",
            stats.files_discovered,
            stats.files_decoded,
            stats.files_failed,
            stats.files_skipped
        );
        tracing::info!(
            "Decode failures: {} unknown format, {} corrupt payloads; {} extraction timeouts",
            stats.unknown_format,
            stats.corrupt_payloads,
            stats.extraction_timeouts
        );
        tracing::info!(
            "References: {} textures, {} models; SWEPs: {} classified ({} base unresolved)",
            stats.textures_found,
            stats.models_found,
            stats.sweps_classified,
            stats.base_unresolved
        );
        tracing::info!(
            "Archives: {} scanned, {} entries recovered by fallback, {} entries skipped",
            stats.archives_scanned,
            stats.archive_entries_recovered,
            stats.archive_entries_skipped
        );
        tracing::info!(
            "Materials: {} created, {} deleted; elapsed {:.2}s",
            stats.materials_created,
            stats.materials_deleted,
            stats.elapsed_ms as f64 / 1000.0
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ScanMetrics::new();
        assert_eq!(metrics.files_discovered.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.files_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_counters() {
        let metrics = ScanMetrics::new();

        metrics.incr(&metrics.files_discovered);
        metrics.incr(&metrics.files_discovered);
        metrics.incr(&metrics.files_failed);
        metrics.add(&metrics.textures_found, 5);

        assert_eq!(metrics.files_discovered.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.files_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.textures_found.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_snapshot() {
        let metrics = ScanMetrics::new();
        metrics.incr(&metrics.sweps_classified);
        metrics.synthesis_aborted.store(true, Ordering::Relaxed);

        let stats = metrics.snapshot();
        assert_eq!(stats.sweps_classified, 1);
        assert!(stats.synthesis_aborted);
    }
}
