//! Scan orchestration.
//!
//! Discovers scan roots, enumerates candidate files (loose files and GMA
//! archive entries), fans them out to a bounded blocking worker pool, and
//! folds the completed results into the aggregate in enumeration order.
//! Progress is published over a broadcast channel; cancellation is a flag
//! polled between dispatches, so in-flight work always finishes at its own
//! bounded checkpoints. A failure on one file is recorded in the metrics
//! and never aborts the scan.

use crate::metrics::ScanMetrics;
use crate::models::{
    ModuleStats, Reference, ReferenceKind, RootKind, RootOrigin, ScanConfig, ScanResult, ScanRoot,
    SwepRecord,
};
use crate::services::{
    ArchiveReader, CacheDecoder, MaterialSynthesizer, ReferenceExtractor, ScanError,
    SwepClassifier, extractor,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;

/// Cache and script locations probed under the configured install root.
const ROOT_SUBDIRS: &[&str] = &[
    "garrysmod/cache",
    "garrysmod/cache/workshop",
    "garrysmod/cache/lua",
    "garrysmod/lua/weapons",
    "garrysmod/addons",
];

/// Extensions that never carry script content or asset paths.
const JUNK_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tga", "wav", "mp3", "ogg", "ttf", "vtf", "txt", "md",
    "json", "cfg", "db", "bsp",
];

const MAX_WALK_DEPTH: usize = 16;
const EVENT_BUFFER: usize = 256;

/// Progress notifications published while a scan runs.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Enumeration finished; workers are starting.
    Started { files_total: usize },
    /// One file's pipeline completed (successfully or not).
    FileCompleted {
        path: String,
        done: usize,
        total: usize,
    },
    /// All files folded; material synthesis is starting.
    SynthesisStarted { textures: usize },
    /// Always the last event, even on cancellation or synthesis abort.
    Finished { success: bool, stats: ModuleStats },
}

/// One unit of work for the pool.
enum Candidate {
    Loose(Utf8PathBuf),
    ArchiveEntry {
        archive: Arc<ArchiveReader>,
        entry: String,
    },
}

impl Candidate {
    /// Origin description carried into references and SWEP records.
    fn source(&self) -> String {
        match self {
            Candidate::Loose(path) => path.to_string(),
            Candidate::ArchiveEntry { archive, entry } => {
                format!("{}:{}", archive.path(), entry)
            }
        }
    }
}

/// Everything one worker produced for one file.
struct FileOutcome {
    /// Position in the enumeration order; the aggregate folds by this, not
    /// by completion order, so worker scheduling never changes the output.
    index: usize,
    source: String,
    references: Vec<Reference>,
    records: Vec<SwepRecord>,
    timed_out: bool,
    error: Option<ScanError>,
}

pub struct ScanOrchestrator {
    config: ScanConfig,
    metrics: Arc<ScanMetrics>,
    event_tx: broadcast::Sender<ScanEvent>,
    cancelled: Arc<AtomicBool>,
}

impl ScanOrchestrator {
    pub fn new(config: ScanConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            config,
            metrics: Arc::new(ScanMetrics::new()),
            event_tx,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to progress events for this scan.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.event_tx.subscribe()
    }

    /// Request cooperative cancellation. Dispatching stops at the next
    /// check; work already in flight finishes and is folded in.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        tracing::info!("Scan cancellation requested");
    }

    pub fn metrics(&self) -> Arc<ScanMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run the full pipeline: discover, decode, extract, classify,
    /// synthesize.
    ///
    /// The only hard error is an invalid configuration, checked before any
    /// work starts. Everything downstream is recorded per file; an
    /// inaccessible output directory aborts the synthesis write-out only
    /// and the gathered results are still returned.
    pub async fn run_scan(&self) -> Result<ScanResult, ScanError> {
        self.config
            .validate()
            .map_err(ScanError::ConfigurationInvalid)?;

        let roots = self.discover_roots();
        let candidates = self.enumerate(&roots);
        let total = candidates.len();
        self.metrics.add(&self.metrics.files_discovered, total as u64);
        tracing::info!(
            "Scanning {} candidate files across {} roots",
            total,
            roots.len()
        );
        let _ = self.event_tx.send(ScanEvent::Started { files_total: total });

        let workers = if self.config.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.config.worker_threads
        };
        let semaphore = Arc::new(Semaphore::new(workers));
        let decoder = Arc::new(CacheDecoder::new(self.config.max_decompressed_bytes));
        let extractor = self
            .config
            .extraction_enabled
            .then(|| Arc::new(ReferenceExtractor::new(self.config.pattern_budget_ms)));
        let classifier = self
            .config
            .classification_enabled
            .then(|| Arc::new(SwepClassifier::new()));

        let mut join_set: JoinSet<FileOutcome> = JoinSet::new();
        let mut completed: Vec<FileOutcome> = Vec::new();
        let mut done = 0usize;

        let mut pending = candidates.into_iter().enumerate();
        loop {
            // Dispatch until the pool is saturated or we run dry.
            while join_set.len() < workers {
                if self.cancelled.load(Ordering::Relaxed) {
                    break;
                }
                let Some((index, candidate)) = pending.next() else {
                    break;
                };
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let decoder = Arc::clone(&decoder);
                let extractor = extractor.clone();
                let classifier = classifier.clone();
                join_set.spawn(async move {
                    let outcome = tokio::task::spawn_blocking(move || {
                        process_candidate(
                            index,
                            &candidate,
                            &decoder,
                            extractor.as_deref(),
                            classifier.as_deref(),
                        )
                    })
                    .await
                    .unwrap_or_else(|e| FileOutcome {
                        index,
                        source: "<worker>".to_string(),
                        references: Vec::new(),
                        records: Vec::new(),
                        timed_out: false,
                        error: Some(ScanError::Io(std::io::Error::other(e))),
                    });
                    drop(permit);
                    outcome
                });
            }

            // Record exactly one completed worker at a time. Aggregation
            // happens after the pool drains, in enumeration order, so the
            // result never depends on which worker finished first.
            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let Ok(outcome) = joined else {
                self.metrics.incr(&self.metrics.files_failed);
                continue;
            };
            done += 1;
            self.record_outcome(&outcome, done, total);
            completed.push(outcome);
        }

        completed.sort_unstable_by_key(|o| o.index);
        let mut references: IndexMap<(String, ReferenceKind), Reference> = IndexMap::new();
        let mut records: Vec<SwepRecord> = Vec::new();
        for outcome in completed {
            // First discovery in enumeration order wins; a later owned
            // discovery backfills the owner of an unowned first one.
            for reference in outcome.references {
                match references.entry(reference.dedup_key()) {
                    indexmap::map::Entry::Occupied(mut slot) => {
                        if slot.get().owner.is_none() && reference.owner.is_some() {
                            slot.get_mut().owner = reference.owner;
                        }
                    }
                    indexmap::map::Entry::Vacant(slot) => {
                        slot.insert(reference);
                    }
                }
            }
            records.extend(outcome.records);
        }

        SwepClassifier::resolve_base_chains(&mut records);
        let mut unresolved = 0usize;
        for record in records.iter().filter(|r| r.base_unresolved) {
            unresolved += 1;
            tracing::debug!(
                "{}",
                ScanError::ClassificationUnresolved(record.class_name.clone())
            );
        }
        self.metrics
            .add(&self.metrics.sweps_classified, records.len() as u64);
        self.metrics
            .add(&self.metrics.base_unresolved, unresolved as u64);

        let references: Vec<Reference> = references.into_values().collect();
        let textures = references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Texture)
            .count();
        self.metrics
            .add(&self.metrics.textures_found, textures as u64);
        self.metrics.add(
            &self.metrics.models_found,
            (references.len() - textures) as u64,
        );

        let _ = self
            .event_tx
            .send(ScanEvent::SynthesisStarted { textures });
        let synthesizer = MaterialSynthesizer::new(&self.config);
        let material_actions = synthesizer.synthesize(&references, &records);

        if !self.config.output_dir.trim().is_empty() {
            let output_dir = Utf8PathBuf::from(&self.config.output_dir);
            match synthesizer.write_actions(&material_actions, &output_dir) {
                Ok((created, deleted)) => {
                    self.metrics.add(&self.metrics.materials_created, created);
                    self.metrics.add(&self.metrics.materials_deleted, deleted);
                }
                Err(e) => {
                    tracing::error!("Material write-out aborted: {e}");
                    self.metrics
                        .synthesis_aborted
                        .store(true, Ordering::Relaxed);
                }
            }
        }

        let stats = self.metrics.snapshot();
        let success = !stats.synthesis_aborted;
        let _ = self.event_tx.send(ScanEvent::Finished {
            success,
            stats: stats.clone(),
        });
        self.metrics.log_summary();

        Ok(ScanResult {
            references,
            swep_records: records,
            material_actions,
            stats,
        })
    }

    /// Metrics and progress for one completed file. Runs at completion
    /// time; the reference and record aggregation happens later in
    /// enumeration order.
    fn record_outcome(&self, outcome: &FileOutcome, done: usize, total: usize) {
        match &outcome.error {
            None => self.metrics.incr(&self.metrics.files_decoded),
            Some(ScanError::UnknownFormat) => {
                self.metrics.incr(&self.metrics.unknown_format);
                self.metrics.incr(&self.metrics.files_failed);
                tracing::debug!("Unrecognized format: {}", outcome.source);
            }
            Some(ScanError::CorruptPayload(reason)) => {
                self.metrics.incr(&self.metrics.corrupt_payloads);
                self.metrics.incr(&self.metrics.files_failed);
                tracing::warn!("Corrupt payload in {}: {reason}", outcome.source);
            }
            Some(e) => {
                self.metrics.incr(&self.metrics.files_failed);
                tracing::warn!("Failed to process {}: {e}", outcome.source);
            }
        }
        if outcome.timed_out {
            self.metrics.incr(&self.metrics.extraction_timeouts);
            tracing::warn!(
                "{} ({})",
                ScanError::ExtractionTimeout,
                outcome.source
            );
        }

        let _ = self.event_tx.send(ScanEvent::FileCompleted {
            path: outcome.source.clone(),
            done,
            total,
        });
    }

    /// Resolve the configured root into concrete scan roots.
    ///
    /// A `.gma` root is scanned as an archive. A directory root is narrowed
    /// to the known cache and script locations underneath it when any exist;
    /// otherwise the directory itself is walked.
    fn discover_roots(&self) -> Vec<ScanRoot> {
        let root = Utf8PathBuf::from(self.config.scan_root.trim());
        if root.is_file() {
            return vec![ScanRoot {
                path: root,
                kind: RootKind::Archive,
                origin: RootOrigin::Explicit,
            }];
        }
        if !root.is_dir() {
            tracing::warn!("Scan root {root} does not exist");
            return Vec::new();
        }

        let mut fallbacks: Vec<ScanRoot> = Vec::new();
        for sub in ROOT_SUBDIRS {
            let path = root.join(sub);
            if !path.is_dir() {
                continue;
            }
            // A location nested under an already-selected root would be
            // walked twice.
            if fallbacks.iter().any(|r| path.starts_with(&r.path)) {
                continue;
            }
            fallbacks.push(ScanRoot {
                path,
                kind: RootKind::Directory,
                origin: RootOrigin::Fallback,
            });
        }
        if fallbacks.is_empty() {
            vec![ScanRoot {
                path: root,
                kind: RootKind::Directory,
                origin: RootOrigin::Explicit,
            }]
        } else {
            fallbacks
        }
    }

    fn enumerate(&self, roots: &[ScanRoot]) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for root in roots {
            tracing::debug!("Enumerating {} ({:?})", root.path, root.origin);
            match root.kind {
                RootKind::Directory => self.walk_dir(&root.path, 0, &mut candidates),
                RootKind::Archive => self.enumerate_archive(&root.path, &mut candidates),
            }
        }
        candidates
    }

    fn walk_dir(&self, dir: &Utf8Path, depth: usize, candidates: &mut Vec<Candidate>) {
        if depth > MAX_WALK_DEPTH {
            tracing::warn!("Walk depth bound hit under {dir}");
            return;
        }
        let entries = match dir.read_dir_utf8() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot read directory {dir}: {e}");
                return;
            }
        };

        // Directory order is filesystem-dependent; sorting keeps the
        // enumeration (and therefore discovery order) stable across runs.
        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in &entries {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                self.walk_dir(path, depth + 1, candidates);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("gma"))
            {
                self.enumerate_archive(path, candidates);
                continue;
            }
            if is_junk(path.as_str()) {
                self.metrics.incr(&self.metrics.files_skipped);
                continue;
            }
            match fs::metadata(path) {
                Ok(meta) if meta.len() > 0 && meta.len() <= self.config.max_file_bytes => {
                    candidates.push(Candidate::Loose(path.to_path_buf()));
                }
                Ok(_) => self.metrics.incr(&self.metrics.files_skipped),
                Err(e) => {
                    tracing::warn!("Cannot stat {path}: {e}");
                    self.metrics.incr(&self.metrics.files_failed);
                }
            }
        }
    }

    fn enumerate_archive(&self, path: &Utf8Path, candidates: &mut Vec<Candidate>) {
        match ArchiveReader::open(path) {
            Ok(archive) => {
                self.metrics.incr(&self.metrics.archives_scanned);
                if archive.recovered_via_fallback() {
                    self.metrics.add(
                        &self.metrics.archive_entries_recovered,
                        archive.list_entries().count() as u64,
                    );
                }
                self.metrics.add(
                    &self.metrics.archive_entries_skipped,
                    archive.skipped_entries(),
                );

                let archive = Arc::new(archive);
                for descriptor in archive.list_entries() {
                    if is_junk(&descriptor.name) {
                        self.metrics.incr(&self.metrics.files_skipped);
                        continue;
                    }
                    if descriptor.size == 0 || descriptor.size > self.config.max_file_bytes {
                        self.metrics.incr(&self.metrics.files_skipped);
                        continue;
                    }
                    candidates.push(Candidate::ArchiveEntry {
                        archive: Arc::clone(&archive),
                        entry: descriptor.name,
                    });
                }
            }
            Err(e) => {
                tracing::warn!("Cannot open archive {path}: {e}");
                self.metrics.incr(&self.metrics.files_failed);
            }
        }
    }
}

fn is_junk(name: &str) -> bool {
    let lower = name.to_lowercase();
    JUNK_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// Per-file pipeline: read, decode, extract, classify.
///
/// Runs on the blocking pool. Never panics on bad input; the outcome
/// carries the error for the aggregator to record.
fn process_candidate(
    index: usize,
    candidate: &Candidate,
    decoder: &CacheDecoder,
    extractor: Option<&ReferenceExtractor>,
    classifier: Option<&SwepClassifier>,
) -> FileOutcome {
    let source = candidate.source();
    let mut outcome = FileOutcome {
        index,
        source: source.clone(),
        references: Vec::new(),
        records: Vec::new(),
        timed_out: false,
        error: None,
    };

    let bytes = match candidate {
        Candidate::Loose(path) => match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                outcome.error = Some(ScanError::Io(e));
                return outcome;
            }
        },
        Candidate::ArchiveEntry { archive, entry } => match archive.read_entry(entry) {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                outcome.error = Some(e);
                return outcome;
            }
        },
    };

    let decoded = match decoder.decode(&bytes) {
        Ok(decoded) => decoded,
        Err(e) => {
            outcome.error = Some(e);
            return outcome;
        }
    };

    if let Some(extractor) = extractor {
        let extracted = extractor.extract(&decoded.text);
        outcome.timed_out = extracted.timed_out;
        outcome.references = extracted
            .references
            .into_iter()
            .map(|raw| Reference {
                raw: raw.raw,
                path: raw.path,
                kind: raw.kind,
                source: source.clone(),
                owner: None,
            })
            .collect();
    }

    if let Some(classifier) = classifier {
        outcome.records = classifier.classify(&decoded.text, &source);
        attribute_record_assets(&mut outcome);
    }

    outcome
}

/// Feed model and material fields from classified records back into the
/// reference set, attributed to their owning class.
fn attribute_record_assets(outcome: &mut FileOutcome) {
    let mut owned: Vec<(String, ReferenceKind, String)> = Vec::new();
    for record in &outcome.records {
        for model in [&record.view_model, &record.world_model].into_iter().flatten() {
            owned.push((model.clone(), ReferenceKind::Model, record.class_name.clone()));
        }
        for material in &record.materials {
            owned.push((
                material.clone(),
                ReferenceKind::Texture,
                record.class_name.clone(),
            ));
        }
    }

    for (raw, kind, class_name) in owned {
        let Some(path) = extractor::normalize(&raw) else {
            continue;
        };
        match outcome
            .references
            .iter_mut()
            .find(|r| r.path == path && r.kind == kind)
        {
            Some(existing) => {
                if existing.owner.is_none() {
                    existing.owner = Some(class_name);
                }
            }
            None => outcome.references.push(Reference {
                raw,
                path,
                kind,
                source: outcome.source.clone(),
                owner: Some(class_name),
            }),
        }
    }
}
