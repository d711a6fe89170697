//! swepscan - standalone SWEP asset-reference scanner
//!
//! Main entry point for the command-line scanner.
//!
//! # Execution Flow
//!
//! 1. Initialize logging → logs/swepscan_<date>.log plus console output
//! 2. Create tokio runtime with 4 worker threads
//! 3. Load `swepscan data/swepscan.yaml` (written with defaults on first run)
//! 4. Apply command-line overrides: `swepscan [scan_root] [report_path]`
//! 5. Run the scan, logging progress events as files complete
//! 6. Write the JSON report and shut the runtime down
//!
//! Material definition files are written under the configured `output_dir`
//! during the scan itself; the report written here is the structured summary
//! (references, SWEP records, gamemode and base-class breakdowns, stats).

use anyhow::{Context, Result};
use swepscan::{APP_NAME, ConfigManager, ScanEvent, ScanOrchestrator, VERSION};
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    let _guard = swepscan::logging::setup_logging("logs", "swepscan", false, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("swepscan-worker")
        .build()?;

    let config_manager = ConfigManager::new("swepscan data")?;
    let mut config = config_manager.load()?;

    let mut args = std::env::args().skip(1);
    if let Some(root) = args.next() {
        config.scan_root = root;
    }
    let report_path = args
        .next()
        .unwrap_or_else(|| "swepscan_report.json".to_string());

    tracing::info!(
        "Scan root: {}, output dir: {}",
        config.scan_root,
        if config.output_dir.is_empty() {
            "<disabled>"
        } else {
            &config.output_dir
        }
    );

    let result = runtime.block_on(async {
        let orchestrator = ScanOrchestrator::new(config);
        let mut events = orchestrator.subscribe();

        let progress = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ScanEvent::Started { files_total }) => {
                        tracing::info!("Scanning {files_total} files");
                    }
                    Ok(ScanEvent::FileCompleted { path, done, total }) => {
                        tracing::debug!("[{done}/{total}] {path}");
                    }
                    Ok(ScanEvent::SynthesisStarted { textures }) => {
                        tracing::info!("Synthesizing materials for {textures} textures");
                    }
                    Ok(ScanEvent::Finished { success, stats }) => {
                        tracing::info!(
                            "Scan finished (success={success}) in {:.2}s",
                            stats.elapsed_ms as f64 / 1000.0
                        );
                        break;
                    }
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Progress subscription lagged, {skipped} events skipped");
                    }
                }
            }
        });

        let result = orchestrator.run_scan().await;
        // Dropping the orchestrator closes the event channel so the progress
        // task also ends when the scan aborted before the terminal event.
        drop(orchestrator);
        let _ = progress.await;
        result
    })?;

    let report = result.to_report();
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize scan report")?;
    std::fs::write(&report_path, json)
        .with_context(|| format!("Failed to write report: {report_path}"))?;
    tracing::info!(
        "Report written to {report_path}: {} SWEPs, {} textures, {} models",
        report.sweps.len(),
        report.texture_references.len(),
        report.model_references.len()
    );

    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    Ok(())
}
