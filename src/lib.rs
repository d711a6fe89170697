// swepscan - SWEP asset-reference scanner for Garry's Mod installations
//
// This is the library crate containing the scan pipeline and data structures.
// The binary crate (main.rs) provides the standalone analysis entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::ScanMetrics;
pub use models::{ScanConfig, ScanReport, ScanResult};
pub use services::{ScanError, ScanEvent, ScanOrchestrator};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
