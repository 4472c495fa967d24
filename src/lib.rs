// Goti Scanner - QR scan-and-connect flow for the Goti ISP
//
// This is the library crate containing the scan pipeline, status machine and configuration.
// The binary crate (main.rs) provides the GUI entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{Language, NetworkJoinInfo, ScanMode, ScanState, ScanStatus, ScannerConfig};
pub use state::{StateChange, StateError, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
