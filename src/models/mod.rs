//! Data models for the Goti scanner.
//!
//! - [`ScanState`]: the state container behind the scanner screen (status, mode, failure, join info)
//! - [`ScanStatus`]: the user-visible status machine
//! - [`NetworkJoinInfo`]: fields parsed from an accepted payload
//! - [`ScannerConfig`]: settings loaded from `Scanner Settings.yaml`
//!
//! State updates go through [`StateManager`](crate::state::StateManager), which
//! validates status transitions and emits change events.

pub mod config;
pub mod scan_state;

pub use config::{FacingMode, Language, LoggingSettings, ScannerConfig, ScannerSettings, UiSettings};
pub use scan_state::{FailureKind, NetworkJoinInfo, ScanFailure, ScanMode, ScanState, ScanStatus};
