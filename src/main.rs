//! Goti Scanner - QR scan-and-connect for Goti ISP network nodes
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! This binary wires the scan pipeline into a Slint window:
//! - Configuration loading ([`ConfigManager`], `Goti Data/Scanner Settings.yaml` + `GOTI_*` env)
//! - Logging (daily rotating file + optional console output)
//! - Tokio runtime for scan runs and the simulated handshake
//! - [`ScanSession`] over an image-feed camera and the rqrr decoder
//! - [`ScannerController`] bridging the session and the window
//!
//! The main thread runs the Slint event loop; scan runs live on tokio workers
//! and a background thread forwards state changes to the window.

use anyhow::Result;
use goti_scanner::services::{
    CameraConstraints, CaptureController, DecodeLoop, ImageFeedCamera, LogHaptics, PayloadClassifier, QrDecoder,
    ScanSession,
};
use goti_scanner::ui::ScannerController;
use goti_scanner::{APP_NAME, ConfigManager, Metrics, StateManager, VERSION, logging};
use std::sync::Arc;
use std::time::Duration;

const CONFIG_DIR: &str = "Goti Data";

fn main() -> Result<()> {
    let config_manager = Arc::new(ConfigManager::new(CONFIG_DIR)?);
    let config = config_manager.load_scanner_config()?;

    // Held until exit so buffered log lines are flushed
    let log_dir = config_manager.log_dir(&config.logging);
    let _guard = logging::init_logging(&config.logging, &log_dir, "goti-scanner")?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("goti-worker")
        .build()?;

    let metrics = Arc::new(Metrics::new());

    let state_manager = Arc::new(StateManager::new());
    state_manager.load_from_config(&config);

    let settings = &config.scanner;
    let feed_dir = config_manager.resolve(&settings.camera_feed_dir);
    tracing::info!("Camera feed directory: {}", feed_dir);

    let capture = CaptureController::new(
        Arc::new(ImageFeedCamera::new(&feed_dir, settings.camera_torch)),
        CameraConstraints::from_settings(settings),
        Arc::clone(&metrics),
    );
    let decode = DecodeLoop::new(
        Arc::new(QrDecoder),
        PayloadClassifier::from_settings(settings),
        Duration::from_millis(settings.frame_interval_ms),
        Arc::clone(&metrics),
    );
    let session = Arc::new(ScanSession::new(
        Arc::clone(&state_manager),
        capture,
        decode,
        Arc::new(LogHaptics),
        settings,
    ));

    let controller = ScannerController::new(
        Arc::clone(&session),
        Arc::clone(&config_manager),
        config.clone(),
        runtime.handle().clone(),
        Arc::clone(&metrics),
    )?;

    // Blocks until the window is closed
    let result = controller.run();

    tracing::info!("GUI closed, shutting down");
    session.close();
    runtime.shutdown_timeout(Duration::from_secs(2));
    metrics.log_summary();

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
