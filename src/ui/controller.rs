// Scanner Controller - Bridges the Slint scanner window with the scan session
//
// This module contains the ScannerController which coordinates between:
// - Slint UI (ScannerWindow)
// - ScanSession (capture, decode, handshake)
// - StateManager (status machine, change events)
// - UiBridge (async/GUI coordination)

use crate::config::ConfigManager;
use crate::metrics::Metrics;
use crate::models::{Language, ScanState, ScannerConfig};
use crate::services::{Frame, ScanError, ScanOutcome, ScanSession};
use crate::state::{StateChange, StateManager};
use crate::ui::bridge::UiBridge;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use slint::{Rgba8Pixel, SharedPixelBuffer};
use std::fs;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast::{self, error::RecvError};

// Include the generated Slint code
slint::include_modules!();

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Identifier shown on the success panel if the payload carried none
const FALLBACK_NODE_NAME: &str = "GOTI_CORE_NODE";

/// GUI controller for the scanner window
///
/// - Wires Slint callbacks to [`ScanSession`] runs on the tokio runtime
/// - Mirrors [`StateChange`] events into window properties
/// - Streams decimated camera frames into the preview image
/// - Opens the native image picker using the `rfd` crate
///
/// # Example
/// ```ignore
/// let controller = ScannerController::new(
///     session,
///     config_manager,
///     config,
///     runtime.handle().clone(),
///     metrics,
/// )?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct ScannerController {
    ui: ScannerWindow,
    session: Arc<ScanSession>,
}

impl ScannerController {
    /// Create the window and wire it to `session`
    ///
    /// # Arguments
    /// * `session` - Scan session driving the status machine
    /// * `config_manager` - Used to persist the language preference
    /// * `config` - Configuration the session was built from
    /// * `tokio_handle` - Runtime that scan runs are spawned on
    /// * `metrics` - Counters for dropped UI updates
    pub fn new(
        session: Arc<ScanSession>,
        config_manager: Arc<ConfigManager>,
        config: ScannerConfig,
        tokio_handle: tokio::runtime::Handle,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let ui = ScannerWindow::new().context("Failed to create Slint UI")?;
        let bridge = UiBridge::new(&ui, tokio_handle, metrics);

        Self::apply_state(&ui, &session.state().snapshot());

        let preview_every = config.scanner.preview_every;
        let config = Arc::new(Mutex::new(config));
        Self::setup_callbacks(&ui, &bridge, &session, config_manager, config);
        Self::setup_preview(&bridge, &session, preview_every);
        Self::setup_state_subscription(&bridge, &session);

        tracing::info!("Scanner controller initialized");

        Ok(Self { ui, session })
    }

    /// Run the GUI (blocks until window is closed)
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        let result = self.ui.run();
        self.session.close();
        result
    }

    /// Copy a state snapshot into the window properties
    fn apply_state(ui: &ScannerWindow, state: &ScanState) {
        ui.set_status(state.status.as_str().into());
        ui.set_mode(state.mode.as_str().into());
        ui.set_error_message(
            state
                .failure
                .as_ref()
                .map(|f| f.message.clone())
                .unwrap_or_default()
                .into(),
        );
        ui.set_network_name(
            state
                .join_info
                .as_ref()
                .map(|info| info.identifier.as_str())
                .filter(|id| !id.is_empty())
                .unwrap_or(FALLBACK_NODE_NAME)
                .into(),
        );
        ui.set_has_flash(state.illumination_supported);
        ui.set_flash_on(state.illumination_on);
        ui.set_language_en(state.language == Language::En);
    }

    fn setup_callbacks(
        ui: &ScannerWindow,
        bridge: &UiBridge<ScannerWindow>,
        session: &Arc<ScanSession>,
        config_manager: Arc<ConfigManager>,
        config: Arc<Mutex<ScannerConfig>>,
    ) {
        // Start camera / retry camera
        let start = {
            let bridge = bridge.clone();
            let session = Arc::clone(session);
            move || {
                let session = Arc::clone(&session);
                bridge.spawn(async move {
                    Self::log_outcome("camera", session.start_camera().await);
                });
            }
        };
        ui.on_start_camera(start.clone());
        ui.on_retry_camera(start);

        // Pick image
        {
            let bridge = bridge.clone();
            let session = Arc::clone(session);
            ui.on_pick_image(move || {
                let Some(path) = Self::show_image_picker() else {
                    tracing::debug!("Image picker cancelled");
                    return;
                };

                let bytes = match fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!("Failed to read {}: {}", path, e);
                        return;
                    }
                };

                tracing::info!("Scanning image {} ({} bytes)", path, bytes.len());
                let session = Arc::clone(&session);
                bridge.spawn(async move {
                    Self::log_outcome("image", session.scan_image(bytes).await);
                });
            });
        }

        // Flashlight
        {
            let session = Arc::clone(session);
            ui.on_toggle_flash(move || {
                session.toggle_illumination();
            });
        }

        // Re-Scan: back to mode selection
        {
            let session = Arc::clone(session);
            ui.on_rescan(move || session.close());
        }

        // Dismiss: tear down and close the window
        {
            let session = Arc::clone(session);
            let ui_weak = ui.as_weak();
            ui.on_dismiss(move || {
                session.close();
                if let Some(ui) = ui_weak.upgrade()
                    && let Err(e) = ui.hide()
                {
                    tracing::error!("Failed to hide scanner window: {}", e);
                }
            });
        }

        // Language
        {
            let session = Arc::clone(session);
            ui.on_toggle_language(move || {
                let language = session.state().read(|s| s.language).toggled();
                session.state().set_language(language);

                let mut config = config.lock().unwrap();
                config.ui.language = language;
                if let Err(e) = config_manager.save_scanner_config(&config) {
                    tracing::warn!("Failed to persist language preference: {}", e);
                }
            });
        }

        {
            let session = Arc::clone(session);
            ui.window().on_close_requested(move || {
                tracing::info!("Close requested - releasing capture");
                session.close();
                slint::CloseRequestResponse::HideWindow
            });
        }

        tracing::debug!("UI callbacks configured");
    }

    /// Push every `every`-th sampled camera frame into the preview image
    fn setup_preview(bridge: &UiBridge<ScannerWindow>, session: &ScanSession, every: u32) {
        let bridge = bridge.clone();
        session.decode_loop().set_preview(
            every,
            Arc::new(move |frame: &Frame| {
                let buffer =
                    SharedPixelBuffer::<Rgba8Pixel>::clone_from_slice(frame.rgba(), frame.width(), frame.height());
                bridge.update_ui(move |ui| ui.set_preview(slint::Image::from_rgba8(buffer)));
            }),
        );
    }

    /// Mirror state changes into the window.
    ///
    /// Runs on a background thread; each event re-renders from a fresh snapshot
    /// so lagged or coalesced events cannot leave the window stale. The thread
    /// holds the state weakly and exits once the event loop has stopped or the
    /// state manager is dropped.
    fn setup_state_subscription(bridge: &UiBridge<ScannerWindow>, session: &Arc<ScanSession>) {
        let bridge = bridge.clone();
        let state = Arc::downgrade(session.state());
        let rx = session.state().subscribe();

        std::thread::spawn(move || {
            tracing::debug!("State subscription thread started");
            forward_state_changes(rx, &state, |snapshot| {
                bridge.update_ui(move |ui| Self::apply_state(ui, &snapshot))
            });
            tracing::debug!("State subscription thread stopped");
        });
    }

    fn log_outcome(source: &str, outcome: Result<ScanOutcome, ScanError>) {
        match outcome {
            Ok(ScanOutcome::Connected(info)) => {
                tracing::info!("{} scan connected to {}", source, info.identifier);
            }
            Ok(ScanOutcome::Cancelled) => tracing::debug!("{} scan cancelled", source),
            Err(e) => tracing::warn!("{} scan failed: {}", source, e),
        }
    }

    /// Show a native image picker
    ///
    /// # Returns
    /// The selected file path, or None if cancelled
    fn show_image_picker() -> Option<Utf8PathBuf> {
        rfd::FileDialog::new()
            .set_title("Select QR Code Image")
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file()
            .and_then(|path| {
                Utf8PathBuf::try_from(path)
                    .map_err(|e| {
                        tracing::error!("Failed to convert path to UTF-8: {}", e);
                        e
                    })
                    .ok()
            })
    }
}

/// Deliver a fresh snapshot to `deliver` for every received change.
///
/// Returns when the channel closes, the state manager is gone, or `deliver`
/// reports that nobody is listening any more.
fn forward_state_changes<F>(mut rx: broadcast::Receiver<StateChange>, state: &Weak<StateManager>, mut deliver: F)
where
    F: FnMut(ScanState) -> bool,
{
    loop {
        match rx.blocking_recv() {
            Ok(change) => {
                tracing::trace!("State change received: {:?}", change);
                if let StateChange::JoinInfoReady { identifier } = &change {
                    tracing::debug!("Showing handshake for {}", identifier);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("State subscription lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }

        let Some(state) = state.upgrade() else {
            break;
        };
        if !deliver(state.snapshot()) {
            break;
        }
    }
}
