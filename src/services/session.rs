use crate::models::{FailureKind, NetworkJoinInfo, ScanStatus, ScannerSettings};
use crate::services::cancel::CancelToken;
use crate::services::capture::{AcquireMode, CaptureController, CaptureError, CaptureSession};
use crate::services::decode::DecodeLoop;
use crate::state::{StateError, StateManager};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Best-effort haptic feedback
pub trait Haptics: Send + Sync {
    fn vibrate(&self, duration: Duration);
}

/// Haptics for hosts without a vibration motor: the pulse is only logged
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn vibrate(&self, duration: Duration) {
        tracing::info!("Haptic pulse ({}ms)", duration.as_millis());
    }
}

/// Errors that end a scan run
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Camera access denied: {0}")]
    AccessDenied(#[source] CaptureError),

    #[error("No Goti network payload found in the image")]
    DecodeRejected,

    #[error(transparent)]
    State(#[from] StateError),
}

/// How a scan run finished without error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Payload accepted and simulated handshake completed
    Connected(NetworkJoinInfo),
    /// The run was superseded or torn down before finishing
    Cancelled,
}

/// Drives one scanner screen: capture, decode, classify, handshake.
///
/// Each run (`start_camera`, `scan_image`) gets its own [`CancelToken`];
/// starting a new run or calling [`close`](Self::close) cancels the previous
/// one, which stops its decode loop, aborts its handshake timer and keeps it
/// from writing state. The capture device is released on every exit path.
///
/// # Example
/// ```ignore
/// let session = Arc::new(ScanSession::new(state, capture, decode, Arc::new(LogHaptics), &settings));
/// match session.start_camera().await {
///     Ok(ScanOutcome::Connected(info)) => println!("joined {}", info.identifier),
///     Ok(ScanOutcome::Cancelled) => {}
///     Err(e) => tracing::warn!("scan failed: {}", e),
/// }
/// ```
pub struct ScanSession {
    state: Arc<StateManager>,
    capture: Mutex<CaptureController>,
    decode: DecodeLoop,
    haptics: Arc<dyn Haptics>,
    handshake_delay: Duration,
    haptic_pulse: Duration,
    run: Mutex<CancelToken>,
}

impl ScanSession {
    pub fn new(
        state: Arc<StateManager>,
        capture: CaptureController,
        decode: DecodeLoop,
        haptics: Arc<dyn Haptics>,
        settings: &ScannerSettings,
    ) -> Self {
        Self {
            state,
            capture: Mutex::new(capture),
            decode,
            haptics,
            handshake_delay: Duration::from_millis(settings.handshake_delay_ms),
            haptic_pulse: Duration::from_millis(settings.haptic_pulse_ms),
            run: Mutex::new(CancelToken::new()),
        }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn decode_loop(&self) -> &DecodeLoop {
        &self.decode
    }

    /// Whether a capture session currently holds a device or image
    pub fn is_capturing(&self) -> bool {
        self.capture.lock().unwrap().is_active()
    }

    /// Open the camera and scan until a payload is accepted.
    ///
    /// Also serves as the retry action from the access-denied panel.
    ///
    /// # Errors
    /// - [`ScanError::AccessDenied`] if the camera cannot be opened; state is `Error`
    /// - [`ScanError::State`] if the status machine refused a transition
    pub async fn start_camera(&self) -> Result<ScanOutcome, ScanError> {
        let token = self.begin_run();
        if !self.step(&token, StateManager::begin_camera_request)? {
            return Ok(ScanOutcome::Cancelled);
        }

        let opened = self
            .open_capture(AcquireMode::Camera, &token, |capture, session| {
                capture.install(session).illumination_supported()
            })
            .await;
        let illumination_supported = match opened {
            Ok(Some(supported)) => supported,
            Ok(None) => return Ok(ScanOutcome::Cancelled),
            Err(e) => {
                if !self.step(&token, |state| state.fail(FailureKind::AccessDenied))? {
                    return Ok(ScanOutcome::Cancelled);
                }
                return Err(ScanError::AccessDenied(e));
            }
        };

        if !self.step(&token, |state| state.camera_ready(illumination_supported))? {
            return Ok(ScanOutcome::Cancelled);
        }

        let Some(info) = self.decode.run(&self.capture, &token).await else {
            return Ok(ScanOutcome::Cancelled);
        };

        // Sampling is over; the camera is not needed for the handshake
        if self.with_current(&token, || self.release_capture()).is_none() {
            tracing::debug!("Payload from a superseded camera run discarded");
            return Ok(ScanOutcome::Cancelled);
        }
        self.connect(info, &token).await
    }

    /// Decode a single user-selected image.
    ///
    /// # Errors
    /// - [`ScanError::DecodeRejected`] if the image is unreadable, holds no code
    ///   or the code is not a network-join payload; state is `Error`
    pub async fn scan_image(&self, bytes: Vec<u8>) -> Result<ScanOutcome, ScanError> {
        let token = self.begin_run();
        if !self.step(&token, StateManager::begin_image_scan)? {
            return Ok(ScanOutcome::Cancelled);
        }

        let opened = self
            .open_capture(AcquireMode::Image(bytes), &token, |capture, session| {
                capture.install(session);
                let frame = capture.next_frame();
                capture.release();
                frame
            })
            .await;
        let frame = match opened {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(ScanOutcome::Cancelled),
            Err(e) => {
                tracing::warn!("Selected file is not a readable image: {}", e);
                None
            }
        };

        let info = match frame {
            Some(frame) => self.decode.decode_blocking(frame).await,
            None => None,
        };

        match info {
            Some(info) => self.connect(info, &token).await,
            None => {
                if !self.step(&token, |state| state.fail(FailureKind::DecodeRejected))? {
                    return Ok(ScanOutcome::Cancelled);
                }
                Err(ScanError::DecodeRejected)
            }
        }
    }

    /// Flip the flashlight of the active camera; unsupported devices are ignored
    pub fn toggle_illumination(&self) -> Option<bool> {
        let toggled = self.capture.lock().unwrap().toggle_illumination();
        if let Some(on) = toggled {
            self.state.set_illumination(true, on);
        }
        toggled
    }

    /// Cancel the current run, release the device and return to mode selection.
    ///
    /// Used for "Re-Scan", "Dismiss" and window teardown alike.
    pub fn close(&self) {
        self.end_run();
        self.state.reset();
        tracing::info!("Scan session closed");
    }

    /// Move to `Connecting`, wait out the simulated handshake, then `Success`
    async fn connect(&self, info: NetworkJoinInfo, token: &CancelToken) -> Result<ScanOutcome, ScanError> {
        let join_info = info.clone();
        if !self.step(token, move |state| state.begin_connecting(join_info))? {
            return Ok(ScanOutcome::Cancelled);
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!("Handshake with {} cancelled", info.identifier);
                return Ok(ScanOutcome::Cancelled);
            }
            _ = tokio::time::sleep(self.handshake_delay) => {}
        }

        if !self.step(token, StateManager::complete)? {
            return Ok(ScanOutcome::Cancelled);
        }
        self.haptics.vibrate(self.haptic_pulse);
        tracing::info!("Network node {} authorized", info.identifier);

        Ok(ScanOutcome::Connected(info))
    }

    /// Cancel the previous run and hand out a fresh token
    fn begin_run(&self) -> CancelToken {
        let mut run = self.run.lock().unwrap();
        run.cancel();
        *run = CancelToken::new();
        self.release_capture();
        run.clone()
    }

    fn end_run(&self) {
        let run = self.run.lock().unwrap();
        run.cancel();
        self.release_capture();
    }

    /// Run `f` only while `token` belongs to the current run.
    ///
    /// Holds the run lock for the duration of `f`, so a concurrent
    /// `begin_run`/`close` either happens before (and `f` is skipped) or
    /// waits until `f` is done. `f` must not take the run lock.
    fn with_current<R>(&self, token: &CancelToken, f: impl FnOnce() -> R) -> Option<R> {
        let _run = self.run.lock().unwrap();
        (!token.is_cancelled()).then(f)
    }

    /// Apply a state step for the run owning `token`; `false` if it was superseded
    fn step<T>(
        &self,
        token: &CancelToken,
        f: impl FnOnce(&StateManager) -> Result<T, StateError>,
    ) -> Result<bool, ScanError> {
        match self.with_current(token, || f(&self.state)) {
            Some(result) => {
                result?;
                Ok(true)
            }
            None => {
                tracing::debug!("Superseded scan run skipped a state update");
                Ok(false)
            }
        }
    }

    /// Open a capture session on the blocking pool, then hand it to `install`
    /// if `token` is still current.
    ///
    /// The controller lock is not held while the device opens. A session
    /// opened for a superseded run is dropped, which stops its track.
    async fn open_capture<R>(
        &self,
        mode: AcquireMode,
        token: &CancelToken,
        install: impl FnOnce(&mut CaptureController, CaptureSession) -> R,
    ) -> Result<Option<R>, CaptureError> {
        let opener = self.capture.lock().unwrap().opener();
        let session = tokio::task::spawn_blocking(move || opener.open(mode))
            .await
            .map_err(|e| CaptureError::TaskFailed(e.to_string()))??;

        Ok(self.with_current(token, || install(&mut *self.capture.lock().unwrap(), session)))
    }

    fn release_capture(&self) {
        self.capture.lock().unwrap().release();
    }

    /// Current status, for callers that only hold the session
    pub fn status(&self) -> ScanStatus {
        self.state.read(|s| s.status)
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if let Ok(run) = self.run.lock() {
            run.cancel();
        }
        if let Ok(mut capture) = self.capture.lock() {
            capture.release();
        }
    }
}
