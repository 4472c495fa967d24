use crate::metrics::Metrics;
use crate::models::{FacingMode, ScannerSettings};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An RGBA8 pixel buffer sampled from a capture session
///
/// The buffer always holds exactly `width * height * 4` bytes; [`Frame::new`]
/// and [`Frame::from_image_bytes`] are the only constructors.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl Frame {
    /// Wrap an RGBA8 buffer, checking its length against the dimensions.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(CaptureError::InvalidFrame {
                width,
                height,
                len: rgba.len(),
            });
        }
        Ok(Self { width, height, rgba })
    }

    /// Decode a still image (PNG, JPEG, ...) from raw bytes
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, CaptureError> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            rgba: image.into_raw(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Grayscale plane, Y = (76*R + 150*G + 29*B) >> 8, alpha ignored
    pub fn luma(&self) -> Vec<u8> {
        self.rgba
            .chunks_exact(4)
            .map(|px| ((76 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32) >> 8) as u8)
            .collect()
    }
}

/// Errors raised while acquiring or driving a capture device
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("No camera device available: {0}")]
    NoDevice(String),

    #[error("Flashlight is not supported by this device")]
    IlluminationUnsupported,

    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Frame buffer of {len} bytes does not match {width}x{height} RGBA")]
    InvalidFrame { width: u32, height: u32, len: usize },

    #[error("Capture worker failed: {0}")]
    TaskFailed(String),
}

impl CaptureError {
    /// Whether this error means the camera cannot be used at all
    pub fn is_access_denied(&self) -> bool {
        matches!(self, CaptureError::PermissionDenied(_) | CaptureError::NoDevice(_))
    }
}

/// Constraints passed to the camera when requesting a stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

impl CameraConstraints {
    pub fn from_settings(settings: &ScannerSettings) -> Self {
        Self {
            facing: settings.facing_mode,
            ideal_width: settings.ideal_width,
            ideal_height: settings.ideal_height,
        }
    }
}

/// Device camera permission API
///
/// `open` either grants a live [`VideoTrack`] or reports why access failed.
#[cfg_attr(test, mockall::automock)]
pub trait CameraDevice: Send + Sync {
    fn open(&self, constraints: &CameraConstraints) -> Result<Box<dyn VideoTrack>, CaptureError>;
}

/// A live video track obtained from a [`CameraDevice`]
#[cfg_attr(test, mockall::automock)]
pub trait VideoTrack: Send {
    fn label(&self) -> String;

    /// True once the track can deliver frames
    fn is_ready(&self) -> bool;

    /// Current frame, or `None` if nothing is available yet
    fn read_frame(&mut self) -> Option<Frame>;

    fn supports_torch(&self) -> bool;

    fn set_torch(&mut self, on: bool) -> Result<(), CaptureError>;

    /// Stop the underlying device; frames are no longer delivered afterwards
    fn stop(&mut self);
}

enum Source {
    Camera(Box<dyn VideoTrack>),
    Still(Frame),
}

/// One acquisition of a device resource.
///
/// Holds either a live camera track or a decoded still image. [`close`](Self::close)
/// stops the track; it runs again on drop, so every exit path releases the device.
pub struct CaptureSession {
    source: Source,
    illumination_supported: bool,
    illumination_on: bool,
    active: bool,
    metrics: Arc<Metrics>,
}

impl CaptureSession {
    fn camera(track: Box<dyn VideoTrack>, metrics: Arc<Metrics>) -> Self {
        let illumination_supported = track.supports_torch();
        metrics.record_session_acquired();
        Self {
            source: Source::Camera(track),
            illumination_supported,
            illumination_on: false,
            active: true,
            metrics,
        }
    }

    fn still(frame: Frame, metrics: Arc<Metrics>) -> Self {
        metrics.record_session_acquired();
        Self {
            source: Source::Still(frame),
            illumination_supported: false,
            illumination_on: false,
            active: true,
            metrics,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_camera(&self) -> bool {
        matches!(self.source, Source::Camera(_))
    }

    pub fn illumination_supported(&self) -> bool {
        self.illumination_supported
    }

    pub fn illumination_on(&self) -> bool {
        self.illumination_on
    }

    /// Current frame of the session, `None` once closed or while the track warms up
    pub fn next_frame(&mut self) -> Option<Frame> {
        if !self.active {
            return None;
        }

        match &mut self.source {
            Source::Camera(track) if track.is_ready() => track.read_frame(),
            Source::Camera(_) => None,
            Source::Still(frame) => Some(frame.clone()),
        }
    }

    /// Flip the flashlight, returning its new state
    pub fn toggle_illumination(&mut self) -> Result<bool, CaptureError> {
        if !self.active || !self.illumination_supported {
            return Err(CaptureError::IlluminationUnsupported);
        }

        let Source::Camera(track) = &mut self.source else {
            return Err(CaptureError::IlluminationUnsupported);
        };

        let next = !self.illumination_on;
        track.set_torch(next)?;
        self.illumination_on = next;
        self.metrics.record_illumination_toggle();
        Ok(next)
    }

    /// Stop every device track held by this session. Idempotent.
    pub fn close(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.illumination_on = false;

        match &mut self.source {
            Source::Camera(track) => {
                tracing::debug!("Stopping camera track {}", track.label());
                track.stop();
            }
            Source::Still(frame) => {
                *frame = Frame {
                    width: 0,
                    height: 0,
                    rgba: Vec::new(),
                };
            }
        }

        self.metrics.record_session_released();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// What the controller should acquire
pub enum AcquireMode {
    Camera,
    /// Raw bytes of a user-selected image file
    Image(Vec<u8>),
}

/// Opens capture sessions without touching the controller's active session.
///
/// Cloned out of the [`CaptureController`] so that slow opens (camera start-up,
/// image decoding) can run on a blocking thread with the controller unlocked.
#[derive(Clone)]
pub struct SessionOpener {
    camera: Arc<dyn CameraDevice>,
    constraints: CameraConstraints,
    metrics: Arc<Metrics>,
}

impl SessionOpener {
    /// Open a camera stream or decode a still image.
    ///
    /// # Errors
    /// - [`CaptureError::PermissionDenied`] / [`CaptureError::NoDevice`] for camera mode
    /// - [`CaptureError::ImageLoad`] if the image bytes cannot be decoded
    pub fn open(&self, mode: AcquireMode) -> Result<CaptureSession, CaptureError> {
        match mode {
            AcquireMode::Camera => {
                tracing::info!(
                    "Requesting camera ({:?}, ideal {}x{})",
                    self.constraints.facing,
                    self.constraints.ideal_width,
                    self.constraints.ideal_height
                );
                let track = self.camera.open(&self.constraints).inspect_err(|e| {
                    self.metrics.record_access_denied();
                    tracing::error!("Camera request failed: {}", e);
                })?;
                let session = CaptureSession::camera(track, Arc::clone(&self.metrics));
                tracing::info!(
                    "Camera granted, flashlight supported: {}",
                    session.illumination_supported()
                );
                Ok(session)
            }
            AcquireMode::Image(bytes) => {
                let frame = Frame::from_image_bytes(&bytes)?;
                tracing::info!("Loaded still image {}x{}", frame.width, frame.height);
                Ok(CaptureSession::still(frame, Arc::clone(&self.metrics)))
            }
        }
    }
}

/// Owns the capture device for the scanner.
///
/// At most one [`CaptureSession`] is live at a time; installing a new one
/// releases the previous one first.
pub struct CaptureController {
    opener: SessionOpener,
    session: Option<CaptureSession>,
}

impl CaptureController {
    pub fn new(camera: Arc<dyn CameraDevice>, constraints: CameraConstraints, metrics: Arc<Metrics>) -> Self {
        Self {
            opener: SessionOpener {
                camera,
                constraints,
                metrics,
            },
            session: None,
        }
    }

    /// Release the current session, then open and install a new one.
    ///
    /// # Errors
    /// See [`SessionOpener::open`]
    pub fn acquire(&mut self, mode: AcquireMode) -> Result<&CaptureSession, CaptureError> {
        self.release();
        let session = self.opener.open(mode)?;
        Ok(self.install(session))
    }

    /// Handle for opening a session outside the controller's lock
    pub fn opener(&self) -> SessionOpener {
        self.opener.clone()
    }

    /// Make `session` the active one, releasing any previous session
    pub fn install(&mut self, session: CaptureSession) -> &CaptureSession {
        self.release();
        self.session.insert(session)
    }

    /// Release the active session, stopping its device tracks
    pub fn release(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            tracing::debug!("Capture session released");
        }
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(CaptureSession::is_active)
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        self.session.as_mut().and_then(CaptureSession::next_frame)
    }

    /// Toggle the flashlight of the active camera.
    ///
    /// Unsupported devices are logged and ignored; returns the new state on success.
    pub fn toggle_illumination(&mut self) -> Option<bool> {
        let session = self.session.as_mut()?;
        match session.toggle_illumination() {
            Ok(on) => {
                tracing::info!("Flashlight {}", if on { "on" } else { "off" });
                Some(on)
            }
            Err(e) => {
                tracing::warn!("Flashlight toggle ignored: {}", e);
                None
            }
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let rgba = std::iter::repeat_n([rgb[0], rgb[1], rgb[2], 255], (width * height) as usize)
            .flatten()
            .collect();
        Frame::new(width, height, rgba).unwrap()
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    /// Track that must be stopped exactly once
    fn live_track(torch: bool) -> MockVideoTrack {
        let mut track = MockVideoTrack::new();
        track.expect_label().return_const("mock-camera".to_string());
        track.expect_supports_torch().return_const(torch);
        track.expect_is_ready().return_const(true);
        track
            .expect_read_frame()
            .returning(|| Some(solid_frame(2, 2, [0, 0, 0])));
        track.expect_stop().times(1).return_const(());
        track
    }

    fn controller_with(camera: MockCameraDevice) -> (CaptureController, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let controller = CaptureController::new(
            Arc::new(camera),
            CameraConstraints::default(),
            Arc::clone(&metrics),
        );
        (controller, metrics)
    }

    #[test]
    fn test_frame_length_checked() {
        assert!(Frame::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            Frame::new(2, 2, vec![0; 15]),
            Err(CaptureError::InvalidFrame { len: 15, .. })
        ));
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(solid_frame(1, 1, [255, 255, 255]).luma(), vec![254]);
        assert_eq!(solid_frame(1, 1, [0, 0, 0]).luma(), vec![0]);
        assert_eq!(solid_frame(1, 1, [255, 0, 0]).luma(), vec![75]);
    }

    #[test]
    fn test_from_image_bytes() {
        let frame = Frame::from_image_bytes(&png_bytes(3, 2)).unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert_eq!(frame.rgba().len(), 24);
    }

    #[test]
    fn test_from_invalid_bytes() {
        let err = Frame::from_image_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, CaptureError::ImageLoad(_)));
    }

    #[test]
    fn test_acquire_camera_and_release() {
        let mut camera = MockCameraDevice::new();
        let track = live_track(true);
        camera
            .expect_open()
            .times(1)
            .return_once(move |_| Ok(Box::new(track) as Box<dyn VideoTrack>));
        let (mut controller, metrics) = controller_with(camera);

        let session = controller.acquire(AcquireMode::Camera).unwrap();
        assert!(session.is_camera());
        assert!(session.illumination_supported());
        assert!(controller.next_frame().is_some());
        assert_eq!(metrics.open_sessions(), 1);

        controller.release();

        assert!(!controller.is_active());
        assert!(controller.next_frame().is_none());
        assert_eq!(metrics.open_sessions(), 0);
    }

    #[test]
    fn test_mode_switch_releases_camera() {
        let mut camera = MockCameraDevice::new();
        let track = live_track(false);
        camera
            .expect_open()
            .return_once(move |_| Ok(Box::new(track) as Box<dyn VideoTrack>));
        let (mut controller, metrics) = controller_with(camera);

        controller.acquire(AcquireMode::Camera).unwrap();
        let session = controller.acquire(AcquireMode::Image(png_bytes(4, 4))).unwrap();

        assert!(!session.is_camera());
        assert_eq!(metrics.sessions_acquired.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.open_sessions(), 1);
    }

    #[test]
    fn test_dropping_controller_stops_track() {
        let mut camera = MockCameraDevice::new();
        let track = live_track(false);
        camera
            .expect_open()
            .return_once(move |_| Ok(Box::new(track) as Box<dyn VideoTrack>));
        let (mut controller, metrics) = controller_with(camera);

        controller.acquire(AcquireMode::Camera).unwrap();
        drop(controller);

        assert_eq!(metrics.open_sessions(), 0);
    }

    #[test]
    fn test_permission_denied() {
        let mut camera = MockCameraDevice::new();
        camera
            .expect_open()
            .returning(|_| Err(CaptureError::PermissionDenied("user refused".to_string())));
        let (mut controller, metrics) = controller_with(camera);

        let err = controller.acquire(AcquireMode::Camera).err().unwrap();

        assert!(err.is_access_denied());
        assert!(!controller.is_active());
        assert_eq!(metrics.access_denied.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.open_sessions(), 0);
    }

    #[test]
    fn test_illumination_unsupported_is_silent() {
        let mut camera = MockCameraDevice::new();
        let track = live_track(false);
        camera
            .expect_open()
            .return_once(move |_| Ok(Box::new(track) as Box<dyn VideoTrack>));
        let (mut controller, _metrics) = controller_with(camera);
        controller.acquire(AcquireMode::Camera).unwrap();

        assert_eq!(controller.toggle_illumination(), None);
    }

    #[test]
    fn test_illumination_toggle() {
        let mut camera = MockCameraDevice::new();
        let mut track = live_track(true);
        track.expect_set_torch().times(2).returning(|_| Ok(()));
        camera
            .expect_open()
            .return_once(move |_| Ok(Box::new(track) as Box<dyn VideoTrack>));
        let (mut controller, metrics) = controller_with(camera);
        controller.acquire(AcquireMode::Camera).unwrap();

        assert_eq!(controller.toggle_illumination(), Some(true));
        assert_eq!(controller.toggle_illumination(), Some(false));
        assert_eq!(metrics.illumination_toggles.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_track_not_ready_yields_no_frame() {
        let mut camera = MockCameraDevice::new();
        let mut track = MockVideoTrack::new();
        track.expect_label().return_const("warming-up".to_string());
        track.expect_supports_torch().return_const(false);
        track.expect_is_ready().return_const(false);
        track.expect_read_frame().never();
        track.expect_stop().times(1).return_const(());
        camera
            .expect_open()
            .return_once(move |_| Ok(Box::new(track) as Box<dyn VideoTrack>));
        let (mut controller, _metrics) = controller_with(camera);
        controller.acquire(AcquireMode::Camera).unwrap();

        assert!(controller.next_frame().is_none());
    }

    #[test]
    fn test_opened_session_installs_over_previous() {
        let mut camera = MockCameraDevice::new();
        let track = live_track(false);
        camera
            .expect_open()
            .return_once(move |_| Ok(Box::new(track) as Box<dyn VideoTrack>));
        let (mut controller, metrics) = controller_with(camera);
        controller.acquire(AcquireMode::Camera).unwrap();

        // Opening does not touch the active session
        let still = controller.opener().open(AcquireMode::Image(png_bytes(2, 2))).unwrap();
        assert!(controller.session().unwrap().is_camera());
        assert_eq!(metrics.open_sessions(), 2);

        let session = controller.install(still);
        assert!(!session.is_camera());
        assert_eq!(metrics.open_sessions(), 1);
    }

    #[test]
    fn test_dropping_unused_opened_session_stops_track() {
        let mut camera = MockCameraDevice::new();
        let track = live_track(false);
        camera
            .expect_open()
            .return_once(move |_| Ok(Box::new(track) as Box<dyn VideoTrack>));
        let (controller, metrics) = controller_with(camera);

        let session = controller.opener().open(AcquireMode::Camera).unwrap();
        drop(session);

        assert!(!controller.is_active());
        assert_eq!(metrics.open_sessions(), 0);
    }

    #[test]
    fn test_still_image_without_illumination() {
        let camera = MockCameraDevice::new();
        let (mut controller, _metrics) = controller_with(camera);

        controller.acquire(AcquireMode::Image(png_bytes(2, 2))).unwrap();

        assert!(controller.next_frame().is_some());
        assert_eq!(controller.toggle_illumination(), None);
    }
}
