//! Services module - the scan-and-connect pipeline.
//!
//! The services are framework-agnostic: nothing here depends on the UI layer,
//! so the whole flow can be driven from tests or another front-end.
//!
//! # Components
//!
//! - [`CaptureController`]: acquires a camera track or a still image and owns
//!   the device for the lifetime of a [`CaptureSession`]
//! - [`DecodeLoop`]: samples frames and runs a [`FrameDecoder`] on them
//! - [`PayloadClassifier`]: turns decoded text into [`NetworkJoinInfo`](crate::models::NetworkJoinInfo)
//! - [`ScanSession`]: drives the status machine, the simulated handshake and
//!   cancellation of a run
//! - [`ImageFeedCamera`]: a [`CameraDevice`] that replays images from disk
//!
//! # Data Flow
//!
//! ```text
//! CameraDevice ──▶ CaptureController ──▶ DecodeLoop ──▶ PayloadClassifier
//!                                                          │
//!                           StateManager ◀── ScanSession ◀─┘
//! ```

pub mod camera;
pub mod cancel;
pub mod capture;
pub mod classifier;
pub mod decode;
pub mod session;

pub use camera::ImageFeedCamera;
pub use cancel::CancelToken;
pub use capture::{
    AcquireMode, CameraConstraints, CameraDevice, CaptureController, CaptureError, CaptureSession, Frame, SessionOpener,
    VideoTrack,
};
pub use classifier::PayloadClassifier;
pub use decode::{DecodeLoop, FrameDecoder, PreviewSink, QrDecoder};
pub use session::{Haptics, LogHaptics, ScanError, ScanOutcome, ScanSession};
