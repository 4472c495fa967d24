use crate::metrics::Metrics;
use crate::models::NetworkJoinInfo;
use crate::services::cancel::CancelToken;
use crate::services::capture::{CaptureController, Frame};
use crate::services::classifier::PayloadClassifier;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

/// Extracts the text of a machine-readable code from a frame
pub trait FrameDecoder: Send + Sync {
    /// Decoded text of the first readable code, or `None`
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// QR decoder backed by `rqrr`
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl FrameDecoder for QrDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        if width == 0 || height == 0 {
            return None;
        }

        let luma = frame.luma();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| luma[y * width + x]);

        prepared.detect_grids().into_iter().find_map(|grid| match grid.decode() {
            Ok((_meta, content)) => Some(content),
            Err(e) => {
                tracing::trace!("QR grid found but not decodable: {}", e);
                None
            }
        })
    }
}

/// Receives sampled frames for on-screen preview
pub type PreviewSink = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Samples frames from the capture controller and classifies decoded payloads.
///
/// One sample runs at a time. In camera mode [`run`](Self::run) keeps sampling
/// at `frame_interval` until a payload is accepted or the run's token is
/// cancelled; decode misses and rejected payloads are not surfaced. Image mode
/// uses [`decode_once`](Self::decode_once).
pub struct DecodeLoop {
    decoder: Arc<dyn FrameDecoder>,
    classifier: PayloadClassifier,
    frame_interval: Duration,
    preview: RwLock<Option<(u32, PreviewSink)>>,
    metrics: Arc<Metrics>,
}

impl DecodeLoop {
    pub fn new(
        decoder: Arc<dyn FrameDecoder>,
        classifier: PayloadClassifier,
        frame_interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            decoder,
            classifier,
            frame_interval: frame_interval.max(Duration::from_millis(1)),
            preview: RwLock::new(None),
            metrics,
        }
    }

    /// Forward every `every`-th sampled frame to `sink`; `every == 0` disables preview
    pub fn set_preview(&self, every: u32, sink: PreviewSink) {
        let mut preview = self.preview.write().unwrap();
        *preview = (every > 0).then_some((every, sink));
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Decode and classify a single frame on the calling thread
    pub fn decode_once(&self, frame: &Frame) -> Option<NetworkJoinInfo> {
        let started = Instant::now();
        let payload = self.decoder.decode(frame);
        self.classify(payload, started.elapsed())
    }

    /// Decode on the blocking pool, then classify
    pub async fn decode_blocking(&self, frame: Frame) -> Option<NetworkJoinInfo> {
        let decoder = Arc::clone(&self.decoder);
        let started = Instant::now();
        let payload = match tokio::task::spawn_blocking(move || decoder.decode(&frame)).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Decoder task failed: {}", e);
                None
            }
        };
        self.classify(payload, started.elapsed())
    }

    fn classify(&self, payload: Option<String>, decode_time: Duration) -> Option<NetworkJoinInfo> {
        self.metrics.record_frame_sampled(decode_time);

        let payload = payload?;
        self.metrics.record_decode_hit();
        tracing::debug!("Decoded payload ({} chars)", payload.chars().count());

        match self.classifier.classify(&payload) {
            Some(info) => {
                self.metrics.record_payload_accepted();
                Some(info)
            }
            None => {
                self.metrics.record_payload_rejected();
                None
            }
        }
    }

    /// Sample frames until a payload is accepted.
    ///
    /// Returns `None` if `cancel` fires first. After cancellation no further
    /// frame is read from `capture`.
    pub async fn run(&self, capture: &Mutex<CaptureController>, cancel: &CancelToken) -> Option<NetworkJoinInfo> {
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sampled: u64 = 0;

        tracing::info!("Decode loop started ({}ms interval)", self.frame_interval.as_millis());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Decode loop cancelled after {} frames", sampled);
                    return None;
                }
                _ = ticker.tick() => {}
            }

            let Some(frame) = grab_frame(capture) else {
                continue;
            };
            sampled += 1;
            self.push_preview(&frame, sampled);

            let info = self.decode_blocking(frame).await;
            if cancel.is_cancelled() {
                tracing::debug!("Decode loop cancelled while decoding frame {}", sampled);
                return None;
            }
            if let Some(info) = info {
                tracing::info!("Payload accepted after {} frames", sampled);
                return Some(info);
            }
        }
    }

    fn push_preview(&self, frame: &Frame, sampled: u64) {
        let preview = self.preview.read().unwrap();
        if let Some((every, sink)) = preview.as_ref() {
            if sampled % u64::from(*every) == 0 {
                sink(frame);
            }
        }
    }
}

fn grab_frame(capture: &Mutex<CaptureController>) -> Option<Frame> {
    match capture.lock() {
        Ok(mut controller) => controller.next_frame(),
        Err(_) => {
            tracing::error!("Capture controller lock poisoned; skipping frame");
            None
        }
    }
}
