// Scanner metrics module
//
// Lightweight counters for the capture and decode pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Scan pipeline metrics
///
/// Uses atomic operations for thread-safe tracking without locks. Shared as
/// `Arc<Metrics>` between the capture controller, the decode loop and the
/// scan session, and logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Frames handed to the decoder
    pub frames_sampled: AtomicU64,

    /// Frames in which the decoder found any code
    pub decode_hits: AtomicU64,

    pub payloads_accepted: AtomicU64,
    pub payloads_rejected: AtomicU64,

    /// Capture sessions opened (camera or still image)
    pub sessions_acquired: AtomicU64,

    /// Capture sessions closed
    pub sessions_released: AtomicU64,

    pub access_denied: AtomicU64,
    pub illumination_toggles: AtomicU64,

    /// UI updates dropped because the window was gone
    pub ui_updates_dropped: AtomicU64,

    /// Total time spent inside the decoder in microseconds
    pub decode_time_us: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_sampled: AtomicU64::new(0),
            decode_hits: AtomicU64::new(0),
            payloads_accepted: AtomicU64::new(0),
            payloads_rejected: AtomicU64::new(0),
            sessions_acquired: AtomicU64::new(0),
            sessions_released: AtomicU64::new(0),
            access_denied: AtomicU64::new(0),
            illumination_toggles: AtomicU64::new(0),
            ui_updates_dropped: AtomicU64::new(0),
            decode_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_frame_sampled(&self, decode_time: Duration) {
        self.frames_sampled.fetch_add(1, Ordering::Relaxed);
        self.decode_time_us
            .fetch_add(decode_time.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_decode_hit(&self) {
        self.decode_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payload_accepted(&self) {
        self.payloads_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payload_rejected(&self) {
        self.payloads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_acquired(&self) {
        self.sessions_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_released(&self) {
        self.sessions_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_access_denied(&self) {
        self.access_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_illumination_toggle(&self) {
        self.illumination_toggles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ui_update_dropped(&self) {
        self.ui_updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Sessions acquired but not yet released
    pub fn open_sessions(&self) -> u64 {
        let acquired = self.sessions_acquired.load(Ordering::Relaxed);
        let released = self.sessions_released.load(Ordering::Relaxed);
        acquired.saturating_sub(released)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average decoder time per sampled frame in milliseconds
    pub fn avg_decode_time_ms(&self) -> f64 {
        let total = self.decode_time_us.load(Ordering::Relaxed);
        let count = self.frames_sampled.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64 / 1000.0
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Scanner Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Frames: {} sampled, {} with a code (avg decode {:.2}ms)",
            self.frames_sampled.load(Ordering::Relaxed),
            self.decode_hits.load(Ordering::Relaxed),
            self.avg_decode_time_ms()
        );
        tracing::info!(
            "Payloads: {} accepted, {} rejected",
            self.payloads_accepted.load(Ordering::Relaxed),
            self.payloads_rejected.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Capture sessions: {} acquired, {} released, {} access denied",
            self.sessions_acquired.load(Ordering::Relaxed),
            self.sessions_released.load(Ordering::Relaxed),
            self.access_denied.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Illumination toggles: {}, dropped UI updates: {}",
            self.illumination_toggles.load(Ordering::Relaxed),
            self.ui_updates_dropped.load(Ordering::Relaxed)
        );

        let open = self.open_sessions();
        if open > 0 {
            tracing::warn!("{} capture session(s) still open at shutdown", open);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
