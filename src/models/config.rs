use serde::{Deserialize, Serialize};

/// Display language of user-visible messages
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    #[default]
    Bn,
}

impl Language {
    pub fn toggled(self) -> Self {
        match self {
            Language::En => Language::Bn,
            Language::Bn => Language::En,
        }
    }
}

/// Which camera the scanner asks for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear-facing camera
    #[default]
    Environment,
    User,
}

/// Scanner configuration from `Scanner Settings.yaml`
///
/// Every field has a default so a partial (or missing) file still loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default)]
    pub scanner: ScannerSettings,

    #[serde(default)]
    pub ui: UiSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,

    /// Delay between frame samples in camera mode
    pub frame_interval_ms: u64,

    /// Push every n-th sampled frame to the preview (0 disables preview)
    pub preview_every: u32,

    /// Simulated handshake between `Connecting` and `Success`
    pub handshake_delay_ms: u64,

    pub brand_marker: String,
    pub identifier_max_chars: usize,

    pub haptic_pulse_ms: u64,

    /// Directory of images replayed by the image-feed camera
    pub camera_feed_dir: String,

    /// Whether the image-feed camera reports a flashlight
    pub camera_torch: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
            frame_interval_ms: 16,
            preview_every: 2,
            handshake_delay_ms: 1500,
            brand_marker: "goti".to_string(),
            identifier_max_chars: 20,
            haptic_pulse_ms: 200,
            camera_feed_dir: "camera".to_string(),
            camera_torch: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    pub language: Language,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub debug_mode: bool,
    pub console_output: bool,
    pub log_dir: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            debug_mode: false,
            console_output: true,
            log_dir: "logs".to_string(),
        }
    }
}
