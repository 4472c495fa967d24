use crate::models::Language;
use serde::{Deserialize, Serialize};
use std::fmt;

/// User-visible status of the scan flow.
///
/// Exactly one status is active at a time. Allowed moves are listed in
/// [`ScanState::can_transition_to`]; everything else is rejected by
/// [`StateManager`](crate::state::StateManager).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Idle,
    RequestingAccess,
    Scanning,
    Connecting,
    Success,
    Error,
}

impl ScanStatus {
    /// Terminal states wait for an explicit user action.
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Success | ScanStatus::Error)
    }

    /// Stable lowercase name, used by the UI layer
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Idle => "idle",
            ScanStatus::RequestingAccess => "requesting",
            ScanStatus::Scanning => "scanning",
            ScanStatus::Connecting => "connecting",
            ScanStatus::Success => "success",
            ScanStatus::Error => "error",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input mode chosen on the selection screen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    Select,
    Camera,
    Image,
}

impl ScanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanMode::Select => "select",
            ScanMode::Camera => "camera",
            ScanMode::Image => "image",
        }
    }
}

/// Category of a failure shown in the error panel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Camera permission denied or no device available
    AccessDenied,
    /// Image-mode payload did not match a network-join pattern
    DecodeRejected,
}

impl FailureKind {
    /// Localized message for the error panel.
    pub fn message(self, language: Language) -> &'static str {
        match (self, language) {
            (FailureKind::AccessDenied, Language::En) => {
                "Access Denied. Please enable camera permissions in your system settings."
            }
            (FailureKind::AccessDenied, Language::Bn) => {
                "ক্যামেরা ব্যবহারের অনুমতি পাওয়া যায়নি। সেটিংস থেকে পারমিশন চেক করুন।"
            }
            (FailureKind::DecodeRejected, Language::En) => "Invalid Node. No Goti QR code detected.",
            (FailureKind::DecodeRejected, Language::Bn) => {
                "ভুল কিউআর কোড। সঠিক কোড ব্যবহার করুন।"
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Parsed fields of an accepted network-join payload.
///
/// Lives only as long as the success panel needs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkJoinInfo {
    pub identifier: String,
    pub secret: Option<String>,
}

/// Complete state of one scanner screen.
///
/// Wrapped in `Arc<RwLock<_>>` by [`crate::state::StateManager`]; mutate it only
/// through the manager so transitions are validated and change events fire.
#[derive(Clone, Debug, Default)]
pub struct ScanState {
    pub status: ScanStatus,
    pub mode: ScanMode,
    pub failure: Option<ScanFailure>,
    pub join_info: Option<NetworkJoinInfo>,

    // Capability of the active capture session
    pub illumination_supported: bool,
    pub illumination_on: bool,

    pub language: Language,
}

impl ScanState {
    /// Whether `next` is reachable from the current status.
    ///
    /// Image mode skips the permission step (`Idle -> Scanning`) and is the only
    /// mode in which a scanning or connecting flow may end in `Error`. Every
    /// status can fall back to `Idle`, which is how the flow restarts.
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        use ScanStatus::*;

        let image_mode = self.mode == ScanMode::Image;
        match (self.status, next) {
            (_, Idle) => true,
            (Idle, RequestingAccess) => self.mode == ScanMode::Camera,
            (Idle, Scanning) => image_mode,
            (RequestingAccess, Scanning) | (RequestingAccess, Error) => true,
            (Scanning, Connecting) => true,
            (Scanning, Error) | (Connecting, Error) => image_mode,
            (Connecting, Success) => true,
            (Error, RequestingAccess) => self.mode == ScanMode::Camera,
            _ => false,
        }
    }

    /// Clear everything tied to the previous run, keeping user preferences.
    pub fn reset_run(&mut self) {
        self.status = ScanStatus::Idle;
        self.failure = None;
        self.join_info = None;
        self.illumination_supported = false;
        self.illumination_on = false;
    }
}
