use crate::models::{NetworkJoinInfo, ScannerSettings};
use regex::Regex;

/// Decides whether decoded QR text is a network-join payload.
///
/// Two rules, tried in order:
///
/// 1. A `S:<identifier>` field (case-insensitive, value up to the next `;`),
///    as found in the conventional `WIFI:S:<ssid>;T:WPA;P:<password>;;` format.
/// 2. Otherwise, any payload containing the brand marker (case-insensitive).
///    The identifier is the first `identifier_max_chars` characters of the
///    payload.
///
/// In both cases the secret comes from a `P:<secret>` field when present.
/// The marker rule is a loose heuristic that only exists to let promotional
/// codes through; it carries no structural guarantee.
#[derive(Debug, Clone)]
pub struct PayloadClassifier {
    /// Regex for the identifier field, e.g. `S:GotiHome`
    identifier_pattern: Regex,

    /// Regex for the secret field, e.g. `P:secret123`
    secret_pattern: Regex,

    /// Lowercased brand marker
    brand_marker: String,

    identifier_max_chars: usize,
}

impl PayloadClassifier {
    pub fn new(brand_marker: &str, identifier_max_chars: usize) -> Self {
        Self {
            identifier_pattern: Regex::new(r"(?i)S:([^;]+)").expect("Invalid identifier regex"),
            secret_pattern: Regex::new(r"(?i)P:([^;]+)").expect("Invalid secret regex"),
            brand_marker: brand_marker.to_lowercase(),
            identifier_max_chars,
        }
    }

    pub fn from_settings(settings: &ScannerSettings) -> Self {
        Self::new(&settings.brand_marker, settings.identifier_max_chars)
    }

    /// Classify a decoded payload, returning the join info if it is accepted
    pub fn classify(&self, payload: &str) -> Option<NetworkJoinInfo> {
        let secret = self.capture(&self.secret_pattern, payload);

        let identifier = match self.capture(&self.identifier_pattern, payload) {
            Some(identifier) => identifier,
            None if self.has_brand_marker(payload) => {
                payload.chars().take(self.identifier_max_chars).collect()
            }
            None => {
                tracing::debug!("Payload rejected: no identifier field or brand marker");
                return None;
            }
        };

        Some(NetworkJoinInfo { identifier, secret })
    }

    fn has_brand_marker(&self, payload: &str) -> bool {
        !self.brand_marker.is_empty() && payload.to_lowercase().contains(&self.brand_marker)
    }

    fn capture(&self, pattern: &Regex, payload: &str) -> Option<String> {
        pattern
            .captures(payload)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl Default for PayloadClassifier {
    fn default() -> Self {
        Self::from_settings(&ScannerSettings::default())
    }
}
