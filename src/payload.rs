//! APNs notification payload construction and JSON encoding.
//!
//! A [`Payload`] holds the logical content of a notification (alert, badge,
//! sound, custom data) and encodes it into the compact JSON byte string the
//! gateway expects:
//!
//! ```json
//! {"aps":{"alert":"Hello","sound":"default","badge":1},"my-key":"my-value"}
//! ```
//!
//! Encoding is pure and synchronous. The `aps` object contains only the
//! sub-keys that were actually set; custom entries are merged at the top
//! level beside `aps`. The encoder fails fast when the result exceeds the
//! size limit; it never truncates.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Default maximum encoded payload size in bytes.
///
/// Apple raised the limit over the protocol's lifetime (256 bytes originally,
/// 2 KB later). Callers targeting older gateway behavior can pass a tighter
/// limit to [`Payload::to_bytes_with_limit`].
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 2048;

/// Top-level keys reserved by the protocol. Custom keys must not shadow
/// these: the gateway reads them out of `aps`, so a duplicate at the top
/// level is almost certainly a caller bug.
const RESERVED_KEYS: &[&str] = &["aps", "alert", "badge", "sound", "content-available"];

/// Payload encoding errors.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Encoded JSON exceeds the size limit.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    TooLarge {
        /// Encoded byte length.
        size: usize,
        /// The limit that was exceeded.
        max: usize,
    },

    /// A custom key collides with a reserved protocol key.
    #[error("custom key collides with reserved key: {0:?}")]
    KeyCollision(String),
}

/// A structured alert with localization and launch-image options.
///
/// Keys whose values are unset are omitted from the encoded JSON.
#[derive(Debug, Clone, Serialize)]
pub struct PayloadAlert {
    /// Alert body text.
    pub body: String,
    /// Localization key for the action button label.
    #[serde(rename = "action-loc-key", skip_serializing_if = "Option::is_none")]
    pub action_loc_key: Option<String>,
    /// Localization key for the alert body.
    #[serde(rename = "loc-key", skip_serializing_if = "Option::is_none")]
    pub loc_key: Option<String>,
    /// Format arguments for `loc-key`.
    #[serde(rename = "loc-args", skip_serializing_if = "Option::is_none")]
    pub loc_args: Option<Vec<String>>,
    /// Launch image filename.
    #[serde(rename = "launch-image", skip_serializing_if = "Option::is_none")]
    pub launch_image: Option<String>,
}

impl PayloadAlert {
    /// Create a structured alert with the given body text.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            action_loc_key: None,
            loc_key: None,
            loc_args: None,
            launch_image: None,
        }
    }

    /// Set the action button localization key.
    #[must_use]
    pub fn action_loc_key(mut self, key: impl Into<String>) -> Self {
        self.action_loc_key = Some(key.into());
        self
    }

    /// Set the body localization key.
    #[must_use]
    pub fn loc_key(mut self, key: impl Into<String>) -> Self {
        self.loc_key = Some(key.into());
        self
    }

    /// Set the body localization arguments.
    #[must_use]
    pub fn loc_args(mut self, args: Vec<String>) -> Self {
        self.loc_args = Some(args);
        self
    }

    /// Set the launch image filename.
    #[must_use]
    pub fn launch_image(mut self, image: impl Into<String>) -> Self {
        self.launch_image = Some(image.into());
        self
    }
}

/// Alert content: either a plain string or a structured alert.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Alert {
    /// Plain alert text.
    Plain(String),
    /// Structured alert with localization options.
    Structured(PayloadAlert),
}

/// The `aps` object. Field order matters only for byte-level test
/// expectations; the gateway does not care.
#[derive(Serialize)]
struct Aps<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<&'a Alert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    content_available: Option<u8>,
}

/// A logical notification payload.
///
/// Build with the chained setters, then encode with [`Payload::to_bytes`]:
///
/// ```
/// use apns_legacy::payload::Payload;
///
/// let bytes = Payload::new()
///     .alert("Hello World!")
///     .sound("default")
///     .badge(1)
///     .to_bytes()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Payload {
    alert: Option<Alert>,
    badge: Option<u32>,
    sound: Option<String>,
    content_available: bool,
    custom: Map<String, Value>,
}

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a plain-text alert.
    #[must_use]
    pub fn alert(mut self, text: impl Into<String>) -> Self {
        self.alert = Some(Alert::Plain(text.into()));
        self
    }

    /// Set a structured alert.
    #[must_use]
    pub fn structured_alert(mut self, alert: PayloadAlert) -> Self {
        self.alert = Some(Alert::Structured(alert));
        self
    }

    /// Set the badge count. Zero is a valid value (clears the badge);
    /// leaving it unset omits the key entirely.
    #[must_use]
    pub fn badge(mut self, count: u32) -> Self {
        self.badge = Some(count);
        self
    }

    /// Set the sound filename (or `"default"`).
    #[must_use]
    pub fn sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    /// Mark the payload as content-available (silent background update).
    #[must_use]
    pub fn content_available(mut self) -> Self {
        self.content_available = true;
        self
    }

    /// Add a custom top-level key. Collisions with reserved keys are
    /// reported by the encode step, not here.
    #[must_use]
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Encode to compact JSON with the default size limit.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::KeyCollision`] if a custom key shadows a
    /// reserved key, or [`PayloadError::TooLarge`] if the encoded JSON
    /// exceeds [`DEFAULT_MAX_PAYLOAD_SIZE`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        self.to_bytes_with_limit(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Encode to compact JSON, failing if the result exceeds `max` bytes.
    ///
    /// # Errors
    ///
    /// Same as [`Payload::to_bytes`], with the caller-supplied limit.
    pub fn to_bytes_with_limit(&self, max: usize) -> Result<Vec<u8>, PayloadError> {
        for key in self.custom.keys() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(PayloadError::KeyCollision(key.clone()));
            }
        }

        let aps = Aps {
            alert: self.alert.as_ref(),
            sound: self.sound.as_deref(),
            badge: self.badge,
            content_available: self.content_available.then_some(1),
        };

        let mut top = Map::new();
        top.insert(
            "aps".to_string(),
            serde_json::to_value(&aps).unwrap_or(Value::Null),
        );
        for (key, value) in &self.custom {
            top.insert(key.clone(), value.clone());
        }

        // serde_json is compact by default: no extra whitespace.
        let bytes = serde_json::to_vec(&top).unwrap_or_default();
        if bytes.len() > max {
            return Err(PayloadError::TooLarge {
                size: bytes.len(),
                max,
            });
        }

        Ok(bytes)
    }
}
