//! Wire protocol codec for the APNs binary gateway.
//!
//! Enhanced notification frame (client → gateway), all integers
//! big-endian:
//!
//! ```text
//! [u8 command=1] [u32 identifier] [u32 expiry]
//! [u16 token_len=32] [32 token bytes] [u16 payload_len] [payload]
//! ```
//!
//! Error response frame (gateway → client), fixed 6 bytes:
//!
//! ```text
//! [u8 command=8] [u8 status] [u32 identifier]
//! ```
//!
//! The byte layout is the compatibility-critical part of this crate: a
//! frame that is off by one byte is silently dropped or errored by the
//! gateway. Everything here is pure, no I/O.

// Rust guideline compliant 2026-02

use data_encoding::HEXLOWER_PERMISSIVE;
use thiserror::Error;

/// Command byte for an enhanced notification frame.
pub const NOTIFICATION_COMMAND: u8 = 1;

/// Command byte for a multi-notification batch frame.
pub const BATCH_COMMAND: u8 = 2;

/// Command byte for a gateway error response.
pub const ERROR_RESPONSE_COMMAND: u8 = 8;

/// Device tokens are always 32 raw bytes (64 hex characters).
pub const DEVICE_TOKEN_LEN: usize = 32;

/// Error responses are always exactly 6 bytes.
pub const ERROR_RESPONSE_LEN: usize = 6;

/// Gateway status codes, passed through to listeners uninterpreted.
pub mod status {
    /// No error.
    pub const NO_ERROR: u8 = 0;
    /// Processing error.
    pub const PROCESSING_ERROR: u8 = 1;
    /// Missing device token.
    pub const MISSING_DEVICE_TOKEN: u8 = 2;
    /// Missing topic.
    pub const MISSING_TOPIC: u8 = 3;
    /// Missing payload.
    pub const MISSING_PAYLOAD: u8 = 4;
    /// Invalid token size.
    pub const INVALID_TOKEN_SIZE: u8 = 5;
    /// Invalid topic size.
    pub const INVALID_TOPIC_SIZE: u8 = 6;
    /// Invalid payload size.
    pub const INVALID_PAYLOAD_SIZE: u8 = 7;
    /// Invalid token.
    pub const INVALID_TOKEN: u8 = 8;
    /// Gateway is shutting down the connection.
    pub const SHUTDOWN: u8 = 10;
    /// Unknown error.
    pub const UNKNOWN: u8 = 255;
}

/// Frame encoding/decoding errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Device token hex string is malformed or the wrong length.
    #[error("invalid device token: {0}")]
    BadToken(String),

    /// Payload does not fit the 16-bit length field.
    #[error("payload too large for frame: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Payload byte length.
        size: usize,
        /// Largest encodable payload.
        max: usize,
    },

    /// A gateway response frame is malformed.
    #[error("invalid response frame: {0}")]
    BadResponse(String),
}

/// Decode a device token from hex text to raw bytes.
fn decode_token(token_hex: &str) -> Result<[u8; DEVICE_TOKEN_LEN], FrameError> {
    if token_hex.len() % 2 != 0 {
        return Err(FrameError::BadToken(format!(
            "odd hex length {}",
            token_hex.len()
        )));
    }

    let raw = HEXLOWER_PERMISSIVE
        .decode(token_hex.as_bytes())
        .map_err(|e| FrameError::BadToken(format!("not valid hex: {e}")))?;

    <[u8; DEVICE_TOKEN_LEN]>::try_from(raw.as_slice()).map_err(|_| {
        FrameError::BadToken(format!(
            "decoded length {} (expected {DEVICE_TOKEN_LEN})",
            raw.len()
        ))
    })
}

/// A single validated notification, ready to serialize.
///
/// Validation (token format, payload size) happens in [`Notification::new`],
/// so [`Notification::encode`] itself cannot fail. A notification is built
/// per send call and discarded once written; it is not retained for retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Caller-supplied correlation value, echoed back in error responses.
    pub identifier: u32,
    /// Unix timestamp (seconds); 0 means "do not store for later delivery".
    pub expiry: u32,
    /// Raw device token bytes.
    pub token: [u8; DEVICE_TOKEN_LEN],
    /// Encoded JSON payload.
    pub payload: Vec<u8>,
}

impl Notification {
    /// Build a notification from a hex device token and encoded payload.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BadToken`] if `token_hex` has odd length,
    /// non-hex characters, or does not decode to exactly 32 bytes, and
    /// [`FrameError::PayloadTooLarge`] if the payload exceeds the 16-bit
    /// length field.
    pub fn new(
        identifier: u32,
        expiry: u32,
        token_hex: &str,
        payload: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let token = decode_token(token_hex)?;

        if payload.len() > u16::MAX as usize {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: u16::MAX as usize,
            });
        }

        Ok(Self {
            identifier,
            expiry,
            token,
            payload,
        })
    }

    /// Encode into the enhanced notification wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(45 + self.payload.len());
        buf.push(NOTIFICATION_COMMAND);
        buf.extend_from_slice(&self.identifier.to_be_bytes());
        buf.extend_from_slice(&self.expiry.to_be_bytes());
        buf.extend_from_slice(&(DEVICE_TOKEN_LEN as u16).to_be_bytes());
        buf.extend_from_slice(&self.token);
        buf.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode an enhanced notification frame.
    ///
    /// The gateway never sends these back; this exists for round-trip
    /// verification and test servers.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BadResponse`] if the frame is truncated or has
    /// the wrong command byte, [`FrameError::BadToken`] on a bad token
    /// length field.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < 45 {
            return Err(FrameError::BadResponse(format!(
                "notification frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != NOTIFICATION_COMMAND {
            return Err(FrameError::BadResponse(format!(
                "unexpected command byte 0x{:02x}",
                bytes[0]
            )));
        }

        let identifier = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let expiry = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);

        let token_len = u16::from_be_bytes([bytes[9], bytes[10]]) as usize;
        if token_len != DEVICE_TOKEN_LEN {
            return Err(FrameError::BadToken(format!(
                "token length field {token_len} (expected {DEVICE_TOKEN_LEN})"
            )));
        }
        let mut token = [0u8; DEVICE_TOKEN_LEN];
        token.copy_from_slice(&bytes[11..11 + DEVICE_TOKEN_LEN]);

        let payload_len = u16::from_be_bytes([bytes[43], bytes[44]]) as usize;
        if bytes.len() < 45 + payload_len {
            return Err(FrameError::BadResponse(format!(
                "payload truncated: have {} of {payload_len} bytes",
                bytes.len() - 45
            )));
        }
        let payload = bytes[45..45 + payload_len].to_vec();

        Ok(Self {
            identifier,
            expiry,
            token,
            payload,
        })
    }
}

/// Accumulates multiple notifications into a single command-2 batch frame.
///
/// Batch layout per notification: `[u8 2][u32 frame_len]` followed by five
/// length-prefixed items, each `[u8 item_id][u16 item_len][data]`:
/// 1 = token, 2 = payload, 3 = identifier, 4 = expiry, 5 = priority.
#[derive(Debug, Default)]
pub struct NotificationBatch {
    data: Vec<u8>,
    count: usize,
}

impl NotificationBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notification with the given delivery priority
    /// (10 = immediate, 5 = power-conserving).
    pub fn add(&mut self, notification: &Notification, priority: u8) {
        let mut items = Vec::with_capacity(64 + notification.payload.len());

        // Item 1: device token
        items.push(1);
        items.extend_from_slice(&(DEVICE_TOKEN_LEN as u16).to_be_bytes());
        items.extend_from_slice(&notification.token);

        // Item 2: payload
        items.push(2);
        items.extend_from_slice(&(notification.payload.len() as u16).to_be_bytes());
        items.extend_from_slice(&notification.payload);

        // Item 3: identifier
        items.push(3);
        items.extend_from_slice(&4u16.to_be_bytes());
        items.extend_from_slice(&notification.identifier.to_be_bytes());

        // Item 4: expiry
        items.push(4);
        items.extend_from_slice(&4u16.to_be_bytes());
        items.extend_from_slice(&notification.expiry.to_be_bytes());

        // Item 5: priority
        items.push(5);
        items.extend_from_slice(&1u16.to_be_bytes());
        items.push(priority);

        self.data.push(BATCH_COMMAND);
        self.data.extend_from_slice(&(items.len() as u32).to_be_bytes());
        self.data.extend_from_slice(&items);
        self.count += 1;
    }

    /// Encoded batch bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of notifications in the batch.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A decoded gateway error response.
///
/// Ordinary data, not an error value: a non-zero status conventionally
/// means the identified notification (and anything written after it before
/// the gateway processed the error) went undelivered. Resend policy is the
/// caller's, keyed off `identifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Gateway status code (see [`status`]).
    pub status: u8,
    /// Identifier of the notification that triggered the response.
    pub identifier: u32,
}

impl ErrorResponse {
    /// Encode into the 6-byte wire format. Used by test gateways; the
    /// client only ever decodes these.
    pub fn to_bytes(&self) -> [u8; ERROR_RESPONSE_LEN] {
        let id = self.identifier.to_be_bytes();
        [
            ERROR_RESPONSE_COMMAND,
            self.status,
            id[0],
            id[1],
            id[2],
            id[3],
        ]
    }
}

/// Incremental error-response decoder that handles partial reads.
///
/// The socket may deliver fewer (or more) than 6 bytes per read event.
/// Feed whatever arrives via [`ResponseDecoder::feed`]; bytes that do not
/// yet form a complete frame are buffered for the next call.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    buf: Vec<u8>,
}

impl ResponseDecoder {
    /// Create a decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and extract every complete response frame, in arrival
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BadResponse`] if a frame's command byte is not
    /// 8; at that point the stream is out of sync and the connection must
    /// be torn down.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<ErrorResponse>, FrameError> {
        self.buf.extend_from_slice(bytes);
        let mut responses = Vec::new();

        while self.buf.len() >= ERROR_RESPONSE_LEN {
            if self.buf[0] != ERROR_RESPONSE_COMMAND {
                return Err(FrameError::BadResponse(format!(
                    "unexpected command byte 0x{:02x}",
                    self.buf[0]
                )));
            }

            let status = self.buf[1];
            let identifier =
                u32::from_be_bytes([self.buf[2], self.buf[3], self.buf[4], self.buf[5]]);
            responses.push(ErrorResponse { status, identifier });

            self.buf.drain(..ERROR_RESPONSE_LEN);
        }

        Ok(responses)
    }

    /// Returns true if the decoder holds buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    const TOKEN_HEX: &str = "b5bb9d8014a0f9b1d61e21e796d78dccdf1352f23cd32812f4850b878ae4944c";

    #[test]
    fn test_notification_wire_layout() {
        let payload = Payload::new()
            .alert("Hello World!")
            .sound("default")
            .badge(1)
            .to_bytes()
            .unwrap();
        let n = Notification::new(1, 0, TOKEN_HEX, payload).unwrap();
        let bytes = n.encode();

        assert_eq!(bytes.len(), 105); // 45-byte header + 60-byte payload
        assert_eq!(bytes[0], NOTIFICATION_COMMAND);
        assert_eq!(&bytes[1..5], &[0, 0, 0, 1]); // identifier
        assert_eq!(&bytes[5..9], &[0, 0, 0, 0]); // expiry
        assert_eq!(&bytes[9..11], &[0, 32]); // token length
        assert_eq!(bytes[11], 0xb5);
        assert_eq!(bytes[42], 0x4c);
        assert_eq!(&bytes[43..45], &[0, 60]); // payload length
        assert_eq!(&bytes[45..47], b"{\"");
    }

    #[test]
    fn test_notification_round_trip() {
        let n = Notification::new(0xDEAD_BEEF, 1_700_000_000, TOKEN_HEX, b"{}".to_vec()).unwrap();
        let decoded = Notification::decode(&n.encode()).unwrap();
        assert_eq!(decoded, n);
    }

    #[test]
    fn test_uppercase_token_accepted() {
        let upper = TOKEN_HEX.to_uppercase();
        let n = Notification::new(1, 0, &upper, b"{}".to_vec()).unwrap();
        assert_eq!(n.token[0], 0xb5);
    }

    #[test]
    fn test_odd_length_token_rejected() {
        let result = Notification::new(1, 0, &TOKEN_HEX[..63], b"{}".to_vec());
        assert!(matches!(result, Err(FrameError::BadToken(_))));
    }

    #[test]
    fn test_non_hex_token_rejected() {
        let bad = format!("zz{}", &TOKEN_HEX[2..]);
        let result = Notification::new(1, 0, &bad, b"{}".to_vec());
        assert!(matches!(result, Err(FrameError::BadToken(_))));
    }

    #[test]
    fn test_short_token_rejected() {
        let result = Notification::new(1, 0, &TOKEN_HEX[..32], b"{}".to_vec());
        assert!(matches!(result, Err(FrameError::BadToken(_))));
    }

    #[test]
    fn test_long_token_rejected() {
        let long = format!("{TOKEN_HEX}ff");
        let result = Notification::new(1, 0, &long, b"{}".to_vec());
        assert!(matches!(result, Err(FrameError::BadToken(_))));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![b'x'; u16::MAX as usize + 1];
        let result = Notification::new(1, 0, TOKEN_HEX, payload);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_max_payload_accepted() {
        let payload = vec![b'x'; u16::MAX as usize];
        let n = Notification::new(1, 0, TOKEN_HEX, payload).unwrap();
        let bytes = n.encode();
        assert_eq!(&bytes[43..45], &[0xff, 0xff]);
    }

    #[test]
    fn test_batch_layout() {
        let n = Notification::new(7, 3600, TOKEN_HEX, b"{}".to_vec()).unwrap();
        let mut batch = NotificationBatch::new();
        batch.add(&n, 10);

        assert_eq!(batch.len(), 1);
        let bytes = batch.as_bytes();
        assert_eq!(bytes[0], BATCH_COMMAND);

        // frame_len covers the five items: (3+32) + (3+2) + (3+4) + (3+4) + (3+1)
        let frame_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        assert_eq!(frame_len, 58);
        assert_eq!(bytes.len(), 5 + frame_len);

        // Item 1: token
        assert_eq!(bytes[5], 1);
        assert_eq!(&bytes[6..8], &[0, 32]);
        // Item 2: payload
        assert_eq!(bytes[40], 2);
        assert_eq!(&bytes[41..43], &[0, 2]);
        assert_eq!(&bytes[43..45], b"{}");
        // Item 3: identifier
        assert_eq!(bytes[45], 3);
        assert_eq!(&bytes[46..48], &[0, 4]);
        assert_eq!(&bytes[48..52], &[0, 0, 0, 7]);
        // Item 4: expiry
        assert_eq!(bytes[52], 4);
        assert_eq!(&bytes[53..55], &[0, 4]);
        assert_eq!(&bytes[55..59], &3600u32.to_be_bytes());
        // Item 5: priority
        assert_eq!(bytes[59], 5);
        assert_eq!(&bytes[60..62], &[0, 1]);
        assert_eq!(bytes[62], 10);
    }

    #[test]
    fn test_batch_multiple_notifications() {
        let a = Notification::new(1, 0, TOKEN_HEX, b"{}".to_vec()).unwrap();
        let b = Notification::new(2, 0, TOKEN_HEX, b"{}".to_vec()).unwrap();
        let mut batch = NotificationBatch::new();
        batch.add(&a, 10);
        batch.add(&b, 5);

        assert_eq!(batch.len(), 2);
        // Second notification starts right after the first.
        assert_eq!(batch.as_bytes()[63], BATCH_COMMAND);
    }

    #[test]
    fn test_response_round_trip() {
        let response = ErrorResponse {
            status: status::INVALID_TOKEN,
            identifier: 42,
        };
        let mut decoder = ResponseDecoder::new();
        let decoded = decoder.feed(&response.to_bytes()).unwrap();
        assert_eq!(decoded, vec![response]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_response_split_across_reads_emits_exactly_one() {
        let response = ErrorResponse {
            status: status::PROCESSING_ERROR,
            identifier: 0x0102_0304,
        };
        let bytes = response.to_bytes();

        let mut decoder = ResponseDecoder::new();
        let first = decoder.feed(&bytes[..3]).unwrap();
        assert!(first.is_empty());
        assert!(decoder.has_partial());

        let second = decoder.feed(&bytes[3..]).unwrap();
        assert_eq!(second, vec![response]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_response_byte_at_a_time() {
        let response = ErrorResponse {
            status: status::SHUTDOWN,
            identifier: 99,
        };
        let bytes = response.to_bytes();
        let mut decoder = ResponseDecoder::new();
        for (i, byte) in bytes.iter().enumerate() {
            let out = decoder.feed(&[*byte]).unwrap();
            if i < bytes.len() - 1 {
                assert!(out.is_empty());
            } else {
                assert_eq!(out, vec![response]);
            }
        }
    }

    #[test]
    fn test_concatenated_responses_emit_in_order() {
        let mut wire = Vec::new();
        for id in 1..=4u32 {
            wire.extend_from_slice(
                &ErrorResponse {
                    status: status::INVALID_PAYLOAD_SIZE,
                    identifier: id,
                }
                .to_bytes(),
            );
        }

        let mut decoder = ResponseDecoder::new();
        let out = decoder.feed(&wire).unwrap();
        assert_eq!(out.len(), 4);
        for (i, response) in out.iter().enumerate() {
            assert_eq!(response.identifier, i as u32 + 1);
        }
    }

    #[test]
    fn test_bad_command_byte_rejected() {
        let mut decoder = ResponseDecoder::new();
        let result = decoder.feed(&[0x07, 0, 0, 0, 0, 1]);
        assert!(matches!(result, Err(FrameError::BadResponse(_))));
    }

    #[test]
    fn test_trailing_partial_after_complete_frame() {
        let response = ErrorResponse {
            status: status::NO_ERROR,
            identifier: 5,
        };
        let mut wire = response.to_bytes().to_vec();
        wire.extend_from_slice(&[ERROR_RESPONSE_COMMAND, 1]); // start of next frame

        let mut decoder = ResponseDecoder::new();
        let out = decoder.feed(&wire).unwrap();
        assert_eq!(out, vec![response]);
        assert!(decoder.has_partial());
    }
}
