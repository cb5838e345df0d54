//! Change-notification envelope codec.
//!
//! Queue messages carry a base64 body wrapping a JSON change event. Only the
//! object-created event type is actionable for the pipeline; everything else
//! is discarded by the monitor.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OBJECT_CREATED_EVENT: &str = "Storage.ObjectCreated";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("envelope payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("envelope payload is not a valid change event: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub event_type: String,
    pub data: ChangeData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeData {
    pub url: String,
}

pub fn decode_change_envelope(body: &str) -> Result<ChangeEvent, EnvelopeError> {
    let raw = BASE64.decode(body.trim())?;
    let text = String::from_utf8(raw)?;
    Ok(serde_json::from_str(&text)?)
}

/// Encode an event the way the storage notifier does; used by tests and
/// local tooling to seed a queue.
pub fn encode_change_envelope(event_type: &str, url: &str) -> String {
    let event = ChangeEvent {
        event_type: event_type.to_string(),
        data: ChangeData { url: url.to_string() },
    };
    // serializing a two-field struct cannot fail
    BASE64.encode(serde_json::to_vec(&event).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_created_event() {
        let body = encode_change_envelope(OBJECT_CREATED_EVENT, "https://store/models/a.metadata.json");
        let event = decode_change_envelope(&body).unwrap();
        assert_eq!(event.event_type, OBJECT_CREATED_EVENT);
        assert_eq!(event.data.url, "https://store/models/a.metadata.json");
    }

    #[test]
    fn rejects_non_base64_body() {
        assert!(matches!(decode_change_envelope("%%%"), Err(EnvelopeError::Base64(_))));
    }

    #[test]
    fn rejects_non_json_payload() {
        let body = BASE64.encode(b"plain text");
        assert!(matches!(decode_change_envelope(&body), Err(EnvelopeError::Json(_))));
    }
}
