//! Transport envelope unwrapping.
//!
//! Every remote boundary answers with `{"statusCode": 200, "body": "<json>"}`
//! where `body` is itself a serialized document. The trigger client, the
//! status classifier and the stage orchestrator all go through [`Envelope`]
//! instead of parsing the two levels by hand.

use crate::errors::EnvelopeError;
use serde_json::Value;

/// An unwrapped transport envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// `statusCode` carried inside the envelope, if present.
    pub status_code: Option<u16>,
    /// The parsed inner body.
    pub body: Value,
    /// The inner body as it was serialized on the wire.
    pub raw_body: String,
}

impl Envelope {
    /// Parses raw transport bytes and unwraps the inner body.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let outer: Value =
            serde_json::from_str(raw).map_err(|e| EnvelopeError::NotJson(e.to_string()))?;
        Self::from_value(&outer)
    }

    /// Unwraps an already-parsed outer document.
    ///
    /// A `body` that is an object or array is accepted as-is; a string body is
    /// parsed as JSON.
    pub fn from_value(outer: &Value) -> Result<Self, EnvelopeError> {
        let object = outer.as_object().ok_or(EnvelopeError::MissingBody)?;
        let status_code = object
            .get("statusCode")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok());

        let (body, raw_body) = match object.get("body") {
            None | Some(Value::Null) => return Err(EnvelopeError::MissingBody),
            Some(Value::String(s)) => (decode_str(s)?, s.clone()),
            Some(v @ (Value::Object(_) | Value::Array(_))) => (v.clone(), v.to_string()),
            Some(other) => {
                return Err(EnvelopeError::InvalidBody(format!(
                    "unexpected body type: {other}"
                )))
            }
        };

        Ok(Self {
            status_code,
            body,
            raw_body,
        })
    }

    /// Whether the envelope reports success. A missing status code counts as
    /// success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code
            .map_or(true, |code| (200..300).contains(&code))
    }

    /// Reads a string field from the inner body.
    #[must_use]
    pub fn body_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }
}

/// Parses raw transport bytes and returns only the inner body.
pub fn unwrap_str(raw: &str) -> Result<Value, EnvelopeError> {
    Envelope::parse(raw).map(|e| e.body)
}

/// Decodes a value that may itself be a serialized document.
///
/// Strings are parsed as JSON, everything else is returned unchanged.
pub fn decode_value(value: &Value) -> Result<Value, EnvelopeError> {
    match value {
        Value::String(s) => decode_str(s),
        other => Ok(other.clone()),
    }
}

fn decode_str(s: &str) -> Result<Value, EnvelopeError> {
    serde_json::from_str(s).map_err(|e| EnvelopeError::InvalidBody(e.to_string()))
}
