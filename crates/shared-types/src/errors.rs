//! # Error Types
//!
//! The error taxonomy visible to clients and its wire representation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Error classes reported to the caller.
///
/// Numbered on the wire; the numbering is shared with the issuing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Fingerprint or signer id not registered.
    KeyUnknown = 1,
    /// Any cryptographic primitive failure, including bad padding.
    Encryption = 2,
    /// Structural validation of a task failed.
    TaskInvalid = 3,
    /// Rejected by the organization's ACL.
    NotAllowed = 4,
    /// Startup or configuration failure. Never produced by request handling.
    OtherUnrecoverable = 5,
    /// Malformed request, bad ticket, expired ticket, broker failure.
    OtherRecoverable = 6,
}

/// Unknown numeric error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown error code: {0}")]
pub struct UnknownErrorCode(pub u8);

impl ErrorCode {
    /// Numeric wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = UnknownErrorCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ErrorCode::KeyUnknown),
            2 => Ok(ErrorCode::Encryption),
            3 => Ok(ErrorCode::TaskInvalid),
            4 => Ok(ErrorCode::NotAllowed),
            5 => Ok(ErrorCode::OtherUnrecoverable),
            6 => Ok(ErrorCode::OtherRecoverable),
            other => Err(UnknownErrorCode(other)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::KeyUnknown => "key unknown",
            ErrorCode::Encryption => "encryption",
            ErrorCode::TaskInvalid => "task invalid",
            ErrorCode::NotAllowed => "not allowed",
            ErrorCode::OtherUnrecoverable => "unrecoverable",
            ErrorCode::OtherRecoverable => "recoverable",
        };
        f.write_str(name)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = u8::deserialize(deserializer)?;
        ErrorCode::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Serialized form of an error: `{"Error": "<message>", "Code": <n>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Human-readable description.
    #[serde(rename = "Error")]
    pub message: String,
    /// Error class.
    #[serde(rename = "Code")]
    pub code: ErrorCode,
}

impl ErrorRecord {
    /// Create a new record.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::KeyUnknown.as_u8(), 1);
        assert_eq!(ErrorCode::OtherRecoverable.as_u8(), 6);
        for raw in 1..=6u8 {
            assert_eq!(ErrorCode::try_from(raw).unwrap().as_u8(), raw);
        }
        assert_eq!(ErrorCode::try_from(0), Err(UnknownErrorCode(0)));
    }

    #[test]
    fn test_record_serialization() {
        let record = ErrorRecord::new(ErrorCode::Encryption, "Invalid padding size");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"Error":"Invalid padding size","Code":2}"#);

        let parsed: ErrorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_unknown_code_rejected() {
        let parsed: Result<ErrorRecord, _> = serde_json::from_str(r#"{"Error":"x","Code":9}"#);
        assert!(parsed.is_err());
    }
}
