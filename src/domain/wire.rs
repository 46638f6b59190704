//! JSON payloads exchanged between devices, operators and the coordinator
//!
//! Field names follow the HTTP API. Legacy readers send `card_id` and `type`,
//! which are accepted as aliases.

use crate::domain::types::{IdentityId, Mode, ScanAction, ScanStatus, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollRequest {
    #[serde(alias = "card_id")]
    pub identity_id: IdentityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(alias = "card_id")]
    pub identity_id: IdentityId,
    /// Device clock reading; coordinator time is used when absent or blank
    #[serde(
        default,
        deserialize_with = "blank_timestamp_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<Timestamp>,
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ScanAction>,
    /// Mode the device believed it was in when the token was read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_mode: Option<Mode>,
}

fn blank_timestamp_as_none<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => Timestamp::parse(&raw).map(Some).map_err(|e| {
            serde::de::Error::custom(format!("invalid timestamp {:?}: {}", raw, e))
        }),
        _ => Ok(None),
    }
}

impl ScanRequest {
    pub fn new(identity_id: IdentityId) -> Self {
        Self { identity_id, timestamp: None, action_type: None, device_mode: None }
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_action(mut self, action: ScanAction) -> Self {
        self.action_type = Some(action);
        self
    }

    pub fn from_device(mut self, mode: Mode) -> Self {
        self.device_mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReply {
    pub status: ScanStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Closed session length, present on checkout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Seconds left before a toggle scan may close the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
}

impl ScanReply {
    pub fn new(status: ScanStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            name: None,
            duration: None,
            remaining_seconds: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Reply synthesized by a device when the coordinator cannot be reached
    pub fn offline() -> Self {
        Self::new(ScanStatus::Error, "Server Offline")
    }
}

/// Two-valued status for operator actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckReply {
    pub status: AckStatus,
    pub message: String,
}

impl AckReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self { status: AckStatus::Success, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: AckStatus::Error, message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeReply {
    pub mode: Mode,
}

/// Mode is kept as free text so an invalid value reaches validation
/// instead of failing JSON decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetModeRequest {
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetModeReply {
    pub status: AckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameRequest {
    #[serde(alias = "card_id")]
    pub identity_id: IdentityId,
    pub name: String,
}

/// One row of session history, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub name: String,
    pub check_in: Timestamp,
    pub check_out: Option<Timestamp>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub identity_id: IdentityId,
    pub name: String,
    /// Check-in time of the open session, if any
    pub active_checkin: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_request_accepts_legacy_fields() {
        let req: ScanRequest = serde_json::from_str(
            r#"{"card_id": 584190023411, "timestamp": "2024-01-01 09:00:00", "type": "checkout"}"#,
        )
        .unwrap();
        assert_eq!(req.identity_id.as_str(), "584190023411");
        assert_eq!(req.action_type, Some(ScanAction::Checkout));
        assert_eq!(req.timestamp.unwrap().to_string(), "2024-01-01 09:00:00");
        assert_eq!(req.device_mode, None);
    }

    #[test]
    fn test_scan_request_blank_timestamp_is_absent() {
        for body in [
            r#"{"identity_id":"1001","timestamp":""}"#,
            r#"{"identity_id":"1001","timestamp":"  "}"#,
            r#"{"identity_id":"1001","timestamp":null}"#,
        ] {
            let req: ScanRequest = serde_json::from_str(body).unwrap();
            assert_eq!(req.timestamp, None, "{}", body);
        }

        let bad = serde_json::from_str::<ScanRequest>(r#"{"identity_id":"1","timestamp":"noon"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_scan_request_omits_absent_fields() {
        let req = ScanRequest::new(IdentityId::new("abc")).from_device(Mode::Attendance);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"identity_id":"abc","device_mode":"attendance"}"#);
    }

    #[test]
    fn test_scan_reply_rejects_unknown_status() {
        let parsed = serde_json::from_str::<ScanReply>(r#"{"status":"maybe","message":"?"}"#);
        assert!(parsed.is_err());

        let body = concat!(
            r#"{"status":"warning","message":"Too soon! Wait 1 min to check out.","#,
            r#""remaining_seconds":30}"#
        );
        let warning: ScanReply = serde_json::from_str(body).unwrap();
        assert_eq!(warning.status, ScanStatus::Warning);
        assert_eq!(warning.remaining_seconds, Some(30));
    }
}
