//! Button payloads.
//!
//! Payloads are compact JSON objects with one-letter keys so they fit into
//! the 100 character custom id of a message component.

use crate::error::GrabError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackMode {
    #[serde(rename = "m")]
    AsMedia,
    #[serde(rename = "f")]
    AsFile,
}

/// Resumes a pending selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallbackRequest {
    #[serde(rename = "t")]
    pub token: String,
    #[serde(rename = "k", default, skip_serializing_if = "Option::is_none")]
    pub link_key: Option<String>,
    #[serde(rename = "m")]
    pub mode: CallbackMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsAction {
    #[serde(rename = "or")]
    OpenRoot,
    #[serde(rename = "om")]
    OpenMode,
    #[serde(rename = "sm")]
    SetMode,
    #[serde(rename = "ol")]
    OpenLanguage,
    #[serde(rename = "sl")]
    SetLanguage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsCallback {
    #[serde(rename = "s")]
    pub action: SettingsAction,
    #[serde(rename = "v", default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

impl SettingsCallback {
    pub fn new(action: SettingsAction, value: impl Into<String>) -> Self {
        Self {
            action,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallbackPayload {
    Settings(SettingsCallback),
    Selection(CallbackRequest),
}

impl CallbackPayload {
    pub fn decode(data: &str) -> Result<Self, GrabError> {
        serde_json::from_str(data).map_err(|e| GrabError::CallbackMalformed(e.to_string()))
    }

    pub fn encode(&self) -> String {
        // Plain structs of strings and unit enums always serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<CallbackRequest> for CallbackPayload {
    fn from(value: CallbackRequest) -> Self {
        CallbackPayload::Selection(value)
    }
}

impl From<SettingsCallback> for CallbackPayload {
    fn from(value: SettingsCallback) -> Self {
        CallbackPayload::Settings(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(link_key: Option<&str>, mode: CallbackMode) -> CallbackRequest {
        CallbackRequest {
            token: "q0JzV8yXQ6mBfQn1Zx3zJw".to_string(),
            link_key: link_key.map(str::to_string),
            mode,
        }
    }

    #[test]
    fn test_selection_payload_roundtrip() {
        let payload = CallbackPayload::from(request(Some("2"), CallbackMode::AsFile));
        let encoded = payload.encode();

        assert_eq!(encoded, r#"{"t":"q0JzV8yXQ6mBfQn1Zx3zJw","k":"2","m":"f"}"#);
        assert!(encoded.len() <= 100);
        assert_eq!(CallbackPayload::decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_selection_payload_without_key() {
        let payload = CallbackPayload::from(request(None, CallbackMode::AsMedia));
        let encoded = payload.encode();

        assert!(!encoded.contains("\"k\""));
        assert_eq!(CallbackPayload::decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_settings_payload_roundtrip() {
        let payload = CallbackPayload::from(SettingsCallback::new(SettingsAction::SetMode, "files"));
        let encoded = payload.encode();

        assert_eq!(encoded, r#"{"s":"sm","v":"files"}"#);
        assert_eq!(CallbackPayload::decode(&encoded).unwrap(), payload);

        let root = CallbackPayload::decode(r#"{"s":"or"}"#).unwrap();
        assert_eq!(
            root,
            CallbackPayload::Settings(SettingsCallback::new(SettingsAction::OpenRoot, ""))
        );
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        let cases = [
            "",
            "not json",
            r#"{"t":"abc"}"#,
            r#"{"k":"1","m":"m"}"#,
            r#"{"t":1,"m":"m"}"#,
            r#"{"t":"abc","m":"x"}"#,
            r#"{"t":"abc","k":3,"m":"m"}"#,
            r#"{"t":"abc","m":"m","extra":true}"#,
            r#"{"s":"zz"}"#,
        ];
        for case in cases {
            assert!(
                matches!(
                    CallbackPayload::decode(case),
                    Err(GrabError::CallbackMalformed(_))
                ),
                "accepted {case:?}"
            );
        }
    }
}
