//! License records and validation status types.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Caller-supplied context forwarded to validators and remote attestors.
pub type ValidationContext = Map<String, Value>;

/// License record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// Opaque license key.
    pub key: String,
    /// Owning tenant.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Licensed features.
    #[serde(default)]
    pub features: BTreeSet<String>,
    /// Expiration timestamp (ISO-8601).
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Issue timestamp (ISO-8601).
    #[serde(default)]
    pub issued_at: Option<String>,
    /// Opaque signature, never verified locally.
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl License {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            tenant_id: None,
            features: BTreeSet::new(),
            expires_at: None,
            issued_at: None,
            signature: None,
            metadata: Map::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    pub fn with_expiry(mut self, expires_at: impl Into<String>) -> Self {
        self.expires_at = Some(expires_at.into());
        self
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// Parsed expiry; `Ok(None)` when unset.
    pub fn expiry(&self) -> Result<Option<DateTime<Utc>>> {
        match self.expires_at.as_deref() {
            None => Ok(None),
            Some(raw) => parse_timestamp(raw)
                .map(Some)
                .ok_or_else(|| Error::LicenseInvalid(format!("Unparsable expiry: {}", raw))),
        }
    }
}

/// Parse an ISO-8601 timestamp, accepting RFC 3339, bare dates and
/// zone-less date-times (interpreted as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// License validation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseState {
    Unregistered,
    Pending,
    Invalid,
    Expired,
    Valid,
}

impl fmt::Display for LicenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LicenseState::Unregistered => "unregistered",
            LicenseState::Pending => "pending",
            LicenseState::Invalid => "invalid",
            LicenseState::Expired => "expired",
            LicenseState::Valid => "valid",
        };
        f.write_str(s)
    }
}

/// Current validation status of a license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatus {
    pub state: LicenseState,
    pub reason: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for LicenseStatus {
    fn default() -> Self {
        Self {
            state: LicenseState::Unregistered,
            reason: None,
            validated_at: None,
            metadata: None,
            error: None,
        }
    }
}

impl LicenseStatus {
    pub fn new(state: LicenseState, reason: impl Into<String>) -> Self {
        Self {
            state,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn validated_at(mut self, at: DateTime<Utc>) -> Self {
        self.validated_at = Some(at);
        self
    }

    /// Attach metadata, dropping it when empty.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = (!metadata.is_empty()).then_some(metadata);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_valid(&self) -> bool {
        self.state == LicenseState::Valid
    }

    /// Look up a nested metadata value by JSON pointer (e.g. `/remote/attestation`).
    pub fn metadata_pointer(&self, pointer: &str) -> Option<&Value> {
        let metadata = self.metadata.as_ref()?;
        let path = pointer.trim_start_matches('/');
        match path.split_once('/') {
            Some((head, rest)) => metadata.get(head)?.pointer(&format!("/{}", rest)),
            None => metadata.get(path),
        }
    }
}

/// A status recorded in the validation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: LicenseStatus,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_license_deserializes_camel_case() {
        let json = r#"{
            "key": "tenant-license",
            "tenantId": "acme",
            "features": ["core", "core", "analytics"],
            "expiresAt": "2025-12-31T00:00:00Z"
        }"#;
        let license: License = serde_json::from_str(json).unwrap();
        assert_eq!(license.tenant_id.as_deref(), Some("acme"));
        assert_eq!(license.features.len(), 2);
        assert!(license.has_feature("analytics"));
        assert!(license.signature.is_none());
    }

    #[test]
    fn test_expiry_parsing() {
        let license = License::new("k").with_expiry("2025-12-31");
        let expiry = license.expiry().unwrap().unwrap();
        assert_eq!(expiry.to_rfc3339(), "2025-12-31T00:00:00+00:00");

        let bad = License::new("k").with_expiry("next tuesday");
        assert!(bad.expiry().is_err());

        assert!(matches!(License::new("k").expiry(), Ok(None)));
    }

    #[test]
    fn test_status_drops_empty_metadata() {
        let status = LicenseStatus::new(LicenseState::Valid, "VALID").with_metadata(Map::new());
        assert!(status.metadata.is_none());
    }

    #[test]
    fn test_metadata_pointer() {
        let mut metadata = Map::new();
        metadata.insert(
            "remote".to_string(),
            serde_json::json!({"attestation": {"nextCheckInMs": 500}}),
        );
        let status = LicenseStatus::new(LicenseState::Valid, "VALID").with_metadata(metadata);
        assert_eq!(
            status
                .metadata_pointer("/remote/attestation/nextCheckInMs")
                .and_then(Value::as_u64),
            Some(500)
        );
        assert!(status.metadata_pointer("/remote/revocation").is_none());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&LicenseState::Unregistered).unwrap();
        assert_eq!(json, "\"unregistered\"");
    }
}
