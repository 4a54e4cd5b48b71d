//! Wire-format tests for tollgate-core types.

use pretty_assertions::assert_eq;
use serde_json::json;
use tollgate_core::{License, LicenseState, LicenseStatus, StatusSnapshot, reason};

#[test]
fn test_license_uses_camel_case() {
    let license = License::new("lic-42")
        .with_tenant("acme")
        .with_features(["sso", "audit"])
        .with_expiry("2030-01-01");

    let value = serde_json::to_value(&license).expect("serialize");
    assert_eq!(value["tenantId"], json!("acme"));
    assert_eq!(value["expiresAt"], json!("2030-01-01"));
    assert_eq!(value["features"], json!(["audit", "sso"]));
    assert!(value.get("tenant_id").is_none());
}

#[test]
fn test_license_accepts_sparse_documents() {
    let license: License =
        serde_json::from_value(json!({"key": "lic-1", "features": ["core"]})).expect("deserialize");

    assert_eq!(license.key, "lic-1");
    assert!(license.tenant_id.is_none());
    assert!(license.has_feature("core"));
    assert!(license.metadata.is_empty());
}

#[test]
fn test_unparsable_expiry_survives_deserialization() {
    let license: License =
        serde_json::from_value(json!({"key": "lic-1", "expiresAt": "next tuesday"}))
            .expect("deserialize");

    assert_eq!(license.expires_at.as_deref(), Some("next tuesday"));
    assert!(license.expiry().is_err());
}

#[test]
fn test_status_wire_shape() {
    let status = LicenseStatus::new(LicenseState::Invalid, reason::VALIDATOR_ERROR)
        .validated_at("2025-01-01T00:00:00Z".parse().unwrap())
        .with_error("backend down");

    let value = serde_json::to_value(&status).expect("serialize");
    assert_eq!(value["state"], json!("invalid"));
    assert_eq!(value["reason"], json!("VALIDATOR_ERROR"));
    assert_eq!(value["error"], json!("backend down"));
    assert!(value.get("metadata").is_none());

    let parsed: LicenseStatus = serde_json::from_value(value).expect("deserialize");
    assert_eq!(parsed.state, LicenseState::Invalid);
}

#[test]
fn test_snapshot_serializes_status_and_timestamp() {
    let snapshot = StatusSnapshot {
        status: LicenseStatus::new(LicenseState::Pending, reason::PENDING_VALIDATION),
        timestamp: "2025-01-01T00:00:00Z".parse().unwrap(),
    };

    let value = serde_json::to_value(&snapshot).expect("serialize");
    assert_eq!(value["status"]["state"], json!("pending"));
    assert!(value["timestamp"].as_str().unwrap().starts_with("2025-01-01T00:00:00"));
}
