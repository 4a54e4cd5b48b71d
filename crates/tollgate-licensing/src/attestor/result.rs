//! Attestation stage results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tollgate_core::parse_timestamp;

/// Marker serialized as `{"skipped": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skipped {
    pub skipped: bool,
}

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageResult<T> {
    Skipped(Skipped),
    Completed(T),
}

impl<T> StageResult<T> {
    pub fn skipped() -> Self {
        StageResult::Skipped(Skipped { skipped: true })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StageResult::Skipped(_))
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            StageResult::Completed(payload) => Some(payload),
            StageResult::Skipped(_) => None,
        }
    }
}

/// Attestation stage payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationOutcome {
    pub valid: bool,
    pub reason: Option<String>,
    pub attested_at: DateTime<Utc>,
    pub next_check_at: Option<DateTime<Utc>>,
    pub next_check_in_ms: Option<i64>,
    pub metadata: Map<String, Value>,
    pub raw: Value,
}

impl AttestationOutcome {
    /// Read a server response. A missing `valid` flag counts as valid.
    pub fn from_response(raw: Value, now: DateTime<Utc>) -> Self {
        Self {
            valid: raw.get("valid").and_then(Value::as_bool).unwrap_or(true),
            reason: string_field(&raw, "reason"),
            attested_at: timestamp_field(&raw, "attestedAt").unwrap_or(now),
            next_check_at: timestamp_field(&raw, "nextCheckAt"),
            next_check_in_ms: millis_field(&raw, "nextCheckInMs"),
            metadata: object_field(&raw, "metadata"),
            raw,
        }
    }
}

/// Revocation stage payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationOutcome {
    pub revoked: bool,
    pub reason: Option<String>,
    pub checked_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
    pub raw: Value,
}

impl RevocationOutcome {
    /// Read a server response. Only an explicit `revoked: true` revokes.
    pub fn from_response(raw: Value, now: DateTime<Utc>) -> Self {
        Self {
            revoked: raw.get("revoked").and_then(Value::as_bool).unwrap_or(false),
            reason: string_field(&raw, "reason"),
            checked_at: timestamp_field(&raw, "checkedAt").unwrap_or(now),
            metadata: object_field(&raw, "metadata"),
            raw,
        }
    }
}

/// Entitlements stage payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementsOutcome {
    pub entitlements: Vec<String>,
    pub updated_at: DateTime<Utc>,
    pub ttl_ms: Option<i64>,
    pub metadata: Map<String, Value>,
    pub raw: Value,
}

impl EntitlementsOutcome {
    /// Read a server response; non-string entitlements are dropped.
    pub fn from_response(raw: Value, now: DateTime<Utc>) -> Self {
        let entitlements = raw
            .get("entitlements")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            entitlements,
            updated_at: timestamp_field(&raw, "updatedAt").unwrap_or(now),
            ttl_ms: millis_field(&raw, "ttlMs"),
            metadata: object_field(&raw, "metadata"),
            raw,
        }
    }
}

/// Aggregate result of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttestationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<StageResult<AttestationOutcome>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<StageResult<RevocationOutcome>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlements: Option<StageResult<EntitlementsOutcome>>,
}

impl AttestationResult {
    /// Attestation payload when the server reported the license invalid.
    pub fn rejection(&self) -> Option<&AttestationOutcome> {
        self.attestation
            .as_ref()
            .and_then(StageResult::completed)
            .filter(|outcome| !outcome.valid)
    }

    /// Revocation payload when the server reported the license revoked.
    pub fn revocation_hit(&self) -> Option<&RevocationOutcome> {
        self.revocation
            .as_ref()
            .and_then(StageResult::completed)
            .filter(|outcome| outcome.revoked)
    }

    /// Entitlements granted by a completed entitlements stage.
    pub fn granted_entitlements(&self) -> Option<&[String]> {
        self.entitlements
            .as_ref()
            .and_then(StageResult::completed)
            .map(|outcome| outcome.entitlements.as_slice())
    }
}

fn string_field(raw: &Value, name: &str) -> Option<String> {
    raw.get(name).and_then(Value::as_str).map(str::to_string)
}

fn timestamp_field(raw: &Value, name: &str) -> Option<DateTime<Utc>> {
    raw.get(name).and_then(Value::as_str).and_then(parse_timestamp)
}

fn millis_field(raw: &Value, name: &str) -> Option<i64> {
    let value = raw.get(name)?;
    value.as_i64().or_else(|| value.as_f64().map(|ms| ms as i64))
}

fn object_field(raw: &Value, name: &str) -> Map<String, Value> {
    raw.get(name)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
