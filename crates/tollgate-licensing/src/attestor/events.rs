//! Attestor event surface for audit and telemetry sinks.

use super::result::{AttestationOutcome, EntitlementsOutcome, RevocationOutcome, StageResult};
use crate::validator::ValidatorOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Event categories listeners can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Attestation,
    Revocation,
    Entitlements,
    Validation,
    Error,
    Schedule,
}

/// Where a remote-pipeline failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Attestation,
    Revocation,
    Entitlements,
    Validation,
    ScheduledValidation,
    InitialValidation,
}

/// Events emitted by a remote attestor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AttestorEvent {
    Attestation(StageResult<AttestationOutcome>),
    Revocation(StageResult<RevocationOutcome>),
    Entitlements(StageResult<EntitlementsOutcome>),
    Validation(ValidatorOutcome),
    Error {
        kind: ErrorKind,
        message: String,
    },
    Schedule {
        delay_ms: u64,
        next_run_at: DateTime<Utc>,
    },
}

impl AttestorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AttestorEvent::Attestation(_) => EventKind::Attestation,
            AttestorEvent::Revocation(_) => EventKind::Revocation,
            AttestorEvent::Entitlements(_) => EventKind::Entitlements,
            AttestorEvent::Validation(_) => EventKind::Validation,
            AttestorEvent::Error { .. } => EventKind::Error,
            AttestorEvent::Schedule { .. } => EventKind::Schedule,
        }
    }
}
