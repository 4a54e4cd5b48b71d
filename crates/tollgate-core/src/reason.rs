//! Reason codes attached to license statuses.

pub const NO_LICENSE: &str = "NO_LICENSE";
pub const PENDING_VALIDATION: &str = "PENDING_VALIDATION";
pub const MISSING_KEY: &str = "MISSING_KEY";
pub const INVALID_EXPIRY: &str = "INVALID_EXPIRY";
pub const LICENSE_EXPIRED: &str = "LICENSE_EXPIRED";
pub const VALIDATOR_REJECTED: &str = "VALIDATOR_REJECTED";
pub const VALIDATOR_ERROR: &str = "VALIDATOR_ERROR";
pub const VALID: &str = "VALID";

// Remote attestation
pub const REMOTE_INVALID: &str = "REMOTE_INVALID";
pub const REMOTE_REVOKED: &str = "REMOTE_REVOKED";
pub const REMOTE_ATTESTATION_ERROR: &str = "REMOTE_ATTESTATION_ERROR";
