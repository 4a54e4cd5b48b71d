//! Error types for Tollgate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // License errors
    #[error("License key is required")]
    MissingKey,

    #[error("License feature missing: {feature}")]
    FeatureMissing { feature: String },

    #[error("License invalid: {0}")]
    LicenseInvalid(String),

    // Validator errors
    #[error("Validator failed: {0}")]
    Validator(String),

    // Remote attestation errors
    #[error("Remote request failed with status {status}")]
    HttpStatus {
        status: u16,
        body: serde_json::Value,
    },

    #[error("Remote request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Attestor not bound to a license manager")]
    NotBound,

    // Profile errors
    #[error("Attestation profile not found: {0}")]
    ProfileNotFound(String),

    #[error("No default attestation profile configured")]
    NoDefaultProfile,

    #[error("Invalid attestation profile: {0}")]
    InvalidProfile(String),

    #[error("Unknown profile pack: {0}")]
    UnknownPack(String),

    // Infrastructure errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingKey => "LICENSE_KEY_REQUIRED",
            Error::FeatureMissing { .. } => "LICENSE_FEATURE_MISSING",
            Error::LicenseInvalid(_) => "LICENSE_INVALID",
            Error::Validator(_) => "VALIDATOR_ERROR",
            Error::HttpStatus { .. } => "REMOTE_HTTP_STATUS",
            Error::Timeout { .. } => "REMOTE_TIMEOUT",
            Error::NotBound => "ATTESTOR_NOT_BOUND",
            Error::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
            Error::NoDefaultProfile => "PROFILE_DEFAULT_MISSING",
            Error::InvalidProfile(_) => "PROFILE_INVALID",
            Error::UnknownPack(_) => "PROFILE_PACK_UNKNOWN",
            Error::Network(_) => "NETWORK_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status carried by a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_missing_code() {
        let err = Error::FeatureMissing {
            feature: "vision-kit".to_string(),
        };
        assert_eq!(err.code(), "LICENSE_FEATURE_MISSING");
        assert_eq!(err.to_string(), "License feature missing: vision-kit");
    }

    #[test]
    fn test_http_status_exposes_status() {
        let err = Error::HttpStatus {
            status: 503,
            body: serde_json::json!({"error": "unavailable"}),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(Error::NotBound.status(), None);
    }
}
