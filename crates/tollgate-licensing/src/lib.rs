//! License validation for Tollgate.
//!
//! A [`LicenseManager`] holds the current license and runs a chain of
//! validators. A [`RemoteLicenseAttestor`] contributes a remote
//! attest/revocation/entitlements check to that chain and keeps it fresh
//! on a server-driven schedule. The [`LicenseAttestationProfileRegistry`]
//! builds attestors from named profiles.

pub mod attestor;
pub mod listeners;
pub mod manager;
pub mod profiles;
pub mod transport;
pub mod validator;

pub use attestor::{
    AttestationOutcome, AttestationResult, AttestorEvent, BindingOptions, EntitlementsOutcome,
    ErrorKind, EventKind, LicenseAttestor, RemoteAttestorConfig, RemoteLicenseAttestor,
    RevocationOutcome, StageResult,
};
pub use listeners::ListenerId;
pub use manager::{HISTORY_LIMIT, LicenseManager};
pub use profiles::{
    AttestationProfile, AttestorOverrides, CreatedAttestor, FactoryArgs,
    LicenseAttestationProfileRegistry, PackOptions, ProfilePack, ProfileSla, ProfileSource,
    ProfileSpec,
};
pub use transport::ReqwestTransport;
pub use validator::{Validator, ValidatorId, ValidatorOutcome, validator_fn};

pub use tollgate_core::{License, LicenseState, LicenseStatus, ValidationContext};
