//! Tollgate Core
//!
//! License domain types, reason codes, error handling and the collaborator
//! ports (clock, HTTP transport) shared by the other Tollgate crates.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates.

pub mod clock;
pub mod error;
pub mod license;
pub mod ports;
pub mod reason;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use license::{
    License, LicenseState, LicenseStatus, StatusSnapshot, ValidationContext, parse_timestamp,
};
pub use ports::{HttpRequest, HttpResponse, HttpTransport};
