//! Named attestor configurations.
//!
//! A profile describes how to obtain an attestor for a customer segment or
//! region: a literal [`RemoteAttestorConfig`], a pre-built attestor, or a
//! factory. The [`LicenseAttestationProfileRegistry`] resolves profiles
//! into attestors at configuration time.

mod packs;
mod registry;

pub use packs::{PackOptions, ProfilePack};
pub use registry::LicenseAttestationProfileRegistry;

use crate::attestor::{BindingOptions, LicenseAttestor, RemoteAttestorConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tollgate_core::{Error, Result};

/// Arguments handed to a profile factory.
pub struct FactoryArgs<'a> {
    pub profile: &'a AttestationProfile,
    /// Fully merged attestor options: the profile binding's options, then
    /// the override binding's, then `overrides.attestor_options`, later keys
    /// winning. The raw call overrides remain available on `overrides`.
    pub attestor_options: &'a Map<String, Value>,
    pub overrides: &'a AttestorOverrides,
}

pub type AttestorFactory =
    dyn Fn(FactoryArgs<'_>) -> Result<Arc<dyn LicenseAttestor>> + Send + Sync;

/// Where a profile's attestor comes from.
#[derive(Clone)]
pub enum ProfileSource {
    Literal(RemoteAttestorConfig),
    Instance(Arc<dyn LicenseAttestor>),
    Factory(Arc<AttestorFactory>),
}

impl fmt::Debug for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileSource::Literal(config) => f.debug_tuple("Literal").field(config).finish(),
            ProfileSource::Instance(_) => f.write_str("Instance(..)"),
            ProfileSource::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Informational service levels for a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSla {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_target_ms: Option<u64>,
    /// Availability target in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<String>,
}

/// A registered attestor profile.
#[derive(Debug, Clone)]
pub struct AttestationProfile {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub source: ProfileSource,
    pub binding: BindingOptions,
    pub sla: ProfileSla,
    pub metadata: Map<String, Value>,
}

impl AttestationProfile {
    pub fn new(id: impl Into<String>, source: ProfileSource) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            source,
            binding: BindingOptions::default(),
            sla: ProfileSla::default(),
            metadata: Map::new(),
        }
    }

    pub fn literal(id: impl Into<String>, config: RemoteAttestorConfig) -> Self {
        Self::new(id, ProfileSource::Literal(config))
    }

    pub fn instance(id: impl Into<String>, attestor: Arc<dyn LicenseAttestor>) -> Self {
        Self::new(id, ProfileSource::Instance(attestor))
    }

    pub fn factory<F>(id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(FactoryArgs<'_>) -> Result<Arc<dyn LicenseAttestor>> + Send + Sync + 'static,
    {
        Self::new(id, ProfileSource::Factory(Arc::new(factory)))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_binding(mut self, binding: BindingOptions) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_sla(mut self, sla: ProfileSla) -> Self {
        self.sla = sla;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Literal attestor config, if this profile has one.
    pub fn config(&self) -> Option<&RemoteAttestorConfig> {
        match &self.source {
            ProfileSource::Literal(config) => Some(config),
            _ => None,
        }
    }
}

/// Serializable profile definition, as read from a profiles file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestor: Option<RemoteAttestorConfig>,
    #[serde(default)]
    pub binding: BindingOptions,
    #[serde(default)]
    pub sla: ProfileSla,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ProfileSpec {
    pub fn into_profile(self) -> Result<AttestationProfile> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidProfile("profile id is required".to_string()));
        }
        let config = self.attestor.ok_or_else(|| {
            Error::InvalidProfile(format!("profile {} has no attestor config", self.id))
        })?;

        let mut profile = AttestationProfile::literal(self.id, config)
            .with_binding(self.binding)
            .with_sla(self.sla)
            .with_metadata(self.metadata);
        if let Some(name) = self.name {
            profile.name = name;
        }
        profile.description = self.description;
        Ok(profile)
    }
}

/// Per-call overrides for [`LicenseAttestationProfileRegistry::create_attestor`].
#[derive(Clone, Default)]
pub struct AttestorOverrides {
    /// Use this attestor instead of anything the profile describes.
    pub attestor: Option<Arc<dyn LicenseAttestor>>,
    pub attestor_options: Map<String, Value>,
    pub binding: BindingOptions,
}

impl AttestorOverrides {
    pub fn with_attestor(mut self, attestor: Arc<dyn LicenseAttestor>) -> Self {
        self.attestor = Some(attestor);
        self
    }

    pub fn with_attestor_options(mut self, options: Map<String, Value>) -> Self {
        self.attestor_options = options;
        self
    }

    pub fn with_binding(mut self, binding: BindingOptions) -> Self {
        self.binding = binding;
        self
    }
}

/// An attestor resolved from a profile, with the binding options to use.
#[derive(Clone)]
pub struct CreatedAttestor {
    pub attestor: Arc<dyn LicenseAttestor>,
    pub binding: BindingOptions,
    pub profile: AttestationProfile,
}
