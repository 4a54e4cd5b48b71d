use super::packs::{PackOptions, ProfilePack};
use super::{
    AttestationProfile, AttestorOverrides, CreatedAttestor, FactoryArgs, ProfileSource,
    ProfileSpec,
};
use crate::attestor::{LicenseAttestor, RemoteLicenseAttestor};
use std::collections::BTreeMap;
use std::sync::Arc;
use tollgate_core::{Clock, Error, HttpTransport, Result};
use tracing::{Span, debug, info, info_span};

/// Registry of attestor profiles, keyed by id.
pub struct LicenseAttestationProfileRegistry {
    profiles: BTreeMap<String, AttestationProfile>,
    default_profile: Option<String>,
    transport: Option<Arc<dyn HttpTransport>>,
    clock: Option<Arc<dyn Clock>>,
    span: Span,
}

impl Default for LicenseAttestationProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseAttestationProfileRegistry {
    pub fn new() -> Self {
        Self {
            profiles: BTreeMap::new(),
            default_profile: None,
            transport: None,
            clock: None,
            span: info_span!("profile_registry"),
        }
    }

    /// Transport handed to attestors built from literal configs.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Clock handed to attestors built from literal configs.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Register or overwrite a profile. The first profile becomes the default.
    pub fn register_profile(&mut self, profile: AttestationProfile) -> Result<()> {
        if profile.id.trim().is_empty() {
            return Err(Error::InvalidProfile("profile id is required".to_string()));
        }
        if self.default_profile.is_none() {
            self.default_profile = Some(profile.id.clone());
        }
        debug!(parent: &self.span, profile_id = %profile.id, "Profile registered");
        self.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    pub fn register_spec(&mut self, spec: ProfileSpec) -> Result<()> {
        self.register_profile(spec.into_profile()?)
    }

    /// Register every regional profile of a pack and return their ids.
    pub fn install_pack(
        &mut self,
        pack: ProfilePack,
        options: &PackOptions,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for profile in pack.profiles(options) {
            ids.push(profile.id.clone());
            self.register_profile(profile)?;
        }
        info!(parent: &self.span, pack = %pack, profiles = ids.len(), "Profile pack installed");
        Ok(ids)
    }

    pub fn set_default_profile(&mut self, id: &str) -> Result<()> {
        if !self.profiles.contains_key(id) {
            return Err(Error::ProfileNotFound(id.to_string()));
        }
        self.default_profile = Some(id.to_string());
        Ok(())
    }

    pub fn default_profile_id(&self) -> Option<&str> {
        self.default_profile.as_deref()
    }

    /// Remove a profile. A removed default falls back to the first remaining id.
    pub fn remove_profile(&mut self, id: &str) -> Option<AttestationProfile> {
        let removed = self.profiles.remove(id)?;
        if self.default_profile.as_deref() == Some(id) {
            self.default_profile = self.profiles.keys().next().cloned();
        }
        debug!(parent: &self.span, profile_id = %id, "Profile removed");
        Some(removed)
    }

    pub fn profile(&self, id: &str) -> Option<&AttestationProfile> {
        self.profiles.get(id)
    }

    /// All profiles, ordered by id.
    pub fn profiles(&self) -> Vec<&AttestationProfile> {
        self.profiles.values().collect()
    }

    /// Resolve a profile (or the default) into an attestor.
    pub fn create_attestor(
        &self,
        profile_id: Option<&str>,
        overrides: AttestorOverrides,
    ) -> Result<CreatedAttestor> {
        let profile = self.resolve(profile_id)?;

        let mut binding = profile.binding.merged(&overrides.binding);
        binding
            .attestor_options
            .extend(overrides.attestor_options.clone());

        let attestor: Arc<dyn LicenseAttestor> = match (&overrides.attestor, &profile.source) {
            (Some(attestor), _) => Arc::clone(attestor),
            (None, ProfileSource::Factory(factory)) => factory(FactoryArgs {
                profile,
                attestor_options: &binding.attestor_options,
                overrides: &overrides,
            })?,
            (None, ProfileSource::Instance(attestor)) => Arc::clone(attestor),
            (None, ProfileSource::Literal(config)) => {
                let config = config
                    .merged_with(&binding.attestor_options)
                    .map_err(|e| Error::InvalidProfile(format!("{}: {}", profile.id, e)))?;
                Arc::new(self.build_remote(profile, config))
            }
        };

        info!(parent: &self.span, profile_id = %profile.id, "Attestor created from profile");
        Ok(CreatedAttestor {
            attestor,
            binding,
            profile: profile.clone(),
        })
    }

    fn resolve(&self, profile_id: Option<&str>) -> Result<&AttestationProfile> {
        let id = match profile_id {
            Some(id) => id,
            None => self.default_profile.as_deref().ok_or(Error::NoDefaultProfile)?,
        };
        self.profiles
            .get(id)
            .ok_or_else(|| Error::ProfileNotFound(id.to_string()))
    }

    fn build_remote(
        &self,
        profile: &AttestationProfile,
        config: crate::attestor::RemoteAttestorConfig,
    ) -> RemoteLicenseAttestor {
        let mut builder = RemoteLicenseAttestor::builder(config).span(info_span!(
            parent: &self.span,
            "remote_attestor",
            profile_id = %profile.id
        ));
        if let Some(transport) = &self.transport {
            builder = builder.transport(Arc::clone(transport));
        }
        if let Some(clock) = &self.clock {
            builder = builder.clock(Arc::clone(clock));
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestor::{BindingOptions, RemoteAttestorConfig};
    use serde_json::json;

    fn literal(id: &str) -> AttestationProfile {
        AttestationProfile::literal(
            id,
            RemoteAttestorConfig::with_base_url("https://attest.test/v1"),
        )
    }

    #[test]
    fn test_first_profile_becomes_default() {
        let mut registry = LicenseAttestationProfileRegistry::new();
        registry.register_profile(literal("a")).unwrap();
        registry.register_profile(literal("b")).unwrap();
        assert_eq!(registry.default_profile_id(), Some("a"));

        registry.set_default_profile("b").unwrap();
        assert_eq!(registry.default_profile_id(), Some("b"));
        assert!(registry.set_default_profile("missing").is_err());
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut registry = LicenseAttestationProfileRegistry::new();
        let err = registry.register_profile(literal(" ")).unwrap_err();
        assert!(matches!(err, Error::InvalidProfile(_)));
    }

    #[test]
    fn test_remove_reassigns_default() {
        let mut registry = LicenseAttestationProfileRegistry::new();
        registry.register_profile(literal("a")).unwrap();
        registry.register_profile(literal("b")).unwrap();

        assert!(registry.remove_profile("a").is_some());
        assert_eq!(registry.default_profile_id(), Some("b"));
        assert!(registry.remove_profile("b").is_some());
        assert_eq!(registry.default_profile_id(), None);
        assert!(registry.remove_profile("b").is_none());
    }

    #[test]
    fn test_resolution_errors() {
        let registry = LicenseAttestationProfileRegistry::new();
        let err = registry
            .create_attestor(None, AttestorOverrides::default())
            .err()
            .unwrap();
        assert_eq!(err.code(), "PROFILE_DEFAULT_MISSING");

        let err = registry
            .create_attestor(Some("nope"), AttestorOverrides::default())
            .err()
            .unwrap();
        assert_eq!(err.code(), "PROFILE_NOT_FOUND");
    }

    #[test]
    fn test_binding_and_options_merge() {
        let mut registry = LicenseAttestationProfileRegistry::new();
        let binding: BindingOptions = serde_json::from_value(json!({
            "immediate": false,
            "attestor_options": {"poll_interval_ms": 60000},
            "channel": "stable"
        }))
        .unwrap();
        registry
            .register_profile(literal("eu").with_binding(binding))
            .unwrap();

        let overrides = AttestorOverrides::default()
            .with_attestor_options(json!({"fail_open": true}).as_object().cloned().unwrap())
            .with_binding(serde_json::from_value(json!({"channel": "beta"})).unwrap());
        let created = registry.create_attestor(None, overrides).unwrap();

        assert_eq!(created.profile.id, "eu");
        assert!(!created.binding.immediate());
        assert_eq!(created.binding.extra["channel"], json!("beta"));
        assert_eq!(created.binding.attestor_options["fail_open"], json!(true));
        assert_eq!(
            created.binding.attestor_options["poll_interval_ms"],
            json!(60000)
        );
    }

    #[test]
    fn test_factory_receives_merged_options() {
        let mut registry = LicenseAttestationProfileRegistry::new();
        registry
            .register_profile(AttestationProfile::factory("custom", |args| {
                assert_eq!(args.profile.id, "custom");
                assert_eq!(args.attestor_options["fail_open"], json!(true));
                let config = RemoteAttestorConfig::default()
                    .merged_with(args.attestor_options)
                    .map_err(|e| Error::InvalidProfile(e.to_string()))?;
                Ok(Arc::new(RemoteLicenseAttestor::new(config)) as Arc<dyn LicenseAttestor>)
            }))
            .unwrap();

        let overrides = AttestorOverrides::default()
            .with_attestor_options(json!({"fail_open": true}).as_object().cloned().unwrap());
        assert!(registry.create_attestor(Some("custom"), overrides).is_ok());
    }

    #[test]
    fn test_override_attestor_wins() {
        let mut registry = LicenseAttestationProfileRegistry::new();
        registry
            .register_profile(AttestationProfile::factory("never", |_| {
                Err(Error::Internal("factory should not run".to_string()))
            }))
            .unwrap();

        let instance: Arc<dyn LicenseAttestor> =
            Arc::new(RemoteLicenseAttestor::new(RemoteAttestorConfig::default()));
        let overrides = AttestorOverrides::default().with_attestor(Arc::clone(&instance));
        let created = registry.create_attestor(Some("never"), overrides).unwrap();
        assert!(Arc::ptr_eq(&created.attestor, &instance));
    }

    #[test]
    fn test_invalid_attestor_options() {
        let mut registry = LicenseAttestationProfileRegistry::new();
        registry.register_profile(literal("eu")).unwrap();

        let overrides = AttestorOverrides::default()
            .with_attestor_options(json!({"history_limit": "many"}).as_object().cloned().unwrap());
        let err = registry.create_attestor(Some("eu"), overrides).err().unwrap();
        assert!(matches!(err, Error::InvalidProfile(_)));
    }
}
