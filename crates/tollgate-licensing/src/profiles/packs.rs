//! Built-in profile templates, instantiated once per region.

use super::{AttestationProfile, ProfileSla};
use crate::attestor::RemoteAttestorConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tollgate_core::Error;

pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{region}.attest.tollgate.dev/v1";

/// Built-in profile packs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfilePack {
    /// Strict, fail-closed checks for enterprise tenants.
    EnterpriseSaas,
    /// Relaxed cadence, fail-open for self-serve plans.
    Growth,
    /// Long-lived offline deployments without a revocation feed.
    EdgeOffline,
}

impl ProfilePack {
    pub const ALL: [ProfilePack; 3] = [
        ProfilePack::EnterpriseSaas,
        ProfilePack::Growth,
        ProfilePack::EdgeOffline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfilePack::EnterpriseSaas => "enterprise-saas",
            ProfilePack::Growth => "growth",
            ProfilePack::EdgeOffline => "edge-offline",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ProfilePack::EnterpriseSaas => "Enterprise SaaS",
            ProfilePack::Growth => "Growth",
            ProfilePack::EdgeOffline => "Edge Offline",
        }
    }

    fn segment(&self) -> &'static str {
        match self {
            ProfilePack::EnterpriseSaas => "enterprise",
            ProfilePack::Growth => "self-serve",
            ProfilePack::EdgeOffline => "edge",
        }
    }

    fn sla(&self) -> ProfileSla {
        let (target, availability, retry) = match self {
            ProfilePack::EnterpriseSaas => {
                (250, 99.95, "3 retries, exponential backoff from 200ms")
            }
            ProfilePack::Growth => (500, 99.9, "2 retries, fixed 1s delay"),
            ProfilePack::EdgeOffline => (2000, 99.5, "retry on next scheduled check"),
        };
        ProfileSla {
            response_target_ms: Some(target),
            availability: Some(availability),
            retry_policy: Some(retry.to_string()),
        }
    }

    fn config(&self, endpoint: &str, options: &PackOptions) -> RemoteAttestorConfig {
        let mut config = RemoteAttestorConfig::with_base_url(endpoint);
        config.headers = options.headers.clone();
        match self {
            ProfilePack::EnterpriseSaas => {
                config.fail_open = false;
                config.poll_interval_ms = 15 * 60 * 1000;
                config.minimum_poll_interval_ms = 60 * 1000;
            }
            ProfilePack::Growth => {
                config.fail_open = true;
                config.poll_interval_ms = 60 * 60 * 1000;
                config.minimum_poll_interval_ms = 5 * 60 * 1000;
            }
            ProfilePack::EdgeOffline => {
                config.fail_open = true;
                config.revocation_url = None;
                config.poll_interval_ms = 6 * 60 * 60 * 1000;
                config.minimum_poll_interval_ms = 15 * 60 * 1000;
                config.request_timeout_ms = Some(30_000);
            }
        }
        if let Some(fail_open) = options.fail_open {
            config.fail_open = fail_open;
        }
        config
    }

    /// One profile per region, with ids `<pack>/<region>`.
    pub fn profiles(&self, options: &PackOptions) -> Vec<AttestationProfile> {
        options
            .regions
            .iter()
            .map(|region| {
                let endpoint = options.endpoint(region);
                let mut metadata = Map::new();
                metadata.insert("pack".to_string(), json!(self.as_str()));
                metadata.insert("region".to_string(), json!(region));
                metadata.insert("segment".to_string(), json!(self.segment()));

                AttestationProfile::literal(
                    format!("{}/{}", self.as_str(), region),
                    self.config(&endpoint, options),
                )
                .with_name(format!("{} ({})", self.title(), region))
                .with_description(format!("{} attestation via {}", self.title(), endpoint))
                .with_sla(self.sla())
                .with_metadata(metadata)
            })
            .collect()
    }
}

impl fmt::Display for ProfilePack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfilePack {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfilePack::ALL
            .into_iter()
            .find(|pack| pack.as_str() == s)
            .ok_or_else(|| Error::UnknownPack(s.to_string()))
    }
}

/// Options for instantiating a pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackOptions {
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    /// Base URL per region; `{region}` is substituted.
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Overrides the pack's fail-open setting.
    #[serde(default)]
    pub fail_open: Option<bool>,
}

fn default_regions() -> Vec<String> {
    vec!["global".to_string()]
}

fn default_endpoint_template() -> String {
    DEFAULT_ENDPOINT_TEMPLATE.to_string()
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            endpoint_template: default_endpoint_template(),
            headers: BTreeMap::new(),
            fail_open: None,
        }
    }
}

impl PackOptions {
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn endpoint(&self, region: &str) -> String {
        self.endpoint_template.replace("{region}", region)
    }
}
