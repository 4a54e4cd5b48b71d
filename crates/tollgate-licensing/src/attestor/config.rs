//! Remote attestor and binding configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tollgate_core::ValidationContext;

/// Remote attestor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAttestorConfig {
    /// Attestation endpoint. The stage is skipped when unset.
    #[serde(default)]
    pub attestation_url: Option<String>,
    /// Revocation endpoint. The stage is skipped when unset.
    #[serde(default)]
    pub revocation_url: Option<String>,
    /// Entitlements endpoint. The stage is skipped when unset.
    #[serde(default)]
    pub entitlements_url: Option<String>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Treat remote failures as valid.
    #[serde(default)]
    pub fail_open: bool,
    /// Poll interval when the server gives no hint.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Floor applied to every scheduled delay.
    #[serde(default = "default_minimum_poll_interval_ms")]
    pub minimum_poll_interval_ms: u64,
    /// Attestation results kept in history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Per-request deadline. `None` waits on the transport.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    15 * 60 * 1000
}

fn default_minimum_poll_interval_ms() -> u64 {
    30 * 1000
}

fn default_history_limit() -> usize {
    50
}

fn default_request_timeout_ms() -> Option<u64> {
    Some(10_000)
}

impl Default for RemoteAttestorConfig {
    fn default() -> Self {
        Self {
            attestation_url: None,
            revocation_url: None,
            entitlements_url: None,
            headers: BTreeMap::new(),
            fail_open: false,
            poll_interval_ms: default_poll_interval_ms(),
            minimum_poll_interval_ms: default_minimum_poll_interval_ms(),
            history_limit: default_history_limit(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl RemoteAttestorConfig {
    /// Point all three stages at `<base>/attest`, `<base>/revocation` and
    /// `<base>/entitlements`.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            attestation_url: Some(format!("{}/attest", base)),
            revocation_url: Some(format!("{}/revocation", base)),
            entitlements_url: Some(format!("{}/entitlements", base)),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Overlay a JSON object of options onto this config.
    pub fn merged_with(&self, options: &Map<String, Value>) -> serde_json::Result<Self> {
        if options.is_empty() {
            return Ok(self.clone());
        }
        let mut base = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        base.extend(options.clone());
        serde_json::from_value(Value::Object(base))
    }
}

/// How an attestor attaches to a license manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingOptions {
    /// Validate immediately when the manager already holds a license.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate: Option<bool>,
    /// Context passed to attestor-triggered validations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ValidationContext>,
    /// Attestor options applied when a profile instantiates its attestor.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attestor_options: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BindingOptions {
    pub fn deferred() -> Self {
        Self {
            immediate: Some(false),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: ValidationContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn immediate(&self) -> bool {
        self.immediate.unwrap_or(true)
    }

    pub fn context(&self) -> ValidationContext {
        self.context.clone().unwrap_or_default()
    }

    /// Overrides win key by key; `attestor_options` merges one level deeper.
    pub fn merged(&self, overrides: &BindingOptions) -> BindingOptions {
        let mut attestor_options = self.attestor_options.clone();
        attestor_options.extend(overrides.attestor_options.clone());

        let mut extra = self.extra.clone();
        extra.extend(overrides.extra.clone());

        BindingOptions {
            immediate: overrides.immediate.or(self.immediate),
            context: overrides.context.clone().or_else(|| self.context.clone()),
            attestor_options,
            extra,
        }
    }
}
