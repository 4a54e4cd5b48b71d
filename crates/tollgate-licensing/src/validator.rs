//! Pluggable validators consulted by the license manager.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tollgate_core::{License, Result, ValidationContext};

/// Handle returned by [`crate::LicenseManager::register_validator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidatorId(pub(crate) u64);

/// Verdict produced by a validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatorOutcome {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ValidatorOutcome {
    pub fn pass() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl From<bool> for ValidatorOutcome {
    fn from(valid: bool) -> Self {
        Self {
            valid,
            ..Default::default()
        }
    }
}

/// Async license check. Returning `Err` marks the pass as `VALIDATOR_ERROR`.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<ValidatorOutcome>;
}

struct FnValidator<F>(F);

#[async_trait]
impl<F, Fut> Validator for FnValidator<F>
where
    F: Fn(License, ValidationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ValidatorOutcome>> + Send,
{
    async fn validate(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<ValidatorOutcome> {
        (self.0)(license.clone(), context.clone()).await
    }
}

/// Wrap an async closure as a validator.
pub fn validator_fn<F, Fut>(f: F) -> Arc<dyn Validator>
where
    F: Fn(License, ValidationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ValidatorOutcome>> + Send + 'static,
{
    Arc::new(FnValidator(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validator_fn_receives_license() {
        let validator = validator_fn(|license: License, _ctx| async move {
            Ok(ValidatorOutcome::from(license.has_feature("core")))
        });

        let license = License::new("key").with_features(["core"]);
        let outcome = validator
            .validate(&license, &ValidationContext::new())
            .await
            .unwrap();
        assert!(outcome.valid);
        assert!(outcome.reason.is_none());
    }

    #[test]
    fn test_outcome_serialization_skips_empty_fields() {
        let json = serde_json::to_value(ValidatorOutcome::pass()).unwrap();
        assert_eq!(json, serde_json::json!({"valid": true}));

        let json = serde_json::to_value(ValidatorOutcome::reject("SEAT_LIMIT")).unwrap();
        assert_eq!(json, serde_json::json!({"valid": false, "reason": "SEAT_LIMIT"}));
    }
}
