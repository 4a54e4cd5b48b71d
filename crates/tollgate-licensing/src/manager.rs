//! License store and validator chain.

use crate::attestor::{BindingOptions, LicenseAttestor};
use crate::listeners::{ListenerId, Listeners, panic_message};
use crate::validator::{Validator, ValidatorId, ValidatorOutcome};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tollgate_core::reason;
use tollgate_core::{
    Clock, Error, License, LicenseState, LicenseStatus, Result, StatusSnapshot, SystemClock,
    ValidationContext,
};
use tracing::{Span, debug, info, info_span, warn};

/// Number of status snapshots retained in the validation history.
pub const HISTORY_LIMIT: usize = 50;

type StatusListener = dyn Fn(&LicenseStatus) + Send + Sync;

struct ManagerState {
    license: Option<License>,
    status: LicenseStatus,
    history: VecDeque<StatusSnapshot>,
}

/// Holds the current license and its validation status.
///
/// Overlapping [`validate`](Self::validate) calls are not serialized: each
/// pass evaluates a snapshot of the license and validators, and whichever
/// finishes last determines the stored status.
pub struct LicenseManager {
    state: Mutex<ManagerState>,
    validators: Mutex<Vec<(ValidatorId, Arc<dyn Validator>)>>,
    next_validator_id: AtomicU64,
    listeners: Listeners<StatusListener>,
    attestor: Mutex<Option<Arc<dyn LicenseAttestor>>>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
    span: Span,
}

impl Default for LicenseManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseManager {
    /// Create a manager with no license, using the system clock.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManagerState {
                license: None,
                status: LicenseStatus::default(),
                history: VecDeque::new(),
            }),
            validators: Mutex::new(Vec::new()),
            next_validator_id: AtomicU64::new(1),
            listeners: Listeners::new(),
            attestor: Mutex::new(None),
            clock: Arc::new(SystemClock),
            history_limit: HISTORY_LIMIT,
            span: info_span!("license_manager"),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Parent span for this manager's log events.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Replace the current license. `None` unregisters; a keyed license
    /// always moves to `pending`.
    pub fn set_license(&self, license: impl Into<Option<License>>) -> Result<LicenseStatus> {
        let license = license.into();
        if license.as_ref().is_some_and(|l| l.key.is_empty()) {
            return Err(Error::MissingKey);
        }

        let status = match license {
            Some(_) => LicenseStatus::new(LicenseState::Pending, reason::PENDING_VALIDATION),
            None => LicenseStatus::new(LicenseState::Unregistered, reason::NO_LICENSE),
        };
        self.state.lock().license = license;
        self.transition(status.clone());
        Ok(status)
    }

    /// Remove the license from any state.
    pub fn clear_license(&self) -> LicenseStatus {
        let status = LicenseStatus::new(LicenseState::Unregistered, reason::NO_LICENSE);
        self.state.lock().license = None;
        self.transition(status.clone());
        status
    }

    /// Run local checks and every registered validator.
    pub async fn validate(&self, context: &ValidationContext) -> LicenseStatus {
        let license = self.state.lock().license.clone();
        let status = match license {
            None => LicenseStatus::new(LicenseState::Unregistered, reason::NO_LICENSE),
            Some(license) => self.evaluate(&license, context).await,
        };
        self.transition(status.clone());
        status
    }

    async fn evaluate(&self, license: &License, context: &ValidationContext) -> LicenseStatus {
        let now = self.clock.now();

        if license.key.trim().is_empty() {
            return LicenseStatus::new(LicenseState::Invalid, reason::MISSING_KEY).validated_at(now);
        }

        match license.expiry() {
            Err(e) => {
                warn!(parent: &self.span, error = %e, "License expiry is not a valid timestamp");
                return LicenseStatus::new(LicenseState::Invalid, reason::INVALID_EXPIRY)
                    .validated_at(now);
            }
            Ok(Some(expires_at)) if now >= expires_at => {
                warn!(parent: &self.span, expires_at = %expires_at, "License has expired");
                return LicenseStatus::new(LicenseState::Expired, reason::LICENSE_EXPIRED)
                    .validated_at(now);
            }
            Ok(_) => {}
        }

        let validators: Vec<Arc<dyn Validator>> = self
            .validators
            .lock()
            .iter()
            .map(|(_, validator)| Arc::clone(validator))
            .collect();

        let mut merged = MetadataMerge::default();
        for (index, validator) in validators.iter().enumerate() {
            match validator.validate(license, context).await {
                Ok(ValidatorOutcome {
                    valid: true,
                    metadata,
                    ..
                }) => {
                    if let Some(metadata) = metadata {
                        let granted = merged.absorb(metadata);
                        self.grant_features(&license.key, granted);
                    }
                }
                Ok(ValidatorOutcome {
                    reason: rejection,
                    metadata,
                    ..
                }) => {
                    let rejection =
                        rejection.unwrap_or_else(|| reason::VALIDATOR_REJECTED.to_string());
                    debug!(
                        parent: &self.span,
                        validator = index,
                        reason = %rejection,
                        "Validator rejected license"
                    );
                    if let Some(metadata) = metadata {
                        merged.absorb(metadata);
                    }
                    return LicenseStatus::new(LicenseState::Invalid, rejection)
                        .validated_at(self.clock.now())
                        .with_metadata(merged.finish());
                }
                Err(e) => {
                    warn!(parent: &self.span, validator = index, error = %e, "Validator failed");
                    return LicenseStatus::new(LicenseState::Invalid, reason::VALIDATOR_ERROR)
                        .validated_at(self.clock.now())
                        .with_metadata(merged.finish())
                        .with_error(e.to_string());
                }
            }
        }

        LicenseStatus::new(LicenseState::Valid, reason::VALID)
            .validated_at(self.clock.now())
            .with_metadata(merged.finish())
    }

    /// Union granted entitlements into the stored license, if it is still
    /// the one that was validated.
    fn grant_features(&self, key: &str, granted: BTreeSet<String>) {
        if granted.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        if let Some(license) = state.license.as_mut().filter(|l| l.key == key) {
            license.features.extend(granted);
        }
    }

    fn transition(&self, status: LicenseStatus) {
        {
            let mut state = self.state.lock();
            state.status = status.clone();
            state.history.push_back(StatusSnapshot {
                status: status.clone(),
                timestamp: self.clock.now(),
            });
            while state.history.len() > self.history_limit {
                state.history.pop_front();
            }
        }

        info!(
            parent: &self.span,
            state = %status.state,
            reason = status.reason.as_deref().unwrap_or_default(),
            "License status changed"
        );

        for listener in self.listeners.snapshot() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(&status))) {
                warn!(
                    parent: &self.span,
                    error = %panic_message(payload.as_ref()),
                    "Status listener panicked"
                );
            }
        }
        self.prune_attestor();
    }

    /// Append a validator; registration order is execution order.
    pub fn register_validator(&self, validator: Arc<dyn Validator>) -> ValidatorId {
        let id = ValidatorId(self.next_validator_id.fetch_add(1, Ordering::Relaxed));
        self.validators.lock().push((id, validator));
        debug!(parent: &self.span, validator_id = id.0, "Validator registered");
        id
    }

    pub fn unregister_validator(&self, id: ValidatorId) -> bool {
        let mut validators = self.validators.lock();
        let before = validators.len();
        validators.retain(|(entry, _)| *entry != id);
        validators.len() != before
    }

    pub fn validator_count(&self) -> usize {
        self.validators.lock().len()
    }

    /// Subscribe to status changes. Listeners run synchronously, in order.
    pub fn on_status_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LicenseStatus) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    pub fn remove_status_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn status_listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Bind an attestor, detaching the previously attached one.
    pub async fn attach_attestor(
        self: &Arc<Self>,
        attestor: Arc<dyn LicenseAttestor>,
        options: BindingOptions,
    ) -> Result<()> {
        let previous = self.attestor.lock().take();
        if let Some(previous) = previous {
            self.release(previous.as_ref());
        }
        attestor.bind_to_license_manager(self, options).await?;

        // Stored after binding so the initial validation cannot prune it.
        let replaced = self.attestor.lock().replace(Arc::clone(&attestor));
        if let Some(replaced) = replaced.filter(|r| !same_attestor(r, &attestor)) {
            self.release(replaced.as_ref());
        }
        Ok(())
    }

    pub fn detach_attestor(&self) {
        let attached = self.attestor.lock().take();
        if let Some(attestor) = attached {
            self.release(attestor.as_ref());
        }
    }

    /// Whether an attestor is attached and still bound to this manager.
    pub fn has_attestor(&self) -> bool {
        self.attestor
            .lock()
            .as_ref()
            .is_some_and(|attestor| attestor.is_bound_to(self))
    }

    /// Detach `attestor` only if it has not since moved to another manager.
    fn release(&self, attestor: &dyn LicenseAttestor) {
        if attestor.is_bound_to(self) {
            attestor.detach();
        } else {
            debug!(parent: &self.span, "Attached attestor already rebound elsewhere");
        }
    }

    /// Forget an attestor that detached itself or was rebound elsewhere.
    fn prune_attestor(&self) {
        let stale = {
            let mut slot = self.attestor.lock();
            if slot.as_ref().is_some_and(|attestor| !attestor.is_bound_to(self)) {
                slot.take()
            } else {
                None
            }
        };
        drop(stale);
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.state
            .lock()
            .license
            .as_ref()
            .is_some_and(|l| l.has_feature(feature))
    }

    pub fn require_feature(&self, feature: &str) -> Result<()> {
        if self.has_feature(feature) {
            Ok(())
        } else {
            Err(Error::FeatureMissing {
                feature: feature.to_string(),
            })
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().status.is_valid()
    }

    pub fn status(&self) -> LicenseStatus {
        self.state.lock().status.clone()
    }

    pub fn license(&self) -> Option<License> {
        self.state.lock().license.clone()
    }

    /// Status snapshots, oldest first.
    pub fn validation_history(&self) -> Vec<StatusSnapshot> {
        self.state.lock().history.iter().cloned().collect()
    }
}

fn same_attestor(a: &Arc<dyn LicenseAttestor>, b: &Arc<dyn LicenseAttestor>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Two-phase merge of validator metadata: top-level keys overwrite, then
/// every `entitlements` array seen is unioned.
#[derive(Default)]
struct MetadataMerge {
    merged: Map<String, Value>,
    entitlements: BTreeSet<String>,
}

impl MetadataMerge {
    /// Merge one validator's metadata and return the features it grants.
    fn absorb(&mut self, metadata: Map<String, Value>) -> BTreeSet<String> {
        let top_level = string_set(metadata.get("entitlements"));
        let mut granted = string_set(
            metadata
                .get("remote")
                .and_then(|remote| remote.pointer("/entitlements/entitlements")),
        );
        granted.extend(top_level.iter().cloned());

        self.merged.extend(metadata);
        self.entitlements.extend(top_level);
        granted
    }

    fn finish(mut self) -> Map<String, Value> {
        if !self.entitlements.is_empty() {
            let union = self.entitlements.into_iter().map(Value::String).collect();
            self.merged.insert("entitlements".to_string(), Value::Array(union));
        }
        self.merged
    }
}

fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
