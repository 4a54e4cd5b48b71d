//! Remote license attestation.
//!
//! A [`RemoteLicenseAttestor`] runs a three-stage check against the
//! licensing backend (attest, revocation, entitlements), exposes it to a
//! [`LicenseManager`] as a validator, and re-validates on a schedule driven
//! by server hints.

mod config;
mod events;
mod result;

pub use config::{BindingOptions, RemoteAttestorConfig};
pub use events::{AttestorEvent, ErrorKind, EventKind};
pub use result::{
    AttestationOutcome, AttestationResult, EntitlementsOutcome, RevocationOutcome, Skipped,
    StageResult,
};

use crate::listeners::{ListenerId, Listeners, panic_message};
use crate::manager::LicenseManager;
use crate::transport::ReqwestTransport;
use crate::validator::{Validator, ValidatorId, ValidatorOutcome};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tollgate_core::reason;
use tollgate_core::{
    Clock, Error, HttpRequest, HttpTransport, License, LicenseState, LicenseStatus, Result,
    SystemClock, ValidationContext, parse_timestamp,
};
use tracing::{Span, debug, info, info_span, warn};

/// Something that can contribute a validator to a license manager and
/// keep itself attached to it.
#[async_trait]
pub trait LicenseAttestor: Send + Sync {
    /// Validator compatible with [`LicenseManager::register_validator`].
    fn create_validator(&self) -> Arc<dyn Validator>;

    /// Attach to `manager`, replacing any previous binding.
    async fn bind_to_license_manager(
        &self,
        manager: &Arc<LicenseManager>,
        options: BindingOptions,
    ) -> Result<()>;

    /// Undo the binding. Idempotent.
    fn detach(&self);

    /// Whether the current binding targets `manager`.
    fn is_bound_to(&self, manager: &LicenseManager) -> bool;
}

type EventListener = dyn Fn(&AttestorEvent) + Send + Sync;

struct Binding {
    manager: Weak<LicenseManager>,
    validator_id: ValidatorId,
    listener_id: ListenerId,
    context: ValidationContext,
}

struct PendingTimer {
    seq: u64,
    handle: JoinHandle<()>,
}

struct AttestorInner {
    config: RemoteAttestorConfig,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    listeners: Listeners<EventListener>,
    history: Mutex<VecDeque<AttestationResult>>,
    last_result: Mutex<Option<AttestationResult>>,
    binding: Mutex<Option<Binding>>,
    timer: Mutex<Option<PendingTimer>>,
    timer_seq: AtomicU64,
    span: Span,
}

/// Builder for [`RemoteLicenseAttestor`].
pub struct RemoteLicenseAttestorBuilder {
    config: RemoteAttestorConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    clock: Option<Arc<dyn Clock>>,
    span: Option<Span>,
}

impl RemoteLicenseAttestorBuilder {
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> RemoteLicenseAttestor {
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        RemoteLicenseAttestor {
            inner: Arc::new(AttestorInner {
                config: self.config,
                transport,
                clock,
                listeners: Listeners::new(),
                history: Mutex::new(VecDeque::new()),
                last_result: Mutex::new(None),
                binding: Mutex::new(None),
                timer: Mutex::new(None),
                timer_seq: AtomicU64::new(0),
                span: self.span.unwrap_or_else(|| info_span!("remote_attestor")),
            }),
        }
    }
}

/// Remote attest/revocation/entitlements pipeline.
#[derive(Clone)]
pub struct RemoteLicenseAttestor {
    inner: Arc<AttestorInner>,
}

impl RemoteLicenseAttestor {
    /// Attestor using the default reqwest transport and system clock.
    pub fn new(config: RemoteAttestorConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: RemoteAttestorConfig) -> RemoteLicenseAttestorBuilder {
        RemoteLicenseAttestorBuilder {
            config,
            transport: None,
            clock: None,
            span: None,
        }
    }

    pub fn config(&self) -> &RemoteAttestorConfig {
        &self.inner.config
    }

    pub async fn attest(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<StageResult<AttestationOutcome>> {
        self.inner.attest(license, context).await
    }

    pub async fn check_revocation(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<StageResult<RevocationOutcome>> {
        self.inner.check_revocation(license, context).await
    }

    pub async fn sync_entitlements(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<StageResult<EntitlementsOutcome>> {
        self.inner.sync_entitlements(license, context).await
    }

    /// Run all stages in order, stopping on an invalid or revoked license.
    pub async fn run_attestation(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<AttestationResult> {
        self.inner.run_attestation(license, context).await
    }

    /// Schedule the next validation of the bound manager and return the
    /// effective delay.
    pub fn schedule_next(&self, delay_ms: Option<i64>, context: ValidationContext) -> Result<u64> {
        self.inner.schedule_next(delay_ms, context)
    }

    /// Subscribe to one kind of event.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&AttestorEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(move |event: &AttestorEvent| {
            if event.kind() == kind {
                listener(event);
            }
        }))
    }

    /// Subscribe to every event.
    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&AttestorEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Recent results, oldest first.
    pub fn history(&self) -> Vec<AttestationResult> {
        self.inner.history.lock().iter().cloned().collect()
    }

    pub fn last_result(&self) -> Option<AttestationResult> {
        self.inner.last_result.lock().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.inner.binding.lock().is_some()
    }

    pub fn has_pending_schedule(&self) -> bool {
        self.inner.timer.lock().is_some()
    }
}

#[async_trait]
impl LicenseAttestor for RemoteLicenseAttestor {
    fn create_validator(&self) -> Arc<dyn Validator> {
        Arc::new(AttestationValidator {
            inner: Arc::clone(&self.inner),
        })
    }

    async fn bind_to_license_manager(
        &self,
        manager: &Arc<LicenseManager>,
        options: BindingOptions,
    ) -> Result<()> {
        AttestorInner::bind(&self.inner, manager, options).await;
        Ok(())
    }

    fn detach(&self) {
        self.inner.detach();
    }

    fn is_bound_to(&self, manager: &LicenseManager) -> bool {
        self.inner
            .binding
            .lock()
            .as_ref()
            .is_some_and(|binding| std::ptr::eq(binding.manager.as_ptr(), manager))
    }
}

impl AttestorInner {
    async fn attest(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<StageResult<AttestationOutcome>> {
        let Some(url) = self.config.attestation_url.as_deref() else {
            return Ok(StageResult::skipped());
        };
        let body = self.post_stage(url, license, context).await?;
        Ok(StageResult::Completed(AttestationOutcome::from_response(
            body,
            self.clock.now(),
        )))
    }

    async fn check_revocation(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<StageResult<RevocationOutcome>> {
        let Some(url) = self.config.revocation_url.as_deref() else {
            return Ok(StageResult::skipped());
        };
        let body = self.post_stage(url, license, context).await?;
        Ok(StageResult::Completed(RevocationOutcome::from_response(
            body,
            self.clock.now(),
        )))
    }

    async fn sync_entitlements(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<StageResult<EntitlementsOutcome>> {
        let Some(url) = self.config.entitlements_url.as_deref() else {
            return Ok(StageResult::skipped());
        };
        let body = self.post_stage(url, license, context).await?;
        Ok(StageResult::Completed(EntitlementsOutcome::from_response(
            body,
            self.clock.now(),
        )))
    }

    async fn post_stage(
        &self,
        url: &str,
        license: &License,
        context: &ValidationContext,
    ) -> Result<Value> {
        debug!(parent: &self.span, url = %url, "Posting attestation request");

        let payload = json!({
            "license": license,
            "context": context,
            "timestamp": self.clock.now().to_rfc3339(),
        });
        let request = HttpRequest::post_json(url, serde_json::to_string(&payload)?)
            .with_headers(&self.config.headers)
            .with_timeout(self.config.request_timeout());

        let response = match self.config.request_timeout_ms {
            Some(timeout_ms) => {
                tokio::time::timeout(
                    Duration::from_millis(timeout_ms),
                    self.transport.post(request),
                )
                .await
                .map_err(|_| Error::Timeout { timeout_ms })??
            }
            None => self.transport.post(request).await?,
        };

        let parsed = parse_body(&response.body);
        if !response.is_success() {
            let body = parsed.unwrap_or_else(|_| Value::String(response.body.clone()));
            warn!(
                parent: &self.span,
                url = %url,
                status = response.status,
                "Attestation endpoint returned an error"
            );
            return Err(Error::HttpStatus {
                status: response.status,
                body,
            });
        }
        parsed
    }

    async fn run_attestation(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<AttestationResult> {
        let mut result = AttestationResult::default();

        let attestation = self
            .attest(license, context)
            .await
            .inspect_err(|e| self.emit_error(ErrorKind::Attestation, e))?;
        self.emit(AttestorEvent::Attestation(attestation.clone()));
        result.attestation = Some(attestation);
        if result.rejection().is_some() {
            debug!(parent: &self.span, "Remote attestation rejected license");
            return Ok(self.record(result));
        }

        let revocation = self
            .check_revocation(license, context)
            .await
            .inspect_err(|e| self.emit_error(ErrorKind::Revocation, e))?;
        self.emit(AttestorEvent::Revocation(revocation.clone()));
        result.revocation = Some(revocation);
        if result.revocation_hit().is_some() {
            debug!(parent: &self.span, "License reported revoked");
            return Ok(self.record(result));
        }

        match self.sync_entitlements(license, context).await {
            Ok(entitlements) => {
                self.emit(AttestorEvent::Entitlements(entitlements.clone()));
                result.entitlements = Some(entitlements);
            }
            Err(e) => {
                self.emit_error(ErrorKind::Entitlements, &e);
                if !self.config.fail_open {
                    return Err(e);
                }
                warn!(
                    parent: &self.span,
                    error = %e,
                    "Entitlement sync failed, continuing without entitlements"
                );
            }
        }

        Ok(self.record(result))
    }

    fn record(&self, result: AttestationResult) -> AttestationResult {
        {
            let mut history = self.history.lock();
            history.push_back(result.clone());
            while history.len() > self.config.history_limit.max(1) {
                history.pop_front();
            }
        }
        *self.last_result.lock() = Some(result.clone());
        result
    }

    /// Translate a pipeline run into a validator verdict.
    async fn validate(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<ValidatorOutcome> {
        let outcome = match self.run_attestation(license, context).await {
            Ok(result) => translate(&result)?,
            Err(e) => {
                self.emit_error(ErrorKind::Validation, &e);
                let message = e.to_string();
                if self.config.fail_open {
                    warn!(
                        parent: &self.span,
                        error = %message,
                        "Remote attestation failed, failing open"
                    );
                    ValidatorOutcome::pass().with_metadata(remote_metadata(
                        json!({"error": message, "failOpen": true}),
                    ))
                } else {
                    ValidatorOutcome::reject(reason::REMOTE_ATTESTATION_ERROR)
                        .with_metadata(remote_metadata(json!({"error": message})))
                }
            }
        };
        self.emit(AttestorEvent::Validation(outcome.clone()));
        Ok(outcome)
    }

    async fn bind(this: &Arc<Self>, manager: &Arc<LicenseManager>, options: BindingOptions) {
        this.detach();

        let validator_id = manager.register_validator(Arc::new(AttestationValidator {
            inner: Arc::clone(this),
        }));
        let weak = Arc::downgrade(this);
        let listener_id = manager.on_status_change(move |status| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_status(status);
            }
        });

        let context = options.context();
        *this.binding.lock() = Some(Binding {
            manager: Arc::downgrade(manager),
            validator_id,
            listener_id,
            context: context.clone(),
        });
        info!(
            parent: &this.span,
            immediate = options.immediate(),
            "Attestor bound to license manager"
        );

        let has_key = manager
            .license()
            .is_some_and(|license| !license.key.trim().is_empty());
        if !has_key {
            return;
        }

        if options.immediate() {
            let validation = AssertUnwindSafe(manager.validate(&context)).catch_unwind();
            if let Err(payload) = validation.await {
                this.emit_error_message(
                    ErrorKind::InitialValidation,
                    panic_message(payload.as_ref()),
                );
            }
        } else if let Err(e) = this.schedule_next(None, context) {
            this.emit_error(ErrorKind::InitialValidation, &e);
        }
    }

    fn handle_status(self: &Arc<Self>, status: &LicenseStatus) {
        match status.state {
            LicenseState::Valid => {
                let delay = self.hinted_delay(status);
                let context = self
                    .binding
                    .lock()
                    .as_ref()
                    .map(|binding| binding.context.clone())
                    .unwrap_or_default();
                if let Err(e) = self.schedule_next(delay, context) {
                    self.emit_error(ErrorKind::ScheduledValidation, &e);
                }
            }
            LicenseState::Unregistered => {
                debug!(parent: &self.span, "License unregistered, detaching attestor");
                self.detach();
            }
            _ => {}
        }
    }

    /// Server-suggested delay before the next check, if any.
    fn hinted_delay(&self, status: &LicenseStatus) -> Option<i64> {
        if let Some(ms) = status
            .metadata_pointer("/remote/attestation/nextCheckInMs")
            .and_then(as_millis)
        {
            return Some(ms);
        }
        if let Some(at) = status
            .metadata_pointer("/remote/attestation/nextCheckAt")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
        {
            return Some((at - self.clock.now()).num_milliseconds());
        }
        status
            .metadata_pointer("/remote/entitlements/ttlMs")
            .and_then(as_millis)
    }

    fn schedule_next(
        self: &Arc<Self>,
        delay_ms: Option<i64>,
        context: ValidationContext,
    ) -> Result<u64> {
        let requested = delay_ms
            .and_then(|ms| u64::try_from(ms).ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(self.config.poll_interval_ms);
        let effective = requested.max(self.config.minimum_poll_interval_ms);
        let weak = Arc::downgrade(self);

        let previous = {
            // Held across the binding check and spawn so that neither detach
            // nor the task itself can interleave before the slot is filled.
            let mut timer = self.timer.lock();
            let manager = self
                .binding
                .lock()
                .as_ref()
                .map(|binding| binding.manager.clone())
                .ok_or(Error::NotBound)?;
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| Error::Internal(format!("No tokio runtime for scheduling: {}", e)))?;
            let seq = self.timer_seq.fetch_add(1, Ordering::Relaxed) + 1;
            let handle = runtime.spawn(async move {
                tokio::time::sleep(Duration::from_millis(effective)).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.claim_timer(seq) {
                    return;
                }
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                debug!(parent: &inner.span, "Running scheduled validation");
                let validation = AssertUnwindSafe(manager.validate(&context)).catch_unwind();
                if let Err(payload) = validation.await {
                    inner.emit_error_message(
                        ErrorKind::ScheduledValidation,
                        panic_message(payload.as_ref()),
                    );
                }
            });
            timer.replace(PendingTimer { seq, handle })
        };
        if let Some(previous) = previous {
            previous.handle.abort();
        }

        let now = self.clock.now();
        let next_run_at = i64::try_from(effective)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        info!(
            parent: &self.span,
            delay_ms = effective,
            next_run_at = %next_run_at,
            "Scheduled next attestation"
        );
        self.emit(AttestorEvent::Schedule {
            delay_ms: effective,
            next_run_at,
        });
        Ok(effective)
    }

    /// Take ownership of the pending timer if it is still ours.
    fn claim_timer(&self, seq: u64) -> bool {
        let mut timer = self.timer.lock();
        if timer.as_ref().is_some_and(|pending| pending.seq == seq) {
            timer.take();
            true
        } else {
            false
        }
    }

    fn detach(&self) {
        let binding = {
            let mut timer = self.timer.lock();
            if let Some(pending) = timer.take() {
                pending.handle.abort();
            }
            self.binding.lock().take()
        };
        if let Some(binding) = binding {
            if let Some(manager) = binding.manager.upgrade() {
                manager.unregister_validator(binding.validator_id);
                manager.remove_status_listener(binding.listener_id);
            }
            info!(parent: &self.span, "Attestor detached");
        }
    }

    fn emit(&self, event: AttestorEvent) {
        for listener in self.listeners.snapshot() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                warn!(
                    parent: &self.span,
                    event = ?event.kind(),
                    error = %panic_message(payload.as_ref()),
                    "Attestor listener panicked"
                );
            }
        }
    }

    fn emit_error(&self, kind: ErrorKind, error: &Error) {
        self.emit_error_message(kind, error.to_string());
    }

    fn emit_error_message(&self, kind: ErrorKind, message: String) {
        warn!(parent: &self.span, kind = ?kind, error = %message, "Remote attestation error");
        self.emit(AttestorEvent::Error { kind, message });
    }
}

struct AttestationValidator {
    inner: Arc<AttestorInner>,
}

#[async_trait]
impl Validator for AttestationValidator {
    async fn validate(
        &self,
        license: &License,
        context: &ValidationContext,
    ) -> Result<ValidatorOutcome> {
        self.inner.validate(license, context).await
    }
}

fn translate(result: &AttestationResult) -> Result<ValidatorOutcome> {
    let remote = serde_json::to_value(result)?;

    if let Some(rejection) = result.rejection() {
        let reason = rejection
            .reason
            .clone()
            .unwrap_or_else(|| reason::REMOTE_INVALID.to_string());
        return Ok(ValidatorOutcome::reject(reason).with_metadata(remote_metadata(remote)));
    }
    if let Some(revocation) = result.revocation_hit() {
        let reason = revocation
            .reason
            .clone()
            .unwrap_or_else(|| reason::REMOTE_REVOKED.to_string());
        return Ok(ValidatorOutcome::reject(reason).with_metadata(remote_metadata(remote)));
    }

    let mut metadata = remote_metadata(remote);
    if let Some(entitlements) = result.granted_entitlements() {
        metadata.insert("entitlements".to_string(), json!(entitlements));
    }
    Ok(ValidatorOutcome::pass().with_metadata(metadata))
}

fn remote_metadata(remote: Value) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("remote".to_string(), remote);
    metadata
}

fn parse_body(body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(body)?)
}

fn as_millis(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|ms| ms as i64))
}
