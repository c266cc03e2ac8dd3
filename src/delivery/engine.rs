use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::metrics::{DeliveryMetrics, DispatchMetrics, ProbeMetrics};
use crate::notification::{
    DeliverySummary, NewNotification, Notification, NotificationStore, Payload, TargetMode,
};
use crate::provider::{PushMessage, PushProvider, ProviderError};
use crate::registration::{DeviceRegistration, RegistrationStore};
use crate::storage::StoreError;

use super::classifier::{DeliveryOutcome, SideEffect};
use super::message::OutboundTemplate;

/// Errors that abort a whole dispatch.
///
/// Per-device delivery failures never appear here; they are classified,
/// logged and counted instead.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request rejected before any state was touched
    #[error("Validation error: {0}")]
    Validation(String),

    /// Target resolution produced no active devices
    #[error("No active devices found")]
    NoEligibleTargets,

    /// Storage failed; the notification, if created, is left unfinalized
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// The dispatch task died before reporting back
    #[error("Dispatch task failed: {0}")]
    Interrupted(String),
}

/// A request to notify a set of devices
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub title: String,
    pub body: String,
    pub payload: Payload,
    pub target: TargetMode,
}

impl DispatchRequest {
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.title.trim().is_empty() || self.body.trim().is_empty() {
            return Err(DispatchError::Validation(
                "Title and body are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Aggregate result of a completed fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub notification_id: Uuid,
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// Answer of a single-token probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub deliverable: bool,
    pub outcome: DeliveryOutcome,
}

/// What happened to one device during fan-out
#[derive(Debug)]
struct EndpointReport {
    success: bool,
    deactivated: bool,
}

/// Partial sums merged once all devices have been processed
#[derive(Debug, Default)]
struct Tally {
    succeeded: u32,
    failed: u32,
    deactivated: u32,
}

impl Tally {
    fn record(&mut self, report: &EndpointReport) {
        if report.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if report.deactivated {
            self.deactivated += 1;
        }
    }
}

/// Statistics for the delivery engine
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Fan-outs that finalized their notification
    pub dispatches_completed: AtomicU64,
    /// Requests rejected before fan-out
    pub dispatches_rejected: AtomicU64,
    /// Fan-outs aborted by storage errors
    pub dispatches_failed: AtomicU64,
    pub deliveries_attempted: AtomicU64,
    pub deliveries_succeeded: AtomicU64,
    pub deliveries_failed: AtomicU64,
    pub registrations_deactivated: AtomicU64,
    pub probes: AtomicU64,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            dispatches_completed: self.dispatches_completed.load(Ordering::Relaxed),
            dispatches_rejected: self.dispatches_rejected.load(Ordering::Relaxed),
            dispatches_failed: self.dispatches_failed.load(Ordering::Relaxed),
            deliveries_attempted: self.deliveries_attempted.load(Ordering::Relaxed),
            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            registrations_deactivated: self.registrations_deactivated.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of engine statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatsSnapshot {
    pub dispatches_completed: u64,
    pub dispatches_rejected: u64,
    pub dispatches_failed: u64,
    pub deliveries_attempted: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
    pub registrations_deactivated: u64,
    pub probes: u64,
}

/// Fans a notification out to devices through the push provider
pub struct DeliveryEngine {
    registrations: Arc<dyn RegistrationStore>,
    notifications: Arc<dyn NotificationStore>,
    provider: Arc<dyn PushProvider>,
    config: DeliveryConfig,
    stats: EngineStats,
}

impl DeliveryEngine {
    pub fn new(
        registrations: Arc<dyn RegistrationStore>,
        notifications: Arc<dyn NotificationStore>,
        provider: Arc<dyn PushProvider>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            registrations,
            notifications,
            provider,
            config,
            stats: EngineStats::default(),
        }
    }

    /// Get engine statistics
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Validate, resolve targets, persist the notification and fan out.
    ///
    /// The work runs on its own task, so dropping the returned future (client
    /// disconnect, caller timeout) does not cancel attempts already handed to
    /// the provider; the notification is still logged and finalized.
    pub async fn dispatch(
        self: &Arc<Self>,
        request: DispatchRequest,
    ) -> Result<DispatchResult, DispatchError> {
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move { engine.run_dispatch(request).await });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                self.stats.dispatches_failed.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_failed();
                tracing::error!(error = %e, "Dispatch task failed");
                Err(DispatchError::Interrupted(e.to_string()))
            }
        }
    }

    /// An empty target set is rejected before the notification is created.
    #[tracing::instrument(
        name = "engine.dispatch",
        skip(self, request),
        fields(target_all = request.target.is_all())
    )]
    async fn run_dispatch(&self, request: DispatchRequest) -> Result<DispatchResult, DispatchError> {
        if let Err(e) = request.validate() {
            self.stats.dispatches_rejected.fetch_add(1, Ordering::Relaxed);
            DispatchMetrics::record_invalid();
            return Err(e);
        }

        let targets = self.resolve_targets(&request.target).await?;
        if targets.is_empty() {
            self.stats.dispatches_rejected.fetch_add(1, Ordering::Relaxed);
            DispatchMetrics::record_no_targets();
            tracing::info!("No eligible devices for notification");
            return Err(DispatchError::NoEligibleTargets);
        }

        let notification = self
            .notifications
            .create_notification(NewNotification {
                title: request.title,
                body: request.body,
                payload: request.payload,
                target: request.target,
            })
            .await?;

        self.fan_out(&notification, targets).await
    }

    /// Snapshot the active registrations addressed by `target`.
    ///
    /// The returned list is fixed for the run; deactivations made during
    /// fan-out do not remove devices from it.
    pub async fn resolve_targets(
        &self,
        target: &TargetMode,
    ) -> Result<Vec<DeviceRegistration>, DispatchError> {
        if let TargetMode::Owners(owner_ids) = target {
            if owner_ids.is_empty() {
                return Ok(Vec::new());
            }
        }
        Ok(self.registrations.list_active(target.owner_filter()).await?)
    }

    /// Deliver an already persisted notification to every target.
    ///
    /// Each device is processed in isolation with at most
    /// `max_concurrency` provider calls in flight. Every started attempt runs
    /// to completion. If any storage write failed the notification is left
    /// unfinalized and the first storage error is returned; otherwise the
    /// counters are written once.
    #[tracing::instrument(
        name = "engine.fan_out",
        skip(self, notification, targets),
        fields(notification_id = %notification.id, device_count = targets.len())
    )]
    pub async fn fan_out(
        &self,
        notification: &Notification,
        targets: Vec<DeviceRegistration>,
    ) -> Result<DispatchResult, DispatchError> {
        let targets = unique_by_id(targets);
        if targets.is_empty() {
            return Err(DispatchError::NoEligibleTargets);
        }

        DispatchMetrics::record_started(&notification.target, targets.len());
        let started = Instant::now();
        let template = OutboundTemplate::build(notification);

        let attempts: Vec<BoxFuture<'_, Result<EndpointReport, StoreError>>> = targets
            .iter()
            .map(|registration| self.deliver_one(notification.id, &template, registration).boxed())
            .collect();
        let reports: Vec<Result<EndpointReport, StoreError>> = stream::iter(attempts)
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut tally = Tally::default();
        let mut first_error = None;
        for report in reports {
            match report {
                Ok(report) => tally.record(&report),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        self.stats
            .registrations_deactivated
            .fetch_add(tally.deactivated as u64, Ordering::Relaxed);

        if let Some(e) = first_error {
            self.stats.dispatches_failed.fetch_add(1, Ordering::Relaxed);
            DispatchMetrics::record_failed();
            tracing::error!(
                notification_id = %notification.id,
                error = %e,
                "Fan-out hit a storage error, notification left unfinalized"
            );
            return Err(DispatchError::Store(e));
        }

        let summary = DeliverySummary {
            attempted: targets.len() as u32,
            succeeded: tally.succeeded,
            failed: tally.failed,
        };
        debug_assert!(summary.is_consistent());

        self.notifications
            .finalize_notification(notification.id, summary)
            .await?;

        self.stats.dispatches_completed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .deliveries_attempted
            .fetch_add(summary.attempted as u64, Ordering::Relaxed);
        self.stats
            .deliveries_succeeded
            .fetch_add(summary.succeeded as u64, Ordering::Relaxed);
        self.stats
            .deliveries_failed
            .fetch_add(summary.failed as u64, Ordering::Relaxed);
        DispatchMetrics::record_completed(started.elapsed());

        tracing::info!(
            notification_id = %notification.id,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            deactivated = tally.deactivated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Notification fan-out complete"
        );

        Ok(DispatchResult {
            notification_id: notification.id,
            attempted: summary.attempted,
            succeeded: summary.succeeded,
            failed: summary.failed,
        })
    }

    /// Check whether a single token is currently deliverable.
    ///
    /// Nothing is looked up, logged or deactivated; the token need not belong
    /// to any registration.
    #[tracing::instrument(name = "engine.probe", skip(self, token))]
    pub async fn probe(&self, token: &str) -> Result<ProbeResult, DispatchError> {
        if token.trim().is_empty() {
            return Err(DispatchError::Validation("Token is required".to_string()));
        }

        let message = PushMessage {
            token: token.to_string(),
            title: self.config.probe_title.clone(),
            body: self.config.probe_body.clone(),
            data: Payload::new(),
        };

        let outcome = DeliveryOutcome::classify(self.call_provider(&message).await);

        self.stats.probes.fetch_add(1, Ordering::Relaxed);
        ProbeMetrics::record(&outcome);
        tracing::info!(outcome = outcome.label(), "Token probe finished");

        Ok(ProbeResult {
            deliverable: outcome.is_success(),
            outcome,
        })
    }

    /// Deliver, classify, apply the side effect, then log: in that order.
    async fn deliver_one(
        &self,
        notification_id: Uuid,
        template: &OutboundTemplate,
        registration: &DeviceRegistration,
    ) -> Result<EndpointReport, StoreError> {
        let message = template.address(&registration.token);
        let outcome = DeliveryOutcome::classify(self.call_provider(&message).await);
        DeliveryMetrics::record_outcome(&outcome);

        let mut deactivated = false;
        if outcome.side_effect() == SideEffect::Deactivate {
            deactivated = self.registrations.deactivate(registration.id).await?;
            if deactivated {
                DeliveryMetrics::record_deactivated();
            }
            tracing::warn!(
                notification_id = %notification_id,
                registration_id = %registration.id,
                "Token unregistered, registration deactivated"
            );
        }

        self.notifications
            .append_log(outcome.to_log(notification_id, registration.id))
            .await?;

        match &outcome {
            DeliveryOutcome::Success(receipt) => tracing::debug!(
                notification_id = %notification_id,
                registration_id = %registration.id,
                receipt = %receipt,
                "Message sent"
            ),
            DeliveryOutcome::InvalidArgument(detail) => tracing::warn!(
                notification_id = %notification_id,
                registration_id = %registration.id,
                error = %detail,
                "Invalid argument"
            ),
            DeliveryOutcome::Unregistered(_) => {}
            DeliveryOutcome::Other(detail) => tracing::warn!(
                notification_id = %notification_id,
                registration_id = %registration.id,
                error = %detail,
                "Push delivery failed"
            ),
        }

        Ok(EndpointReport {
            success: outcome.is_success(),
            deactivated,
        })
    }

    /// Call the provider; a panicking provider counts as an `Other` failure.
    async fn call_provider(&self, message: &PushMessage) -> Result<String, ProviderError> {
        let started = Instant::now();
        let result = AssertUnwindSafe(self.provider.deliver(message))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ProviderError::Other("provider panicked".to_string())));
        DeliveryMetrics::observe_provider_latency(started.elapsed());
        result
    }
}

/// Drop repeated registrations, keeping the first occurrence
fn unique_by_id(targets: Vec<DeviceRegistration>) -> Vec<DeviceRegistration> {
    let mut seen = HashSet::with_capacity(targets.len());
    targets.into_iter().filter(|r| seen.insert(r.id)).collect()
}
