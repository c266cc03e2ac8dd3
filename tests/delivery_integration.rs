//! Delivery engine integration tests
//!
//! Drives the engine against the in-memory stores and a scripted provider,
//! so every provider outcome can be produced on demand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use ara_push_service::config::DeliveryConfig;
use ara_push_service::delivery::{
    DeliveryEngine, DeliveryOutcome, DispatchError, DispatchRequest, NOTIFICATION_ID_KEY,
    TIMESTAMP_KEY, UNREGISTERED_DETAIL,
};
use ara_push_service::notification::{
    DeliveryLogEntry, DeliveryStatus, DeliverySummary, FailureKind, MemoryNotificationStore,
    NewDeliveryLog, NewNotification, Notification, NotificationStore, Payload, TargetMode,
};
use ara_push_service::provider::{ProviderError, PushMessage, PushProvider};
use ara_push_service::registration::{DeviceType, MemoryRegistrationStore, RegistrationStore};
use ara_push_service::storage::StoreError;

/// Provider answering from a per-token script; unknown tokens succeed.
#[derive(Default)]
struct ScriptedProvider {
    script: HashMap<String, Result<String, ProviderError>>,
    sent: Mutex<Vec<PushMessage>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    fn new() -> Self {
        Self::default()
    }

    fn with(mut self, token: &str, result: Result<String, ProviderError>) -> Self {
        self.script.insert(token.to_string(), result);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushProvider for ScriptedProvider {
    async fn deliver(&self, message: &PushMessage) -> Result<String, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(message.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if message.token == "panics" {
            panic!("scripted provider panic");
        }

        self.script
            .get(&message.token)
            .cloned()
            .unwrap_or_else(|| Ok(format!("receipt-{}", message.token)))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Notification store that refuses log writes for one registration
struct FlakyNotificationStore {
    inner: MemoryNotificationStore,
    failing_registration: Mutex<Option<Uuid>>,
}

#[async_trait]
impl NotificationStore for FlakyNotificationStore {
    async fn create_notification(&self, new: NewNotification) -> Result<Notification, StoreError> {
        self.inner.create_notification(new).await
    }

    async fn finalize_notification(
        &self,
        id: Uuid,
        summary: DeliverySummary,
    ) -> Result<Notification, StoreError> {
        self.inner.finalize_notification(id, summary).await
    }

    async fn append_log(&self, entry: NewDeliveryLog) -> Result<DeliveryLogEntry, StoreError> {
        if *self.failing_registration.lock().unwrap() == Some(entry.registration_id) {
            return Err(StoreError::Postgres(sqlx::Error::PoolTimedOut));
        }
        self.inner.append_log(entry).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        self.inner.get(id).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Notification>, StoreError> {
        self.inner.list_recent(limit).await
    }

    async fn logs_for(&self, notification_id: Uuid) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        self.inner.logs_for(notification_id).await
    }

    fn backend_type(&self) -> &'static str {
        "flaky"
    }
}

struct TestEnvironment {
    registrations: Arc<MemoryRegistrationStore>,
    notifications: Arc<MemoryNotificationStore>,
    provider: Arc<ScriptedProvider>,
    engine: Arc<DeliveryEngine>,
}

fn create_test_environment(provider: ScriptedProvider) -> TestEnvironment {
    create_test_environment_with(provider, DeliveryConfig::default())
}

fn create_test_environment_with(
    provider: ScriptedProvider,
    config: DeliveryConfig,
) -> TestEnvironment {
    let registrations = Arc::new(MemoryRegistrationStore::new());
    let notifications = Arc::new(MemoryNotificationStore::new());
    let provider = Arc::new(provider);
    let engine = Arc::new(DeliveryEngine::new(
        registrations.clone(),
        notifications.clone(),
        provider.clone(),
        config,
    ));

    TestEnvironment {
        registrations,
        notifications,
        provider,
        engine,
    }
}

fn request(target: TargetMode) -> DispatchRequest {
    let mut payload = Payload::new();
    payload.insert("order_id".to_string(), json!("A-1001"));
    DispatchRequest {
        title: "Order shipped".to_string(),
        body: "Your order is on its way".to_string(),
        payload,
        target,
    }
}

async fn register(env: &TestEnvironment, token: &str, owner: Option<&str>) -> Uuid {
    let (registration, _) = env
        .registrations
        .register(token, owner, DeviceType::Web)
        .await
        .unwrap();
    registration.id
}

#[tokio::test]
async fn test_mixed_outcomes_are_isolated_per_device() {
    let provider = ScriptedProvider::new()
        .with("gone", Err(ProviderError::Unregistered("Requested entity was not found.".to_string())))
        .with("malformed", Err(ProviderError::InvalidArgument("bad registration token".to_string())))
        .with("outage", Err(ProviderError::Other("UNAVAILABLE: try later".to_string())));
    let env = create_test_environment(provider);

    let ok_id = register(&env, "healthy", None).await;
    let gone_id = register(&env, "gone", None).await;
    let malformed_id = register(&env, "malformed", None).await;
    let outage_id = register(&env, "outage", None).await;

    let result = env.engine.dispatch(request(TargetMode::All)).await.unwrap();

    assert_eq!(result.attempted, 4);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 3);

    // Only the unregistered token is deactivated
    assert!(env.registrations.get(ok_id).unwrap().active);
    assert!(!env.registrations.get(gone_id).unwrap().active);
    assert!(env.registrations.get(malformed_id).unwrap().active);
    assert!(env.registrations.get(outage_id).unwrap().active);

    // Exactly one log per device
    let logs = env.notifications.logs_for(result.notification_id).await.unwrap();
    assert_eq!(logs.len(), 4);
    let by_registration: HashMap<Uuid, &DeliveryLogEntry> =
        logs.iter().map(|l| (l.registration_id, l)).collect();

    let ok_log = by_registration[&ok_id];
    assert_eq!(ok_log.status, DeliveryStatus::Sent);
    assert_eq!(ok_log.failure_kind, None);
    assert_eq!(ok_log.error_detail, "");

    let gone_log = by_registration[&gone_id];
    assert_eq!(gone_log.status, DeliveryStatus::Failed);
    assert_eq!(gone_log.failure_kind, Some(FailureKind::Unregistered));
    assert_eq!(gone_log.error_detail, UNREGISTERED_DETAIL);

    let malformed_log = by_registration[&malformed_id];
    assert_eq!(malformed_log.failure_kind, Some(FailureKind::InvalidArgument));
    assert_eq!(malformed_log.error_detail, "bad registration token");

    let outage_log = by_registration[&outage_id];
    assert_eq!(outage_log.failure_kind, Some(FailureKind::Unknown));
    assert_eq!(outage_log.error_detail, "UNAVAILABLE: try later");

    // Counters written once and consistent with the log
    let notification = env
        .notifications
        .get(result.notification_id)
        .await
        .unwrap()
        .unwrap();
    assert!(notification.is_finalized());
    assert_eq!(notification.attempted_count, 4);
    assert_eq!(notification.success_count, 1);
    assert_eq!(notification.failure_count, 3);

    let stats = env.engine.stats();
    assert_eq!(stats.dispatches_completed, 1);
    assert_eq!(stats.registrations_deactivated, 1);
}

#[tokio::test]
async fn test_deactivated_device_is_skipped_next_time() {
    let provider = ScriptedProvider::new()
        .with("gone", Err(ProviderError::Unregistered("not found".to_string())));
    let env = create_test_environment(provider);

    register(&env, "healthy", None).await;
    register(&env, "gone", None).await;

    let first = env.engine.dispatch(request(TargetMode::All)).await.unwrap();
    assert_eq!(first.attempted, 2);

    let second = env.engine.dispatch(request(TargetMode::All)).await.unwrap();
    assert_eq!(second.attempted, 1);
    assert_eq!(second.succeeded, 1);
    assert_eq!(second.failed, 0);
}

#[tokio::test]
async fn test_re_registering_reactivates_device() {
    let provider = ScriptedProvider::new()
        .with("flappy", Err(ProviderError::Unregistered("not found".to_string())));
    let env = create_test_environment(provider);

    let id = register(&env, "flappy", None).await;
    env.engine.dispatch(request(TargetMode::All)).await.unwrap();
    assert!(!env.registrations.get(id).unwrap().active);

    let again = register(&env, "flappy", None).await;
    assert_eq!(again, id);
    assert!(env.registrations.get(id).unwrap().active);
}

#[tokio::test]
async fn test_owner_targeting() {
    let env = create_test_environment(ScriptedProvider::new());

    register(&env, "u1-phone", Some("u1")).await;
    register(&env, "u1-laptop", Some("u1")).await;
    register(&env, "u2-phone", Some("u2")).await;
    register(&env, "anonymous", None).await;

    let result = env
        .engine
        .dispatch(request(TargetMode::Owners(vec!["u1".to_string()])))
        .await
        .unwrap();
    assert_eq!(result.attempted, 2);

    let mut tokens: Vec<String> = env.provider.sent().into_iter().map(|m| m.token).collect();
    tokens.sort();
    assert_eq!(tokens, vec!["u1-laptop", "u1-phone"]);
}

#[tokio::test]
async fn test_no_eligible_targets_persists_nothing() {
    let env = create_test_environment(ScriptedProvider::new());
    register(&env, "u2-phone", Some("u2")).await;

    let err = env
        .engine
        .dispatch(request(TargetMode::Owners(vec!["nobody".to_string()])))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoEligibleTargets));

    let err = env
        .engine
        .dispatch(request(TargetMode::Owners(Vec::new())))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoEligibleTargets));

    assert!(env.notifications.list_recent(20).await.unwrap().is_empty());
    assert!(env.provider.sent().is_empty());
    assert_eq!(env.engine.stats().dispatches_rejected, 2);
}

#[tokio::test]
async fn test_validation_rejects_before_any_work() {
    let env = create_test_environment(ScriptedProvider::new());
    register(&env, "healthy", None).await;

    let mut bad = request(TargetMode::All);
    bad.title = "  ".to_string();

    let err = env.engine.dispatch(bad).await.unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
    assert!(env.notifications.list_recent(20).await.unwrap().is_empty());
    assert!(env.provider.sent().is_empty());
}

#[tokio::test]
async fn test_outbound_data_carries_reserved_keys() {
    let env = create_test_environment(ScriptedProvider::new());
    register(&env, "healthy", None).await;

    let mut req = request(TargetMode::All);
    req.payload
        .insert(NOTIFICATION_ID_KEY.to_string(), json!("spoofed"));

    let result = env.engine.dispatch(req).await.unwrap();
    let sent = env.provider.sent();
    assert_eq!(sent.len(), 1);

    let message = &sent[0];
    assert_eq!(message.title, "Order shipped");
    assert_eq!(message.data["order_id"], json!("A-1001"));
    assert_eq!(
        message.data[NOTIFICATION_ID_KEY],
        json!(result.notification_id.to_string())
    );
    assert!(message.data.contains_key(TIMESTAMP_KEY));
}

#[tokio::test]
async fn test_provider_panic_counts_as_unknown_failure() {
    let env = create_test_environment(ScriptedProvider::new());
    let panicking = register(&env, "panics", None).await;
    register(&env, "healthy", None).await;

    let result = env.engine.dispatch(request(TargetMode::All)).await.unwrap();
    assert_eq!(result.attempted, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);

    let logs = env.notifications.logs_for(result.notification_id).await.unwrap();
    let log = logs
        .iter()
        .find(|l| l.registration_id == panicking)
        .unwrap();
    assert_eq!(log.failure_kind, Some(FailureKind::Unknown));
    assert!(env.registrations.get(panicking).unwrap().active);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let provider = ScriptedProvider::new().with_delay(Duration::from_millis(20));
    let config = DeliveryConfig {
        max_concurrency: 2,
        ..DeliveryConfig::default()
    };
    let env = create_test_environment_with(provider, config);

    for i in 0..6 {
        register(&env, &format!("device-{}", i), None).await;
    }

    let result = env.engine.dispatch(request(TargetMode::All)).await.unwrap();
    assert_eq!(result.attempted, 6);
    assert_eq!(result.succeeded, 6);

    let peak = env.provider.peak_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak in-flight was {}", peak);
}

#[tokio::test]
async fn test_store_failure_leaves_notification_unfinalized() {
    let registrations = Arc::new(MemoryRegistrationStore::new());
    let notifications = Arc::new(FlakyNotificationStore {
        inner: MemoryNotificationStore::new(),
        failing_registration: Mutex::new(None),
    });
    let engine = Arc::new(DeliveryEngine::new(
        registrations.clone(),
        notifications.clone(),
        Arc::new(ScriptedProvider::new()),
        DeliveryConfig::default(),
    ));

    registrations.register("a", None, DeviceType::Web).await.unwrap();
    let (broken, _) = registrations
        .register("b", None, DeviceType::Android)
        .await
        .unwrap();
    registrations.register("c", None, DeviceType::Ios).await.unwrap();
    *notifications.failing_registration.lock().unwrap() = Some(broken.id);

    let err = engine.dispatch(request(TargetMode::All)).await.unwrap_err();
    assert!(matches!(err, DispatchError::Store(StoreError::Postgres(_))));

    // The other devices still completed their attempts
    assert_eq!(notifications.inner.log_count(), 2);

    let recent = notifications.list_recent(20).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert!(!recent[0].is_finalized());
    assert_eq!(recent[0].attempted_count, 0);
    assert_eq!(engine.stats().dispatches_failed, 1);
}

#[tokio::test]
async fn test_abandoned_dispatch_still_completes() {
    let provider = ScriptedProvider::new()
        .with("gone", Err(ProviderError::Unregistered("not found".to_string())))
        .with_delay(Duration::from_millis(50));
    let env = create_test_environment(provider);
    for token in ["a", "b", "c"] {
        register(&env, token, None).await;
    }
    let gone = register(&env, "gone", None).await;

    // Caller gives up while the provider calls are in flight
    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        env.engine.dispatch(request(TargetMode::All)),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(env.provider.sent().len(), 4);
    assert_eq!(env.notifications.log_count(), 4);
    assert!(!env.registrations.get(gone).unwrap().active);

    let recent = env.notifications.list_recent(20).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert!(recent[0].is_finalized());
    assert_eq!(recent[0].attempted_count, 4);
    assert_eq!(recent[0].failure_count, 1);
    assert_eq!(env.engine.stats().dispatches_completed, 1);
}

#[tokio::test]
async fn test_concurrent_dispatches_deactivate_once() {
    let provider = ScriptedProvider::new()
        .with("gone", Err(ProviderError::Unregistered("not found".to_string())))
        .with_delay(Duration::from_millis(10));
    let env = create_test_environment(provider);
    let gone = register(&env, "gone", None).await;

    let (a, b) = tokio::join!(
        env.engine.dispatch(request(TargetMode::All)),
        env.engine.dispatch(request(TargetMode::All)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.failed, 1);
    assert_eq!(b.failed, 1);
    assert!(!env.registrations.get(gone).unwrap().active);
    assert_eq!(env.engine.stats().registrations_deactivated, 1);
}

#[tokio::test]
async fn test_probe_touches_no_state() {
    let provider = ScriptedProvider::new()
        .with("gone", Err(ProviderError::Unregistered("not found".to_string())))
        .with("malformed", Err(ProviderError::InvalidArgument("bad token".to_string())))
        .with("flaky", Err(ProviderError::Other("UNAVAILABLE: try later".to_string())));
    let env = create_test_environment(provider);
    let gone = register(&env, "gone", None).await;

    let ok = env.engine.probe("never-registered").await.unwrap();
    assert!(ok.deliverable);
    assert_eq!(
        ok.outcome,
        DeliveryOutcome::Success("receipt-never-registered".to_string())
    );

    let unregistered = env.engine.probe("gone").await.unwrap();
    assert!(!unregistered.deliverable);
    assert!(matches!(unregistered.outcome, DeliveryOutcome::Unregistered(_)));
    // Probes never deactivate
    assert!(env.registrations.get(gone).unwrap().active);

    let invalid = env.engine.probe("malformed").await.unwrap();
    assert!(matches!(invalid.outcome, DeliveryOutcome::InvalidArgument(_)));

    let other = env.engine.probe("flaky").await.unwrap();
    assert!(matches!(other.outcome, DeliveryOutcome::Other(_)));

    assert!(matches!(
        env.engine.probe("").await,
        Err(DispatchError::Validation(_))
    ));

    let sent = env.provider.sent();
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[0].title, "Test Notification");
    assert_eq!(sent[0].body, "This is a test message - token is working!");
    assert!(sent[0].data.is_empty());

    assert!(env.notifications.list_recent(20).await.unwrap().is_empty());
    assert_eq!(env.notifications.log_count(), 0);
    assert_eq!(env.engine.stats().probes, 4);
}
