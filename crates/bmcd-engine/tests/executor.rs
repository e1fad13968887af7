//! End-to-end behaviour of the action executor against test drivers

use std::sync::Arc;
use std::time::Duration;

use bmcd_drivers::{BootDevice, PowerAction, PowerState, UserRole, UserSpec};
use bmcd_engine::{
    status_channel, ActionCategory, ActionExecutor, ActionOutcome, AuthResolver, Authn,
    BootDeviceRequest, Code, CollectingSink, Credentials, Error, FailingDriver,
    MemoryCredentialStore, PowerRequest, RequestContext, SleepDriver, StaticDriver,
    DriverRegistry, UserAction, UserRequest, ALL_DRIVERS_FAILED,
};

fn power_on(host: &str) -> PowerRequest {
    PowerRequest {
        authn: Some(Authn::direct(host, "admin", "admin")),
        power_action: PowerAction::On,
    }
}

fn run_with(
    registry: DriverRegistry,
    request: impl Into<bmcd_engine::ActionRequest>,
    ctx: RequestContext,
) -> (ActionExecutor, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let executor = ActionExecutor::new(request.into(), ctx, Arc::new(registry), sink.clone());
    (executor, sink)
}

#[tokio::test]
async fn falls_back_to_second_driver() {
    let first = Arc::new(FailingDriver::new("d1", Error::unavailable("connection refused")));
    let second = Arc::new(StaticDriver::new("d2", ActionOutcome::Power(PowerState::On)));
    let mut registry = DriverRegistry::new();
    registry.register_arc(first.clone());
    registry.register_arc(second.clone());

    let (executor, sink) = run_with(registry, power_on("10.0.0.1"), RequestContext::new());
    let result = executor.run().await.expect("second driver should succeed");

    assert_eq!(result.driver, "d2");
    assert_eq!(result.outcome, ActionOutcome::Power(PowerState::On));
    assert_eq!(result.details, vec!["d1: connection refused"]);
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);

    let messages = sink.messages();
    let fallback = messages
        .iter()
        .position(|m| m.contains("d1 failed"))
        .expect("fallback message");
    let success = messages
        .iter()
        .position(|m| m.contains("succeeded via d2"))
        .expect("success message");
    assert!(fallback < success);
}

#[tokio::test]
async fn exhaustion_lists_failures_in_attempt_order() {
    let mut registry = DriverRegistry::new();
    registry.register(FailingDriver::new("d1", Error::unavailable("no route to host")));
    registry.register(FailingDriver::new("d2", Error::unauthenticated("bad password")));

    let (executor, sink) = run_with(registry, power_on("10.0.0.1"), RequestContext::new());
    let err = executor.run().await.unwrap_err();

    assert_eq!(err.code, Code::Internal);
    assert_eq!(err.message, ALL_DRIVERS_FAILED);
    assert_eq!(
        err.details,
        vec!["d1: no route to host", "d2: bad password"]
    );
    assert!(sink
        .messages()
        .last()
        .is_some_and(|m| m.ends_with(ALL_DRIVERS_FAILED)));
}

#[tokio::test]
async fn exhaustion_with_only_connection_failures_is_unavailable() {
    let mut registry = DriverRegistry::new();
    registry.register(FailingDriver::new("d1", Error::unavailable("refused")));
    registry.register(FailingDriver::new("d2", Error::unavailable("timed out")));

    let (executor, _) = run_with(registry, power_on("10.0.0.1"), RequestContext::new());
    let err = executor.run().await.unwrap_err();

    assert_eq!(err.code, Code::Unavailable);
    assert_eq!(err.details.len(), 2);
}

#[tokio::test]
async fn missing_auth_invokes_no_driver() {
    let driver = Arc::new(StaticDriver::new("d1", ActionOutcome::Power(PowerState::On)));
    let mut registry = DriverRegistry::new();
    registry.register_arc(driver.clone());

    let request = PowerRequest {
        authn: None,
        power_action: PowerAction::Off,
    };
    let (executor, _) = run_with(registry, request, RequestContext::new());
    let err = executor.run().await.unwrap_err();

    assert_eq!(err.code, Code::Unauthenticated);
    assert_eq!(err.message, "no auth found");
    assert_eq!(driver.calls(), 0);
}

#[tokio::test]
async fn empty_direct_authn_is_unauthenticated() {
    let mut registry = DriverRegistry::new();
    registry.register(StaticDriver::new("d1", ActionOutcome::Power(PowerState::On)));

    let request = PowerRequest {
        authn: Some(Authn::DirectAuthn(None)),
        power_action: PowerAction::On,
    };
    let (executor, _) = run_with(registry, request, RequestContext::new());
    let err = executor.run().await.unwrap_err();

    assert_eq!(err, Error::unauthenticated("no auth found"));
}

#[tokio::test]
async fn no_capable_driver_is_invalid_argument() {
    let mut registry = DriverRegistry::new();
    registry.register(
        FailingDriver::new("power-only", Error::internal("unused"))
            .with_categories(&[ActionCategory::Power]),
    );

    let request = BootDeviceRequest {
        authn: Some(Authn::direct("10.0.0.1", "admin", "admin")),
        boot_device: BootDevice::Pxe,
        persistent: false,
        efi_boot: false,
    };
    let (executor, _) = run_with(registry, request, RequestContext::new());
    let err = executor.run().await.unwrap_err();

    assert_eq!(err.code, Code::InvalidArgument);
    assert!(err.message.contains("boot device"));
}

#[tokio::test]
async fn cancellation_stops_fallback() {
    let slow = Arc::new(SleepDriver::new("slow", Duration::from_secs(30)));
    let next = Arc::new(StaticDriver::new("next", ActionOutcome::Power(PowerState::On)));
    let mut registry = DriverRegistry::new();
    registry.register_arc(slow.clone());
    registry.register_arc(next.clone());

    let ctx = RequestContext::new();
    let canceller = ctx.clone();
    let (executor, _) = run_with(registry, power_on("10.0.0.1"), ctx);

    let handle = tokio::spawn(executor.run());
    tokio::time::sleep(Duration::from_millis(20)).await;
    canceller.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("executor should stop promptly")
        .expect("task should not panic")
        .unwrap_err();

    assert_eq!(err.code, Code::Cancelled);
    assert_eq!(slow.calls(), 1);
    assert_eq!(next.calls(), 0);
}

#[tokio::test]
async fn deadline_is_reported_as_deadline_exceeded() {
    let mut registry = DriverRegistry::new();
    registry.register(SleepDriver::new("slow", Duration::from_secs(30)));

    let ctx = RequestContext::new().with_timeout(Duration::from_millis(30));
    let (executor, sink) = run_with(registry, power_on("10.0.0.1"), ctx);
    let err = executor.run().await.unwrap_err();

    assert_eq!(err.code, Code::DeadlineExceeded);
    assert!(sink.messages().iter().any(|m| m.starts_with("aborted")));
}

#[tokio::test]
async fn stored_credentials_are_resolved() {
    let mut store = MemoryCredentialStore::new();
    store.insert("bmc-7", Credentials::new("root", "calvin"));
    let resolver = AuthResolver::new().with_store(Arc::new(store));

    let mut registry = DriverRegistry::new();
    registry.register(StaticDriver::new("d1", ActionOutcome::Power(PowerState::Off)));

    let request = PowerRequest {
        authn: Some(Authn::stored("bmc-7")),
        power_action: PowerAction::Status,
    };
    let (executor, _) = run_with(registry, request, RequestContext::new());
    let result = executor.with_resolver(resolver).run().await.unwrap();
    assert_eq!(result.outcome, ActionOutcome::Power(PowerState::Off));
}

#[tokio::test]
async fn invalid_user_request_is_rejected_before_drivers() {
    let driver = Arc::new(StaticDriver::new("d1", ActionOutcome::User("ops".into())));
    let mut registry = DriverRegistry::new();
    registry.register_arc(driver.clone());

    let request = UserRequest {
        authn: Some(Authn::direct("10.0.0.1", "admin", "admin")),
        user_action: UserAction::Create(UserSpec {
            username: "ops".into(),
            password: String::new(),
            role: UserRole::Operator,
        }),
    };
    let (executor, _) = run_with(registry, request, RequestContext::new());
    let err = executor.run().await.unwrap_err();

    assert_eq!(err.code, Code::InvalidArgument);
    assert_eq!(driver.calls(), 0);
}

#[tokio::test]
async fn concurrent_requests_keep_separate_status_streams() {
    let mut registry = DriverRegistry::new();
    registry.register(FailingDriver::new("d1", Error::unavailable("refused")));
    registry.register(StaticDriver::new("d2", ActionOutcome::Power(PowerState::On)));
    let registry = Arc::new(registry);

    let sink_a = Arc::new(CollectingSink::new());
    let sink_b = Arc::new(CollectingSink::new());
    let a = ActionExecutor::new(
        power_on("host-a").into(),
        RequestContext::new(),
        registry.clone(),
        sink_a.clone(),
    );
    let b = ActionExecutor::new(
        PowerRequest {
            authn: Some(Authn::direct("host-b", "admin", "admin")),
            power_action: PowerAction::Cycle,
        }
        .into(),
        RequestContext::new(),
        registry,
        sink_b.clone(),
    );

    let (ra, rb) = tokio::join!(a.run(), b.run());
    assert!(ra.is_ok());
    assert!(rb.is_ok());

    assert!(sink_a.messages().iter().all(|m| !m.contains("power cycle")));
    assert!(sink_b.messages().iter().all(|m| !m.contains("power on")));
    assert_eq!(sink_a.messages().len(), sink_b.messages().len());
}

#[tokio::test]
async fn status_channel_receives_messages_in_order() {
    let mut registry = DriverRegistry::new();
    registry.register(FailingDriver::new("d1", Error::internal("boom")));
    registry.register(StaticDriver::new("d2", ActionOutcome::Power(PowerState::On)));

    let (sink, mut rx) = status_channel(16, Duration::from_millis(100));
    let executor = ActionExecutor::new(
        power_on("10.0.0.1").into(),
        RequestContext::new(),
        Arc::new(registry),
        Arc::new(sink),
    );
    executor.run().await.unwrap();

    let mut received = Vec::new();
    while let Ok(message) = rx.try_recv() {
        received.push(message);
    }
    assert_eq!(
        received,
        vec![
            "power on: attempting via d1",
            "d1 failed: boom; falling back to d2",
            "power on: attempting via d2",
            "power on: succeeded via d2",
        ]
    );
}

#[tokio::test]
async fn undrained_status_channel_does_not_stall() {
    let mut registry = DriverRegistry::new();
    registry.register(StaticDriver::new("d1", ActionOutcome::Power(PowerState::On)));

    let (sink, _rx) = status_channel(1, Duration::from_millis(10));
    let executor = ActionExecutor::new(
        power_on("10.0.0.1").into(),
        RequestContext::new(),
        Arc::new(registry),
        Arc::new(sink),
    );

    let result = tokio::time::timeout(Duration::from_secs(5), executor.run())
        .await
        .expect("executor must not block on status delivery");
    assert!(result.is_ok());
}
