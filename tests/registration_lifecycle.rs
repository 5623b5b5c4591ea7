//! Integration tests for node startup, registration and shutdown.

use node_bootstrap::prelude::*;
use node_bootstrap::registry::{FixedAddress, InMemoryRegistry};
use node_bootstrap::sources::MemorySource;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

const NODE_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));

fn settings() -> MemorySource {
    MemorySource::new("appsettings")
        .reloadable(true)
        .with_value("service.name", "values")
        .with_value("service.version", "1.0.0-pre")
        .with_value("service.port", 5000i64)
        .with_value("service.tags", vec!["urlprefix-/values".to_string()])
}

async fn resolver(source: &MemorySource) -> ConfigResolver {
    ConfigResolver::builder()
        .with_source(source.clone())
        .build()
        .await
        .unwrap()
}

fn bootstrap(resolver: ConfigResolver, registry: &InMemoryRegistry) -> NodeBootstrap {
    NodeBootstrap::new(resolver)
        .with_address_discovery(FixedAddress(NODE_IP))
        .with_registry_client(Arc::new(registry.clone()))
}

#[tokio::test]
async fn test_start_registers_discovered_address() {
    let registry = InMemoryRegistry::new();
    let node = bootstrap(resolver(&settings()).await, &registry)
        .start()
        .await
        .unwrap();

    let services = registry.services();
    assert_eq!(services.len(), 1);
    let (_, entry) = &services[0];
    assert_eq!(entry.name, "values");
    assert_eq!(entry.version, "1.0.0-pre");
    assert_eq!(entry.address.as_str(), "http://10.0.0.5:5000/");
    assert_eq!(entry.tags, vec!["urlprefix-/values".to_string()]);

    assert_eq!(node.coordinator().state(), LifecycleState::Registered);
    assert!(registry.checks().is_empty());
    node.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_leaves_registry_empty_and_stops_watch() {
    let source = settings()
        .with_value("service.health_check.enabled", true)
        .with_value("service.health_check.path", "status");
    let registry = InMemoryRegistry::new();
    let node = bootstrap(resolver(&source).await, &registry)
        .start()
        .await
        .unwrap();

    assert_eq!(node.coordinator().state(), LifecycleState::HealthChecked);
    let registration = node.registration().unwrap();
    let check = registration.health_check().unwrap();
    assert_eq!(check.target().as_str(), "http://10.0.0.5:5000/status");
    assert_eq!(check.interval(), Duration::from_secs(15));
    assert_eq!(check.owner(), registration.id());

    node.shutdown().await;
    assert!(registry.services().is_empty());
    assert!(registry.checks().is_empty());
    assert_eq!(node.coordinator().state(), LifecycleState::Unregistered);

    // The watch is gone: changes no longer trigger rebuilds.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let loads = source.load_count();
    source.set("service.port", 6000i64);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.load_count(), loads);
}

#[tokio::test]
async fn test_second_shutdown_is_silent() {
    let registry = InMemoryRegistry::new();
    let node = bootstrap(resolver(&settings()).await, &registry)
        .start()
        .await
        .unwrap();

    node.shutdown().await;
    let calls = registry.call_count();
    node.shutdown().await;
    assert_eq!(registry.call_count(), calls);
}

#[tokio::test]
async fn test_health_check_failure_is_not_fatal() {
    let source = settings().with_value("service.health_check.enabled", true);
    let registry = InMemoryRegistry::new();
    registry.reject_health_checks(true);

    let node = bootstrap(resolver(&source).await, &registry)
        .start()
        .await
        .unwrap();

    assert_eq!(node.coordinator().state(), LifecycleState::Registered);
    assert_eq!(registry.services().len(), 1);
    assert!(node.registration().unwrap().health_check().is_none());
    node.shutdown().await;
}

#[tokio::test]
async fn test_registration_failure_aborts_startup() {
    let source = settings();
    let registry = InMemoryRegistry::new();
    registry.set_unreachable(true);

    let resolver = resolver(&source).await;
    let result = bootstrap(resolver.clone(), &registry).start().await;
    assert!(matches!(
        result,
        Err(BootstrapError::Registry(RegistryError::Registration(_)))
    ));

    // The watch started for this node was cancelled with it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let loads = source.load_count();
    source.set("service.port", 6000i64);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.load_count(), loads);
}

#[tokio::test]
async fn test_missing_service_section_fails_startup() {
    let source = MemorySource::new("appsettings").with_value("registry.host", "127.0.0.1");
    let registry = InMemoryRegistry::new();

    let result = bootstrap(resolver(&source).await, &registry).start().await;
    assert!(matches!(
        result,
        Err(BootstrapError::Config(ConfigError::BindError(_)))
    ));
    assert_eq!(registry.call_count(), 0);
}

#[tokio::test]
async fn test_missing_registry_section_fails_without_injected_client() {
    let result = NodeBootstrap::new(resolver(&settings()).await)
        .with_address_discovery(FixedAddress(NODE_IP))
        .start()
        .await;
    assert!(matches!(
        result,
        Err(BootstrapError::Config(_)) | Err(BootstrapError::Registry(RegistryError::Config(_)))
    ));
}

#[tokio::test]
async fn test_run_until_shutdown_signal() {
    let registry = InMemoryRegistry::new();
    let node = bootstrap(resolver(&settings()).await, &registry)
        .start()
        .await
        .unwrap();

    let signal = ShutdownSignal::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.fire();
    });

    tokio::time::timeout(Duration::from_secs(5), node.run_until(&signal))
        .await
        .unwrap()
        .unwrap();
    assert!(registry.services().is_empty());

    // A signal has one subscriber only.
    assert!(matches!(
        node.run_until(&signal).await,
        Err(RegistryError::InvalidState(_))
    ));
}
