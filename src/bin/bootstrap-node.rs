//! Demo node: resolves configuration, registers with Consul, serves its
//! health-check route, and deregisters on Ctrl-C.
//!
//! Usage: `bootstrap-node [settings-file]` (default `appsettings.json`).

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use node_bootstrap::prelude::*;
use node_bootstrap::registry::ServiceSettings;
use node_bootstrap::sources::ConsulKvSource;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_PREFIX: &str = "NODE";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Deserialize)]
struct RemoteSettings {
    address: String,
    key: String,
    #[serde(default)]
    token: Option<String>,
}

/// Read the `remote` section from the local layers only, to learn where the
/// remote layer lives.
async fn remote_settings(settings_file: &str) -> Result<Option<RemoteSettings>> {
    let local = ConfigResolver::builder()
        .with_optional_file(settings_file)
        .with_env_overrides(ENV_PREFIX, ENV_SEPARATOR)
        .build()
        .await?;
    let snapshot = local.snapshot();
    if !snapshot.contains("remote") {
        return Ok(None);
    }
    snapshot.bind_section("remote").map(Some)
}

async fn status(State(resolver): State<ConfigResolver>) -> Json<Value> {
    let snapshot = resolver.snapshot();
    Json(json!({
        "status": "ok",
        "service": snapshot.get::<String>("service.name").ok(),
        "version": snapshot.get::<String>("service.version").ok(),
        "sources": snapshot.contributors(),
    }))
}

fn router(service: &ServiceSettings, resolver: ConfigResolver) -> Router {
    let path = format!("/{}", service.health_check.path.trim_start_matches('/'));
    Router::new().route(&path, get(status)).with_state(resolver)
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings_file = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "appsettings.json".to_string());
    tracing::info!(settings = %settings_file, "bootstrap-node starting");

    let mut builder = ConfigResolver::builder().with_optional_file(&settings_file);
    if let Some(remote) = remote_settings(&settings_file).await? {
        let mut source = ConsulKvSource::builder()
            .with_address(&remote.address)
            .with_key(&remote.key);
        if let Some(token) = remote.token {
            source = source.with_token(token);
        }
        builder = builder.with_source(source.build()?);
    }
    let resolver = builder
        .with_env_overrides(ENV_PREFIX, ENV_SEPARATOR)
        .build()
        .await?;

    let service: ServiceSettings = resolver.snapshot().bind_section("service")?;
    let listener = TcpListener::bind(("0.0.0.0", service.port)).await?;
    tracing::info!(port = service.port, path = %service.health_check.path, "listening");

    // Serve before registering so the first probe finds the route.
    let stop_serving = CancellationToken::new();
    let app = router(&service, resolver.clone());
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(stop_serving.clone().cancelled_owned())
            .into_future(),
    );

    let node = NodeBootstrap::new(resolver).start().await?;

    let shutdown = ShutdownSignal::new();
    shutdown.fire_on_ctrl_c();
    node.run_until(&shutdown).await?;

    // Withdrawn from the registry; now drain in-flight requests.
    stop_serving.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
        Err(e) => tracing::error!(error = %e, "HTTP server task ended abnormally"),
    }
    tracing::info!("bootstrap-node stopped");
    Ok(())
}
