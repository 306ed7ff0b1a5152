use std::sync::Arc;

use anyhow::Context as _;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use coparent_reflect::config::{FlowConfig, ServerConfig};
use coparent_reflect::error::ConfigError;
use coparent_reflect::llm::{LlmBackend, LlmConfig};
use coparent_reflect::reflection::{
    PhaseCatalog, ReflectionRouteState, TurnOrchestrator, reflection_routes,
};

/// Log to stderr, and additionally to a daily-rolling file when a log
/// directory is configured. The returned guard must live until exit.
fn init_tracing(log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "coparent-reflect.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server = ServerConfig::from_env();
    let _log_guard = init_tracing(server.log_dir.as_deref());

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string()))?;

    let llm = LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model: server.model.clone(),
    };
    let orchestrator = TurnOrchestrator::from_config(
        &llm,
        PhaseCatalog::standard(),
        FlowConfig::from_env(),
    )
    .context("failed to set up the reflection engine")?;
    let orchestrator = Arc::new(orchestrator);
    let app = reflection_routes(ReflectionRouteState::new(orchestrator)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server.port))
        .await
        .with_context(|| format!("failed to bind port {}", server.port))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = server.port,
        model = %server.model,
        "Reflection server started"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
