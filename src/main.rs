use std::time::Duration;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use mcp_bridge::config::BridgeConfig;
use mcp_bridge::db::SqlStore;
use mcp_bridge::mcp::Handshake;
use mcp_bridge::state::AppState;
use mcp_bridge::watchdog;

async fn connect_database(config: &BridgeConfig) -> Option<SqlStore> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("startup: DATABASE_URL not set -- traditional routes will return 503");
        return None;
    };
    match SqlStore::connect(url).await {
        Ok(store) => {
            tracing::info!("startup: connected to MySQL");
            Some(store)
        }
        Err(e) => {
            tracing::error!("startup: MySQL connection failed: {}", e);
            None
        }
    }
}

async fn build_app(config: &BridgeConfig) -> anyhow::Result<(axum::Router, AppState)> {
    let store = connect_database(config).await;
    let state = AppState::new(config, store);

    // CORS -- any origin; the bridge carries no credentials
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(86_400));

    // Security headers
    let nosniff: SetResponseHeaderLayer<HeaderValue> = SetResponseHeaderLayer::overriding(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    let frame_deny: SetResponseHeaderLayer<HeaderValue> = SetResponseHeaderLayer::overriding(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    );
    let referrer: SetResponseHeaderLayer<HeaderValue> = SetResponseHeaderLayer::overriding(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    // Rate limiting: 60 req burst, replenish 1 per second, per IP
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(1)
        .burst_size(60)
        .finish()
        .context("invalid rate limiter configuration")?;

    let app = mcp_bridge::create_router(state.clone())
        .layer(GovernorLayer::new(governor_conf))
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(cors)
        .layer(nosniff)
        .layer(frame_deny)
        .layer(referrer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
        )
        .layer(CompressionLayer::new());

    Ok((app, state))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    let config = BridgeConfig::from_env().context("invalid configuration")?;
    let (app, state) = build_app(&config).await?;

    // ── MCP session: one attempt here, the watchdog retries ──
    match state.connect_mcp().await {
        Ok(Handshake::Completed(_)) => {
            tracing::info!("startup: MCP session ready at {}", config.mcp.server_url)
        }
        Ok(Handshake::AlreadyInitialized) => tracing::info!(
            "startup: MCP server at {} was already initialized",
            config.mcp.server_url
        ),
        Err(e) => tracing::warn!(
            "startup: MCP unavailable ({}) -- AI routes return 503 until the watchdog reconnects",
            e
        ),
    }

    // ── Spawn background watchdog ──
    let watchdog = watchdog::spawn(state.clone());

    let addr = config.bind_addr();
    tracing::info!("mcp-bridge listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    watchdog.abort();
    state.shutdown_mcp().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
