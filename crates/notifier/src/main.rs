//! DeskFlow notification endpoint
//!
//! Public, unauthenticated `POST /api/enviar-email-oc` that emails a
//! purchase-order notification built from the request body.

mod handler;
mod rate_limit;

use axum::{http::Method, middleware, routing::post, Router};
use deskflow_common::{
    config::{AppConfig, ObservabilityConfig},
    mail::{self, Mailer},
    metrics,
};
use handler::NotifierState;
use metrics_exporter_prometheus::PrometheusBuilder;
use rate_limit::GlobalRateLimiter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Route served by this binary
pub const NOTIFY_PATH: &str = "/api/enviar-email-oc";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    init_tracing(&config.observability);
    info!("Starting DeskFlow notifier v{}", deskflow_common::VERSION);

    if config.observability.metrics_port != 0 {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port)))
            .install()?;
        metrics::register_metrics();
    }

    // Requests are answered with 500 until credentials are provided
    let mailer: Option<Arc<dyn Mailer>> = match mail::build_mailer(&config.mail) {
        Ok(mailer) => {
            info!(provider = mailer.provider(), "Mail transport ready");
            Some(mailer)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Mail credentials are not configured");
            None
        }
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.storage.timeout_secs))
        .build()?;

    let state = NotifierState {
        mailer,
        http,
        notifications: Arc::new(config.notifications.clone()),
    };

    let app = create_router(state, rate_limit::from_config(&config.rate_limit));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}

/// CORS answers every OPTIONS request itself with 200 and wildcard headers
fn create_router(state: NotifierState, limiter: Option<Arc<GlobalRateLimiter>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let mut router = Router::new().route(
        NOTIFY_PATH,
        post(handler::send_notification).fallback(handler::method_not_allowed),
    );

    if let Some(limiter) = limiter {
        router = router.route_layer(middleware::from_fn_with_state(limiter, rate_limit::limit));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
