//! DeskFlow API Gateway
//!
//! The main entry point for the purchase-order application.
//! Handles:
//! - Authentication and authorization
//! - Purchase-order submission and listing
//! - Administration (status, ERP reference, recipient lists)
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware as axum_middleware,
    routing::{get, patch, put},
    Router,
};
use deskflow_common::{
    auth::JwtManager,
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository},
    errors::AppError,
    mail::{self, Mailer},
    metrics,
    orders::{AttachmentUploader, NotificationComposer, SubmissionOrchestrator},
    storage::{ObjectStore, SupabaseStorage},
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub jwt: Arc<JwtManager>,
    pub orchestrator: Arc<SubmissionOrchestrator>,
}

impl AppState {
    pub fn repository(&self) -> Repository {
        Repository::new(self.db.clone())
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);
    info!("Starting DeskFlow API Gateway v{}", deskflow_common::VERSION);

    // Initialize metrics
    init_metrics(&config.observability)?;

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    let jwt_secret = config.auth.jwt_secret.as_deref().ok_or_else(|| AppError::Configuration {
        message: "auth.jwt_secret is not configured".to_string(),
    })?;
    let jwt = Arc::new(
        JwtManager::new(jwt_secret, config.auth.jwt_expiration_secs)
            .with_admin_role(config.auth.admin_role.clone()),
    );

    let storage: Arc<dyn ObjectStore> = Arc::new(SupabaseStorage::from_config(&config.storage)?);

    // Submissions fail at the notification step until mail is configured
    let mailer: Option<Arc<dyn Mailer>> = match mail::build_mailer(&config.mail) {
        Ok(mailer) => Some(mailer),
        Err(e) => {
            tracing::warn!(error = %e, "Mail is not configured; notifications will fail");
            None
        }
    };

    let orchestrator = SubmissionOrchestrator::new(
        Arc::new(Repository::new(db.clone())),
        AttachmentUploader::new(storage.clone(), config.storage.upload_concurrency),
        NotificationComposer::new(
            storage,
            config.storage.signed_url_ttl_secs,
            config.notifications.default_recipients.clone(),
            config.notifications.utc_offset_minutes,
        ),
        mailer,
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        jwt,
        orchestrator: Arc::new(orchestrator),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// JSON or pretty logs; `RUST_LOG` overrides the configured level
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

fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets_for_metric(
            Matcher::Suffix("submission_duration_seconds".to_string()),
            metrics::SUBMISSION_BUCKETS,
        )?
        .install()?;

    metrics::register_metrics();
    info!(port = config.metrics_port, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let max_body_bytes = state.config.server.max_body_bytes;

    // API routes
    let api_routes = Router::new()
        // Requester endpoints
        .route(
            "/purchase-orders",
            get(handlers::purchase_orders::list_own).post(handlers::purchase_orders::submit),
        )
        .route("/projects", get(handlers::projects::list_projects))

        // Administration endpoints
        .route("/admin/purchase-orders", get(handlers::admin::list_purchase_orders))
        .route("/admin/purchase-orders/{id}", patch(handlers::admin::update_purchase_order))
        .route("/admin/email-configs", get(handlers::admin::list_email_configs))
        .route("/admin/email-configs/{company}", put(handlers::admin::upsert_email_config));

    // Compose the app
    Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(axum_middleware::from_fn(middleware::metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use deskflow_common::config::DatabaseConfig;
    use tower::ServiceExt;
    use uuid::Uuid;

    struct NoopStore;

    #[async_trait::async_trait]
    impl ObjectStore for NoopStore {
        async fn upload(&self, path: &str, _content_type: &str, _bytes: axum::body::Bytes) -> deskflow_common::Result<String> {
            Ok(path.to_string())
        }

        async fn signed_url(&self, path: &str, _expires_in_secs: u64) -> deskflow_common::Result<String> {
            Ok(path.to_string())
        }
    }

    fn test_state() -> AppState {
        let config = AppConfig {
            server: Default::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/deskflow".to_string(),
                read_url: None,
                max_connections: 1,
                min_connections: 0,
                connect_timeout_secs: 1,
                idle_timeout_secs: 1,
                run_migrations: false,
            },
            auth: Default::default(),
            storage: Default::default(),
            mail: Default::default(),
            notifications: Default::default(),
            observability: Default::default(),
            rate_limit: Default::default(),
        };

        let db = DbPool {
            primary: sea_orm::DatabaseConnection::Disconnected,
            replica: None,
        };
        let store: Arc<dyn ObjectStore> = Arc::new(NoopStore);

        let orchestrator = SubmissionOrchestrator::new(
            Arc::new(Repository::new(db.clone())),
            AttachmentUploader::new(store.clone(), 1),
            NotificationComposer::new(store, 60, Vec::new(), 0),
            None,
        );

        AppState {
            config: Arc::new(config),
            db,
            jwt: Arc::new(JwtManager::new("test_secret", 3600)),
            orchestrator: Arc::new(orchestrator),
        }
    }

    fn token(state: &AppState, role: &str) -> String {
        state
            .jwt
            .generate_token(Uuid::new_v4(), "ana@fch.cl", "FCH", role)
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::get("/v1/purchase-orders").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"]["code"].is_string());
    }

    #[tokio::test]
    async fn test_admin_routes_reject_regular_users() {
        let state = test_state();
        let bearer = format!("Bearer {}", token(&state, "user"));
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::get("/v1/admin/purchase-orders")
                    .header("authorization", bearer)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_patch_rejects_empty_update() {
        let state = test_state();
        let bearer = format!("Bearer {}", token(&state, "admin"));
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::patch(format!("/v1/admin/purchase-orders/{}", Uuid::new_v4()))
                    .header("authorization", bearer)
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_submission_route_rejects_invalid_form() {
        let state = test_state();
        let bearer = format!("Bearer {}", token(&state, "user"));
        let app = create_router(state);

        let boundary = "deskflow-boundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"tipo\"\r\n\r\nfactura\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"proveedor\"\r\n\r\n  \r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"valor\"\r\n\r\n500000\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"archivos\"; filename=\"a.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n%PDF\r\n\
             --{b}--\r\n",
            b = boundary
        );

        let response = app
            .oneshot(
                Request::post("/v1/purchase-orders")
                    .header("authorization", bearer)
                    .header("content-type", format!("multipart/form-data; boundary={}", boundary))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Ingrese el nombre del proveedor"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_rejected_before_database() {
        let state = test_state();
        let bearer = format!("Bearer {}", token(&state, "admin"));
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::put("/v1/admin/email-configs/FCH")
                    .header("authorization", bearer)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"destinatarios": ["compras@fch.cl", "no-es-correo"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
