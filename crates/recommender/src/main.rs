//! Catalyst Explorer Recommendation Service
//!
//! HTTP entry point for the recommendation engine.
//! Handles:
//! - Swipe-based proposal recommendations
//! - AI score enhancement of search results
//! - Embedding coverage diagnostics
//! - Health and Prometheus metrics endpoints

mod handlers;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use catalyst_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    metrics, VERSION,
};
use catalyst_recommender::{PgStore, RecommendationEngine};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub repository: Repository,
    pub engine: Arc<RecommendationEngine>,
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config);

    info!("Starting Catalyst Explorer Recommender v{}", VERSION);

    let config = Arc::new(config);

    // Initialize metrics
    let metrics_handle = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("request_duration_seconds".to_string()),
                metrics::LATENCY_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Suffix("recommendation_duration_seconds".to_string()),
                metrics::LATENCY_BUCKETS,
            )?
            .install_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    let store = Arc::new(PgStore::new(db.clone()));
    let engine = RecommendationEngine::new(
        store.clone(),
        store,
        config.recommendation.clone(),
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        repository: Repository::new(db.clone()),
        db,
        engine: Arc::new(engine),
        metrics: metrics_handle,
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

/// JSON or plain logs, filtered by `RUST_LOG` or the configured level
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // API routes
    let api_routes = Router::new()
        .route(
            "/recommendations",
            post(handlers::recommendations::recommend),
        )
        .route(
            "/search/enhance",
            post(handlers::recommendations::enhance_search),
        )
        .route(
            "/embeddings/coverage",
            get(handlers::coverage::embedding_coverage),
        );

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::health::metrics))
        .nest("/v1", api_routes);

    with_middleware(app, &config).with_state(state)
}

/// Tracing, CORS, request ids, the per-request deadline and the concurrency cap
fn with_middleware<S>(router: Router<S>, config: &AppConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let max_concurrent = config.server.max_concurrent_requests.max(1);

    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Outer layers run first: the id is set before it is propagated
        .layer(propagate_id)
        .layer(request_id)
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
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
            Ok(mut sig) => {
                sig.recv().await;
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
    use axum::body::Body;
    use axum::http::Request;
    use catalyst_recommender::InMemoryStore;
    use std::time::Duration;
    use tower::ServiceExt;

    fn offline_state() -> AppState {
        let config = Arc::new(AppConfig::default());
        let db = DbPool {
            primary: Default::default(),
            replica: None,
        };
        let store = Arc::new(InMemoryStore::new());
        AppState {
            engine: Arc::new(RecommendationEngine::new(
                store.clone(),
                store,
                config.recommendation.clone(),
            )),
            repository: Repository::new(db.clone()),
            config,
            db,
            metrics: None,
        }
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_slow_requests_time_out() {
        let mut config = AppConfig::default();
        config.server.request_timeout_secs = 1;

        let slow = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "done"
            }),
        );
        let app = with_middleware(slow, &config);

        let response = app.oneshot(get_request("/slow")).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let app = with_middleware(
            Router::new().route("/ping", get(|| async { "pong" })),
            &AppConfig::default(),
        );

        let response = app.oneshot(get_request("/ping")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_database() {
        let response = create_router(offline_state())
            .oneshot(get_request("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let response = create_router(offline_state())
            .oneshot(get_request("/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
