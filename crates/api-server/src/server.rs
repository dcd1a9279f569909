//! API server: the REST router plus the Prometheus exporter.

use crate::rest::{self, AppState};
use axum::routing::{delete, get, post};
use axum::Router;
use rotator_app::Rotator;
use rotator_core::config::AppConfig;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the REST router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Registry
        .route("/v1/banners", post(rest::create_banner))
        .route("/v1/banners/:id", delete(rest::delete_banner))
        .route("/v1/slots", post(rest::create_slot))
        .route("/v1/slots/:id", delete(rest::delete_slot))
        .route("/v1/social-groups", post(rest::create_social_group))
        .route("/v1/social-groups/:id", delete(rest::delete_social_group))
        .route(
            "/v1/slots/:slot/banners/:banner",
            post(rest::attach_banner).delete(rest::detach_banner),
        )
        // Rotation
        .route("/v1/select", post(rest::select_banner))
        .route("/v1/click", post(rest::click_banner))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    rotator: Rotator,
}

impl ApiServer {
    pub fn new(config: AppConfig, rotator: Rotator) -> Self {
        Self { config, rotator }
    }

    /// Serve HTTP until `shutdown` resolves, then let in-flight requests
    /// finish.
    pub async fn start_http<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(AppState {
            rotator: self.rotator.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        });

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Install the Prometheus recorder and its scrape listener on a
    /// separate port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
