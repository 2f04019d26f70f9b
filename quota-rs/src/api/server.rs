//! API Server - HTTP server for the quota store

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{self, AppState};
use crate::quota::{SqliteDonorDirectory, SqliteQuotaStore};

/// API Server configuration
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(store: SqliteQuotaStore, donors: SqliteDonorDirectory, addr: String) -> Self {
        let state = Arc::new(AppState { store, donors });
        Self { state, addr }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        // The website calls this from the browser
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let api_routes = Router::new()
            .route("/health", get(handlers::health))
            .route("/quotas", put(handlers::put_quota))
            .route("/quotas/:kind/:identity/:period", get(handlers::get_quota))
            .route("/donors/:account", get(handlers::get_donor))
            .route("/donors/:account", post(handlers::mark_donor));

        Router::new()
            .nest("/api", api_routes)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the API server
    pub async fn run(&self) -> std::io::Result<()> {
        let router = self.router();

        info!("Starting quota API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
