mod error;
mod sync;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use intranet_common::error::{IntranetError, IntranetResult};
use intranet_common::types::ServiceInfo;
use intranet_config::{init_tracing, AppConfig};
use intranet_db::advbox::pg_repository::PgAdvboxRepository;
use intranet_db::sync::pg_repository::PgSyncJobRepository;
use intranet_sync::advbox::client::AdvboxClientConfig;
use intranet_sync::clock::TokioClock;
use intranet_sync::{SyncContext, SyncSettings};
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub ctx: SyncContext,
    /// Kept as loaded: a missing credential is reported on each trigger
    /// as an `error` summary instead of keeping the server down.
    pub advbox: Arc<IntranetResult<AdvboxClientConfig>>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo::new("intranet-api", env!("CARGO_PKG_VERSION")))
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .merge(sync::router())
        .layer(cors)
        .with_state(state)
}

async fn serve() -> IntranetResult<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(service = "intranet-api", "starting");

    let settings = SyncSettings::from_env()?;
    let advbox = AdvboxClientConfig::from_env();
    if let Err(e) = &advbox {
        tracing::warn!(error = %e, "advbox is not configured; sync triggers will report errors");
    }

    let pool = intranet_db::create_pool(&config.database_url).await?;
    intranet_db::run_migrations(&pool).await?;

    let store = Arc::new(PgAdvboxRepository::new(pool.clone()));
    let state = AppState {
        ctx: SyncContext {
            jobs: Arc::new(PgSyncJobRepository::new(pool)),
            customers: store.clone(),
            lawsuits: store,
            clock: Arc::new(TokioClock),
            settings,
        },
        advbox: Arc::new(advbox),
    };

    let app = build_router(state);
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .map_err(|e| IntranetError::Config(format!("invalid bind address: {e}")))?;

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| IntranetError::Internal(format!("failed to bind {addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| IntranetError::Internal(format!("server error: {e}")))
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing("info");

    match serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "intranet-api stopped");
            ExitCode::FAILURE
        }
    }
}
