//! HTTP surface: submission endpoint, duplex channel, tutorial lookup, assets.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header::CACHE_CONTROL, HeaderValue},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, services::ServeDir,
    set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::info;

use crate::{
    config::Settings,
    process::{Limits, Supervisor},
    safety::DangerPatterns,
    scratch::ScriptStore,
    session::SessionRegistry,
    tutorials::TutorialStore,
};

mod error;
mod handlers;
mod ws;

pub use error::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    patterns: Arc<DangerPatterns>,
    scripts: ScriptStore,
    supervisor: Supervisor,
    tutorials: TutorialStore,
}

impl AppState {
    /// Loads the danger patterns and creates the scratch and data directories.
    pub fn new(settings: Settings) -> Result<Self> {
        let patterns = DangerPatterns::load(settings.danger_patterns_path.as_deref())?;
        let scripts = ScriptStore::new(&settings.scratch_dir, settings.scratch_retention)?;
        let tutorials = TutorialStore::new(&settings.data_dir)?;
        let supervisor = Supervisor::new(
            SessionRegistry::new(),
            settings.python_bin.clone(),
            Limits { timeout: settings.exec_timeout, kill_grace: settings.kill_grace },
        );
        info!(patterns = patterns.len(), scratch = %settings.scratch_dir.display(), "execution state ready");

        Ok(Self {
            settings: Arc::new(settings),
            patterns: Arc::new(patterns),
            scripts,
            supervisor,
            tutorials,
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        self.supervisor.registry()
    }

    pub fn scripts(&self) -> &ScriptStore {
        &self.scripts
    }
}

pub fn router(state: AppState) -> Router {
    let assets = Router::new()
        .fallback_service(ServeDir::new(&state.settings.public_dir))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
        ));

    Router::new()
        .route("/api/execute", post(handlers::execute))
        .route("/api/tutorials/:id", get(handlers::tutorial))
        .route("/api/tutorials/section/:id", get(handlers::section))
        .route("/ws", get(ws::ws_handler))
        .merge(assets)
        .layer(DefaultBodyLimit::max(state.settings.max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(
            |_: Box<dyn std::any::Any + Send + 'static>| -> Response { error::internal_error_response() },
        ))
        .with_state(state)
}

/// Binds, starts the scratch sweeper, and serves until Ctrl-C.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.settings.host, state.settings.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "server running on port {}", state.settings.port);
    info!("visit http://localhost:{} to use the IDE", state.settings.port);

    let sweeper = state
        .scripts
        .clone()
        .spawn_sweeper(state.settings.scratch_sweep_every);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
