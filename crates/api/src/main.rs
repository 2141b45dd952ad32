use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invest_alert_core::alert::{runner, AlertSystem, Status};
use invest_alert_core::config::Settings;
use invest_alert_core::display::{PanelState, RenderedPanel};
use invest_alert_core::domain::alert::{AlertKind, AlertOutcome};
use invest_alert_core::domain::catalog::Catalog;
use invest_alert_core::storage::kv::{FileKvStore, KvStore};
use invest_alert_core::storage::preferences::{self, AlertPreference};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let catalog = Catalog::load(settings.catalog_path.as_deref())?;
    let store = open_store_or_degrade(&settings).await;
    let system = Arc::new(AlertSystem::with_store(&settings, catalog, store)?);

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let poller = tokio::spawn(runner::run_polling(
        system.clone(),
        Duration::from_secs(settings.poll_secs),
        chrono::Utc::now,
        async move {
            let _ = stop_rx.await;
        },
    ));

    let app = router(AppState { system });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(());
    let _ = poller.await;
    Ok(())
}

// A broken database must not take the page down; fall back to the state file.
async fn open_store_or_degrade(settings: &Settings) -> Arc<dyn KvStore> {
    match invest_alert_core::storage::open_store(settings).await {
        Ok(store) => store,
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(
                error = %format!("{e:#}"),
                path = %settings.state_path.display(),
                "state store unavailable; starting API in degraded mode with file store"
            );
            Arc::new(FileKvStore::new(&settings.state_path))
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/panel", get(get_panel))
        .route("/catalog", get(get_catalog))
        .route("/schedule", get(get_schedule))
        .route("/preferences", get(get_preferences))
        .route("/preferences/:kind", put(put_preference))
        .route("/alerts/:kind", post(post_alert))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    system: Arc<AlertSystem>,
}

#[derive(Debug, Serialize)]
struct ApiPanel {
    state: PanelState,
    rendered: RenderedPanel,
}

#[derive(Debug, Deserialize)]
struct PreferenceUpdate {
    enabled: bool,
}

fn parse_kind(raw: &str) -> Result<AlertKind, StatusCode> {
    raw.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_panel(State(state): State<AppState>) -> Json<ApiPanel> {
    let panel = state.system.panel();
    Json(ApiPanel {
        state: panel.snapshot().await,
        rendered: panel.render().await,
    })
}

async fn get_catalog(State(state): State<AppState>) -> Json<Catalog> {
    Json(state.system.catalog().clone())
}

async fn get_schedule(State(state): State<AppState>) -> Json<Status> {
    Json(state.system.status(chrono::Utc::now()).await)
}

async fn get_preferences(
    State(state): State<AppState>,
) -> Result<Json<AlertPreference>, StatusCode> {
    let prefs = preferences::load(state.system.store())
        .await
        .map_err(internal_error)?;
    Ok(Json(prefs))
}

async fn put_preference(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(update): Json<PreferenceUpdate>,
) -> Result<Json<AlertPreference>, StatusCode> {
    let kind = parse_kind(&kind)?;
    let store = state.system.store();
    preferences::set_enabled(store, kind, update.enabled)
        .await
        .map_err(internal_error)?;
    let prefs = preferences::load(store).await.map_err(internal_error)?;
    Ok(Json(prefs))
}

async fn post_alert(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<AlertOutcome>, StatusCode> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.system.fire(kind, chrono::Utc::now()).await))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
