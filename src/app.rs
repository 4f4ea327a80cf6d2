use crate::config::Config;
use crate::coordinator::{Decision, FilterChangeCoordinator, FilterEvent, PaneMode};
use crate::models::{Certification, FilterCriteria, Genre};
use crate::persist::{FileStore, KeyValueStore, Preferences};
use crate::store::{CatalogStore, CatalogView};
use crate::tmdb::{CatalogFetcher, CatalogSource, HttpRemote, QueryBuilder, RemoteApi};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
const LONG_POLL: Duration = Duration::from_secs(25);
pub const CATALOG_DIR: &str = "catalog";
pub const SETTINGS_DIR: &str = "settings";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CatalogStore>,
    pub coordinator: Arc<FilterChangeCoordinator>,
}

impl AppState {
    /// `catalog` is owned by the store alone; `settings` holds the user's criteria.
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        queries: QueryBuilder,
        catalog: Arc<dyn KeyValueStore>,
        settings: Arc<dyn KeyValueStore>,
        mode: PaneMode,
    ) -> Self {
        let source: Arc<dyn CatalogSource> = Arc::new(CatalogFetcher::new(remote, queries));
        let store = Arc::new(CatalogStore::open(catalog));
        let coordinator = Arc::new(FilterChangeCoordinator::new(
            source,
            store.clone(),
            Preferences::new(settings),
            mode,
        ));
        Self { store, coordinator }
    }

    /// File-backed state: the movie snapshot under `<data_dir>/catalog`, criteria under
    /// `<data_dir>/settings`.
    pub fn with_data_dir(
        remote: Arc<dyn RemoteApi>,
        queries: QueryBuilder,
        data_dir: &std::path::Path,
        mode: PaneMode,
    ) -> Self {
        Self::new(
            remote,
            queries,
            Arc::new(FileStore::new(data_dir.join(CATALOG_DIR))),
            Arc::new(FileStore::new(data_dir.join(SETTINGS_DIR))),
            mode,
        )
    }
}

pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    info!(
        "Using TMDB at {} with data in {}",
        config.tmdb_base_url,
        config.data_dir.display()
    );

    let remote: Arc<dyn RemoteApi> = Arc::new(HttpRemote::new()?);
    let queries = QueryBuilder::new(&config.tmdb_base_url, &config.tmdb_api_key);
    let state = AppState::with_data_dir(remote, queries, &config.data_dir, config.pane_mode);
    if let Some(e) = state.store.hydration_error() {
        warn!("Starting with an empty movie list: {}", e);
    }

    tokio::spawn(bootstrap(state.coordinator.clone()));

    let app = build_router(state);

    info!("Listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Cold start: reference lists first so stale selections are reset before the first fetch.
async fn bootstrap(coordinator: Arc<FilterChangeCoordinator>) {
    if let Err(e) = coordinator.ensure_reference_lists().await {
        warn!("Failed to reconcile saved criteria: {}", e);
    }
    match coordinator.handle(FilterEvent::Launched) {
        Ok(dispatched) => {
            dispatched.finished().await;
        }
        Err(e) => error!("Initial fetch was not dispatched: {}", e),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/movies", get(list_movies))
        .route("/movies/:id", get(movie_detail))
        .route("/genres", get(list_genres))
        .route("/certifications", get(list_certifications))
        .route("/criteria", get(get_criteria).put(put_criteria))
        .route("/settings/closed", post(settings_closed))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn list_movies(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": state.store.status(),
        "movies": state.store.get_movies().as_slice(),
    }))
}

async fn movie_detail(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let Some(movie) = state.store.get_movie(id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("movie {} not found", id) })),
        )
            .into_response();
    };
    Json(json!({
        "genres": state.store.genre_names_for(&movie),
        "poster_url": movie.poster_url(),
        "backdrop_url": movie.backdrop_url(),
        "movie": movie,
    }))
    .into_response()
}

async fn list_genres(State(state): State<AppState>) -> Json<Vec<Genre>> {
    Json(state.store.get_genres().to_vec())
}

async fn list_certifications(State(state): State<AppState>) -> Json<Vec<Certification>> {
    Json(state.store.get_certifications().to_vec())
}

async fn get_criteria(State(state): State<AppState>) -> Response {
    match state.coordinator.current_criteria() {
        Ok(criteria) => Json::<FilterCriteria>(criteria).into_response(),
        Err(e) => {
            error!("Failed to read criteria: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Serialize)]
struct DispatchBody {
    #[serde(flatten)]
    decision: Decision,
    ticket: Option<u64>,
}

async fn put_criteria(
    State(state): State<AppState>,
    Json(criteria): Json<FilterCriteria>,
) -> Response {
    if let Err(reason) = criteria.validate() {
        warn!("Rejecting criteria: {}", reason);
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": reason })),
        )
            .into_response();
    }
    dispatch(&state, FilterEvent::CriteriaChanged(criteria), StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
struct SettingsClosed {
    #[serde(default)]
    changed: bool,
}

async fn settings_closed(
    State(state): State<AppState>,
    Json(body): Json<SettingsClosed>,
) -> Response {
    dispatch(
        &state,
        FilterEvent::SettingsClosed {
            changed: body.changed,
        },
        StatusCode::OK,
    )
}

fn dispatch(state: &AppState, event: FilterEvent, ok_status: StatusCode) -> Response {
    match state.coordinator.handle(event) {
        Ok(dispatched) => {
            let body = DispatchBody {
                decision: dispatched.decision,
                ticket: dispatched.ticket.map(|t| t.sequence()),
            };
            (ok_status, Json(body)).into_response()
        }
        Err(e) => {
            error!("Filter event failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    after: Option<u64>,
}

/// Without `after`, returns the current view. With it, waits until a newer revision is
/// published or the poll window closes, then returns whatever is current.
async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Json<CatalogView> {
    let Some(after) = query.after else {
        return Json(state.store.view());
    };
    let mut rx = state.store.subscribe();
    let waited = tokio::time::timeout(LONG_POLL, rx.wait_for(|v| v.revision > after)).await;
    let newer = match waited {
        Ok(Ok(view)) => Some((*view).clone()),
        _ => None,
    };
    Json(newer.unwrap_or_else(|| state.store.view()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
