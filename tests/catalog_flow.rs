use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use popmovies::app::{build_router, AppState, CATALOG_DIR, SETTINGS_DIR};
use popmovies::coordinator::PaneMode;
use popmovies::error::{CatalogError, CatalogResult};
use popmovies::persist::MemoryStore;
use popmovies::store::{CatalogView, MovieListStatus};
use popmovies::tmdb::{QueryBuilder, RemoteApi};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

const BASE: &str = "https://tmdb.example.test/3";

struct FakeRemote {
    urls: Mutex<Vec<String>>,
    offline: bool,
}

impl FakeRemote {
    fn new() -> Self {
        Self {
            urls: Mutex::new(Vec::new()),
            offline: false,
        }
    }

    fn offline() -> Self {
        Self {
            offline: true,
            ..Self::new()
        }
    }

    fn discover_urls(&self) -> Vec<String> {
        self.urls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.contains("/discover/movie"))
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl RemoteApi for FakeRemote {
    async fn get(&self, url: &str) -> CatalogResult<Vec<u8>> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.offline {
            return Err(CatalogError::transport("HTTP 503 Service Unavailable"));
        }
        let body = if url.contains("/genre/movie/list") {
            json!({ "genres": [
                { "id": 28, "name": "Action" },
                { "id": 10769, "name": "Foreign" },
                { "id": 35, "name": "Comedy" }
            ]})
        } else if url.contains("/certification/movie/list") {
            json!({ "certifications": { "US": [
                { "certification": "R", "meaning": "Restricted", "order": 4 },
                { "certification": "PG-13", "meaning": "", "order": 3 }
            ]}})
        } else if url.contains("with_genres=35") {
            json!({ "page": 1, "results": [
                { "id": 11, "title": "Comedy One", "genre_ids": [35], "poster_path": "/c1.jpg" }
            ]})
        } else {
            json!({ "page": 1, "results": [
                { "id": 1, "title": "Action One", "genre_ids": [28, 35], "poster_path": "/a1.jpg" },
                { "id": 2, "title": "Action Two", "genre_ids": [28] }
            ]})
        };
        Ok(serde_json::to_vec(&body).unwrap())
    }
}

fn state_with(remote: Arc<FakeRemote>, mode: PaneMode) -> AppState {
    AppState::new(
        remote,
        QueryBuilder::new(BASE, "test-key"),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        mode,
    )
}

fn file_state(remote: Arc<FakeRemote>, dir: &std::path::Path) -> AppState {
    AppState::with_data_dir(remote, QueryBuilder::new(BASE, "test-key"), dir, PaneMode::Dual)
}

async fn send(state: &AppState, request: Request<Body>) -> Response {
    build_router(state.clone()).oneshot(request).await.unwrap()
}

async fn get(state: &AppState, uri: &str) -> Response {
    send(state, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn send_json(state: &AppState, method: &str, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(state, request).await
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_ready(state: &AppState) -> CatalogView {
    let mut rx = state.store.subscribe();
    let view = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|v| matches!(v.status, MovieListStatus::Ready { .. })),
    )
    .await
    .expect("timed out waiting for the movie list")
    .expect("store dropped");
    view.clone()
}

fn comedy_criteria() -> Value {
    json!({
        "certification_name": "Any Rating",
        "genre_id": 35,
        "sort_key": "vote_average.desc",
        "release_year": "2016",
        "restrict_to_year": false
    })
}

#[tokio::test]
async fn criteria_change_fetches_and_serves_movies() {
    let remote = Arc::new(FakeRemote::new());
    let state = state_with(remote.clone(), PaneMode::Dual);

    let res = send_json(&state, "PUT", "/criteria", comedy_criteria()).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let decision = json_body(res).await;
    assert_eq!(decision["fetch"], json!(true));
    assert_eq!(decision["refresh"], json!("grid"));
    assert!(decision["ticket"].is_u64());

    wait_ready(&state).await;
    let body = json_body(get(&state, "/movies").await).await;
    assert_eq!(body["status"]["state"], json!("ready"));
    assert_eq!(body["status"]["count"], json!(1));
    assert_eq!(body["movies"][0]["title"], json!("Comedy One"));

    let urls = remote.discover_urls();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].contains("certification.lte=R"));
    assert!(urls[0].contains("with_genres=35"));
    assert!(urls[0].contains("vote_count.gte=20"));
    assert!(urls[0].contains("sort_by=vote_average.desc"));
    assert!(!urls[0].contains("primary_release_year"));

    let saved = json_body(get(&state, "/criteria").await).await;
    assert_eq!(saved, comedy_criteria());
}

#[tokio::test]
async fn invalid_criteria_are_rejected_without_fetching() {
    let remote = Arc::new(FakeRemote::new());
    let state = state_with(remote.clone(), PaneMode::Dual);
    let mut criteria = comedy_criteria();
    criteria["restrict_to_year"] = json!(true);
    criteria["release_year"] = json!("16");

    let res = send_json(&state, "PUT", "/criteria", criteria).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(remote.discover_urls().is_empty());
}

#[tokio::test]
async fn single_pane_fetches_when_settings_close() {
    let remote = Arc::new(FakeRemote::new());
    let state = state_with(remote.clone(), PaneMode::Single);

    let res = send_json(&state, "PUT", "/criteria", comedy_criteria()).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let decision = json_body(res).await;
    assert_eq!(decision["fetch"], json!(false));
    assert_eq!(decision["refresh"], json!("settings"));
    assert!(remote.discover_urls().is_empty());

    let res = send_json(&state, "POST", "/settings/closed", json!({ "changed": false })).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["fetch"], json!(true));
    wait_ready(&state).await;
    assert_eq!(remote.discover_urls().len(), 1);
}

#[tokio::test]
async fn movie_detail_resolves_genres_and_images() {
    let remote = Arc::new(FakeRemote::new());
    let state = state_with(remote, PaneMode::Dual);
    state.coordinator.ensure_reference_lists().await.unwrap();

    let genres = json_body(get(&state, "/genres").await).await;
    let names: Vec<&str> = genres
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Any Genre", "Action", "Comedy"]);

    let certs = json_body(get(&state, "/certifications").await).await;
    assert_eq!(certs[0]["name"], json!("Any Rating"));
    assert_eq!(certs[1]["name"], json!("PG-13"));

    send_json(&state, "PUT", "/criteria", json!({ "genre_id": 28 })).await;
    wait_ready(&state).await;

    let detail = json_body(get(&state, "/movies/1").await).await;
    assert_eq!(detail["movie"]["title"], json!("Action One"));
    assert_eq!(detail["genres"], json!(["Action", "Comedy"]));
    assert_eq!(
        detail["poster_url"],
        json!("https://image.tmdb.org/t/p/w185/a1.jpg")
    );
    assert_eq!(detail["backdrop_url"], Value::Null);

    assert_eq!(get(&state, "/movies/404").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_fetch_reports_error_instead_of_loading() {
    let remote = Arc::new(FakeRemote::offline());
    let state = state_with(remote, PaneMode::Dual);

    let res = send_json(&state, "PUT", "/criteria", comedy_criteria()).await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let view = wait_ready(&state).await;
    match view.status {
        MovieListStatus::Ready { count, last_error } => {
            assert_eq!(count, 0);
            assert!(last_error.unwrap().contains("503"));
        }
        other => panic!("unexpected status {:?}", other),
    }
}

#[tokio::test]
async fn status_long_poll_returns_next_revision() {
    let remote = Arc::new(FakeRemote::new());
    let state = state_with(remote, PaneMode::Dual);
    let current = state.store.view().revision;

    let store = state.store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.replace_movies(Vec::new());
    });

    let body = json_body(get(&state, &format!("/status?after={}", current)).await).await;
    assert!(body["revision"].as_u64().unwrap() > current);
    assert_eq!(body["status"]["state"], json!("ready"));
    assert_eq!(body["status"]["count"], json!(0));
}

#[tokio::test]
async fn movies_and_criteria_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let state = file_state(Arc::new(FakeRemote::new()), dir.path());
        send_json(&state, "PUT", "/criteria", comedy_criteria()).await;
        wait_ready(&state).await;
    }

    let catalog = dir.path().join(CATALOG_DIR);
    assert!(catalog.join("movie_list.json").exists());
    assert!(!catalog.join("filter_criteria.json").exists());
    assert!(dir.path().join(SETTINGS_DIR).join("filter_criteria.json").exists());

    let remote = Arc::new(FakeRemote::new());
    let state = file_state(remote.clone(), dir.path());
    let body = json_body(get(&state, "/movies").await).await;
    assert_eq!(body["status"]["state"], json!("ready"));
    assert_eq!(body["movies"][0]["id"], json!(11));
    assert_eq!(json_body(get(&state, "/criteria").await).await, comedy_criteria());
    assert!(remote.urls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn health_is_ok() {
    let state = state_with(Arc::new(FakeRemote::new()), PaneMode::Dual);
    let res = get(&state, "/health").await;
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"OK");
}
