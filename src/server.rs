use crate::config::{AppConfig, PageConfig};
use crate::error::DashboardError;
use crate::session::{SessionRegistry, Snapshot};
use crate::table::TableEvent;
use crate::types::{Column, Dataset, Record};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

pub struct AppState {
    pub registry: SessionRegistry,
    pub config: Arc<AppConfig>,
    /// Page HTML with the configured titles filled in.
    index_html: String,
}

impl AppState {
    pub fn new(config: AppConfig, dataset: Dataset) -> Self {
        let config = Arc::new(config);
        Self {
            registry: SessionRegistry::new(dataset, config.clone()),
            index_html: render_index(&config.page),
            config,
        }
    }
}

#[derive(Deserialize)]
pub struct EventRequest {
    seq: u64,
    event: TableEvent,
}

/// Optional body of `POST /api/sessions`.
#[derive(Deserialize, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    replay: Vec<TableEvent>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    records: usize,
    sessions: usize,
}

#[derive(Serialize)]
struct RecordsResponse<'a> {
    columns: Vec<&'static str>,
    records: &'a [Record],
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/records", get(records_handler))
        .route("/api/sessions", post(create_session_handler))
        .route(
            "/api/sessions/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/api/sessions/:id/events", post(event_handler));

    if let Some(dir) = &state.config.server.static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `host` as given: an IP literal or a name such as `localhost`.
pub async fn bind(host: &str, port: u16) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))
}

pub async fn start_server(config: AppConfig, dataset: Dataset) -> Result<()> {
    let listener = bind(&config.server.host, config.server.port).await?;
    let addr = listener.local_addr()?;
    let ttl = Duration::from_secs(config.server.session_ttl_secs);

    let state = Arc::new(AppState::new(config, dataset));

    // Sweep idle sessions in the background
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ttl.max(Duration::from_secs(1)) / 2);
        interval.tick().await;
        loop {
            interval.tick().await;
            sweep_state.registry.evict_idle(Instant::now(), ttl);
        }
    });

    let app = router(state);

    info!("Starting server on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

pub enum ApiError {
    BadRequest(String),
    Dashboard(DashboardError),
}

impl From<DashboardError> for ApiError {
    fn from(e: DashboardError) -> Self {
        ApiError::Dashboard(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Dashboard(e @ DashboardError::SessionNotFound(_)) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Dashboard(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

const INDEX_TEMPLATE: &str = include_str!("static/index.html");

fn render_index(page: &PageConfig) -> String {
    let stylesheet = page
        .stylesheet
        .as_deref()
        .map(|href| format!(r#"<link rel="stylesheet" href="{}">"#, escape_html(href)))
        .unwrap_or_default();
    INDEX_TEMPLATE
        .replace("{{browser_title}}", &escape_html(&page.browser_title))
        .replace("{{stylesheet}}", &stylesheet)
        .replace("{{heading}}", &escape_html(&page.heading))
        .replace("{{description}}", &escape_html(&page.description))
        .replace("{{footer}}", &escape_html(page.footer.as_deref().unwrap_or("")))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.index_html.clone())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        records: state.registry.dataset().len(),
        sessions: state.registry.len(),
    })
}

async fn records_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(RecordsResponse {
        columns: Column::ALL.iter().map(|c| c.header()).collect(),
        records: state.registry.dataset().all_records(),
    })
    .into_response()
}

async fn create_session_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Snapshot>), ApiError> {
    // No body at all means a fresh session
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => CreateSessionRequest::default(),
        Err(e) => return Err(e.into()),
    };
    Ok((StatusCode::CREATED, Json(state.registry.create_with(request.replay))))
}

async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Snapshot>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.registry.snapshot(id)?))
}

async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    state.registry.remove(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn event_handler(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<EventRequest>, JsonRejection>,
) -> Result<Json<Snapshot>, ApiError> {
    let Path(id) = id?;
    let Json(request) = body?;
    Ok(Json(state.registry.apply(id, request.seq, request.event)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::two_events;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_state() -> Arc<AppState> {
        let config = AppConfig::with_source("unused.csv");
        Arc::new(AppState::new(config, two_events()))
    }

    fn app() -> Router {
        router(app_state())
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn hovertexts(snapshot: &Value) -> Vec<String> {
        snapshot["map"]["data"][0]["hovertext"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_index_page() {
        let app = app();
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("<title>NYC Wi-Fi Hotspots</title>"));
        assert!(html.contains("Maps and Tables"));
        assert!(html.contains(r#"id="clear-selection""#));
        assert!(!html.contains("{{"));
    }

    #[tokio::test]
    async fn test_health_and_records() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"], 2);
        assert_eq!(body["sessions"], 0);

        let (_, body) = send(&app, "GET", "/api/records", None).await;
        assert_eq!(body["columns"], json!(["Event_ID", "Location", "Latitude", "Longitude"]));
        assert_eq!(body["records"][1]["Location"], "B");
    }

    #[tokio::test]
    async fn test_selection_round_trip() {
        let app = app();
        let (status, created) = send(&app, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(hovertexts(&created), vec!["Event_ID: 1", "Event_ID: 2"]);
        let id = created["session_id"].as_str().unwrap().to_string();

        let uri = format!("/api/sessions/{}/events", id);
        let event = json!({ "seq": 1, "event": { "type": "select", "indices": [1] } });
        let (status, snapshot) = send(&app, "POST", &uri, Some(event)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(hovertexts(&snapshot), vec!["Event_ID: 2"]);
        assert_eq!(snapshot["bar"]["data"][0]["x"], json!(["B"]));

        let event = json!({ "seq": 2, "event": { "type": "select", "indices": [5] } });
        let (status, snapshot) = send(&app, "POST", &uri, Some(event)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["rejected_indices"], json!([5]));
        assert!(hovertexts(&snapshot).is_empty());

        let (status, _) = send(&app, "DELETE", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, "GET", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/sessions/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (_, created) = send(&app, "POST", "/api/sessions", None).await;
        let uri = format!("/api/sessions/{}/events", created["session_id"].as_str().unwrap());
        let event = json!({ "seq": 1, "event": { "type": "sort", "column": "Magnitude" } });
        let (status, body) = send(&app, "POST", &uri, Some(event)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_evicted_session_is_rebuilt_from_replay() {
        let state = app_state();
        let app = router(state.clone());
        let (_, created) = send(&app, "POST", "/api/sessions", None).await;
        let id = created["session_id"].as_str().unwrap().to_string();
        let uri = format!("/api/sessions/{}/events", id);
        let event = json!({ "seq": 1, "event": { "type": "filter", "column": "Location", "query": "b" } });
        let (_, before) = send(&app, "POST", &uri, Some(event)).await;
        assert_eq!(before["table"]["filters"], json!({ "Location": "b" }));

        let ttl = Duration::from_secs(state.config.server.session_ttl_secs);
        assert_eq!(state.registry.evict_idle(Instant::now() + ttl * 2, ttl), 1);

        let event = json!({ "seq": 2, "event": { "type": "toggle_row", "index": 0 } });
        let (status, _) = send(&app, "POST", &uri, Some(event)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // What the page sends: the last known filters and selection, then the failed event
        let replay = json!({ "replay": [
            { "type": "filter", "column": "Location", "query": "b" },
            { "type": "select", "indices": [] },
            { "type": "toggle_row", "index": 0 },
        ] });
        let (status, restored) = send(&app, "POST", "/api/sessions", Some(replay)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_ne!(restored["session_id"], created["session_id"]);
        assert_eq!(restored["seq"], 0);
        assert_eq!(restored["state"]["selection"], json!([0]));
        assert_eq!(hovertexts(&restored), vec!["Event_ID: 2"]);

        let uri = format!("/api/sessions/{}/events", restored["session_id"].as_str().unwrap());
        let event = json!({ "seq": 1, "event": { "type": "clear_filters" } });
        let (status, snapshot) = send(&app, "POST", &uri, Some(event)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["applied"], true);
        assert_eq!(snapshot["state"]["records"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_session_rejects_bad_replay() {
        let app = app();
        let replay = json!({ "replay": [{ "type": "sort", "column": "Magnitude" }] });
        let (status, body) = send(&app, "POST", "/api/sessions", Some(replay)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_bind_accepts_host_names() {
        let listener = bind("localhost", 0).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
        let listener = bind("127.0.0.1", 0).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }
}
