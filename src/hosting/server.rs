use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use super::store::HostingStore;
use crate::error::TourError;
use crate::paths;

/// Largest bundle the upload route accepts.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

// ── Response types ───────────────────────────────────────────────

#[derive(Serialize)]
struct ApiOk<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Serialize)]
struct ApiErr {
    ok: bool,
    error: String,
}

fn ok_json<T: Serialize>(data: T) -> impl IntoResponse {
    Json(ApiOk { ok: true, data })
}

fn err_json(status: StatusCode, msg: String) -> impl IntoResponse {
    (status, Json(ApiErr { ok: false, error: msg }))
}

fn status_for(error: &TourError) -> StatusCode {
    match error {
        TourError::ValidationError { .. } => StatusCode::BAD_REQUEST,
        TourError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: Result<T, TourError>) -> axum::response::Response {
    match result {
        Ok(data) => ok_json(data).into_response(),
        Err(e) => err_json(status_for(&e), e.to_string()).into_response(),
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Deserialize)]
struct UploadQuery {
    author: String,
}

#[derive(Deserialize)]
struct HostRequest {
    path: String,
}

#[derive(Serialize, Deserialize)]
pub struct HostResponse {
    pub url: String,
}

// ── Handlers ─────────────────────────────────────────────────────

/// Store operations touch the filesystem (zip extraction included), so they
/// run on the blocking pool.
async fn run_blocking<T, F>(store: Arc<HostingStore>, job: F) -> Result<T, TourError>
where
    T: Send + 'static,
    F: FnOnce(&HostingStore) -> Result<T, TourError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || job(&store))
        .await
        .map_err(|e| TourError::HostError {
            message: format!("Hosting task failed: {e}"),
        })?
}

async fn post_upload(
    Extension(store): Extension<Arc<HostingStore>>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> impl IntoResponse {
    respond(run_blocking(store, move |store| store.upload(&query.author, &body)).await)
}

async fn get_uploads(Extension(store): Extension<Arc<HostingStore>>) -> impl IntoResponse {
    ok_json(store.list())
}

async fn post_host(
    Extension(store): Extension<Arc<HostingStore>>,
    Path(filename): Path<String>,
    Json(body): Json<HostRequest>,
) -> impl IntoResponse {
    let hosted = run_blocking(store, move |store| store.host(&filename, &body.path)).await;
    respond(hosted.map(|url| HostResponse { url }))
}

async fn post_unhost(
    Extension(store): Extension<Arc<HostingStore>>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    respond(run_blocking(store, move |store| store.unhost(&filename)).await)
}

async fn delete_upload(
    Extension(store): Extension<Arc<HostingStore>>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    respond(run_blocking(store, move |store| store.delete(&filename)).await)
}

// ── Server startup ───────────────────────────────────────────────

pub fn router(store: Arc<HostingStore>) -> Router {
    let hosted = ServeDir::new(store.hosted_root());
    Router::new()
        .route("/api/uploads", post(post_upload).get(get_uploads))
        .route("/api/uploads/{filename}", delete(delete_upload))
        .route("/api/uploads/{filename}/host", post(post_host))
        .route("/api/uploads/{filename}/unhost", post(post_unhost))
        .route("/api/health", get(|| async { "ok" }))
        .nest_service(paths::HOSTED_URL_PREFIX, hosted)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(Extension(store))
}

/// Bind `addr` and serve in the background. Returns the bound address and the
/// server task.
pub async fn start_server(
    store: Arc<HostingStore>,
    addr: SocketAddr,
) -> Result<(SocketAddr, JoinHandle<()>), TourError> {
    let app = router(store);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TourError::HostError {
            message: format!("Failed to bind hosting server: {e}"),
        })?;
    let local = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("Hosting server error: {e}");
        }
    });

    log::info!("Hosting server listening on http://{local}");
    Ok((local, handle))
}
