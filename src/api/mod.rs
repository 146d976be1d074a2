//! HTTP API over the paper service.
//!
//! | Route | Result |
//! |---|---|
//! | `GET /api/papers/{id}?doi=` | canonical paper |
//! | `GET /api/papers/{id}/citations?doi=` | one-hop citation network |
//! | `GET /api/search?q=&limit=` | merged search, at most `limit` papers; an id-shaped `q` resolves directly |
//! | `GET /api/status` | sources, circuit states, cache counters |
//!
//! Ids containing `/` (DOIs) are passed percent-encoded (`10.1038%2Fnature14539`)
//! or through the `doi` parameter. Errors are JSON `{"error", "message"}`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

use crate::service::{PaperService, ServiceError};

#[derive(Debug, Deserialize)]
pub struct DoiParams {
    pub doi: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Build the API router.
pub fn router(service: PaperService) -> Router {
    Router::new()
        .route("/api/papers/{id}", get(get_paper))
        .route("/api/papers/{id}/citations", get(get_citations))
        .route("/api/search", get(search))
        .route("/api/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve the API until Ctrl-C.
pub async fn serve(service: PaperService, addr: SocketAddr) -> std::io::Result<()> {
    let sweeper = service.spawn_sweeper();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    Ok(())
}

/// GET /api/papers/{id}
async fn get_paper(
    State(service): State<PaperService>,
    Path(id): Path<String>,
    Query(params): Query<DoiParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let paper = service.get_paper(&id, params.doi.as_deref()).await?;
    Ok(Json(paper))
}

/// GET /api/papers/{id}/citations
async fn get_citations(
    State(service): State<PaperService>,
    Path(id): Path<String>,
    Query(params): Query<DoiParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let network = service
        .get_citation_network(&id, params.doi.as_deref())
        .await?;
    Ok(Json(network))
}

/// GET /api/search
async fn search(
    State(service): State<PaperService>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let query = params.q.unwrap_or_default();
    let results = service
        .lookup(query.trim(), params.limit.unwrap_or(10))
        .await?
        .into_results();
    Ok(Json(results))
}

/// GET /api/status
async fn status(State(service): State<PaperService>) -> impl IntoResponse {
    Json(service.status())
}
