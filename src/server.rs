use crate::map::Datamap;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    response::{Html, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

pub struct AppState {
    pub page: String,
    pub map: Datamap,
}

#[derive(Deserialize)]
pub struct QueryParams {
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub id: String,
    pub data: Option<Value>,
}

pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/api/query", get(query_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(map: Datamap, port: u16, static_dir: &Path) -> Result<()> {
    let state = Arc::new(AppState { page: map.to_html(), map });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let app = router(state, static_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn page_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.page.clone())
}

/// Region or bubble under a surface point, topmost first.
async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<QueryResponse>> {
    let found = state
        .map
        .hit_test(params.x, params.y)
        .and_then(|node| state.map.describe(node))
        .map(|(id, data)| QueryResponse { id, data });
    Json(found)
}
