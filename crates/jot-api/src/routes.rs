use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use futures::Stream;
use jot_core::models::ItemPayload;
use jot_core::remote::ItemCollection;
use jot_core::{RemoteItem, RemoteKey};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::AppError;

const CHANGE_EVENT: &str = "change";

#[derive(Clone)]
pub struct AppState {
    pub collection: Arc<ItemCollection>,
}

impl AppState {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            collection: Arc::new(ItemCollection::new(config.stream_buffer)),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/items", get(list_items).post(create_item))
        .route("/items/stream", get(item_changes))
        .route(
            "/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    items: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        items: state.collection.len(),
    })
}

async fn list_items(State(state): State<AppState>) -> Json<Vec<RemoteItem>> {
    Json(state.collection.list())
}

async fn create_item(
    State(state): State<AppState>,
    payload: Result<Json<ItemPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<RemoteItem>), AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let item = state.collection.create(&payload)?;
    tracing::info!(id = %item.id, "Item created");
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RemoteItem>, AppError> {
    Ok(Json(state.collection.get(&RemoteKey::new(id))?))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ItemPayload>, JsonRejection>,
) -> Result<Json<RemoteItem>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let item = state.collection.update(&RemoteKey::new(id), &payload)?;
    tracing::info!(id = %item.id, updated_at = item.updated_at, "Item updated");
    Ok(Json(item))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let key = RemoteKey::new(id);
    state.collection.delete(&key)?;
    tracing::info!(id = %key, "Item deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn item_changes(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut changes = state.collection.subscribe();
    tracing::debug!("Change stream subscriber connected");

    let events = stream! {
        loop {
            match changes.recv().await {
                Ok(notice) => match Event::default().event(CHANGE_EVENT).json_data(&notice) {
                    Ok(event) => yield Ok::<_, Infallible>(event),
                    Err(error) => tracing::warn!("Failed to encode change notice: {error}"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change stream subscriber lagged");
                    // Still a change signal; clients only need the trigger
                    yield Ok(Event::default().event(CHANGE_EVENT).data("{}"));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}
