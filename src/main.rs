use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use inventory_core::config::{self, Config};
use inventory_core::domain::Metadata;
use inventory_core::error::Error;
use inventory_core::events::TracingEventSink;
use inventory_core::service::{ItemUpdate, PredictionResult};
use inventory_core::store::{ItemFilters, Repository};
use inventory_core::InventoryService;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

struct AppState {
    service: InventoryService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env();
    config::init_tracing();

    let config = Config::from_env();
    info!(bind_addr = %config.bind_addr, database_path = ?config.database_path, "starting inventory-core");

    let repo = Repository::open(&config.database_path)?;
    let service = InventoryService::new(repo, Arc::new(TracingEventSink));
    let state = Arc::new(AppState { service });

    let app = Router::new()
        .route("/items", get(list_items).post(add_item))
        .route("/items/:id", get(get_item).patch(update_item).delete(remove_item))
        .route("/items/:id/level", axum::routing::post(update_level))
        .route("/items/:id/predict", get(predict_consumption))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct AddItemRequest {
    name: String,
    unit_id: Uuid,
    initial_level: f64,
    max_capacity: f64,
    low_stock_threshold: f64,
    #[serde(default)]
    metadata: Option<Metadata>,
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let item = state.service.add_inventory_item(
        req.name,
        req.unit_id,
        req.initial_level,
        req.max_capacity,
        req.low_stock_threshold,
        req.metadata,
    )?;
    Ok(Json(serde_json::to_value(item).unwrap()))
}

#[derive(Debug, Deserialize)]
struct ListItemsParams {
    low_stock_only: Option<bool>,
    unit_type_filter: Option<String>,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListItemsParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = state.service.list_inventory_items(ItemFilters {
        low_stock_only: params.low_stock_only.unwrap_or(false),
        unit_type_filter: params.unit_type_filter,
        limit: params.limit,
        offset: params.offset,
    })?;
    Ok(Json(serde_json::json!({
        "items": page.items,
        "total_count": page.total_count,
    })))
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let item = state.service.get_inventory_item(id)?;
    Ok(Json(serde_json::to_value(item).unwrap()))
}

#[derive(Debug, Deserialize, Default)]
struct UpdateItemRequest {
    name: Option<String>,
    description: Option<String>,
    max_capacity: Option<f64>,
    low_stock_threshold: Option<f64>,
    metadata: Option<Metadata>,
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (item, changed) = state.service.update_inventory_item(
        id,
        ItemUpdate {
            name: req.name,
            description: req.description,
            max_capacity: req.max_capacity,
            low_stock_threshold: req.low_stock_threshold,
            metadata: req.metadata,
            consumption_behavior: None,
        },
    )?;
    Ok(Json(serde_json::json!({ "item": item, "changed": changed })))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (item_id, name) = state.service.remove_inventory_item(id)?;
    Ok(Json(serde_json::json!({ "item_id": item_id, "name": name })))
}

#[derive(Debug, Deserialize)]
struct UpdateLevelRequest {
    new_level: f64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    record_consumption: bool,
}

async fn update_level(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLevelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = state
        .service
        .update_inventory_level(id, req.new_level, req.reason, req.record_consumption)?;
    Ok(Json(serde_json::json!({
        "item": result.item,
        "below_threshold": result.below_threshold,
    })))
}

#[derive(Debug, Deserialize)]
struct PredictParams {
    days_ahead: f64,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    point: f64,
    lower_bound: f64,
    upper_bound: f64,
    confidence: f64,
    model_tag: &'static str,
    recommendation: String,
    days_remaining: Option<f64>,
    recommended_restock_level: f64,
}

impl From<PredictionResult> for PredictResponse {
    fn from(r: PredictionResult) -> Self {
        Self {
            point: r.estimate.point,
            lower_bound: r.estimate.lower_bound,
            upper_bound: r.estimate.upper_bound,
            confidence: r.estimate.confidence,
            model_tag: r.estimate.model_tag,
            recommendation: r.estimate.recommendation,
            days_remaining: r.days_remaining,
            recommended_restock_level: r.recommended_restock_level,
        }
    }
}

async fn predict_consumption(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<PredictParams>,
) -> Result<Json<PredictResponse>, ApiError> {
    let result = state.service.predict_consumption(id, params.days_ahead)?;
    Ok(Json(result.into()))
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::FailedPrecondition(_) => StatusCode::CONFLICT,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::Canceled => StatusCode::REQUEST_TIMEOUT,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
