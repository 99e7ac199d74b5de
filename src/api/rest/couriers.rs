use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::selector::select_next;
use crate::error::AppError;
use crate::models::courier::{Courier, CourierStatus, GeoPoint};
use crate::models::delivery::Delivery;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(create_courier).get(list_couriers))
        .route(
            "/couriers/:id/route",
            get(get_route).put(reorder_route),
        )
        .route(
            "/couriers/:id/route/optimize",
            post(optimize_route),
        )
        .route("/couriers/:id/route/next", get(next_delivery))
        .route(
            "/couriers/:id/route/:delivery_id/move-up",
            post(move_up),
        )
        .route(
            "/couriers/:id/route/:delivery_id/move-down",
            post(move_down),
        )
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub phone: String,
    pub vehicle: String,
    pub plate: String,
    pub last_known_position: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub delivery_ids: Vec<Uuid>,
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        status: CourierStatus::Active,
        vehicle: payload.vehicle,
        plate: payload.plate,
        last_known_position: payload.last_known_position,
        updated_at: Utc::now(),
    };

    Ok(Json(state.couriers.create(courier).await?))
}

async fn list_couriers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Courier>>, AppError> {
    Ok(Json(state.couriers.list().await?))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    // 404 for unknown couriers rather than an empty route
    state.couriers.get(id).await?;
    Ok(Json(state.sequencer.active_route(id).await?))
}

async fn reorder_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    state.couriers.get(id).await?;
    Ok(Json(state.sequencer.reorder(id, payload.delivery_ids).await?))
}

async fn optimize_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    Ok(Json(state.sequencer.optimize(id).await?))
}

async fn move_up(
    State(state): State<Arc<AppState>>,
    Path((id, delivery_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    Ok(Json(state.sequencer.move_up(id, delivery_id).await?))
}

async fn move_down(
    State(state): State<Arc<AppState>>,
    Path((id, delivery_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    Ok(Json(state.sequencer.move_down(id, delivery_id).await?))
}

async fn next_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<Delivery>>, AppError> {
    state.couriers.get(id).await?;

    let open: Vec<Delivery> = state
        .deliveries
        .list_by_courier(id)
        .await?
        .into_iter()
        .filter(|d| !d.status.is_terminal())
        .collect();

    Ok(Json(select_next(&open).cloned()))
}
