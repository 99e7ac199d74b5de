use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::{
    Address, Delivery, DeliveryItem, DeliveryStatus, Payment, PaymentMethod,
};
use crate::state::AppState;
use crate::store::update_with_retry;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries", post(create_delivery))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/evidence", post(attach_evidence))
        .route("/deliveries/:id/transition", post(transition_delivery))
        .route("/deliveries/:id/assign", post(assign_delivery))
        .route("/deliveries/:id/unassign", post(unassign_delivery))
}

#[derive(Deserialize)]
pub struct CreateDeliveryRequest {
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub address: Address,
    #[serde(default)]
    pub items: Vec<DeliveryItem>,
    pub payment: Option<Payment>,
    pub deadline: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: DeliveryStatus,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct EvidenceRequest {
    pub signature: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
}

async fn create_delivery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<Json<Delivery>, AppError> {
    if payload.order_number.trim().is_empty() {
        return Err(AppError::BadRequest(
            "order_number cannot be empty".to_string(),
        ));
    }

    if let Some(payment) = &payload.payment {
        if payment.received && payment.method == PaymentMethod::None {
            return Err(AppError::BadRequest(
                "payment cannot be received without a payment method".to_string(),
            ));
        }
    }

    let delivery = Delivery {
        id: Uuid::new_v4(),
        order_number: payload.order_number,
        status: DeliveryStatus::Pending,
        customer_name: payload.customer_name,
        customer_phone: payload.customer_phone,
        address: payload.address,
        courier_id: None,
        courier_name: None,
        route_position: None,
        payment: payload.payment,
        items: payload.items,
        signature: None,
        photos: vec![],
        notes: payload.notes,
        created_at: Utc::now(),
        delivered_at: None,
        deadline: payload.deadline,
        version: 0,
    };

    Ok(Json(state.deliveries.create(delivery).await?))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(state.deliveries.get(id).await?))
}

async fn attach_evidence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EvidenceRequest>,
) -> Result<Json<Delivery>, AppError> {
    if payload.signature.is_none() && payload.photos.is_empty() {
        return Err(AppError::BadRequest(
            "evidence needs a signature or at least one photo".to_string(),
        ));
    }

    let (_, updated) = update_with_retry(state.deliveries.as_ref(), id, |current| {
        if current.status.is_terminal() {
            return Err(AppError::BadRequest(format!(
                "delivery {id} is closed; evidence can no longer change"
            )));
        }

        let mut next = current.clone();
        if payload.signature.is_some() {
            next.signature = payload.signature.clone();
        }
        next.photos.extend(payload.photos.iter().cloned());
        Ok(next)
    })
    .await?;

    Ok(Json(updated))
}

async fn transition_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Delivery>, AppError> {
    // assignment and pool-return go through their own operations
    if matches!(
        payload.status,
        DeliveryStatus::Assigned | DeliveryStatus::Pending
    ) {
        return Err(AppError::BadRequest(
            "use the assign/unassign operations to move deliveries on or off a courier"
                .to_string(),
        ));
    }

    Ok(Json(state.lifecycle.transition(id, payload.status).await?))
}

async fn assign_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(state.assignment.assign(id, payload.courier_id).await?))
}

async fn unassign_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(state.assignment.unassign(id).await?))
}
