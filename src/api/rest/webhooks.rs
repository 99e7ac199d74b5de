use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::{Event, EventType};
use crate::models::subscription::WebhookSubscription;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhooks", post(create_subscription).get(list_subscriptions))
        .route("/events", post(publish_event))
}

const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Deserialize)]
pub struct CreateSubscriptionRequest {
    pub name: String,
    pub target_url: String,
    pub events: Vec<EventType>,
    pub active: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Externally-originated dispatch request, e.g. ENTREGA_ATRASADA from the
/// deadline scheduler. The body mirrors the outbound wire format.
#[derive(Deserialize)]
pub struct PublishEventRequest {
    pub evento: EventType,
    pub dados: Value,
}

async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<Json<WebhookSubscription>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if reqwest::Url::parse(&payload.target_url).is_err() {
        return Err(AppError::BadRequest(format!(
            "target_url is not a valid url: {}",
            payload.target_url
        )));
    }

    if payload.events.is_empty() {
        return Err(AppError::BadRequest(
            "subscription needs at least one event type".to_string(),
        ));
    }

    let subscription = WebhookSubscription {
        id: Uuid::new_v4(),
        name: payload.name,
        target_url: payload.target_url,
        events: payload.events,
        active: payload.active.unwrap_or(true),
        timeout_ms: payload.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        max_retries: payload.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        last_execution_at: None,
        last_status_code: None,
    };

    Ok(Json(state.subscriptions.create(subscription).await?))
}

async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WebhookSubscription>>, AppError> {
    Ok(Json(state.subscriptions.list().await?))
}

async fn publish_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PublishEventRequest>,
) -> (StatusCode, Json<Event>) {
    let event = Event::new(payload.evento, payload.dados);
    state.dispatcher.enqueue(event.clone()).await;
    (StatusCode::ACCEPTED, Json(event))
}
