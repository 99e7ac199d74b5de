pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::delivery::Delivery;
use crate::models::event::EventType;
use crate::models::subscription::WebhookSubscription;

const VERSION_RETRY_ATTEMPTS: usize = 3;

/// Read-validate-write with bounded retry on version conflicts. `mutate`
/// must be pure over the snapshot it is given; it runs once per attempt.
/// Returns the pre-mutation snapshot alongside the committed entity so
/// callers can compare states or restore on a later remote failure.
pub async fn update_with_retry<F>(
    store: &dyn DeliveryStore,
    id: Uuid,
    mutate: F,
) -> Result<(Delivery, Delivery), AppError>
where
    F: Fn(&Delivery) -> Result<Delivery, AppError>,
{
    let mut last_conflict = None;

    for _ in 0..VERSION_RETRY_ATTEMPTS {
        let current = store.get(id).await?;
        let next = mutate(&current)?;
        match store.update(next).await {
            Ok(committed) => return Ok((current, committed)),
            Err(AppError::Conflict(msg)) => last_conflict = Some(msg),
            Err(err) => return Err(err),
        }
    }

    Err(AppError::Conflict(last_conflict.unwrap_or_else(|| {
        format!("delivery {id}: update retries exhausted")
    })))
}

/// Persistence port for deliveries. `update` is compare-and-swap on
/// `Delivery.version`: a stale version fails with `Conflict` so two racing
/// writers cannot lose an update.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Delivery, AppError>;
    async fn list_by_courier(&self, courier_id: Uuid) -> Result<Vec<Delivery>, AppError>;
    async fn create(&self, delivery: Delivery) -> Result<Delivery, AppError>;
    async fn update(&self, delivery: Delivery) -> Result<Delivery, AppError>;
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait CourierStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Courier, AppError>;
    async fn list(&self) -> Result<Vec<Courier>, AppError>;
    async fn create(&self, courier: Courier) -> Result<Courier, AppError>;
    async fn update(&self, courier: Courier) -> Result<Courier, AppError>;
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<WebhookSubscription, AppError>;
    async fn list(&self) -> Result<Vec<WebhookSubscription>, AppError>;
    async fn list_active_by_event(
        &self,
        event_type: EventType,
    ) -> Result<Vec<WebhookSubscription>, AppError>;
    async fn create(
        &self,
        subscription: WebhookSubscription,
    ) -> Result<WebhookSubscription, AppError>;
    /// Stamp the outcome of the final delivery attempt; `None` status means
    /// no response was received and is stored as the 0 sentinel.
    async fn record_result(
        &self,
        id: Uuid,
        status_code: Option<u16>,
        executed_at: DateTime<Utc>,
    ) -> Result<(), AppError>;
}
