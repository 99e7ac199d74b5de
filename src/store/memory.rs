use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::delivery::Delivery;
use crate::models::event::EventType;
use crate::models::subscription::WebhookSubscription;
use crate::store::{CourierStore, DeliveryStore, SubscriptionStore};

/// In-memory store binding. Each map entry is guarded by its DashMap shard
/// lock, which is what makes the version compare-and-swap in `update` atomic
/// per delivery.
#[derive(Default)]
pub struct MemoryStore {
    deliveries: DashMap<Uuid, Delivery>,
    couriers: DashMap<Uuid, Courier>,
    subscriptions: DashMap<Uuid, WebhookSubscription>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Delivery, AppError> {
        self.deliveries
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))
    }

    async fn list_by_courier(&self, courier_id: Uuid) -> Result<Vec<Delivery>, AppError> {
        Ok(self
            .deliveries
            .iter()
            .filter(|entry| entry.value().courier_id == Some(courier_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn create(&self, delivery: Delivery) -> Result<Delivery, AppError> {
        if self.deliveries.contains_key(&delivery.id) {
            return Err(AppError::Conflict(format!(
                "delivery {} already exists",
                delivery.id
            )));
        }
        self.deliveries.insert(delivery.id, delivery.clone());
        Ok(delivery)
    }

    async fn update(&self, mut delivery: Delivery) -> Result<Delivery, AppError> {
        let mut entry = self
            .deliveries
            .get_mut(&delivery.id)
            .ok_or_else(|| AppError::NotFound(format!("delivery {} not found", delivery.id)))?;

        if entry.version != delivery.version {
            return Err(AppError::Conflict(format!(
                "delivery {} was modified concurrently",
                delivery.id
            )));
        }

        delivery.version += 1;
        *entry = delivery.clone();
        Ok(delivery)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.deliveries
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))
    }
}

#[async_trait]
impl CourierStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Courier, AppError> {
        self.couriers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))
    }

    async fn list(&self) -> Result<Vec<Courier>, AppError> {
        Ok(self
            .couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn create(&self, courier: Courier) -> Result<Courier, AppError> {
        if self.couriers.contains_key(&courier.id) {
            return Err(AppError::Conflict(format!(
                "courier {} already exists",
                courier.id
            )));
        }
        self.couriers.insert(courier.id, courier.clone());
        Ok(courier)
    }

    async fn update(&self, courier: Courier) -> Result<Courier, AppError> {
        let mut entry = self
            .couriers
            .get_mut(&courier.id)
            .ok_or_else(|| AppError::NotFound(format!("courier {} not found", courier.id)))?;
        *entry = courier.clone();
        Ok(courier)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.couriers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<WebhookSubscription, AppError> {
        self.subscriptions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("subscription {id} not found")))
    }

    async fn list(&self) -> Result<Vec<WebhookSubscription>, AppError> {
        Ok(self
            .subscriptions
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_active_by_event(
        &self,
        event_type: EventType,
    ) -> Result<Vec<WebhookSubscription>, AppError> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().active && entry.value().events.contains(&event_type))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn create(
        &self,
        subscription: WebhookSubscription,
    ) -> Result<WebhookSubscription, AppError> {
        if self.subscriptions.contains_key(&subscription.id) {
            return Err(AppError::Conflict(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        self.subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn record_result(
        &self,
        id: Uuid,
        status_code: Option<u16>,
        executed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut entry = self
            .subscriptions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("subscription {id} not found")))?;

        entry.last_execution_at = Some(executed_at);
        entry.last_status_code = Some(status_code.unwrap_or(0));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::error::AppError;
    use crate::models::delivery::{Address, Delivery, DeliveryStatus};
    use crate::store::DeliveryStore;

    fn delivery(id_seed: u128) -> Delivery {
        Delivery {
            id: Uuid::from_u128(id_seed),
            order_number: format!("PED-{id_seed}"),
            status: DeliveryStatus::Pending,
            customer_name: "Maria".to_string(),
            customer_phone: "11 99999-0000".to_string(),
            address: Address {
                street: "Rua das Flores 100".to_string(),
                city: "São Paulo".to_string(),
                zip: "01000-000".to_string(),
                complement: None,
                location: None,
            },
            courier_id: None,
            courier_name: None,
            route_position: None,
            payment: None,
            items: vec![],
            signature: None,
            photos: vec![],
            notes: None,
            created_at: Utc::now(),
            delivered_at: None,
            deadline: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = MemoryStore::new();
        let created = store.create(delivery(1)).await.unwrap();
        assert_eq!(created.version, 0);

        let updated = store.update(created).await.unwrap();
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = MemoryStore::new();
        let created = store.create(delivery(1)).await.unwrap();

        store.update(created.clone()).await.unwrap();
        let err = store.update(created).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(Uuid::from_u128(42)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
