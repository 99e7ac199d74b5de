use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::delivery::Delivery;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    #[serde(rename = "ENTREGA_EM_ROTA")]
    EntregaEmRota,
    #[serde(rename = "ENTREGA_ENTREGUE")]
    EntregaEntregue,
    /// Raised by an external deadline scheduler, never originated here.
    #[serde(rename = "ENTREGA_ATRASADA")]
    EntregaAtrasada,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "evento")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "dados")]
    pub payload: Value,
}

impl Event {
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn for_delivery(event_type: EventType, delivery: &Delivery) -> Self {
        Self::new(
            event_type,
            serde_json::json!({
                "id": delivery.id,
                "order_number": delivery.order_number,
                "status": delivery.status,
                "courier_id": delivery.courier_id,
                "delivered_at": delivery.delivered_at,
            }),
        )
    }
}
