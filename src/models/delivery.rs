use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    InTransit,
    Delivered,
    Cancelled,
    Problem,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    /// Statuses that keep a delivery on its courier's active route.
    pub fn is_active_on_route(&self) -> bool {
        matches!(self, DeliveryStatus::Assigned | DeliveryStatus::InTransit)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    None,
    Dinheiro,
    Credito,
    Debito,
    Pix,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub method: PaymentMethod,
    pub amount: f64,
    pub received: bool,
    pub change_for: Option<f64>,
    pub installments: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub zip: String,
    pub complement: Option<String>,
    /// Geocoded by an external collaborator; only route optimization reads it.
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryItem {
    pub name: String,
    pub code: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delivery {
    pub id: Uuid,
    pub order_number: String,
    pub status: DeliveryStatus,
    pub customer_name: String,
    pub customer_phone: String,
    pub address: Address,
    pub courier_id: Option<Uuid>,
    pub courier_name: Option<String>,
    pub route_position: Option<u32>,
    pub payment: Option<Payment>,
    pub items: Vec<DeliveryItem>,
    pub signature: Option<String>,
    pub photos: Vec<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    /// Optimistic concurrency stamp, bumped by the store on every update.
    pub version: u64,
}

impl Delivery {
    /// A paid delivery may not complete without a captured signature.
    pub fn requires_signature(&self) -> bool {
        self.payment
            .as_ref()
            .is_some_and(|p| p.method != PaymentMethod::None)
    }

    pub fn clear_courier(&mut self) {
        self.courier_id = None;
        self.courier_name = None;
        self.route_position = None;
    }
}
