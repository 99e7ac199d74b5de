use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CourierStatus {
    Active,
    Inactive,
}

/// Owned by the fleet collaborator; this core only reads couriers and
/// filters on status when assigning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub status: CourierStatus,
    pub vehicle: String,
    pub plate: String,
    pub last_known_position: Option<GeoPoint>,
    pub updated_at: DateTime<Utc>,
}
