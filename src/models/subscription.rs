use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::event::EventType;

/// An external endpoint registered for a set of event types. Created and
/// edited by the configuration collaborator; the dispatcher only reads it
/// and records the outcome of its last delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub name: String,
    pub target_url: String,
    pub events: Vec<EventType>,
    pub active: bool,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub last_execution_at: Option<DateTime<Utc>>,
    /// Final attempt's HTTP status; 0 when no response was received at all.
    pub last_status_code: Option<u16>,
}
