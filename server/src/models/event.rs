use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    InPerson,
    Virtual,
    Hybrid,
}

impl Default for EventType {
    fn default() -> Self {
        Self::InPerson
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: i32,
    pub event_type: EventType,
    pub price: Decimal,
    pub is_active: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Events with a positive price need payment before a seat is confirmed.
    pub fn is_paid(&self) -> bool {
        self.price > Decimal::ZERO
    }

    pub fn is_owned_by(&self, organizer_id: Uuid) -> bool {
        self.organizer_id == Some(organizer_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: i32,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Filled from the caller's organizer profile, never from the request body.
    #[serde(skip)]
    pub organizer_id: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

impl NewEvent {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_fields(
            &self.title,
            self.capacity,
            self.price,
            self.start_time,
            self.end_time,
        )
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub event_type: Option<EventType>,
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
}

impl EventChanges {
    /// Validates the event as it would look after applying these changes.
    pub fn validate_against(&self, current: &Event) -> Result<(), AppError> {
        validate_fields(
            self.title.as_deref().unwrap_or(&current.title),
            self.capacity.unwrap_or(current.capacity),
            self.price.unwrap_or(current.price),
            self.start_time.unwrap_or(current.start_time),
            self.end_time.unwrap_or(current.end_time),
        )
    }

    pub fn apply(self, event: &mut Event) {
        if let Some(title) = self.title {
            event.title = title;
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(start_time) = self.start_time {
            event.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            event.end_time = end_time;
        }
        if let Some(capacity) = self.capacity {
            event.capacity = capacity;
        }
        if let Some(event_type) = self.event_type {
            event.event_type = event_type;
        }
        if let Some(price) = self.price {
            event.price = price;
        }
        if let Some(is_active) = self.is_active {
            event.is_active = is_active;
        }
    }
}

fn validate_fields(
    title: &str,
    capacity: i32,
    price: Decimal,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::ValidationError("Event title is required".to_string()));
    }
    if capacity <= 0 {
        return Err(AppError::ValidationError(
            "Event capacity must be a positive integer".to_string(),
        ));
    }
    if price < Decimal::ZERO {
        return Err(AppError::ValidationError(
            "Event price cannot be negative".to_string(),
        ));
    }
    if end_time < start_time {
        return Err(AppError::ValidationError(
            "Event cannot end before it starts".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub organizer_id: Option<Uuid>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub include_deleted: bool,
}

/// Event detail enriched with registration data for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub total_registrations: i64,
    pub my_registration_status: Option<super::RegistrationStatus>,
}
