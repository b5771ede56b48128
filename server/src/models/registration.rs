use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "registration_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    /// Initial status is a pure function of the event price: paid events wait
    /// for payment, free events confirm immediately.
    pub fn initial_for_price(price: Decimal) -> Self {
        if price > Decimal::ZERO {
            Self::Pending
        } else {
            Self::Confirmed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Allowed transitions: pending -> confirmed, and anything not yet
    /// cancelled -> cancelled. Cancelled is terminal.
    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub event_id: Uuid,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// Whether this row holds the (participant, event) uniqueness slot.
    pub fn occupies_slot(&self) -> bool {
        !self.is_deleted && self.status != RegistrationStatus::Cancelled
    }
}

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub participant_id: Uuid,
    pub event_id: Uuid,
    pub status: RegistrationStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationFilter {
    pub status: Option<RegistrationStatus>,
    pub event_id: Option<Uuid>,
    #[serde(skip)]
    pub participant_id: Option<Uuid>,
    /// Restricts to events owned by this organizer.
    #[serde(skip)]
    pub organizer_id: Option<Uuid>,
}

/// Result of `register`, shaped for the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub message: String,
    pub registration: Registration,
    pub is_paid: bool,
    pub status: RegistrationStatus,
}
