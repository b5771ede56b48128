use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Purpose of a notice; together with recipient and registration it forms the
/// deduplication key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RegistrationCreated,
    RegistrationConfirmed,
    RegistrationCancelled,
}

/// Exactly one recipient role per notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Participant(Uuid),
    Organizer(Uuid),
}

impl Recipient {
    pub fn participant_id(&self) -> Option<Uuid> {
        match self {
            Recipient::Participant(id) => Some(*id),
            Recipient::Organizer(_) => None,
        }
    }

    pub fn organizer_id(&self) -> Option<Uuid> {
        match self {
            Recipient::Organizer(id) => Some(*id),
            Recipient::Participant(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub participant_id: Option<Uuid>,
    pub organizer_id: Option<Uuid>,
    pub event_id: Uuid,
    pub registration_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// The schema guarantees exactly one of the two recipient columns is set.
    pub fn recipient(&self) -> Option<Recipient> {
        match (self.participant_id, self.organizer_id) {
            (Some(id), None) => Some(Recipient::Participant(id)),
            (None, Some(id)) => Some(Recipient::Organizer(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient: Recipient,
    pub event_id: Uuid,
    pub registration_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}
