use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Participant {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub email: String,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewParticipant {
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub account_id: Uuid,
}

impl NewParticipant {
    pub fn validate(&self) -> Result<(), AppError> {
        super::validate_name_and_email(&self.name, &self.email)
    }
}
