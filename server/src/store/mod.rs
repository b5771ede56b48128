//! Record store seam.
//!
//! Every read takes an explicit [`Scope`]: `Active` hides soft-deleted rows,
//! `All` returns them too. Nothing swaps the default behind the caller's back.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Role;
use crate::models::{
    Event, EventChanges, EventFilter, NewEvent, NewNotification, NewOrganizer, NewParticipant,
    NewRegistration, Notification, NotificationKind, Organizer, Participant, Recipient,
    Registration, RegistrationFilter, RegistrationStatus,
};
use crate::utils::pagination::{Page, PageRequest};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Active,
    All,
}

impl Scope {
    pub fn includes_deleted(self) -> bool {
        matches!(self, Scope::All)
    }

    pub fn admits(self, is_deleted: bool) -> bool {
        self.includes_deleted() || !is_deleted
    }
}

/// Entities that support soft delete and restore through the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Event,
    Registration,
    Notification,
}

impl EntityKind {
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Event => "events",
            EntityKind::Registration => "registrations",
            EntityKind::Notification => "notifications",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    /// Maps an identity account to at most one profile role.
    async fn resolve_role(&self, account_id: Uuid) -> StoreResult<Role>;

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event>;
    async fn find_event(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Event>>;
    async fn update_event(&self, id: Uuid, changes: EventChanges) -> StoreResult<Option<Event>>;
    async fn list_events(&self, filter: &EventFilter, page: PageRequest)
        -> StoreResult<Page<Event>>;
    /// Counts non-deleted, non-cancelled registrations for an event.
    async fn count_registrations(&self, event_id: Uuid) -> StoreResult<i64>;

    async fn insert_participant(&self, participant: NewParticipant) -> StoreResult<Participant>;
    async fn find_participant(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Participant>>;
    async fn list_participants(&self, page: PageRequest) -> StoreResult<Page<Participant>>;

    async fn insert_organizer(&self, organizer: NewOrganizer) -> StoreResult<Organizer>;
    async fn find_organizer(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Organizer>>;
    async fn list_organizers(&self, page: PageRequest) -> StoreResult<Page<Organizer>>;

    /// Fails with [`StoreError::UniqueViolation`] when the pair already holds
    /// an open registration.
    async fn insert_registration(&self, registration: NewRegistration)
        -> StoreResult<Registration>;
    async fn find_registration(&self, id: Uuid, scope: Scope)
        -> StoreResult<Option<Registration>>;
    /// The non-deleted, non-cancelled registration for the pair, if any.
    async fn find_open_registration(
        &self,
        participant_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<Registration>>;
    /// Compare-and-set status change. Returns `None` when the row is missing,
    /// deleted, or no longer in `from`.
    async fn transition_registration(
        &self,
        id: Uuid,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreResult<Option<Registration>>;
    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Registration>>;

    /// Inserts unless a notice with the same (recipient, registration, kind)
    /// exists; returns `None` when skipped.
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Option<Notification>>;
    async fn notification_exists(
        &self,
        recipient: Recipient,
        registration_id: Uuid,
        kind: NotificationKind,
    ) -> StoreResult<bool>;
    async fn find_notification(&self, id: Uuid, scope: Scope)
        -> StoreResult<Option<Notification>>;
    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Option<Notification>>;
    async fn list_notifications(
        &self,
        recipient: Recipient,
        page: PageRequest,
    ) -> StoreResult<Page<Notification>>;
    async fn count_unread(&self, recipient: Recipient) -> StoreResult<i64>;

    /// Returns false when the row is missing or already deleted.
    async fn soft_delete(&self, kind: EntityKind, id: Uuid) -> StoreResult<bool>;
    /// Returns false when the row is missing or not deleted.
    async fn restore(&self, kind: EntityKind, id: Uuid) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_admits() {
        assert!(Scope::Active.admits(false));
        assert!(!Scope::Active.admits(true));
        assert!(Scope::All.admits(true));
        assert!(Scope::All.admits(false));
    }
}
