use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{EntityKind, Scope, Store, StoreError, StoreResult};
use crate::auth::Role;
use crate::models::{
    Event, EventChanges, EventFilter, NewEvent, NewNotification, NewOrganizer, NewParticipant,
    NewRegistration, Notification, NotificationKind, Organizer, Participant, Recipient,
    Registration, RegistrationFilter, RegistrationStatus,
};
use crate::utils::pagination::{Page, PageRequest};

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    participants: HashMap<Uuid, Participant>,
    organizers: HashMap<Uuid, Organizer>,
    registrations: HashMap<Uuid, Registration>,
    notifications: HashMap<Uuid, Notification>,
}

impl Tables {
    fn open_registration(&self, participant_id: Uuid, event_id: Uuid) -> Option<&Registration> {
        self.registrations.values().find(|r| {
            r.participant_id == participant_id && r.event_id == event_id && r.occupies_slot()
        })
    }

    fn notification_exists(
        &self,
        recipient: Recipient,
        registration_id: Uuid,
        kind: NotificationKind,
    ) -> bool {
        self.notifications.values().any(|n| {
            n.recipient() == Some(recipient)
                && n.registration_id == Some(registration_id)
                && n.kind == kind
        })
    }
}

/// In-process store with the same uniqueness guarantees as the Postgres
/// schema. A single lock serializes every check-then-write.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

fn unique(what: &str) -> StoreError {
    StoreError::UniqueViolation(what.to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn resolve_role(&self, account_id: Uuid) -> StoreResult<Role> {
        let tables = self.lock()?;
        if let Some(participant) = tables
            .participants
            .values()
            .find(|p| p.account_id == account_id && !p.is_deleted)
        {
            return Ok(Role::Participant(participant.id));
        }
        Ok(tables
            .organizers
            .values()
            .find(|o| o.account_id == Some(account_id) && !o.is_deleted)
            .map(|o| Role::Organizer(o.id))
            .unwrap_or(Role::Anonymous))
    }

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event> {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id: event.organizer_id,
            title: event.title,
            description: event.description,
            location: event.location,
            start_time: event.start_time,
            end_time: event.end_time,
            capacity: event.capacity,
            event_type: event.event_type,
            price: event.price,
            is_active: event.is_active,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn find_event(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Event>> {
        Ok(self
            .lock()?
            .events
            .get(&id)
            .filter(|e| scope.admits(e.is_deleted))
            .cloned())
    }

    async fn update_event(&self, id: Uuid, changes: EventChanges) -> StoreResult<Option<Event>> {
        let mut tables = self.lock()?;
        let Some(event) = tables.events.get_mut(&id).filter(|e| !e.is_deleted) else {
            return Ok(None);
        };
        changes.apply(event);
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Event>> {
        let tables = self.lock()?;
        let mut events: Vec<Event> = tables
            .events
            .values()
            .filter(|e| filter.include_deleted || !e.is_deleted)
            .filter(|e| filter.organizer_id.map_or(true, |id| e.organizer_id == Some(id)))
            .filter(|e| filter.is_active.map_or(true, |active| e.is_active == active))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Ok(Page::from_vec(events, page))
    }

    async fn count_registrations(&self, event_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .lock()?
            .registrations
            .values()
            .filter(|r| r.event_id == event_id && r.occupies_slot())
            .count() as i64)
    }

    async fn insert_participant(&self, participant: NewParticipant) -> StoreResult<Participant> {
        let mut tables = self.lock()?;
        let email = participant.email.trim().to_lowercase();
        if tables.participants.values().any(|p| p.email == email) {
            return Err(unique("Email address is already in use"));
        }
        if tables
            .participants
            .values()
            .any(|p| p.account_id == participant.account_id)
            || tables
                .organizers
                .values()
                .any(|o| o.account_id == Some(participant.account_id))
        {
            return Err(unique("Account already has a profile"));
        }

        let now = Utc::now();
        let participant = Participant {
            id: Uuid::new_v4(),
            account_id: participant.account_id,
            name: participant.name.trim().to_string(),
            email,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        tables
            .participants
            .insert(participant.id, participant.clone());
        Ok(participant)
    }

    async fn find_participant(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Participant>> {
        Ok(self
            .lock()?
            .participants
            .get(&id)
            .filter(|p| scope.admits(p.is_deleted))
            .cloned())
    }

    async fn list_participants(&self, page: PageRequest) -> StoreResult<Page<Participant>> {
        let tables = self.lock()?;
        let mut participants: Vec<Participant> = tables
            .participants
            .values()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect();
        participants.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(Page::from_vec(participants, page))
    }

    async fn insert_organizer(&self, organizer: NewOrganizer) -> StoreResult<Organizer> {
        let mut tables = self.lock()?;
        let email = organizer.email.trim().to_lowercase();
        if tables.organizers.values().any(|o| o.email == email) {
            return Err(unique("Email address is already in use"));
        }
        if let Some(account_id) = organizer.account_id {
            if tables
                .organizers
                .values()
                .any(|o| o.account_id == Some(account_id))
                || tables
                    .participants
                    .values()
                    .any(|p| p.account_id == account_id)
            {
                return Err(unique("Account already has a profile"));
            }
        }

        let now = Utc::now();
        let organizer = Organizer {
            id: Uuid::new_v4(),
            account_id: organizer.account_id,
            name: organizer.name.trim().to_string(),
            email,
            phone: organizer.phone,
            company: organizer.company,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.organizers.insert(organizer.id, organizer.clone());
        Ok(organizer)
    }

    async fn find_organizer(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Organizer>> {
        Ok(self
            .lock()?
            .organizers
            .get(&id)
            .filter(|o| scope.admits(o.is_deleted))
            .cloned())
    }

    async fn list_organizers(&self, page: PageRequest) -> StoreResult<Page<Organizer>> {
        let tables = self.lock()?;
        let mut organizers: Vec<Organizer> = tables
            .organizers
            .values()
            .filter(|o| !o.is_deleted)
            .cloned()
            .collect();
        organizers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(Page::from_vec(organizers, page))
    }

    async fn insert_registration(
        &self,
        registration: NewRegistration,
    ) -> StoreResult<Registration> {
        let mut tables = self.lock()?;
        if tables
            .open_registration(registration.participant_id, registration.event_id)
            .is_some()
        {
            return Err(unique(
                "Participant already holds a registration for this event",
            ));
        }

        let now = Utc::now();
        let registration = Registration {
            id: Uuid::new_v4(),
            participant_id: registration.participant_id,
            event_id: registration.event_id,
            status: registration.status,
            registered_at: now,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        tables
            .registrations
            .insert(registration.id, registration.clone());
        Ok(registration)
    }

    async fn find_registration(
        &self,
        id: Uuid,
        scope: Scope,
    ) -> StoreResult<Option<Registration>> {
        Ok(self
            .lock()?
            .registrations
            .get(&id)
            .filter(|r| scope.admits(r.is_deleted))
            .cloned())
    }

    async fn find_open_registration(
        &self,
        participant_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<Registration>> {
        Ok(self
            .lock()?
            .open_registration(participant_id, event_id)
            .cloned())
    }

    async fn transition_registration(
        &self,
        id: Uuid,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreResult<Option<Registration>> {
        let mut tables = self.lock()?;
        let Some(registration) = tables
            .registrations
            .get_mut(&id)
            .filter(|r| !r.is_deleted && r.status == from)
        else {
            return Ok(None);
        };
        registration.status = to;
        registration.updated_at = Utc::now();
        Ok(Some(registration.clone()))
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Registration>> {
        let tables = self.lock()?;
        let mut registrations: Vec<Registration> = tables
            .registrations
            .values()
            .filter(|r| !r.is_deleted)
            .filter(|r| filter.participant_id.map_or(true, |id| r.participant_id == id))
            .filter(|r| filter.event_id.map_or(true, |id| r.event_id == id))
            .filter(|r| filter.status.map_or(true, |status| r.status == status))
            .filter(|r| {
                filter.organizer_id.map_or(true, |organizer_id| {
                    tables
                        .events
                        .get(&r.event_id)
                        .is_some_and(|e| e.organizer_id == Some(organizer_id))
                })
            })
            .cloned()
            .collect();
        registrations.sort_by(|a, b| b.registered_at.cmp(&a.registered_at).then(a.id.cmp(&b.id)));
        Ok(Page::from_vec(registrations, page))
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Option<Notification>> {
        let mut tables = self.lock()?;
        if tables.notification_exists(
            notification.recipient,
            notification.registration_id,
            notification.kind,
        ) {
            return Ok(None);
        }

        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            message: notification.message,
            participant_id: notification.recipient.participant_id(),
            organizer_id: notification.recipient.organizer_id(),
            event_id: notification.event_id,
            registration_id: Some(notification.registration_id),
            kind: notification.kind,
            is_read: false,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        tables
            .notifications
            .insert(notification.id, notification.clone());
        Ok(Some(notification))
    }

    async fn notification_exists(
        &self,
        recipient: Recipient,
        registration_id: Uuid,
        kind: NotificationKind,
    ) -> StoreResult<bool> {
        Ok(self
            .lock()?
            .notification_exists(recipient, registration_id, kind))
    }

    async fn find_notification(
        &self,
        id: Uuid,
        scope: Scope,
    ) -> StoreResult<Option<Notification>> {
        Ok(self
            .lock()?
            .notifications
            .get(&id)
            .filter(|n| scope.admits(n.is_deleted))
            .cloned())
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        let mut tables = self.lock()?;
        let Some(notification) = tables.notifications.get_mut(&id).filter(|n| !n.is_deleted)
        else {
            return Ok(None);
        };
        if !notification.is_read {
            notification.is_read = true;
            notification.updated_at = Utc::now();
        }
        Ok(Some(notification.clone()))
    }

    async fn list_notifications(
        &self,
        recipient: Recipient,
        page: PageRequest,
    ) -> StoreResult<Page<Notification>> {
        let tables = self.lock()?;
        let mut notifications: Vec<Notification> = tables
            .notifications
            .values()
            .filter(|n| !n.is_deleted && n.recipient() == Some(recipient))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(Page::from_vec(notifications, page))
    }

    async fn count_unread(&self, recipient: Recipient) -> StoreResult<i64> {
        Ok(self
            .lock()?
            .notifications
            .values()
            .filter(|n| !n.is_deleted && !n.is_read && n.recipient() == Some(recipient))
            .count() as i64)
    }

    async fn soft_delete(&self, kind: EntityKind, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        macro_rules! mark_deleted {
            ($table:ident) => {
                match tables.$table.get_mut(&id).filter(|row| !row.is_deleted) {
                    Some(row) => {
                        row.is_deleted = true;
                        row.deleted_at = Some(now);
                        row.updated_at = now;
                        true
                    }
                    None => false,
                }
            };
        }
        Ok(match kind {
            EntityKind::Event => mark_deleted!(events),
            EntityKind::Registration => mark_deleted!(registrations),
            EntityKind::Notification => mark_deleted!(notifications),
        })
    }

    async fn restore(&self, kind: EntityKind, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.lock()?;

        // A restored registration must not collide with a newer open one.
        if kind == EntityKind::Registration {
            if let Some(registration) = tables.registrations.get(&id).filter(|r| r.is_deleted) {
                if registration.status != RegistrationStatus::Cancelled
                    && tables
                        .open_registration(registration.participant_id, registration.event_id)
                        .is_some()
                {
                    return Err(unique(
                        "Participant already holds a registration for this event",
                    ));
                }
            }
        }

        let now = Utc::now();
        macro_rules! clear_deleted {
            ($table:ident) => {
                match tables.$table.get_mut(&id).filter(|row| row.is_deleted) {
                    Some(row) => {
                        row.is_deleted = false;
                        row.deleted_at = None;
                        row.updated_at = now;
                        true
                    }
                    None => false,
                }
            };
        }
        Ok(match kind {
            EntityKind::Event => clear_deleted!(events),
            EntityKind::Registration => clear_deleted!(registrations),
            EntityKind::Notification => clear_deleted!(notifications),
        })
    }
}
