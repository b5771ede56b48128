use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use eventhub_server::auth::Role;
use eventhub_server::models::{
    Event, EventChanges, EventFilter, EventType, NewEvent, NewNotification, NewOrganizer,
    NewParticipant, NewRegistration, Notification, NotificationKind, Organizer, Participant,
    Recipient, Registration, RegistrationFilter, RegistrationStatus,
};
use eventhub_server::services::{NotificationGenerator, RegistrationEngine};
use eventhub_server::store::{EntityKind, MemoryStore, Scope, Store, StoreResult};
use eventhub_server::utils::error::AppError;
use eventhub_server::utils::pagination::{Page, PageRequest};

/// `MemoryStore` with switches that replay what a concurrent request would
/// have done between two steps of the engine.
#[derive(Default)]
struct InterleavedStore {
    inner: MemoryStore,
    /// The duplicate pre-check sees nothing, so the insert decides.
    hide_open_registrations: AtomicBool,
    /// The next status update finds the row already confirmed by someone else.
    confirm_before_next_transition: AtomicBool,
}

#[async_trait]
impl Store for InterleavedStore {
    async fn resolve_role(&self, account_id: Uuid) -> StoreResult<Role> {
        self.inner.resolve_role(account_id).await
    }

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event> {
        self.inner.insert_event(event).await
    }

    async fn find_event(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Event>> {
        self.inner.find_event(id, scope).await
    }

    async fn update_event(&self, id: Uuid, changes: EventChanges) -> StoreResult<Option<Event>> {
        self.inner.update_event(id, changes).await
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Event>> {
        self.inner.list_events(filter, page).await
    }

    async fn count_registrations(&self, event_id: Uuid) -> StoreResult<i64> {
        self.inner.count_registrations(event_id).await
    }

    async fn insert_participant(&self, participant: NewParticipant) -> StoreResult<Participant> {
        self.inner.insert_participant(participant).await
    }

    async fn find_participant(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Participant>> {
        self.inner.find_participant(id, scope).await
    }

    async fn list_participants(&self, page: PageRequest) -> StoreResult<Page<Participant>> {
        self.inner.list_participants(page).await
    }

    async fn insert_organizer(&self, organizer: NewOrganizer) -> StoreResult<Organizer> {
        self.inner.insert_organizer(organizer).await
    }

    async fn find_organizer(&self, id: Uuid, scope: Scope) -> StoreResult<Option<Organizer>> {
        self.inner.find_organizer(id, scope).await
    }

    async fn list_organizers(&self, page: PageRequest) -> StoreResult<Page<Organizer>> {
        self.inner.list_organizers(page).await
    }

    async fn insert_registration(
        &self,
        registration: NewRegistration,
    ) -> StoreResult<Registration> {
        self.inner.insert_registration(registration).await
    }

    async fn find_registration(
        &self,
        id: Uuid,
        scope: Scope,
    ) -> StoreResult<Option<Registration>> {
        self.inner.find_registration(id, scope).await
    }

    async fn find_open_registration(
        &self,
        participant_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<Registration>> {
        if self.hide_open_registrations.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner
            .find_open_registration(participant_id, event_id)
            .await
    }

    async fn transition_registration(
        &self,
        id: Uuid,
        from: RegistrationStatus,
        to: RegistrationStatus,
    ) -> StoreResult<Option<Registration>> {
        if self
            .confirm_before_next_transition
            .swap(false, Ordering::SeqCst)
        {
            self.inner
                .transition_registration(
                    id,
                    RegistrationStatus::Pending,
                    RegistrationStatus::Confirmed,
                )
                .await?;
        }
        self.inner.transition_registration(id, from, to).await
    }

    async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
        page: PageRequest,
    ) -> StoreResult<Page<Registration>> {
        self.inner.list_registrations(filter, page).await
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Option<Notification>> {
        self.inner.insert_notification(notification).await
    }

    async fn notification_exists(
        &self,
        recipient: Recipient,
        registration_id: Uuid,
        kind: NotificationKind,
    ) -> StoreResult<bool> {
        self.inner
            .notification_exists(recipient, registration_id, kind)
            .await
    }

    async fn find_notification(
        &self,
        id: Uuid,
        scope: Scope,
    ) -> StoreResult<Option<Notification>> {
        self.inner.find_notification(id, scope).await
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        self.inner.mark_notification_read(id).await
    }

    async fn list_notifications(
        &self,
        recipient: Recipient,
        page: PageRequest,
    ) -> StoreResult<Page<Notification>> {
        self.inner.list_notifications(recipient, page).await
    }

    async fn count_unread(&self, recipient: Recipient) -> StoreResult<i64> {
        self.inner.count_unread(recipient).await
    }

    async fn soft_delete(&self, kind: EntityKind, id: Uuid) -> StoreResult<bool> {
        self.inner.soft_delete(kind, id).await
    }

    async fn restore(&self, kind: EntityKind, id: Uuid) -> StoreResult<bool> {
        self.inner.restore(kind, id).await
    }
}

struct Harness {
    store: Arc<dyn Store>,
    engine: RegistrationEngine,
    notifications: NotificationGenerator,
    organizer: Organizer,
    participant: Participant,
}

impl Harness {
    async fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }

    async fn with_store(store: Arc<dyn Store>) -> Self {
        let notifications = NotificationGenerator::new(Arc::clone(&store));
        let engine = RegistrationEngine::new(Arc::clone(&store), notifications.clone());

        let organizer = store
            .insert_organizer(NewOrganizer {
                name: "Olivia Organizer".to_string(),
                email: "olivia@example.com".to_string(),
                phone: None,
                company: Some("Conf Co".to_string()),
                account_id: Some(Uuid::new_v4()),
            })
            .await
            .unwrap();
        let participant = store
            .insert_participant(NewParticipant {
                name: "Pat Participant".to_string(),
                email: "pat@example.com".to_string(),
                account_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        Self {
            store,
            engine,
            notifications,
            organizer,
            participant,
        }
    }

    async fn event(&self, price: Decimal) -> Event {
        self.event_by(Some(self.organizer.id), price).await
    }

    async fn event_by(&self, organizer_id: Option<Uuid>, price: Decimal) -> Event {
        let start = Utc::now() + Duration::days(7);
        self.store
            .insert_event(NewEvent {
                title: "Rust Meetup".to_string(),
                description: String::new(),
                location: "Porto".to_string(),
                start_time: start,
                end_time: start + Duration::hours(3),
                capacity: 50,
                event_type: EventType::InPerson,
                price,
                is_active: true,
                organizer_id,
            })
            .await
            .unwrap()
    }

    async fn participant_notices(&self) -> Vec<Notification> {
        self.store
            .list_notifications(
                Recipient::Participant(self.participant.id),
                PageRequest::default(),
            )
            .await
            .unwrap()
            .results
    }

    async fn organizer_notices(&self) -> Vec<Notification> {
        self.store
            .list_notifications(
                Recipient::Organizer(self.organizer.id),
                PageRequest::default(),
            )
            .await
            .unwrap()
            .results
    }

    async fn registrations_for(&self, event_id: Uuid) -> i64 {
        let filter = RegistrationFilter {
            participant_id: Some(self.participant.id),
            event_id: Some(event_id),
            ..RegistrationFilter::default()
        };
        self.store
            .list_registrations(&filter, PageRequest::default())
            .await
            .unwrap()
            .count
    }
}

fn count_kind(notices: &[Notification], kind: NotificationKind) -> usize {
    notices.iter().filter(|n| n.kind == kind).count()
}

#[tokio::test]
async fn test_free_event_registration_is_confirmed() {
    let h = Harness::new().await;
    let event = h.event(Decimal::ZERO).await;

    let outcome = h.engine.register(h.participant.id, event.id).await.unwrap();

    assert_eq!(outcome.status, RegistrationStatus::Confirmed);
    assert_eq!(outcome.registration.status, RegistrationStatus::Confirmed);
    assert!(!outcome.is_paid);
    assert!(outcome.message.contains("free"));

    let participant_notices = h.participant_notices().await;
    assert_eq!(participant_notices.len(), 1);
    assert!(participant_notices[0].message.contains("free event"));
    assert_eq!(h.organizer_notices().await.len(), 1);
}

#[tokio::test]
async fn test_paid_event_registration_is_pending() {
    let h = Harness::new().await;
    let event = h.event(Decimal::new(5000, 2)).await;

    let outcome = h.engine.register(h.participant.id, event.id).await.unwrap();

    assert_eq!(outcome.status, RegistrationStatus::Pending);
    assert!(outcome.is_paid);
    assert!(outcome.message.contains("50.00"));

    let notices = h.participant_notices().await;
    assert_eq!(notices.len(), 1);
    assert!(notices[0].message.contains("awaiting payment of 50.00"));
    assert_eq!(notices[0].kind, NotificationKind::RegistrationCreated);
}

#[tokio::test]
async fn test_duplicate_registration_is_a_conflict() {
    let h = Harness::new().await;
    let event = h.event(Decimal::new(5000, 2)).await;

    h.engine.register(h.participant.id, event.id).await.unwrap();
    let err = h
        .engine
        .register(h.participant.id, event.id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(h.registrations_for(event.id).await, 1);
    assert_eq!(h.participant_notices().await.len(), 1);
    assert_eq!(h.organizer_notices().await.len(), 1);
}

#[tokio::test]
async fn test_racing_insert_loses_with_conflict() {
    let store = Arc::new(InterleavedStore::default());
    let h = Harness::with_store(store.clone()).await;
    let event = h.event(Decimal::new(5000, 2)).await;

    h.engine.register(h.participant.id, event.id).await.unwrap();

    // Both requests passed the pre-check; only the store's guard separates them.
    store.hide_open_registrations.store(true, Ordering::SeqCst);
    let err = h
        .engine
        .register(h.participant.id, event.id)
        .await
        .unwrap_err();

    match err {
        AppError::Conflict(message) => {
            assert_eq!(message, "Participant is already registered for this event")
        }
        other => panic!("expected a conflict, got {:?}", other),
    }
    assert_eq!(h.registrations_for(event.id).await, 1);
    assert_eq!(h.participant_notices().await.len(), 1);
    assert_eq!(h.organizer_notices().await.len(), 1);
}

#[tokio::test]
async fn test_cancel_settles_after_losing_a_status_race() {
    let store = Arc::new(InterleavedStore::default());
    let h = Harness::with_store(store.clone()).await;
    let event = h.event(Decimal::new(5000, 2)).await;
    let outcome = h.engine.register(h.participant.id, event.id).await.unwrap();

    store
        .confirm_before_next_transition
        .store(true, Ordering::SeqCst);
    let cancelled = h
        .engine
        .cancel(&Role::Participant(h.participant.id), outcome.registration.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, RegistrationStatus::Cancelled);

    let participant_notices = h.participant_notices().await;
    let organizer_notices = h.organizer_notices().await;
    assert_eq!(
        count_kind(&participant_notices, NotificationKind::RegistrationCancelled),
        1
    );
    assert_eq!(
        count_kind(&organizer_notices, NotificationKind::RegistrationCancelled),
        1
    );
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let h = Harness::new().await;
    let event = h.event(Decimal::new(5000, 2)).await;
    let actor = Role::Participant(h.participant.id);

    let outcome = h.engine.register(h.participant.id, event.id).await.unwrap();
    let cancelled = h
        .engine
        .cancel(&actor, outcome.registration.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, RegistrationStatus::Cancelled);

    let participant_notices = h.participant_notices().await;
    let organizer_notices = h.organizer_notices().await;
    assert_eq!(
        count_kind(&participant_notices, NotificationKind::RegistrationCancelled),
        1
    );
    assert_eq!(
        count_kind(&organizer_notices, NotificationKind::RegistrationCancelled),
        1
    );

    let again = h
        .engine
        .cancel(&actor, outcome.registration.id)
        .await
        .unwrap();
    assert_eq!(again.status, RegistrationStatus::Cancelled);
    assert_eq!(h.participant_notices().await.len(), participant_notices.len());
    assert_eq!(h.organizer_notices().await.len(), organizer_notices.len());
}

#[tokio::test]
async fn test_organizer_can_cancel_but_strangers_cannot() {
    let h = Harness::new().await;
    let event = h.event(Decimal::ZERO).await;
    let outcome = h.engine.register(h.participant.id, event.id).await.unwrap();

    let err = h
        .engine
        .cancel(&Role::Participant(Uuid::new_v4()), outcome.registration.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = h
        .engine
        .cancel(&Role::Anonymous, outcome.registration.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AuthError(_)));

    let cancelled = h
        .engine
        .cancel(&Role::Organizer(h.organizer.id), outcome.registration.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
}

#[tokio::test]
async fn test_cancelled_registration_can_register_again() {
    let h = Harness::new().await;
    let event = h.event(Decimal::ZERO).await;
    let actor = Role::Participant(h.participant.id);

    let first = h.engine.register(h.participant.id, event.id).await.unwrap();
    h.engine.cancel(&actor, first.registration.id).await.unwrap();

    let second = h.engine.register(h.participant.id, event.id).await.unwrap();
    assert_ne!(first.registration.id, second.registration.id);
    assert_eq!(second.status, RegistrationStatus::Confirmed);

    // Each registration gets its own creation notice.
    let notices = h.participant_notices().await;
    assert_eq!(count_kind(&notices, NotificationKind::RegistrationCreated), 2);
    assert_eq!(count_kind(&notices, NotificationKind::RegistrationCancelled), 1);
}

#[tokio::test]
async fn test_organizer_confirms_pending_registration() {
    let h = Harness::new().await;
    let event = h.event(Decimal::new(1999, 2)).await;
    let outcome = h.engine.register(h.participant.id, event.id).await.unwrap();
    let id = outcome.registration.id;

    let err = h
        .engine
        .confirm(&Role::Participant(h.participant.id), id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let organizer = Role::Organizer(h.organizer.id);
    let confirmed = h.engine.confirm(&organizer, id).await.unwrap();
    assert_eq!(confirmed.status, RegistrationStatus::Confirmed);

    let notices = h.participant_notices().await;
    assert_eq!(count_kind(&notices, NotificationKind::RegistrationConfirmed), 1);

    // Already confirmed: unchanged, nothing new emitted.
    h.engine.confirm(&organizer, id).await.unwrap();
    assert_eq!(h.participant_notices().await.len(), notices.len());
}

#[tokio::test]
async fn test_cancelled_registration_cannot_be_confirmed() {
    let h = Harness::new().await;
    let event = h.event(Decimal::new(1000, 2)).await;
    let outcome = h.engine.register(h.participant.id, event.id).await.unwrap();
    let id = outcome.registration.id;

    h.engine
        .cancel(&Role::Participant(h.participant.id), id)
        .await
        .unwrap();
    let err = h
        .engine
        .confirm(&Role::Organizer(h.organizer.id), id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_deleted_registration_frees_the_slot() {
    let h = Harness::new().await;
    let event = h.event(Decimal::ZERO).await;
    let actor = Role::Participant(h.participant.id);

    let first = h.engine.register(h.participant.id, event.id).await.unwrap();
    h.engine.delete(&actor, first.registration.id).await.unwrap();

    let err = h.engine.get(&actor, first.registration.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    h.engine.register(h.participant.id, event.id).await.unwrap();
    assert_eq!(h.registrations_for(event.id).await, 1);
}

#[tokio::test]
async fn test_registration_requires_profile_and_event() {
    let h = Harness::new().await;
    let event = h.event(Decimal::ZERO).await;

    let err = h
        .engine
        .register(Uuid::new_v4(), event.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingProfile(_)));

    let err = h
        .engine
        .register(h.participant.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_mark_read_twice_succeeds() {
    let h = Harness::new().await;
    let event = h.event(Decimal::ZERO).await;
    h.engine.register(h.participant.id, event.id).await.unwrap();

    let role = Role::Participant(h.participant.id);
    assert_eq!(h.notifications.unread_count(&role).await, 1);

    let notice = h.participant_notices().await.remove(0);
    let first = h.notifications.mark_read(&role, notice.id).await.unwrap();
    let second = h.notifications.mark_read(&role, notice.id).await.unwrap();
    assert!(first.is_read);
    assert!(second.is_read);
    assert_eq!(h.notifications.unread_count(&role).await, 0);
}

#[tokio::test]
async fn test_notifications_are_private_to_their_recipient() {
    let h = Harness::new().await;
    let event = h.event(Decimal::ZERO).await;
    h.engine.register(h.participant.id, event.id).await.unwrap();
    let notice = h.participant_notices().await.remove(0);

    let err = h
        .notifications
        .get(&Role::Organizer(h.organizer.id), notice.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let owner = Role::Participant(h.participant.id);
    h.notifications.delete(&owner, notice.id).await.unwrap();
    let err = h.notifications.get(&owner, notice.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_unread_count_is_zero_without_a_profile() {
    let h = Harness::new().await;
    let event = h.event(Decimal::ZERO).await;
    h.engine.register(h.participant.id, event.id).await.unwrap();

    assert_eq!(h.notifications.unread_count(&Role::Anonymous).await, 0);
    assert_eq!(
        h.notifications
            .unread_count(&Role::Organizer(h.organizer.id))
            .await,
        1
    );
}

#[tokio::test]
async fn test_replayed_creation_does_not_duplicate_notices() {
    use eventhub_server::services::notifications::RegistrationContext;

    let h = Harness::new().await;
    let event = h.event(Decimal::ZERO).await;
    let outcome = h.engine.register(h.participant.id, event.id).await.unwrap();

    let replayed = h
        .notifications
        .on_registration_created(&RegistrationContext {
            registration: &outcome.registration,
            event: &event,
            participant: &h.participant,
        })
        .await;

    assert!(replayed.is_empty());
    assert_eq!(h.participant_notices().await.len(), 1);
    assert_eq!(h.organizer_notices().await.len(), 1);
}

#[tokio::test]
async fn test_event_without_organizer_notifies_participant_only() {
    let h = Harness::new().await;
    let event = h.event_by(None, Decimal::ZERO).await;

    let outcome = h.engine.register(h.participant.id, event.id).await.unwrap();
    let notices = h.participant_notices().await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NotificationKind::RegistrationCreated);
    assert!(h.organizer_notices().await.is_empty());

    h.engine
        .cancel(&Role::Participant(h.participant.id), outcome.registration.id)
        .await
        .unwrap();
    let notices = h.participant_notices().await;
    assert_eq!(notices.len(), 2);
    assert_eq!(count_kind(&notices, NotificationKind::RegistrationCancelled), 1);
    assert!(h.organizer_notices().await.is_empty());
}
