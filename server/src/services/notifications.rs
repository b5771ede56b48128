//! Notification generator.
//!
//! Turns registration lifecycle transitions into participant- and
//! organizer-facing notices. Generation is best effort: failures are logged
//! and never undo the transition that triggered them.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::Role;
use crate::models::{
    Event, NewNotification, Notification, NotificationKind, Participant, Recipient, Registration,
    RegistrationStatus,
};
use crate::store::{EntityKind, Scope, Store};
use crate::utils::error::AppError;
use crate::utils::pagination::{Page, PageRequest};

/// Everything the generator needs to word a notice about one registration.
pub struct RegistrationContext<'a> {
    pub registration: &'a Registration,
    pub event: &'a Event,
    pub participant: &'a Participant,
}

#[derive(Clone)]
pub struct NotificationGenerator {
    store: Arc<dyn Store>,
}

impl NotificationGenerator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn on_registration_created(&self, ctx: &RegistrationContext<'_>) -> Vec<Notification> {
        let mut notices = vec![NewNotification {
            recipient: Recipient::Participant(ctx.participant.id),
            event_id: ctx.event.id,
            registration_id: ctx.registration.id,
            kind: NotificationKind::RegistrationCreated,
            message: messages::participant_created(ctx.event, ctx.registration.status),
        }];
        if let Some(organizer_id) = ctx.event.organizer_id {
            notices.push(NewNotification {
                recipient: Recipient::Organizer(organizer_id),
                event_id: ctx.event.id,
                registration_id: ctx.registration.id,
                kind: NotificationKind::RegistrationCreated,
                message: messages::organizer_created(
                    ctx.event,
                    ctx.participant,
                    ctx.registration.status,
                ),
            });
        }
        self.emit(notices).await
    }

    /// Dispatches on the destination state of a genuine status change.
    pub async fn on_status_changed(
        &self,
        ctx: &RegistrationContext<'_>,
        previous: RegistrationStatus,
    ) -> Vec<Notification> {
        match ctx.registration.status {
            current if current == previous => Vec::new(),
            RegistrationStatus::Cancelled => self.on_registration_cancelled(ctx, previous).await,
            RegistrationStatus::Confirmed => self.on_registration_confirmed(ctx).await,
            RegistrationStatus::Pending => Vec::new(),
        }
    }

    pub async fn on_registration_cancelled(
        &self,
        ctx: &RegistrationContext<'_>,
        previous: RegistrationStatus,
    ) -> Vec<Notification> {
        if previous == RegistrationStatus::Cancelled
            || ctx.registration.status != RegistrationStatus::Cancelled
        {
            return Vec::new();
        }

        let mut notices = vec![NewNotification {
            recipient: Recipient::Participant(ctx.participant.id),
            event_id: ctx.event.id,
            registration_id: ctx.registration.id,
            kind: NotificationKind::RegistrationCancelled,
            message: messages::participant_cancelled(ctx.event),
        }];
        if let Some(organizer_id) = ctx.event.organizer_id {
            notices.push(NewNotification {
                recipient: Recipient::Organizer(organizer_id),
                event_id: ctx.event.id,
                registration_id: ctx.registration.id,
                kind: NotificationKind::RegistrationCancelled,
                message: messages::organizer_cancelled(ctx.event, ctx.participant),
            });
        }
        self.emit(notices).await
    }

    pub async fn on_registration_confirmed(
        &self,
        ctx: &RegistrationContext<'_>,
    ) -> Vec<Notification> {
        let mut notices = vec![NewNotification {
            recipient: Recipient::Participant(ctx.participant.id),
            event_id: ctx.event.id,
            registration_id: ctx.registration.id,
            kind: NotificationKind::RegistrationConfirmed,
            message: messages::participant_confirmed(ctx.event),
        }];
        if let Some(organizer_id) = ctx.event.organizer_id {
            notices.push(NewNotification {
                recipient: Recipient::Organizer(organizer_id),
                event_id: ctx.event.id,
                registration_id: ctx.registration.id,
                kind: NotificationKind::RegistrationConfirmed,
                message: messages::organizer_confirmed(ctx.event, ctx.participant),
            });
        }
        self.emit(notices).await
    }

    async fn emit(&self, notices: Vec<NewNotification>) -> Vec<Notification> {
        let mut created = Vec::with_capacity(notices.len());
        for notice in notices {
            let (recipient, registration_id, kind) =
                (notice.recipient, notice.registration_id, notice.kind);

            match self
                .store
                .notification_exists(recipient, registration_id, kind)
                .await
            {
                Ok(true) => {
                    debug!(?recipient, %registration_id, ?kind, "Notification already sent, skipping");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, ?recipient, %registration_id, "Notification lookup failed");
                    continue;
                }
            }

            // The insert is itself conflict-safe; `None` means a concurrent
            // trigger won the race.
            match self.store.insert_notification(notice).await {
                Ok(Some(notification)) => {
                    info!(
                        notification_id = %notification.id,
                        ?recipient,
                        ?kind,
                        "Notification created"
                    );
                    created.push(notification);
                }
                Ok(None) => {
                    debug!(?recipient, %registration_id, ?kind, "Notification deduplicated on insert");
                }
                Err(e) => {
                    warn!(error = %e, ?recipient, %registration_id, ?kind, "Failed to create notification");
                }
            }
        }
        created
    }

    pub async fn list(&self, role: &Role, page: PageRequest) -> Result<Page<Notification>, AppError> {
        let recipient = require_recipient(role)?;
        Ok(self.store.list_notifications(recipient, page).await?)
    }

    pub async fn get(&self, role: &Role, id: Uuid) -> Result<Notification, AppError> {
        let recipient = require_recipient(role)?;
        self.find_owned(recipient, id).await
    }

    /// Idempotent: re-marking an already read notice succeeds unchanged.
    pub async fn mark_read(&self, role: &Role, id: Uuid) -> Result<Notification, AppError> {
        let recipient = require_recipient(role)?;
        self.find_owned(recipient, id).await?;
        self.store
            .mark_notification_read(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn delete(&self, role: &Role, id: Uuid) -> Result<(), AppError> {
        let recipient = require_recipient(role)?;
        self.find_owned(recipient, id).await?;
        if !self.store.soft_delete(EntityKind::Notification, id).await? {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// Fails closed: an unresolved recipient or a store failure counts as zero.
    pub async fn unread_count(&self, role: &Role) -> i64 {
        let Some(recipient) = role.recipient() else {
            return 0;
        };
        match self.store.count_unread(recipient).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, ?recipient, "Unread count unavailable, reporting zero");
                0
            }
        }
    }

    async fn find_owned(&self, recipient: Recipient, id: Uuid) -> Result<Notification, AppError> {
        let notification = self
            .store
            .find_notification(id, Scope::Active)
            .await?
            .ok_or_else(|| not_found(id))?;
        if notification.recipient() != Some(recipient) {
            return Err(AppError::Forbidden(
                "Notification belongs to another recipient".to_string(),
            ));
        }
        Ok(notification)
    }
}

fn require_recipient(role: &Role) -> Result<Recipient, AppError> {
    role.recipient().ok_or_else(|| {
        AppError::MissingProfile("A participant or organizer profile is required".to_string())
    })
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Notification '{}' was not found", id))
}

pub mod messages {
    use crate::models::{Event, Participant, RegistrationStatus};

    pub fn participant_created(event: &Event, status: RegistrationStatus) -> String {
        match (status, event.is_paid()) {
            (RegistrationStatus::Confirmed, false) => format!(
                "Your registration for '{}' is confirmed. This is a free event, see you there!",
                event.title
            ),
            (RegistrationStatus::Confirmed, true) => format!(
                "Your registration for '{}' is confirmed. Payment of {} received.",
                event.title, event.price
            ),
            (RegistrationStatus::Pending, _) => format!(
                "Your registration for '{}' is pending, awaiting payment of {}.",
                event.title, event.price
            ),
            (RegistrationStatus::Cancelled, _) => format!(
                "Your registration for '{}' was recorded as cancelled.",
                event.title
            ),
        }
    }

    pub fn organizer_created(
        event: &Event,
        participant: &Participant,
        status: RegistrationStatus,
    ) -> String {
        format!(
            "New registration for '{}' from {} (status: {}).",
            event.title, participant.name, status
        )
    }

    pub fn participant_cancelled(event: &Event) -> String {
        format!("Your registration for '{}' has been cancelled.", event.title)
    }

    pub fn organizer_cancelled(event: &Event, participant: &Participant) -> String {
        format!(
            "{} cancelled their registration for '{}'.",
            participant.name, event.title
        )
    }

    pub fn participant_confirmed(event: &Event) -> String {
        format!(
            "Payment received: your registration for '{}' is now confirmed.",
            event.title
        )
    }

    pub fn organizer_confirmed(event: &Event, participant: &Participant) -> String {
        format!(
            "Registration from {} for '{}' was confirmed.",
            participant.name, event.title
        )
    }

    /// Outcome text returned to the caller of `register`.
    pub fn register_outcome(event: &Event, status: RegistrationStatus) -> String {
        match status {
            RegistrationStatus::Pending => format!(
                "Registration received and pending, awaiting payment of {}.",
                event.price
            ),
            _ if event.is_paid() => "Registration confirmed.".to_string(),
            _ => "Registration confirmed, this is a free event.".to_string(),
        }
    }
}
