//! Registration lifecycle engine.
//!
//! States are `pending`, `confirmed` and `cancelled`. The initial state is
//! derived from the event price; `pending -> confirmed` and
//! `{pending, confirmed} -> cancelled` are the only transitions. A cancelled
//! registration no longer holds the (participant, event) slot, so the pair
//! may register again.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::notifications::{messages, NotificationGenerator, RegistrationContext};
use crate::auth::Role;
use crate::models::{
    Event, NewRegistration, Participant, Registration, RegistrationFilter, RegistrationOutcome,
    RegistrationStatus,
};
use crate::store::{EntityKind, Scope, Store, StoreError};
use crate::utils::error::AppError;
use crate::utils::pagination::{Page, PageRequest};

#[derive(Clone)]
pub struct RegistrationEngine {
    store: Arc<dyn Store>,
    notifications: NotificationGenerator,
}

impl RegistrationEngine {
    pub fn new(store: Arc<dyn Store>, notifications: NotificationGenerator) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub async fn register(
        &self,
        participant_id: Uuid,
        event_id: Uuid,
    ) -> Result<RegistrationOutcome, AppError> {
        let participant = self
            .store
            .find_participant(participant_id, Scope::Active)
            .await?
            .ok_or_else(|| {
                AppError::MissingProfile("Participant profile not found".to_string())
            })?;
        let event = self
            .store
            .find_event(event_id, Scope::Active)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event '{}' was not found", event_id)))?;

        if self
            .store
            .find_open_registration(participant.id, event.id)
            .await?
            .is_some()
        {
            return Err(duplicate_registration());
        }

        let status = RegistrationStatus::initial_for_price(event.price);
        // The store's uniqueness guard decides racing inserts for the same pair.
        let registration = self
            .store
            .insert_registration(NewRegistration {
                participant_id: participant.id,
                event_id: event.id,
                status,
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => duplicate_registration(),
                other => other.into(),
            })?;

        info!(
            registration_id = %registration.id,
            participant_id = %participant.id,
            event_id = %event.id,
            status = %status,
            "Registration created"
        );

        self.notifications
            .on_registration_created(&RegistrationContext {
                registration: &registration,
                event: &event,
                participant: &participant,
            })
            .await;

        Ok(RegistrationOutcome {
            message: messages::register_outcome(&event, status),
            is_paid: event.is_paid(),
            status,
            registration,
        })
    }

    /// Idempotent: cancelling a cancelled registration returns it unchanged
    /// and emits nothing.
    pub async fn cancel(&self, actor: &Role, registration_id: Uuid) -> Result<Registration, AppError> {
        let (registration, event) = self.load(registration_id).await?;
        authorize_participant_or_organizer(actor, &registration, &event)?;

        self.transition(registration, &event, RegistrationStatus::Cancelled)
            .await
    }

    /// pending -> confirmed, performed by the event's organizer once payment
    /// is settled. Idempotent for already confirmed registrations.
    pub async fn confirm(&self, actor: &Role, registration_id: Uuid) -> Result<Registration, AppError> {
        let (registration, event) = self.load(registration_id).await?;
        match actor {
            Role::Organizer(organizer_id) if event.is_owned_by(*organizer_id) => {}
            Role::Anonymous => return Err(not_authenticated()),
            _ => {
                return Err(AppError::Forbidden(
                    "Only the event organizer can confirm registrations".to_string(),
                ))
            }
        }

        self.transition(registration, &event, RegistrationStatus::Confirmed)
            .await
    }

    pub async fn get(&self, actor: &Role, registration_id: Uuid) -> Result<Registration, AppError> {
        let (registration, event) = self.load(registration_id).await?;
        authorize_participant_or_organizer(actor, &registration, &event)?;
        Ok(registration)
    }

    /// Soft delete by the owning participant; frees the pair's slot.
    pub async fn delete(&self, actor: &Role, registration_id: Uuid) -> Result<(), AppError> {
        let (registration, _) = self.load(registration_id).await?;
        match actor {
            Role::Participant(id) if *id == registration.participant_id => {}
            Role::Anonymous => return Err(not_authenticated()),
            _ => {
                return Err(AppError::Forbidden(
                    "Only the registered participant can delete a registration".to_string(),
                ))
            }
        }

        if !self
            .store
            .soft_delete(EntityKind::Registration, registration.id)
            .await?
        {
            return Err(registration_not_found(registration.id));
        }
        info!(registration_id = %registration.id, "Registration soft-deleted");
        Ok(())
    }

    pub async fn list_for_participant(
        &self,
        participant_id: Uuid,
        mut filter: RegistrationFilter,
        page: PageRequest,
    ) -> Result<Page<Registration>, AppError> {
        filter.participant_id = Some(participant_id);
        filter.organizer_id = None;
        Ok(self.store.list_registrations(&filter, page).await?)
    }

    pub async fn list_for_organizer(
        &self,
        organizer_id: Uuid,
        mut filter: RegistrationFilter,
        page: PageRequest,
    ) -> Result<Page<Registration>, AppError> {
        filter.organizer_id = Some(organizer_id);
        filter.participant_id = None;
        Ok(self.store.list_registrations(&filter, page).await?)
    }

    async fn load(&self, registration_id: Uuid) -> Result<(Registration, Event), AppError> {
        let registration = self
            .store
            .find_registration(registration_id, Scope::Active)
            .await?
            .ok_or_else(|| registration_not_found(registration_id))?;
        // A soft-deleted event still owns its registrations.
        let event = self
            .store
            .find_event(registration.event_id, Scope::All)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Event '{}' was not found", registration.event_id))
            })?;
        Ok((registration, event))
    }

    async fn transition(
        &self,
        mut current: Registration,
        event: &Event,
        target: RegistrationStatus,
    ) -> Result<Registration, AppError> {
        // Status only moves forward, so a lost compare-and-set settles after
        // re-reading at most twice.
        loop {
            if current.status == target {
                return Ok(current);
            }
            if !current.status.can_transition_to(target) {
                return Err(AppError::Conflict(format!(
                    "Cannot move a {} registration to {}",
                    current.status, target
                )));
            }

            let previous = current.status;
            match self
                .store
                .transition_registration(current.id, previous, target)
                .await?
            {
                Some(updated) => {
                    info!(
                        registration_id = %updated.id,
                        from = %previous,
                        to = %target,
                        "Registration status changed"
                    );
                    self.notify_status_change(&updated, event, previous).await;
                    return Ok(updated);
                }
                None => {
                    current = self
                        .store
                        .find_registration(current.id, Scope::Active)
                        .await?
                        .ok_or_else(|| registration_not_found(current.id))?;
                }
            }
        }
    }

    async fn notify_status_change(
        &self,
        registration: &Registration,
        event: &Event,
        previous: RegistrationStatus,
    ) {
        let participant: Option<Participant> = match self
            .store
            .find_participant(registration.participant_id, Scope::All)
            .await
        {
            Ok(participant) => participant,
            Err(e) => {
                warn!(
                    error = %e,
                    registration_id = %registration.id,
                    "Could not load participant for notification"
                );
                None
            }
        };
        let Some(participant) = participant else {
            return;
        };

        self.notifications
            .on_status_changed(
                &RegistrationContext {
                    registration,
                    event,
                    participant: &participant,
                },
                previous,
            )
            .await;
    }
}

fn authorize_participant_or_organizer(
    actor: &Role,
    registration: &Registration,
    event: &Event,
) -> Result<(), AppError> {
    match actor {
        Role::Participant(id) if *id == registration.participant_id => Ok(()),
        Role::Organizer(id) if event.is_owned_by(*id) => Ok(()),
        Role::Anonymous => Err(not_authenticated()),
        _ => Err(AppError::Forbidden(
            "Only the registered participant or the event organizer can access this registration"
                .to_string(),
        )),
    }
}

fn duplicate_registration() -> AppError {
    AppError::Conflict("Participant is already registered for this event".to_string())
}

fn registration_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Registration '{}' was not found", id))
}

fn not_authenticated() -> AppError {
    AppError::AuthError("Authentication required".to_string())
}
