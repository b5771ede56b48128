use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::auth::{Caller, Role};
use crate::models::{Event, EventChanges, EventDetail, EventFilter, NewEvent};
use crate::state::AppState;
use crate::store::{EntityKind, Scope};
use crate::utils::error::AppError;
use crate::utils::pagination::PageRequest;
use crate::utils::response::{created, empty_success, success};

pub async fn list_events(
    State(state): State<AppState>,
    caller: Caller,
    filter: Result<Query<EventFilter>, QueryRejection>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(filter) = filter?;
    let Query(page) = page?;

    // Deleted events are only visible to their own organizer.
    if filter.include_deleted {
        let organizer_id = caller.require_organizer()?;
        if filter.organizer_id != Some(organizer_id) {
            return Err(AppError::Forbidden(
                "Deleted events can only be listed for your own organizer profile".to_string(),
            ));
        }
    }

    let events = state.store.list_events(&filter, page).await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn create_event(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<NewEvent>, JsonRejection>,
) -> Result<Response, AppError> {
    let organizer_id = caller.require_organizer()?;
    let Json(mut event) = body?;
    event.validate()?;
    event.organizer_id = Some(organizer_id);

    let event = state.store.insert_event(event).await?;
    tracing::info!(event_id = %event.id, organizer_id = %organizer_id, "Event created");
    Ok(created(event, "Event created"))
}

pub async fn get_event(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let event = find_active(&state, id).await?;
    let total_registrations = state.store.count_registrations(event.id).await?;

    let my_registration_status = match caller.role {
        Role::Participant(participant_id) => state
            .store
            .find_open_registration(participant_id, event.id)
            .await?
            .map(|registration| registration.status),
        _ => None,
    };

    let detail = EventDetail {
        event,
        total_registrations,
        my_registration_status,
    };
    Ok(success(detail, "Event retrieved"))
}

pub async fn update_event(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<EventChanges>, JsonRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let Json(changes) = body?;
    let organizer_id = caller.require_organizer()?;

    let current = find_active(&state, id).await?;
    ensure_owner(&current, organizer_id)?;
    changes.validate_against(&current)?;

    let event = state
        .store
        .update_event(id, changes)
        .await?
        .ok_or_else(|| not_found(id))?;
    tracing::info!(event_id = %event.id, "Event updated");
    Ok(success(event, "Event updated"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let organizer_id = caller.require_organizer()?;

    let event = find_active(&state, id).await?;
    ensure_owner(&event, organizer_id)?;

    if !state.store.soft_delete(EntityKind::Event, id).await? {
        return Err(not_found(id));
    }
    tracing::info!(event_id = %id, "Event soft-deleted");
    Ok(empty_success("Event deleted"))
}

pub async fn restore_event(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let organizer_id = caller.require_organizer()?;

    let event = state
        .store
        .find_event(id, Scope::All)
        .await?
        .ok_or_else(|| not_found(id))?;
    ensure_owner(&event, organizer_id)?;

    if !event.is_deleted {
        return Ok(success(event, "Event is not deleted"));
    }
    state.store.restore(EntityKind::Event, id).await?;
    let event = find_active(&state, id).await?;
    tracing::info!(event_id = %id, "Event restored");
    Ok(success(event, "Event restored"))
}

async fn find_active(state: &AppState, id: Uuid) -> Result<Event, AppError> {
    state
        .store
        .find_event(id, Scope::Active)
        .await?
        .ok_or_else(|| not_found(id))
}

fn ensure_owner(event: &Event, organizer_id: Uuid) -> Result<(), AppError> {
    if event.is_owned_by(organizer_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the event organizer can modify this event".to_string(),
        ))
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Event '{}' was not found", id))
}
