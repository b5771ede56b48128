use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::auth::Caller;
use crate::models::{RegisterRequest, RegistrationFilter};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::pagination::PageRequest;
use crate::utils::response::{created, empty_success, success};

pub async fn register(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let participant_id = caller.require_participant()?;
    let Json(request) = body?;
    let event_id = request
        .event_id
        .ok_or_else(|| AppError::ValidationError("event_id is required".to_string()))?;

    let outcome = state
        .registrations
        .register(participant_id, event_id)
        .await?;
    let message = outcome.message.clone();
    Ok(created(outcome, message))
}

/// The participant's own registrations.
pub async fn list_registrations(
    State(state): State<AppState>,
    caller: Caller,
    filter: Result<Query<RegistrationFilter>, QueryRejection>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let participant_id = caller.require_participant()?;
    let Query(filter) = filter?;
    let Query(page) = page?;

    let registrations = state
        .registrations
        .list_for_participant(participant_id, filter, page)
        .await?;
    Ok(success(registrations, "Registrations retrieved"))
}

/// Registrations across the organizer's events.
pub async fn list_organizer_registrations(
    State(state): State<AppState>,
    caller: Caller,
    filter: Result<Query<RegistrationFilter>, QueryRejection>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let organizer_id = caller.require_organizer()?;
    let Query(filter) = filter?;
    let Query(page) = page?;

    let registrations = state
        .registrations
        .list_for_organizer(organizer_id, filter, page)
        .await?;
    Ok(success(registrations, "Registrations retrieved"))
}

pub async fn get_registration(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let role = caller.require_profile()?;
    let registration = state.registrations.get(&role, id).await?;
    Ok(success(registration, "Registration retrieved"))
}

pub async fn cancel_registration(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let role = caller.require_profile()?;
    let registration = state.registrations.cancel(&role, id).await?;
    Ok(success(registration, "Registration cancelled"))
}

pub async fn confirm_registration(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let role = caller.require_profile()?;
    let registration = state.registrations.confirm(&role, id).await?;
    Ok(success(registration, "Registration confirmed"))
}

pub async fn delete_registration(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let role = caller.require_profile()?;
    state.registrations.delete(&role, id).await?;
    Ok(empty_success("Registration deleted"))
}
