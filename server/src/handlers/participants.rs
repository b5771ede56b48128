use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::auth::{Caller, Role};
use crate::models::NewParticipant;
use crate::state::AppState;
use crate::store::Scope;
use crate::utils::error::AppError;
use crate::utils::pagination::PageRequest;
use crate::utils::response::{created, success};

/// Creates the participant profile for the authenticated account.
pub async fn create_participant(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<NewParticipant>, JsonRejection>,
) -> Result<Response, AppError> {
    let account_id = caller.require_account()?;
    if caller.role != Role::Anonymous {
        return Err(AppError::Conflict(
            "Account already has a profile".to_string(),
        ));
    }

    let Json(mut participant) = body?;
    participant.validate()?;
    participant.account_id = account_id;

    let participant = state.store.insert_participant(participant).await?;
    tracing::info!(participant_id = %participant.id, "Participant profile created");
    Ok(created(participant, "Participant created"))
}

pub async fn list_participants(
    State(state): State<AppState>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(page) = page?;
    let participants = state.store.list_participants(page).await?;
    Ok(success(participants, "Participants retrieved"))
}

pub async fn get_participant(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let participant = state
        .store
        .find_participant(id, Scope::Active)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Participant '{}' was not found", id)))?;
    Ok(success(participant, "Participant retrieved"))
}
