use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{Caller, Role};
use crate::models::{EventFilter, NewOrganizer, Organizer};
use crate::state::AppState;
use crate::store::Scope;
use crate::utils::error::AppError;
use crate::utils::pagination::PageRequest;
use crate::utils::response::{created, success};

#[derive(Serialize)]
struct OrganizerDetail {
    #[serde(flatten)]
    organizer: Organizer,
    total_events: i64,
}

/// Creates the organizer profile for the authenticated account.
pub async fn create_organizer(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<NewOrganizer>, JsonRejection>,
) -> Result<Response, AppError> {
    let account_id = caller.require_account()?;
    if caller.role != Role::Anonymous {
        return Err(AppError::Conflict(
            "Account already has a profile".to_string(),
        ));
    }

    let Json(mut organizer) = body?;
    organizer.validate()?;
    organizer.account_id = Some(account_id);

    let organizer = state.store.insert_organizer(organizer).await?;
    tracing::info!(organizer_id = %organizer.id, "Organizer profile created");
    Ok(created(organizer, "Organizer created"))
}

pub async fn list_organizers(
    State(state): State<AppState>,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(page) = page?;
    let organizers = state.store.list_organizers(page).await?;
    Ok(success(organizers, "Organizers retrieved"))
}

pub async fn get_organizer(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let organizer = state
        .store
        .find_organizer(id, Scope::Active)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Organizer '{}' was not found", id)))?;

    let filter = EventFilter {
        organizer_id: Some(organizer.id),
        ..EventFilter::default()
    };
    let total_events = state
        .store
        .list_events(
            &filter,
            PageRequest {
                page: 1,
                page_size: 1,
            },
        )
        .await?
        .count;

    Ok(success(
        OrganizerDetail {
            organizer,
            total_events,
        },
        "Organizer retrieved",
    ))
}
