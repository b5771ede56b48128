use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use uuid::Uuid;

use crate::auth::{Caller, Role};
use crate::models::UnreadCount;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::pagination::PageRequest;
use crate::utils::response::{empty_success, success};

pub async fn list_notifications(
    State(state): State<AppState>,
    caller: Caller,
    page: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(page) = page?;
    let role = caller.require_profile()?;
    let notifications = state.notifications.list(&role, page).await?;
    Ok(success(notifications, "Notifications retrieved"))
}

pub async fn get_notification(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let role = caller.require_profile()?;
    let notification = state.notifications.get(&role, id).await?;
    Ok(success(notification, "Notification retrieved"))
}

pub async fn mark_read(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let role = caller.require_profile()?;
    let notification = state.notifications.mark_read(&role, id).await?;
    Ok(success(notification, "Notification marked as read"))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(id) = id?;
    let role = caller.require_profile()?;
    state.notifications.delete(&role, id).await?;
    Ok(empty_success("Notification deleted"))
}

/// Never fails: an unresolvable caller counts zero unread notices.
pub async fn unread_count(
    State(state): State<AppState>,
    caller: Result<Caller, AppError>,
) -> Response {
    let role = caller.map(|c| c.role).unwrap_or(Role::Anonymous);
    let unread = state.notifications.unread_count(&role).await;
    success(UnreadCount { unread }, "Unread count retrieved")
}
