use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{
    events, health_check, notifications, organizers, participants, registrations,
};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let api = Router::new()
        .route(
            "/events",
            get(events::list_events).post(events::create_event),
        )
        .route(
            "/events/:id",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/restore", post(events::restore_event))
        .route(
            "/participants",
            get(participants::list_participants).post(participants::create_participant),
        )
        .route("/participants/:id", get(participants::get_participant))
        .route(
            "/organizers",
            get(organizers::list_organizers).post(organizers::create_organizer),
        )
        .route("/organizers/:id", get(organizers::get_organizer))
        .route(
            "/registrations",
            get(registrations::list_registrations).post(registrations::register),
        )
        .route(
            "/registrations/organizer",
            get(registrations::list_organizer_registrations),
        )
        .route(
            "/registrations/:id",
            get(registrations::get_registration).delete(registrations::delete_registration),
        )
        .route(
            "/registrations/:id/cancel",
            post(registrations::cancel_registration),
        )
        .route(
            "/registrations/:id/confirm",
            post(registrations::confirm_registration),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/unread_count",
            get(notifications::unread_count),
        )
        .route(
            "/notifications/:id",
            get(notifications::get_notification).delete(notifications::delete_notification),
        )
        .route(
            "/notifications/:id/mark_read",
            post(notifications::mark_read),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.is_production))
        .layer(create_cors_layer(&config.allowed_origins))
}
