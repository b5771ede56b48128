use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod events;
pub mod notifications;
pub mod organizers;
pub mod participants;
pub mod registrations;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "eventhub-api",
    };

    success(payload, "Health check successful")
}
