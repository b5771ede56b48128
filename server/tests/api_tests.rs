use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use eventhub_server::auth::issue_token;
use eventhub_server::config::Config;
use eventhub_server::routes::create_routes;
use eventhub_server::state::AppState;
use eventhub_server::store::MemoryStore;

const SECRET: &str = "api-test-secret";

fn app() -> Router {
    let config = Config::from_lookup(|key| match key {
        "JWT_SECRET" => Some(SECRET.to_string()),
        _ => None,
    });
    let state = AppState::new(Arc::new(MemoryStore::new()), &config.jwt_secret);
    create_routes(state, &config)
}

fn token_for(account: Uuid) -> String {
    issue_token(SECRET, account, chrono::Duration::minutes(10)).unwrap()
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

struct Accounts {
    organizer: String,
    participant: String,
    event_id: String,
}

async fn seed(app: &Router, price: &str) -> Accounts {
    let organizer = token_for(Uuid::new_v4());
    let participant = token_for(Uuid::new_v4());

    let (status, _) = send(
        app,
        Method::POST,
        "/api/v1/organizers",
        Some(&organizer),
        Some(json!({ "name": "Olivia", "email": "olivia@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        app,
        Method::POST,
        "/api/v1/participants",
        Some(&participant),
        Some(json!({ "name": "Pat", "email": "pat@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/events",
        Some(&organizer),
        Some(json!({
            "title": "Rust Meetup",
            "location": "Porto",
            "start_time": "2030-05-01T18:00:00Z",
            "end_time": "2030-05-01T21:00:00Z",
            "capacity": 40,
            "price": price,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    Accounts {
        organizer,
        participant,
        event_id: body["data"]["id"].as_str().unwrap().to_string(),
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_paid_registration_flow() {
    let app = app();
    let accounts = seed(&app, "50.00").await;
    let register = json!({ "event_id": accounts.event_id });

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/registrations",
        Some(&accounts.participant),
        Some(register.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["is_paid"], true);
    let registration_id = body["data"]["registration"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/registrations",
        Some(&accounts.participant),
        Some(register),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/notifications/unread_count",
        Some(&accounts.participant),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unread"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/registrations/{}/confirm", registration_id),
        Some(&accounts.organizer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "confirmed");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/registrations/{}/cancel", registration_id),
        Some(&accounts.participant),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/notifications",
        Some(&accounts.participant),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 3);
}

#[tokio::test]
async fn test_event_detail_shows_caller_status() {
    let app = app();
    let accounts = seed(&app, "0").await;

    send(
        &app,
        Method::POST,
        "/api/v1/registrations",
        Some(&accounts.participant),
        Some(json!({ "event_id": accounts.event_id })),
    )
    .await;

    let uri = format!("/api/v1/events/{}", accounts.event_id);
    let (status, body) = send(&app, Method::GET, &uri, Some(&accounts.participant), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_registrations"], 1);
    assert_eq!(body["data"]["my_registration_status"], "confirmed");

    let (_, body) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(body["data"]["my_registration_status"], Value::Null);
}

#[tokio::test]
async fn test_registration_requires_participant_profile() {
    let app = app();
    let accounts = seed(&app, "0").await;
    let no_profile = token_for(Uuid::new_v4());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/registrations",
        Some(&no_profile),
        Some(json!({ "event_id": accounts.event_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "PROFILE_MISSING");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/registrations",
        None,
        Some(json!({ "event_id": accounts.event_id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_event_id_is_rejected() {
    let app = app();
    let accounts = seed(&app, "0").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/registrations",
        Some(&accounts.participant),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unread_count_fails_closed() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/notifications/unread_count",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unread"], 0);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/notifications/unread_count",
        Some("not-a-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["unread"], 0);
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/notifications",
        Some("not-a-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_only_owner_can_delete_event() {
    let app = app();
    let accounts = seed(&app, "0").await;
    let uri = format!("/api/v1/events/{}", accounts.event_id);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&accounts.participant), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&accounts.organizer), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("{}/restore", uri),
        Some(&accounts.organizer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
}
