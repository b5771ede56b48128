//! JSON envelopes shared by every endpoint: `{success, data, message}` on
//! success, `{success: false, error: {code, message, details}}` on failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
}

#[derive(Serialize)]
pub struct ErrorDetail<'a> {
    pub code: &'a str,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ErrorEnvelope<'a> {
    pub success: bool,
    pub error: ErrorDetail<'a>,
}

pub fn success<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    respond(StatusCode::OK, Some(data), message)
}

pub fn created<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    respond(StatusCode::CREATED, Some(data), message)
}

pub fn empty_success(message: impl Into<String>) -> Response {
    respond::<()>(StatusCode::OK, None, message)
}

fn respond<T: Serialize>(status: StatusCode, data: Option<T>, message: impl Into<String>) -> Response {
    let body = Envelope {
        success: true,
        data,
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

pub fn error(
    code: &str,
    message: impl Into<String>,
    details: Option<Value>,
    status: StatusCode,
) -> Response {
    let body = ErrorEnvelope {
        success: false,
        error: ErrorDetail {
            code,
            message: message.into(),
            details,
        },
    };
    (status, Json(body)).into_response()
}
