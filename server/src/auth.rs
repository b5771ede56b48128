use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Recipient;
use crate::state::AppState;
use crate::utils::error::AppError;

/// Profile role of the current caller, resolved once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Anonymous,
    Participant(Uuid),
    Organizer(Uuid),
}

impl Role {
    pub fn recipient(&self) -> Option<Recipient> {
        match self {
            Role::Anonymous => None,
            Role::Participant(id) => Some(Recipient::Participant(*id)),
            Role::Organizer(id) => Some(Recipient::Organizer(*id)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity account id.
    pub sub: Uuid,
    pub exp: usize,
}

#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::AuthError(format!("Invalid bearer token: {}", e)))
    }
}

/// Mints an HS256 bearer token for an identity account.
pub fn issue_token(secret: &str, account_id: Uuid, ttl: Duration) -> Result<String, AppError> {
    let claims = Claims {
        sub: account_id,
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Failed to sign token: {}", e)))
}

/// The authenticated account (if any) and its resolved role.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub account: Option<Uuid>,
    pub role: Role,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self {
            account: None,
            role: Role::Anonymous,
        }
    }

    pub fn require_account(&self) -> Result<Uuid, AppError> {
        self.account
            .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))
    }

    /// Authenticated and backed by a participant or organizer profile.
    pub fn require_profile(&self) -> Result<Role, AppError> {
        self.require_account()?;
        match self.role {
            Role::Anonymous => Err(AppError::MissingProfile(
                "A participant or organizer profile is required".to_string(),
            )),
            role => Ok(role),
        }
    }

    pub fn require_participant(&self) -> Result<Uuid, AppError> {
        self.require_account()?;
        match self.role {
            Role::Participant(id) => Ok(id),
            _ => Err(AppError::MissingProfile(
                "Participant profile not found".to_string(),
            )),
        }
    }

    pub fn require_organizer(&self) -> Result<Uuid, AppError> {
        self.require_account()?;
        match self.role {
            Role::Organizer(id) => Ok(id),
            _ => Err(AppError::Forbidden(
                "Only organizers can perform this action".to_string(),
            )),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
            return Ok(Caller::anonymous());
        };

        let token = auth_header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::AuthError("Authorization header must be a bearer token".to_string())
            })?;

        let claims = state.tokens.verify(token)?;
        let role = state.store.resolve_role(claims.sub).await?;

        Ok(Caller {
            account: Some(claims.sub),
            role,
        })
    }
}
