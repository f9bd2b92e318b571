//! Caller identity
//!
//! Authentication happens upstream. The gateway forwards the signed-in user in
//! `x-user-id`; every browser also carries an anonymous `visitor_id` cookie
//! used for experiment bucketing.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
};
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const VISITOR_COOKIE: &str = "visitor_id";

const VISITOR_COOKIE_MAX_AGE_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visitor {
    /// Signed-in user, if any
    pub user_id: Option<Uuid>,
    /// Anonymous client id from the `visitor_id` cookie
    pub client_id: Uuid,
    /// True when `client_id` was minted for this request
    pub new_client: bool,
}

impl Visitor {
    /// The signed-in user or an `InvalidInput` error for anonymous callers
    pub fn require_user(&self) -> Result<Uuid, AppError> {
        self.user_id.ok_or_else(|| {
            AppError::InvalidInput(format!("the {} header is required", USER_ID_HEADER))
        })
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let user_id = match headers.get(USER_ID_HEADER) {
            Some(value) => {
                let raw = value.to_str().map_err(|_| {
                    AppError::InvalidInput(format!("{} must be a UUID", USER_ID_HEADER))
                })?;
                Some(Uuid::parse_str(raw.trim()).map_err(|_| {
                    AppError::InvalidInput(format!("{} must be a UUID", USER_ID_HEADER))
                })?)
            }
            None => None,
        };

        let existing = read_cookie(headers, VISITOR_COOKIE).and_then(|v| Uuid::parse_str(&v).ok());
        Ok(match existing {
            Some(client_id) => Self {
                user_id,
                client_id,
                new_client: false,
            },
            None => Self {
                user_id,
                client_id: Uuid::new_v4(),
                new_client: true,
            },
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Visitor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Visitor::from_headers(&parts.headers)
    }
}

/// `Set-Cookie` for a freshly minted visitor id
pub fn visitor_cookie(visitor: &Visitor) -> Option<HeaderValue> {
    if !visitor.new_client {
        return None;
    }
    set_cookie(
        VISITOR_COOKIE,
        &visitor.client_id.to_string(),
        VISITOR_COOKIE_MAX_AGE_SECS,
    )
    .ok()
}

/// Value of the named cookie from the `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

/// Builds a `Set-Cookie` value; a zero max-age expires the cookie
pub fn set_cookie(name: &str, value: &str, max_age_secs: i64) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        name,
        value,
        max_age_secs.max(0)
    ))
    .map_err(|e| AppError::Internal(format!("invalid cookie {}: {}", name, e)))
}
