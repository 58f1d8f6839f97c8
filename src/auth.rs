use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{FromRequestParts, Request},
    http::{HeaderMap, header, request::Parts},
    response::IntoResponse,
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{handler::Handler, middleware::Middleware, rerrors::RouteError};

/// Name of the cookie browsers carry the token in.
pub const AUTH_COOKIE: &str = "authorization";

/// Claims
///
/// The JWT payload: whose token it is and when it stops being valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The user the token was issued to.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// UserContext
///
/// Who is making the request, as established by [`user_context`]. Stored in
/// the request extensions; a request that carried no token, or a bad one, gets
/// an anonymous context, with the reason kept for error messages.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    claims: Option<Claims>,
    token_error: Option<String>,
}

impl UserContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(claims: Claims) -> Self {
        Self {
            claims: Some(claims),
            token_error: None,
        }
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.claims.as_ref().map(|claims| claims.sub)
    }

    pub fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }

    /// Why the presented token was rejected, if one was presented.
    pub fn token_error(&self) -> Option<&str> {
        self.token_error.as_deref()
    }

    /// The 401 to answer with when this context is not good enough.
    pub fn unauthorized(&self) -> RouteError {
        RouteError::unauthorized(self.token_error().unwrap_or("authentication required"))
    }
}

/// Handlers take `UserContext` as an argument; it never rejects. Without the
/// [`user_context`] middleware in the chain every request is anonymous.
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<UserContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// user_context
///
/// Resolves the caller from a JWT signed with `secret`, taken from the
/// `Authorization` header (with or without `Bearer `) or, failing that, from
/// the `authorization` cookie. Never rejects: the outcome is left on the
/// request as a [`UserContext`].
pub fn user_context(secret: impl AsRef<[u8]>) -> Middleware {
    let key = Arc::new(DecodingKey::from_secret(secret.as_ref()));

    Middleware::from_fn(move |mut request: Request, next: Handler| {
        let key = key.clone();
        async move {
            let context = match token(request.headers()) {
                None => UserContext::anonymous(),
                Some(token) => resolve(&token, &key),
            };
            request.extensions_mut().insert(context);
            next.run(request).await
        }
    })
}

fn resolve(token: &str, key: &DecodingKey) -> UserContext {
    // 1. Expiry is always checked.
    let mut validation = Validation::default();
    validation.validate_exp = true;

    // 2. Decode; failures leave an anonymous context with the reason.
    match decode::<Claims>(token, key, &validation) {
        Ok(data) => UserContext::authenticated(data.claims),
        Err(err) => {
            let reason = match err.kind() {
                ErrorKind::ExpiredSignature => "token expired".to_string(),
                ErrorKind::InvalidSignature => "invalid token signature".to_string(),
                _ => format!("invalid token: {err}"),
            };
            tracing::debug!(reason = %reason, "rejected bearer token");
            UserContext {
                claims: None,
                token_error: Some(reason),
            }
        }
    }
}

/// The raw token from the Authorization header or the auth cookie.
fn token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|value| !value.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == AUTH_COOKIE && !value.is_empty())
        .map(|(_, value)| value.strip_prefix("Bearer ").unwrap_or(value).to_string())
}

/// require_user
///
/// Lets authenticated requests through and answers everyone else with a 401
/// RouteError. Must sit after [`user_context`] in the chain.
pub fn require_user() -> Middleware {
    Middleware::from_fn(|request: Request, next: Handler| async move {
        let context = request
            .extensions()
            .get::<UserContext>()
            .cloned()
            .unwrap_or_default();

        if context.is_authenticated() {
            next.run(request).await
        } else {
            context.unauthorized().into_response()
        }
    })
}
