//! Structured route errors.
//!
//! Handlers signal failures as [`RouteError`] values: a status code, a short
//! description and free-form details. They render as JSON on their own, and
//! the [`ErrorMiddleware`] turns them into redirects to an HTML error page for
//! clients that prefer markup.

use std::fmt;

use axum::{
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

mod middleware;

pub use middleware::{DefaultErrorPage, ErrorMiddleware, ErrorPage, RenderError, prefers_html};

/// Literal body used when even the fallback error cannot be serialized.
const UNSERIALIZABLE_BODY: &str = "Failed to write error JSON string to body";

/// RouteError
///
/// The wire format of every structured failure:
/// `{"status_code": 404, "error": "Not Found", "info": {}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RouteError {
    pub status_code: u16,
    pub error: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    #[ts(type = "Record<string, unknown>")]
    #[schema(value_type = Object)]
    pub info: Map<String, Value>,
}

/// An absent or `null` info decodes as empty.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// HandoffError
///
/// Why an `error` query parameter could not be turned back into a RouteError.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("error parameter is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("error parameter is not a RouteError: {0}")]
    Json(#[from] serde_json::Error),
}

impl RouteError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status_code: status.as_u16(),
            error: error.into(),
            info: Map::new(),
        }
    }

    /// Adds one entry to `info`.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    /// The canonical 404 every not-found outcome is normalized to.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn bad_request(reason: impl fmt::Display) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad Request").with_info("reason", reason.to_string())
    }

    pub fn missing_parameters<I, P>(params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let params: Vec<String> = params.into_iter().map(Into::into).collect();
        Self::new(StatusCode::BAD_REQUEST, "Missing parameters")
            .with_info("missing_parameters", params)
    }

    pub fn method_not_allowed<I, M>(method: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        let allowed: Vec<String> = allowed.into_iter().map(Into::into).collect();
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
            .with_info("method", method.into())
            .with_info("allowed_methods", allowed)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized").with_info("message", message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden").with_info("message", message.into())
    }

    /// internal_error
    ///
    /// A 500 carrying the messages of whatever went wrong underneath.
    pub fn internal_error<I, E>(errors: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: fmt::Display,
    {
        let errors: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            .with_info("errors", errors)
    }

    /// The status to respond with; out-of-range codes fall back to 500.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Serializes to the base64url form carried by the `error` query parameter.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE.encode(json))
    }

    pub fn decode(param: &str) -> Result<Self, HandoffError> {
        let json = URL_SAFE.decode(param)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Fills in the fields a careless handler may have left empty.
    fn normalized(mut self) -> Self {
        if self.status_code == 0 {
            self.status_code = StatusCode::NOT_IMPLEMENTED.as_u16();
        }
        if self.error.is_empty() {
            self.error = "MISSING ERROR DESCRIPTION".to_string();
        }
        self
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code, self.error)
    }
}

impl std::error::Error for RouteError {}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let rerr = self.normalized();
        let json_type = [(CONTENT_TYPE, HeaderValue::from_static("application/json"))];

        match serde_json::to_vec(&rerr) {
            Ok(body) => (rerr.status(), json_type, body).into_response(),
            Err(err) => {
                tracing::error!(error = %err, route_error = ?rerr, "failed to serialize route error");
                let fallback = json!({
                    "status_code": 500,
                    "error": "Failed to marshal error message to JSON",
                    "info": { "source_value": format!("{rerr:?}"), "error": err.to_string() },
                });
                match serde_json::to_vec(&fallback) {
                    Ok(body) => (StatusCode::INTERNAL_SERVER_ERROR, json_type, body).into_response(),
                    Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, UNSERIALIZABLE_BODY).into_response(),
                }
            }
        }
    }
}
