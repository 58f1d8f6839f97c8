use std::any::Any;

use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::CatchPanicLayer;

use super::Middleware;
use crate::rerrors::RouteError;

/// panic_recovery
///
/// Turns a panicking handler into a `500` RouteError instead of a dropped
/// connection. Registered after the error middleware so the 500 still goes
/// through error translation.
pub fn panic_recovery() -> Middleware {
    Middleware::from_layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(panic = %message, "handler panicked");
    RouteError::internal_error([message]).into_response()
}
