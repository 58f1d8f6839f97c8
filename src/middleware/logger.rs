use std::time::Instant;

use axum::extract::Request;
use uuid::Uuid;

use super::Middleware;
use crate::handler::Handler;

/// logger
///
/// Logs every request when it enters and when it leaves the chain. The request
/// id is taken from `x-request-id` (set by the request-id layer in front of the
/// router) or generated on the spot. Error statuses are logged as warnings.
pub fn logger() -> Middleware {
    Middleware::from_fn(|request: Request, next: Handler| async move {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let method = request.method().clone();
        let path = request.uri().path().to_owned();
        let started = Instant::now();

        tracing::info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            "request started"
        );

        let response = next.run(request).await;
        let status = response.status();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if status.is_client_error() || status.is_server_error() {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = status.as_u16(),
                elapsed_ms,
                "request failed"
            );
        } else {
            tracing::info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = status.as_u16(),
                elapsed_ms,
                "request finished"
            );
        }

        response
    })
}
