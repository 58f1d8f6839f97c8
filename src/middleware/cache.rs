use std::time::Duration;

use axum::{
    http::{HeaderValue, header::CACHE_CONTROL},
    response::Response,
};
use tower_http::set_header::SetResponseHeaderLayer;

use super::Middleware;

/// cache
///
/// Lets clients and proxies cache successful responses for `max_age`. Only
/// `2xx` responses are marked; handlers that set their own `Cache-Control`
/// keep it. Meant for routes serving the same bytes to every caller, such as
/// static assets.
pub fn cache(max_age: Duration) -> Middleware {
    let value = HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs()))
        .unwrap_or_else(|_| HeaderValue::from_static("public"));
    let policy = move |response: &Response| response.status().is_success().then(|| value.clone());
    Middleware::from_layer(SetResponseHeaderLayer::if_not_present(CACHE_CONTROL, policy))
}

/// disable_cache
///
/// Forces `Cache-Control: no-store` on every response; meant for local
/// development where stale assets get in the way.
pub fn disable_cache() -> Middleware {
    Middleware::from_layer(SetResponseHeaderLayer::overriding(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    ))
}
