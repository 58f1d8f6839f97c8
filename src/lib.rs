use axum::http::HeaderName;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};
use utoipa::OpenApi;

// --- Module Structure ---

// The routing core: handlers, middleware chains, routers and error translation.
pub mod handler;
pub mod middleware;
pub mod rerrors;
pub mod router;

// Application services built on top of it.
pub mod auth;
pub mod config;
pub mod static_files;

// The application's own endpoints (public and authenticated).
pub mod routes;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use handler::Handler;
pub use middleware::{
    Middleware,
    response::{MiddlewaredResponse, ResponseSink, ResponseWriter},
    wrap_middlewares,
};
pub use rerrors::{DefaultErrorPage, ErrorMiddleware, ErrorPage, RouteError};
pub use router::{Pattern, Route, RouteSource, Router, RouterError};

/// ApiDoc
///
/// The OpenAPI description of the application's endpoints and of the
/// RouteError every failure is reported with. Served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(public::health, authenticated::get_me),
    components(schemas(RouteError, authenticated::MeResponse)),
    tags(
        (name = "switchyard", description = "Composable request routing")
    )
)]
pub struct ApiDoc;

/// create_router
///
/// Assembles the application: the router-level chain, the public and
/// authenticated child routers, and the observability layers around the
/// frozen result.
pub fn create_router(config: &AppConfig) -> axum::Router {
    // 1. Router-level chain, outermost first. Panic recovery sits inside error
    // translation so a panic still ends up as a translated 500.
    // Caching is opted into per route (see `public_routes`); locally every
    // response is forced to `no-store`.
    let mut app = Router::new();
    app.use_middleware(middleware::logger());
    if config.disable_cache {
        app.use_middleware(middleware::disable_cache());
    }
    app.use_middleware(ErrorMiddleware::new(DefaultErrorPage))
        .use_middleware(middleware::panic_recovery())
        .use_middleware(auth::user_context(&config.jwt_secret));

    // 2. Child routers, each carrying its own access control.
    app.mount("/", &public::public_routes(config))
        .mount("/account", &authenticated::authenticated_routes());

    tracing::info!(routes = app.len(), "routes registered");

    // 3. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 4. Observability and Correlation Layers (Applied outermost/first)
    app.into_service()
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing, with the request id in the span.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span maker for `TraceLayer`: method, URI and the `x-request-id` set by the
/// request-id layer, so every log line of a request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
