use std::sync::Arc;

use axum::Json;
use utoipa::OpenApi;

use crate::{
    ApiDoc,
    config::AppConfig,
    handler::Handler,
    middleware::cache,
    router::Router,
    static_files::{Dir, FileSystem, JoinedFs, serve_files},
};

/// Public Router Module
///
/// Endpoints that need no identity: liveness, the API description and the
/// static assets. The static file system layers every configured directory,
/// earlier directories shadowing later ones. Assets are the only responses
/// marked cacheable; with `disable_cache` set the app-wide `no-store` still
/// overrides them.
pub fn public_routes(config: &AppConfig) -> Router {
    let assets = config
        .static_dirs
        .iter()
        .fold(JoinedFs::default(), |fs, dir| fs.push(Dir::new(dir)));
    let assets: Arc<dyn FileSystem> = Arc::new(assets);

    let mut router = Router::new();
    router
        // GET /health
        // Monitoring and load balancer checks.
        .handle("GET /health", Handler::from_handler(health))
        // GET /api-docs/openapi.json
        .handle("GET /api-docs/openapi.json", Handler::from_handler(openapi))
        // Only the assets below are shared-cacheable.
        .use_middleware(cache(config.cache_max_age))
        // GET /static/{path...}
        .handle("GET /static/{path...}", serve_files(assets));
    router
}

/// health
///
/// Answers "ok" as long as the process is serving.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
