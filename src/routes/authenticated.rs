use axum::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{UserContext, require_user},
    handler::Handler,
    rerrors::RouteError,
    router::Router,
};

/// Authenticated Router Module
///
/// Endpoints for callers with a valid token. `require_user` is the first
/// middleware of this router, so every route registered here is guarded and
/// anonymous callers get a 401 RouteError before any handler runs.
pub fn authenticated_routes() -> Router {
    let mut router = Router::new();
    router
        .use_middleware(require_user())
        // GET /me
        // The identity behind the presented token.
        .handle("GET /me", Handler::from_handler(get_me));
    router
}

/// MeResponse
///
/// What the server knows about the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// get_me
#[utoipa::path(
    get,
    path = "/account/me",
    responses(
        (status = 200, description = "The authenticated caller", body = MeResponse),
        (status = 401, description = "Missing or invalid token", body = RouteError)
    )
)]
pub async fn get_me(user: UserContext) -> Result<Json<MeResponse>, RouteError> {
    let claims = user.claims().ok_or_else(|| user.unauthorized())?;
    Ok(Json(MeResponse {
        user_id: claims.sub,
        issued_at: claims.iat as u64,
        expires_at: claims.exp as u64,
    }))
}
