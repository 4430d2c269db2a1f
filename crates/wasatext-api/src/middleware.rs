use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use wasatext_db::UserId;

use crate::blocking::run_db;
use crate::error::ApiError;
use crate::state::AppState;

/// The caller's identity, inserted by [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

/// The bearer token is the caller's numeric user id; it must name an
/// existing user.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(auth) = bearer.map_err(|_| ApiError::Unauthorized)?;
    let user_id: UserId = auth
        .token()
        .trim()
        .parse()
        .map_err(|_| ApiError::Unauthorized)?;

    if !run_db(&state, move |db| db.user_exists(user_id)).await? {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
