use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use wasatext_types::api::{LoginRequest, LoginResponse};

use crate::blocking::run_db;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::validate_user_name;

/// POST /session: log in by name, registering the name if it is new.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let name = validate_user_name(&req.name)?;

    let (user_id, created) = run_db(&state, move |db| db.login_or_register(&name)).await?;
    if created {
        info!("New user {} registered via session", user_id);
    }

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            identifier: user_id.to_string(),
        }),
    ))
}
