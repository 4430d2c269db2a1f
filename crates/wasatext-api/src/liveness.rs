use axum::{extract::State, http::StatusCode};

use crate::blocking::run_db;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn liveness(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    run_db(&state, |db| db.ping()).await?;
    Ok(StatusCode::OK)
}
