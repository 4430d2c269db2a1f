use axum::{
    Extension, Json,
    extract::{Multipart, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
};

use wasatext_types::api::{PhotoResponse, SearchQuery, SetNameRequest};
use wasatext_types::models::User;

use crate::blocking::run_db;
use crate::convert;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::uploads::{PhotoOwner, read_photo};

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 16;

/// Trimmed name of 3 to 16 characters.
pub(crate) fn validate_user_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    let len = name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(ApiError::BadRequest(format!(
            "name must be {}-{} characters",
            NAME_MIN, NAME_MAX
        )));
    }
    Ok(name.to_string())
}

pub async fn set_my_name(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    payload: Result<Json<SetNameRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = payload?;
    let name = validate_user_name(&req.name)?;

    run_db(&state, move |db| db.set_user_name(user_id, &name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_my_photo(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<Json<PhotoResponse>, ApiError> {
    let photo_url = read_photo(&state, PhotoOwner::User(user_id), multipart).await?;

    let url = photo_url.clone();
    run_db(&state, move |db| db.set_user_photo(user_id, &url)).await?;
    Ok(Json(PhotoResponse { photo_url }))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<User>>, ApiError> {
    let Query(query) = query?;
    let pattern = query.name.trim().to_string();
    if pattern.is_empty() {
        return Err(ApiError::BadRequest("search name must not be empty".into()));
    }

    let rows = run_db(&state, move |db| db.search_users(&pattern)).await?;
    Ok(Json(rows.into_iter().map(convert::user).collect()))
}
