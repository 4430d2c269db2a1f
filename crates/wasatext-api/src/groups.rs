use axum::{
    Extension, Json,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use wasatext_db::{ConversationId, DbError, UserId};
use wasatext_types::api::{
    AddMemberResult, AddMembersRequest, AddMembersResponse, CreateGroupRequest, GroupIdResponse,
    PhotoResponse, RenameGroupRequest,
};
use wasatext_types::models::Conversation;

use crate::blocking::run_db;
use crate::convert;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::uploads::{PhotoOwner, read_photo};

pub async fn create_group(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let group_id = run_db(&state, move |db| {
        db.create_group(user_id, &req.name, &req.member_ids)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(GroupIdResponse { group_id })))
}

/// Group metadata and members. Direct conversations are not groups.
pub async fn get_group(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(group_id): Path<ConversationId>,
) -> Result<Json<Conversation>, ApiError> {
    let (conversation, members) =
        run_db(&state, move |db| db.get_conversation(group_id, user_id)).await?;
    if !conversation.kind.is_group() {
        return Err(DbError::ConversationNotFound.into());
    }
    Ok(Json(convert::conversation(conversation, members)))
}

pub async fn rename_group(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(group_id): Path<ConversationId>,
    payload: Result<Json<RenameGroupRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = payload?;
    run_db(&state, move |db| db.rename_group(group_id, user_id, &req.name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_group_photo(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(group_id): Path<ConversationId>,
    multipart: Multipart,
) -> Result<Json<PhotoResponse>, ApiError> {
    let photo_url = read_photo(&state, PhotoOwner::Group(group_id), multipart).await?;

    let url = photo_url.clone();
    run_db(&state, move |db| db.set_group_photo(group_id, user_id, &url)).await?;
    Ok(Json(PhotoResponse { photo_url }))
}

pub async fn add_members(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(group_id): Path<ConversationId>,
    payload: Result<Json<AddMembersRequest>, JsonRejection>,
) -> Result<Json<AddMembersResponse>, ApiError> {
    let Json(req) = payload?;
    let results = run_db(&state, move |db| {
        db.add_members(group_id, user_id, &req.user_ids)
    })
    .await?;

    Ok(Json(AddMembersResponse {
        results: results
            .into_iter()
            .map(|item| AddMemberResult {
                user_id: item.id,
                outcome: convert::add_member_status(item.outcome),
            })
            .collect(),
    }))
}

/// Leave a group (own id) or, as an admin, remove someone else.
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path((group_id, target_id)): Path<(ConversationId, UserId)>,
) -> Result<StatusCode, ApiError> {
    run_db(&state, move |db| db.remove_member(group_id, user_id, target_id)).await?;
    if user_id == target_id {
        info!("User {} left group {}", user_id, group_id);
    }
    Ok(StatusCode::OK)
}
