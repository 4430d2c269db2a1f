use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::IntoResponse,
};

use wasatext_db::{ConversationId, Page};
use wasatext_types::api::{
    ConversationDetailsResponse, ConversationIdResponse, CreateConversationRequest, HistoryQuery,
};
use wasatext_types::models::Conversation;

use crate::blocking::run_db;
use crate::convert;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let summaries = run_db(&state, move |db| db.get_conversations_for_user(user_id)).await?;
    Ok(Json(summaries.into_iter().map(convert::summary).collect()))
}

/// Start (or reopen) the direct conversation with another user.
pub async fn create_direct(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    payload: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let target = req.target_user_id;

    let conversation_id =
        run_db(&state, move |db| db.create_or_get_direct(user_id, target)).await?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationIdResponse { conversation_id }),
    ))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(conversation_id): Path<ConversationId>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<ConversationDetailsResponse>, ApiError> {
    let Query(query) = query?;
    let page = Page::new(
        query.limit.unwrap_or(Page::DEFAULT_LIMIT),
        query.offset.unwrap_or(0),
    );

    let details = run_db(&state, move |db| {
        db.get_conversation_with_messages(conversation_id, user_id, page)
    })
    .await?;

    Ok(Json(ConversationDetailsResponse {
        conversation: convert::conversation(details.conversation, details.members),
        messages: details.messages.into_iter().map(convert::message).collect(),
    }))
}
