use axum::{
    Extension, Json,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use wasatext_db::{ConversationId, MessageId};
use wasatext_types::api::{ForwardFailure, ForwardRequest, ForwardResponse, MessageIdResponse, ReactionRequest};

use crate::blocking::run_db;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::uploads::{IMAGE_FIELD, PhotoOwner, accept_image};

/// POST /conversations/{id}: multipart with `content` or `image`, plus
/// optional `replyTo` and `forwarded`.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(conversation_id): Path<ConversationId>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut text: Option<String> = None;
    let mut photo_url: Option<String> = None;
    let mut reply_to: Option<MessageId> = None;
    let mut forwarded = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "content" => text = Some(field.text().await?),
            IMAGE_FIELD => {
                let owner = PhotoOwner::Conversation(conversation_id);
                photo_url = Some(accept_image(&state, owner, field).await?);
            }
            "replyTo" => reply_to = parse_reply_to(&field.text().await?)?,
            "forwarded" => forwarded = parse_flag(&field.text().await?)?,
            _ => {}
        }
    }

    let text = text.filter(|t| !t.trim().is_empty());
    let message_id = match (text, photo_url) {
        (Some(text), None) => {
            run_db(&state, move |db| {
                db.create_message(conversation_id, user_id, &text, reply_to, forwarded)
            })
            .await?
        }
        (None, Some(url)) => {
            run_db(&state, move |db| {
                db.create_message_with_photo(conversation_id, user_id, &url, reply_to, forwarded)
            })
            .await?
        }
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest("send either content or image, not both".into()));
        }
        (None, None) => {
            return Err(ApiError::BadRequest("message needs content or image".into()));
        }
    };

    Ok((StatusCode::CREATED, Json(MessageIdResponse { message_id })))
}

fn parse_reply_to(raw: &str) -> Result<Option<MessageId>, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| ApiError::BadRequest("replyTo must be a message id".into()))
}

fn parse_flag(raw: &str) -> Result<bool, ApiError> {
    match raw.trim() {
        "" | "false" | "0" => Ok(false),
        "true" | "1" => Ok(true),
        other => Err(ApiError::BadRequest(format!("invalid boolean '{}'", other))),
    }
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<MessageId>,
) -> Result<StatusCode, ApiError> {
    run_db(&state, move |db| db.delete_message(message_id, user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Forward into every listed conversation. Targets that refuse the forward
/// are listed under `failures` with their error class.
pub async fn forward_message(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<MessageId>,
    payload: Result<Json<ForwardRequest>, JsonRejection>,
) -> Result<Json<ForwardResponse>, ApiError> {
    let Json(req) = payload?;
    let results = run_db(&state, move |db| {
        db.forward_message_to_many(message_id, user_id, &req.conversation_ids)
    })
    .await?;

    let mut forwarded_message_ids = Vec::new();
    let mut failures = Vec::new();
    for item in results {
        match item.outcome {
            Ok(id) => forwarded_message_ids.push(id),
            Err(e) => {
                let status = ApiError::from(e).status();
                failures.push(ForwardFailure {
                    conversation_id: item.id,
                    error: status.canonical_reason().unwrap_or("Error").to_string(),
                });
            }
        }
    }

    Ok(Json(ForwardResponse {
        forwarded_message_ids,
        failures,
    }))
}

pub async fn add_reaction(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<MessageId>,
    payload: Result<Json<ReactionRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = payload?;
    run_db(&state, move |db| db.add_reaction(message_id, user_id, &req.emoji)).await?;
    Ok(StatusCode::OK)
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(message_id): Path<MessageId>,
) -> Result<StatusCode, ApiError> {
    run_db(&state, move |db| db.remove_reaction(message_id, user_id)).await?;
    Ok(StatusCode::OK)
}
