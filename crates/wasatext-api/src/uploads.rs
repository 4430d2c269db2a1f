//! Synthetic photo uploads. Image bytes are read and discarded; the caller
//! gets back a URL derived from the owner and the uploaded file name.

use axum::extract::{Multipart, multipart::Field};

use wasatext_db::{ConversationId, UserId};

use crate::error::ApiError;
use crate::state::AppState;

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

const FALLBACK_FILE_NAME: &str = "photo";

#[derive(Debug, Clone, Copy)]
pub enum PhotoOwner {
    User(UserId),
    Group(ConversationId),
    Conversation(ConversationId),
}

impl PhotoOwner {
    fn path(self) -> (&'static str, i64) {
        match self {
            PhotoOwner::User(id) => ("users", id),
            PhotoOwner::Group(id) => ("groups", id),
            PhotoOwner::Conversation(id) => ("conversations", id),
        }
    }
}

/// Read the `image` field of a photo-only form.
pub async fn read_photo(
    state: &AppState,
    owner: PhotoOwner,
    mut multipart: Multipart,
) -> Result<String, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            return accept_image(state, owner, field).await;
        }
    }
    Err(ApiError::BadRequest(format!("missing '{}' field", IMAGE_FIELD)))
}

/// Drain an image field and return its synthetic URL.
pub async fn accept_image(
    state: &AppState,
    owner: PhotoOwner,
    field: Field<'_>,
) -> Result<String, ApiError> {
    let file_name = field.file_name().map(str::to_string);
    let bytes = field.bytes().await?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("image is empty".into()));
    }
    Ok(photo_url(&state.photo_base_url, owner, file_name.as_deref()))
}

pub fn photo_url(base: &str, owner: PhotoOwner, file_name: Option<&str>) -> String {
    let (kind, id) = owner.path();
    format!(
        "{}/{}/{}/{}",
        base.trim_end_matches('/'),
        kind,
        id,
        clean_file_name(file_name.unwrap_or_default())
    )
}

/// Last path component, cut at the first `;`.
fn clean_file_name(raw: &str) -> &str {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let name = name.split(';').next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_FILE_NAME
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_embeds_owner_and_file_name() {
        assert_eq!(
            photo_url("/photos", PhotoOwner::Group(3), Some("team.png")),
            "/photos/groups/3/team.png"
        );
        assert_eq!(
            photo_url("https://cdn.example/p/", PhotoOwner::User(1), Some("me.jpg")),
            "https://cdn.example/p/users/1/me.jpg"
        );
    }

    #[test]
    fn file_name_loses_directories_and_parameters() {
        assert_eq!(
            photo_url("/photos", PhotoOwner::Conversation(9), Some("../../etc/passwd")),
            "/photos/conversations/9/passwd"
        );
        assert_eq!(
            photo_url("/photos", PhotoOwner::User(2), Some("C:\\pics\\cat.png;charset=x")),
            "/photos/users/2/cat.png"
        );
        assert_eq!(photo_url("/photos", PhotoOwner::User(2), None), "/photos/users/2/photo");
        assert_eq!(photo_url("/photos", PhotoOwner::User(2), Some("..")), "/photos/users/2/photo");
    }
}
