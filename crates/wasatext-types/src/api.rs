use serde::{Deserialize, Serialize};

use crate::models::{Conversation, Message};

// -- Session --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub name: String,
}

/// The identifier doubles as the bearer token for later requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub identifier: String,
}

// -- Users --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetNameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoResponse {
    pub photo_url: String,
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub target_user_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationIdResponse {
    pub conversation_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationDetailsResponse {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageIdResponse {
    pub message_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ForwardRequest {
    pub conversation_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardResponse {
    pub forwarded_message_ids: Vec<i64>,
    pub failures: Vec<ForwardFailure>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardFailure {
    pub conversation_id: i64,
    pub error: String,
}

// -- Reactions --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionRequest {
    pub emoji: String,
}

// -- Groups --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    pub member_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupIdResponse {
    pub group_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameGroupRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AddMembersRequest {
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddMembersResponse {
    pub results: Vec<AddMemberResult>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberResult {
    pub user_id: i64,
    pub outcome: AddMemberStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddMemberStatus {
    Added,
    AlreadyMember,
    UserNotFound,
}
