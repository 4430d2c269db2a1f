//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the wasatext-types API models so the storage layer has no
//! serialization concerns.

use chrono::{DateTime, Utc};

pub type UserId = i64;
pub type ConversationId = i64;
pub type MessageId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    pub(crate) fn from_flag(is_group: bool) -> Self {
        if is_group { Self::Group } else { Self::Direct }
    }

    pub fn is_group(self) -> bool {
        self == Self::Group
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: UserId,
    pub name: String,
    pub photo_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRow {
    pub id: ConversationId,
    pub name: String,
    pub kind: ConversationKind,
    pub last_message_id: Option<MessageId>,
    pub photo_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRow {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub name: String,
    pub photo_url: String,
    pub is_admin: bool,
}

/// A message carries either text or a photo reference, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Photo(String),
}

impl MessageContent {
    pub fn is_photo(&self) -> bool {
        matches!(self, Self::Photo(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Photo(s) => s,
        }
    }

    pub(crate) fn from_parts(body: String, is_photo: bool) -> Self {
        if is_photo { Self::Photo(body) } else { Self::Text(body) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
    pub reply_to_id: Option<MessageId>,
    pub is_forwarded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionRow {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub reaction: String,
}

/// A conversation as listed for one of its members.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation: ConversationRow,
    pub members: Vec<MemberRow>,
    pub last_message: Option<MessageRow>,
}

#[derive(Debug, Clone)]
pub struct MessageView {
    pub message: MessageRow,
    pub reactions: Vec<ReactionRow>,
}

/// Conversation metadata, members, and one page of history (oldest first).
#[derive(Debug, Clone)]
pub struct ConversationDetails {
    pub conversation: ConversationRow,
    pub members: Vec<MemberRow>,
    pub messages: Vec<MessageView>,
}

/// Limit/offset window over a conversation's history, counted from the
/// newest message backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 200;

    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}

/// Per-item result of a batch operation.
#[derive(Debug)]
pub struct BatchItem<T> {
    pub id: i64,
    pub outcome: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMemberOutcome {
    Added,
    AlreadyMember,
    UserNotFound,
}
