//! Membership and authorization checks.
//!
//! The free functions take a plain `&Connection` so lifecycle operations can
//! run them inside their own write transaction; the `Database` methods are
//! the read-only entry points for callers outside the crate.

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{DbError, Result};
use crate::models::{ConversationId, ConversationKind, UserId};
use crate::Database;

impl Database {
    pub fn is_member(&self, conversation_id: ConversationId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| is_member(conn, conversation_id, user_id))
    }

    pub fn is_admin(&self, conversation_id: ConversationId, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| is_admin(conn, conversation_id, user_id))
    }

    pub fn require_admin(&self, conversation_id: ConversationId, user_id: UserId) -> Result<()> {
        self.with_conn(|conn| require_admin(conn, conversation_id, user_id))
    }
}

/// `None` when the user is not a member, otherwise the admin flag.
pub(crate) fn admin_flag(
    conn: &Connection,
    conversation_id: ConversationId,
    user_id: UserId,
) -> Result<Option<bool>> {
    let flag = conn
        .query_row(
            "SELECT is_admin FROM conversation_members
             WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id, user_id],
            |row| row.get::<_, bool>(0),
        )
        .optional()?;
    Ok(flag)
}

pub fn is_member(conn: &Connection, conversation_id: ConversationId, user_id: UserId) -> Result<bool> {
    Ok(admin_flag(conn, conversation_id, user_id)?.is_some())
}

pub fn is_admin(conn: &Connection, conversation_id: ConversationId, user_id: UserId) -> Result<bool> {
    Ok(admin_flag(conn, conversation_id, user_id)?.unwrap_or(false))
}

pub fn require_member(
    conn: &Connection,
    conversation_id: ConversationId,
    user_id: UserId,
) -> Result<()> {
    match admin_flag(conn, conversation_id, user_id)? {
        Some(_) => Ok(()),
        None => Err(DbError::NotMember),
    }
}

/// `NotMember` when no membership row exists, `NotAdmin` when it exists
/// without the admin flag.
pub fn require_admin(
    conn: &Connection,
    conversation_id: ConversationId,
    user_id: UserId,
) -> Result<()> {
    match admin_flag(conn, conversation_id, user_id)? {
        Some(true) => Ok(()),
        Some(false) => Err(DbError::NotAdmin),
        None => Err(DbError::NotMember),
    }
}

pub(crate) fn conversation_kind(
    conn: &Connection,
    conversation_id: ConversationId,
) -> Result<Option<ConversationKind>> {
    let kind = conn
        .query_row(
            "SELECT is_group FROM conversations WHERE id = ?1",
            [conversation_id],
            |row| row.get::<_, bool>(0),
        )
        .optional()?
        .map(ConversationKind::from_flag);
    Ok(kind)
}

pub(crate) fn require_conversation(conn: &Connection, conversation_id: ConversationId) -> Result<()> {
    conversation_kind(conn, conversation_id)?
        .map(|_| ())
        .ok_or(DbError::ConversationNotFound)
}

/// `ConversationNotFound` unless the id names an existing group.
pub(crate) fn require_group(conn: &Connection, conversation_id: ConversationId) -> Result<()> {
    match conversation_kind(conn, conversation_id)? {
        Some(ConversationKind::Group) => Ok(()),
        _ => Err(DbError::ConversationNotFound),
    }
}
