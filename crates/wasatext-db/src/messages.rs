use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::{DbError, Result};
use crate::membership::{require_conversation, require_member};
use crate::models::{
    BatchItem, ConversationId, MessageContent, MessageId, MessageRow, ReactionRow, UserId,
};
use crate::{Database, write_tx};

/// Column list matching [`row_to_message`]. Callers append the `FROM` clause
/// through [`MESSAGE_FROM`].
pub(crate) const MESSAGE_COLUMNS: &str = "m.id, m.conversation_id, m.sender_id, \
     COALESCE(u.name, ''), m.content, m.is_photo, m.timestamp, m.reply_to_id, m.is_forwarded";

pub(crate) const MESSAGE_FROM: &str = "messages m LEFT JOIN users u ON u.id = m.sender_id";

impl Database {
    // -- Messages --

    pub fn create_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: &str,
        reply_to_id: Option<MessageId>,
        is_forwarded: bool,
    ) -> Result<MessageId> {
        if text.trim().is_empty() {
            return Err(DbError::InvalidArgument("message text must not be empty".into()));
        }
        let content = MessageContent::Text(text.to_string());
        self.send_message(conversation_id, sender_id, &content, reply_to_id, is_forwarded)
    }

    pub fn create_message_with_photo(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        photo_url: &str,
        reply_to_id: Option<MessageId>,
        is_forwarded: bool,
    ) -> Result<MessageId> {
        if photo_url.trim().is_empty() {
            return Err(DbError::InvalidArgument("photo reference must not be empty".into()));
        }
        let content = MessageContent::Photo(photo_url.to_string());
        self.send_message(conversation_id, sender_id, &content, reply_to_id, is_forwarded)
    }

    fn send_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: &MessageContent,
        reply_to_id: Option<MessageId>,
        is_forwarded: bool,
    ) -> Result<MessageId> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            require_conversation(&tx, conversation_id)?;
            require_member(&tx, conversation_id, sender_id)?;

            if let Some(reply_to) = reply_to_id {
                let in_conversation: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1 AND conversation_id = ?2)",
                    params![reply_to, conversation_id],
                    |row| row.get(0),
                )?;
                if !in_conversation {
                    return Err(DbError::ReplyTargetNotFound);
                }
            }

            let id = insert_message(&tx, conversation_id, sender_id, content, reply_to_id, is_forwarded)?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// Delete a message. Only its sender may do this; any other caller gets
    /// `NotFound` whether or not the message exists.
    pub fn delete_message(&self, message_id: MessageId, acting_user_id: UserId) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let conversation_id: ConversationId = tx
                .query_row(
                    "SELECT conversation_id FROM messages WHERE id = ?1 AND sender_id = ?2",
                    params![message_id, acting_user_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(DbError::NotFound)?;

            // Replies and the last-message pointer are nulled by the foreign keys.
            tx.execute("DELETE FROM messages WHERE id = ?1", [message_id])?;
            tx.execute(
                "UPDATE conversations
                 SET last_message_id = (SELECT id FROM messages
                                        WHERE conversation_id = ?1
                                        ORDER BY timestamp DESC, id DESC LIMIT 1)
                 WHERE id = ?1 AND last_message_id IS NULL",
                [conversation_id],
            )?;

            tx.commit()?;
            debug!("Deleted message {} from conversation {}", message_id, conversation_id);
            Ok(())
        })
    }

    /// Copy a message into `target_conversation_id` as a forwarded message.
    ///
    /// The sender must be able to see the original (`MessageNotFound`
    /// otherwise) and must be a member of the target.
    pub fn forward_message(
        &self,
        message_id: MessageId,
        sender_id: UserId,
        target_conversation_id: ConversationId,
    ) -> Result<MessageId> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let (source_conversation, content) = tx
                .query_row(
                    "SELECT conversation_id, content, is_photo FROM messages WHERE id = ?1",
                    [message_id],
                    |row| {
                        Ok((
                            row.get::<_, ConversationId>(0)?,
                            MessageContent::from_parts(row.get(1)?, row.get(2)?),
                        ))
                    },
                )
                .optional()?
                .ok_or(DbError::MessageNotFound)?;

            match require_member(&tx, source_conversation, sender_id) {
                Err(DbError::NotMember) => return Err(DbError::MessageNotFound),
                other => other?,
            }

            require_conversation(&tx, target_conversation_id)?;
            require_member(&tx, target_conversation_id, sender_id)?;

            let id = insert_message(&tx, target_conversation_id, sender_id, &content, None, true)?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// Forward one message into several conversations. Each target is
    /// attempted on its own and reported in the result. Errors that would hit
    /// every target (invisible original, expired deadline) fail the call.
    pub fn forward_message_to_many(
        &self,
        message_id: MessageId,
        sender_id: UserId,
        target_conversation_ids: &[ConversationId],
    ) -> Result<Vec<BatchItem<Result<MessageId>>>> {
        if target_conversation_ids.is_empty() {
            return Err(DbError::InvalidArgument("target list must not be empty".into()));
        }

        let mut targets: Vec<ConversationId> = Vec::with_capacity(target_conversation_ids.len());
        for &id in target_conversation_ids {
            if !targets.contains(&id) {
                targets.push(id);
            }
        }

        let mut results = Vec::with_capacity(targets.len());
        for target in targets {
            match self.forward_message(message_id, sender_id, target) {
                Err(e @ (DbError::MessageNotFound | DbError::Cancelled | DbError::LockPoisoned)) => {
                    return Err(e);
                }
                outcome => results.push(BatchItem { id: target, outcome }),
            }
        }
        Ok(results)
    }

    // -- Reactions --

    /// Set the user's reaction on a message, replacing any previous one.
    pub fn add_reaction(&self, message_id: MessageId, user_id: UserId, emoji: &str) -> Result<()> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(DbError::InvalidArgument("reaction must not be empty".into()));
        }

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let conversation_id = message_conversation(&tx, message_id)?
                .ok_or(DbError::MessageNotFound)?;
            require_member(&tx, conversation_id, user_id)?;

            tx.execute(
                "INSERT INTO message_reactions (message_id, user_id, reaction)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (message_id, user_id) DO UPDATE SET reaction = excluded.reaction",
                params![message_id, user_id, emoji],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn remove_reaction(&self, message_id: MessageId, user_id: UserId) -> Result<()> {
        self.with_conn_mut(|conn| {
            let affected = conn.execute(
                "DELETE FROM message_reactions WHERE message_id = ?1 AND user_id = ?2",
                params![message_id, user_id],
            )?;
            if affected == 0 {
                return Err(DbError::NotFound);
            }
            Ok(())
        })
    }

    pub fn reactions_for_message(&self, message_id: MessageId) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| query_reactions(conn, &[message_id]))
    }
}

/// Insert a message stamped no earlier than the newest message already in
/// the conversation, and point the conversation at it.
fn insert_message(
    conn: &Connection,
    conversation_id: ConversationId,
    sender_id: UserId,
    content: &MessageContent,
    reply_to_id: Option<MessageId>,
    is_forwarded: bool,
) -> Result<MessageId> {
    conn.execute(
        "INSERT INTO messages
             (conversation_id, sender_id, content, timestamp, reply_to_id, is_photo, is_forwarded)
         VALUES (?1, ?2, ?3,
                 MAX(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     COALESCE((SELECT MAX(timestamp) FROM messages WHERE conversation_id = ?1), '')),
                 ?4, ?5, ?6)",
        params![
            conversation_id,
            sender_id,
            content.as_str(),
            reply_to_id,
            content.is_photo(),
            is_forwarded
        ],
    )?;
    let id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE conversations SET last_message_id = ?1 WHERE id = ?2",
        params![id, conversation_id],
    )?;
    Ok(id)
}

fn message_conversation(conn: &Connection, message_id: MessageId) -> Result<Option<ConversationId>> {
    let id = conn
        .query_row(
            "SELECT conversation_id FROM messages WHERE id = ?1",
            [message_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Batch-fetch reactions for a set of message ids.
pub(crate) fn query_reactions(conn: &Connection, message_ids: &[MessageId]) -> Result<Vec<ReactionRow>> {
    if message_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT message_id, user_id, reaction FROM message_reactions
         WHERE message_id IN ({})
         ORDER BY message_id, rowid",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn ToSql> = message_ids.iter().map(|id| id as &dyn ToSql).collect();
    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok(ReactionRow {
                message_id: row.get(0)?,
                user_id: row.get(1)?,
                reaction: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    let raw: String = row.get(6)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        content: MessageContent::from_parts(row.get(4)?, row.get(5)?),
        timestamp,
        reply_to_id: row.get(7)?,
        is_forwarded: row.get(8)?,
    })
}
