//! Read-side assembly: conversation lists, conversation details and message
//! history. Each entry point reads inside one transaction so the pieces it
//! stitches together come from the same snapshot.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::error::{DbError, Result};
use crate::membership::require_member;
use crate::messages::{MESSAGE_COLUMNS, MESSAGE_FROM, query_reactions, row_to_message};
use crate::models::{
    ConversationDetails, ConversationId, ConversationKind, ConversationRow, ConversationSummary,
    MemberRow, MessageRow, MessageView, Page, UserId,
};
use crate::Database;

impl Database {
    // -- Conversations --

    /// Every conversation `user_id` belongs to, with members and the latest
    /// message, most recently active first.
    pub fn get_conversations_for_user(&self, user_id: UserId) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            // Phase 1: which conversations
            let ids: Vec<ConversationId> = {
                let mut stmt = tx.prepare(
                    "SELECT conversation_id FROM conversation_members WHERE user_id = ?1",
                )?;
                stmt.query_map([user_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            if ids.is_empty() {
                return Ok(vec![]);
            }

            // Phase 2: batch-fetch rows, members and last messages for those ids
            let conversations = query_conversations(&tx, &ids)?;
            let mut members = group_by_conversation(query_members(&tx, &ids)?);
            let mut last_messages: HashMap<ConversationId, MessageRow> =
                query_last_messages(&tx, &ids)?
                    .into_iter()
                    .map(|m| (m.conversation_id, m))
                    .collect();

            let mut summaries: Vec<ConversationSummary> = conversations
                .into_iter()
                .map(|conversation| ConversationSummary {
                    members: members.remove(&conversation.id).unwrap_or_default(),
                    last_message: last_messages.remove(&conversation.id),
                    conversation,
                })
                .collect();

            summaries.sort_by(|a, b| {
                let a_key = a.last_message.as_ref().map(|m| (m.timestamp, m.id));
                let b_key = b.last_message.as_ref().map(|m| (m.timestamp, m.id));
                b_key.cmp(&a_key).then(b.conversation.id.cmp(&a.conversation.id))
            });
            Ok(summaries)
        })
    }

    /// Conversation metadata and members, for members only.
    pub fn get_conversation(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<(ConversationRow, Vec<MemberRow>)> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let conversation = load_visible_conversation(&tx, conversation_id, user_id)?;
            let members = query_members(&tx, &[conversation_id])?;
            Ok((conversation, members))
        })
    }

    /// Conversation metadata, members and one page of history, oldest first.
    /// `page` counts back from the newest message.
    pub fn get_conversation_with_messages(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        page: Page,
    ) -> Result<ConversationDetails> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let conversation = load_visible_conversation(&tx, conversation_id, user_id)?;
            let members = query_members(&tx, &[conversation_id])?;

            let mut messages: Vec<MessageRow> = {
                let sql = format!(
                    "SELECT {} FROM {}
                     WHERE m.conversation_id = ?1
                     ORDER BY m.timestamp DESC, m.id DESC
                     LIMIT ?2 OFFSET ?3",
                    MESSAGE_COLUMNS, MESSAGE_FROM
                );
                let mut stmt = tx.prepare(&sql)?;
                stmt.query_map(params![conversation_id, page.limit, page.offset], row_to_message)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            messages.reverse();

            let message_ids: Vec<_> = messages.iter().map(|m| m.id).collect();
            let mut reactions: HashMap<_, Vec<_>> = HashMap::new();
            for reaction in query_reactions(&tx, &message_ids)? {
                reactions.entry(reaction.message_id).or_default().push(reaction);
            }

            let messages = messages
                .into_iter()
                .map(|message| MessageView {
                    reactions: reactions.remove(&message.id).unwrap_or_default(),
                    message,
                })
                .collect();

            Ok(ConversationDetails {
                conversation,
                members,
                messages,
            })
        })
    }
}

/// `ConversationNotFound` for unknown ids, `NotMember` for outsiders.
fn load_visible_conversation(
    conn: &Connection,
    conversation_id: ConversationId,
    user_id: UserId,
) -> Result<ConversationRow> {
    let conversation = conn
        .query_row(
            "SELECT id, name, is_group, last_message_id, photo_url
             FROM conversations WHERE id = ?1",
            [conversation_id],
            row_to_conversation,
        )
        .optional()?
        .ok_or(DbError::ConversationNotFound)?;
    require_member(conn, conversation_id, user_id)?;
    Ok(conversation)
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn query_conversations(conn: &Connection, ids: &[ConversationId]) -> Result<Vec<ConversationRow>> {
    let sql = format!(
        "SELECT id, name, is_group, last_message_id, photo_url
         FROM conversations WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), row_to_conversation)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Members in join order.
fn query_members(conn: &Connection, ids: &[ConversationId]) -> Result<Vec<MemberRow>> {
    let sql = format!(
        "SELECT cm.conversation_id, cm.user_id, u.name, u.photo_url, cm.is_admin
         FROM conversation_members cm
         JOIN users u ON u.id = cm.user_id
         WHERE cm.conversation_id IN ({})
         ORDER BY cm.conversation_id, cm.rowid",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok(MemberRow {
                conversation_id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                photo_url: row.get(3)?,
                is_admin: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_last_messages(conn: &Connection, ids: &[ConversationId]) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {} FROM {}
         WHERE m.id IN (SELECT last_message_id FROM conversations
                        WHERE id IN ({}) AND last_message_id IS NOT NULL)",
        MESSAGE_COLUMNS,
        MESSAGE_FROM,
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), row_to_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn group_by_conversation(members: Vec<MemberRow>) -> HashMap<ConversationId, Vec<MemberRow>> {
    let mut grouped: HashMap<ConversationId, Vec<MemberRow>> = HashMap::new();
    for member in members {
        grouped.entry(member.conversation_id).or_default().push(member);
    }
    grouped
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: ConversationKind::from_flag(row.get(2)?),
        last_message_id: row.get(3)?,
        photo_url: row.get(4)?,
    })
}
