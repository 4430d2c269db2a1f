use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{DbError, Result, is_unique_violation};
use crate::membership::{admin_flag, require_admin, require_group};
use crate::models::{AddMemberOutcome, BatchItem, ConversationId, UserId};
use crate::users::user_exists;
use crate::{Database, write_tx};

impl Database {
    // -- Direct conversations --

    /// Return the direct conversation between `user_a` and `user_b`, creating
    /// it (with both memberships) if none exists. Argument order does not
    /// matter.
    pub fn create_or_get_direct(&self, user_a: UserId, user_b: UserId) -> Result<ConversationId> {
        if user_a == user_b {
            return Err(DbError::InvalidArgument(
                "cannot start a conversation with yourself".into(),
            ));
        }
        let key = direct_key(user_a, user_b);

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            if let Some(id) = find_direct(&tx, &key)? {
                return Ok(id);
            }

            for user in [user_a, user_b] {
                if !user_exists(&tx, user)? {
                    return Err(DbError::MemberNotFound(user));
                }
            }

            let inserted = tx.execute(
                "INSERT INTO conversations (is_group, direct_key) VALUES (0, ?1)",
                [&key],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    // Lost a race with another writer on the same file.
                    drop(tx);
                    return find_direct(conn, &key)?
                        .ok_or_else(|| DbError::Conflict(format!("direct conversation {}", key)));
                }
                Err(e) => return Err(e.into()),
            }
            let id = tx.last_insert_rowid();

            for user in [user_a, user_b] {
                tx.execute(
                    "INSERT INTO conversation_members (conversation_id, user_id, is_admin)
                     VALUES (?1, ?2, 0)",
                    params![id, user],
                )?;
            }

            tx.commit()?;
            debug!("Created direct conversation {} ({})", id, key);
            Ok(id)
        })
    }

    // -- Groups --

    /// Create a group named `name`. The creator is always a member and the
    /// only admin; `member_ids` is deduplicated. Nothing is written unless
    /// every listed user exists.
    pub fn create_group(
        &self,
        creator_id: UserId,
        name: &str,
        member_ids: &[UserId],
    ) -> Result<ConversationId> {
        let name = non_empty(name, "group name")?;
        if member_ids.is_empty() {
            return Err(DbError::InvalidArgument("member list must not be empty".into()));
        }

        let mut members = vec![creator_id];
        for &id in member_ids {
            if !members.contains(&id) {
                members.push(id);
            }
        }

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;

            for &member in &members {
                if !user_exists(&tx, member)? {
                    return Err(DbError::MemberNotFound(member));
                }
            }

            tx.execute(
                "INSERT INTO conversations (name, is_group) VALUES (?1, 1)",
                [name],
            )?;
            let id = tx.last_insert_rowid();

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO conversation_members (conversation_id, user_id, is_admin)
                     VALUES (?1, ?2, ?3)",
                )?;
                for &member in &members {
                    stmt.execute(params![id, member, member == creator_id])?;
                }
            }

            tx.commit()?;
            info!("Created group {} '{}' with {} members", id, name, members.len());
            Ok(id)
        })
    }

    pub fn rename_group(
        &self,
        conversation_id: ConversationId,
        acting_user_id: UserId,
        new_name: &str,
    ) -> Result<()> {
        let new_name = non_empty(new_name, "group name")?;
        self.update_group_column(conversation_id, acting_user_id, "name", new_name)
    }

    pub fn set_group_photo(
        &self,
        conversation_id: ConversationId,
        acting_user_id: UserId,
        photo_url: &str,
    ) -> Result<()> {
        let photo_url = non_empty(photo_url, "photo reference")?;
        self.update_group_column(conversation_id, acting_user_id, "photo_url", photo_url)
    }

    fn update_group_column(
        &self,
        conversation_id: ConversationId,
        acting_user_id: UserId,
        column: &'static str,
        value: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            require_group(&tx, conversation_id)?;
            require_admin(&tx, conversation_id, acting_user_id)?;

            tx.execute(
                &format!("UPDATE conversations SET {} = ?1 WHERE id = ?2 AND is_group = 1", column),
                params![value, conversation_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Add users to a group. Admin rights are checked once, before any insert.
    ///
    /// Each target is attempted independently and reported in the result.
    /// The call fails with `MemberNotFound` (and writes nothing) only when no
    /// target was added and at least one does not exist.
    pub fn add_members(
        &self,
        conversation_id: ConversationId,
        acting_user_id: UserId,
        target_user_ids: &[UserId],
    ) -> Result<Vec<BatchItem<AddMemberOutcome>>> {
        if target_user_ids.is_empty() {
            return Err(DbError::InvalidArgument("user list must not be empty".into()));
        }

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            require_group(&tx, conversation_id)?;
            require_admin(&tx, conversation_id, acting_user_id)?;

            let mut results = Vec::with_capacity(target_user_ids.len());
            for &target in target_user_ids {
                let outcome = if !user_exists(&tx, target)? {
                    AddMemberOutcome::UserNotFound
                } else {
                    let inserted = tx.execute(
                        "INSERT OR IGNORE INTO conversation_members (conversation_id, user_id, is_admin)
                         VALUES (?1, ?2, 0)",
                        params![conversation_id, target],
                    )?;
                    if inserted == 0 {
                        AddMemberOutcome::AlreadyMember
                    } else {
                        AddMemberOutcome::Added
                    }
                };
                results.push(BatchItem { id: target, outcome });
            }

            let any_added = results.iter().any(|r| r.outcome == AddMemberOutcome::Added);
            let first_missing = results
                .iter()
                .find(|r| r.outcome == AddMemberOutcome::UserNotFound)
                .map(|r| r.id);
            if let (false, Some(missing)) = (any_added, first_missing) {
                return Err(DbError::MemberNotFound(missing));
            }

            tx.commit()?;
            Ok(results)
        })
    }

    /// Remove `target_user_id` from a group. Anyone may remove themselves;
    /// removing someone else requires admin rights. If the last admin leaves
    /// while members remain, the earliest-joined remaining member is promoted.
    pub fn remove_member(
        &self,
        conversation_id: ConversationId,
        acting_user_id: UserId,
        target_user_id: UserId,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            require_group(&tx, conversation_id)?;
            if acting_user_id != target_user_id {
                require_admin(&tx, conversation_id, acting_user_id)?;
            }

            let was_admin = admin_flag(&tx, conversation_id, target_user_id)?;
            let affected = tx.execute(
                "DELETE FROM conversation_members WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, target_user_id],
            )?;
            if affected == 0 {
                return Err(DbError::NotFound);
            }

            if was_admin == Some(true) {
                ensure_admin(&tx, conversation_id)?;
            }

            tx.commit()?;
            Ok(())
        })
    }
}

/// Canonical key for the unordered pair {a, b}.
fn direct_key(a: UserId, b: UserId) -> String {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    format!("{}:{}", lo, hi)
}

fn find_direct(conn: &Connection, key: &str) -> Result<Option<ConversationId>> {
    let id = conn
        .query_row(
            "SELECT id FROM conversations WHERE direct_key = ?1 AND is_group = 0",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Promote the earliest-joined member if the group has members but no admin.
fn ensure_admin(conn: &Connection, conversation_id: ConversationId) -> Result<()> {
    let has_admin: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversation_members
                       WHERE conversation_id = ?1 AND is_admin = 1)",
        [conversation_id],
        |row| row.get(0),
    )?;
    if has_admin {
        return Ok(());
    }

    let promoted = conn.execute(
        "UPDATE conversation_members SET is_admin = 1
         WHERE rowid = (SELECT rowid FROM conversation_members
                        WHERE conversation_id = ?1
                        ORDER BY rowid LIMIT 1)",
        [conversation_id],
    )?;
    if promoted > 0 {
        debug!("Promoted a new admin in group {}", conversation_id);
    }
    Ok(())
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DbError::InvalidArgument(format!("{} must not be empty", what)));
    }
    Ok(trimmed)
}
