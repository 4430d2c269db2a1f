use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::error::{DbError, Result, is_unique_violation};
use crate::models::{UserId, UserRow};
use crate::Database;

/// Upper bound on search results.
pub const SEARCH_LIMIT: u32 = 20;

impl Database {
    // -- Users --

    pub fn create_user(&self, name: &str) -> Result<UserId> {
        let name = validate_name(name)?;
        self.with_conn_mut(|conn| insert_user(conn, name))
    }

    /// Session entry point: an existing name logs in, a new name registers.
    /// Returns the user id and whether the user was just created.
    pub fn login_or_register(&self, name: &str) -> Result<(UserId, bool)> {
        let name = validate_name(name)?;
        self.with_conn_mut(|conn| {
            if let Some(user) = query_user_by_name(conn, name)? {
                return Ok((user.id, false));
            }
            let id = insert_user(conn, name)?;
            info!("Registered user {} ({})", id, name);
            Ok((id, true))
        })
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_name(&self, name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_name(conn, name))
    }

    pub fn user_exists(&self, id: UserId) -> Result<bool> {
        self.with_conn(|conn| user_exists(conn, id))
    }

    pub fn set_user_name(&self, id: UserId, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        self.with_conn_mut(|conn| {
            let affected = conn
                .execute("UPDATE users SET name = ?1 WHERE id = ?2", params![name, id])
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        DbError::Conflict(format!("name '{}' is already in use", name))
                    } else {
                        e.into()
                    }
                })?;
            if affected == 0 {
                return Err(DbError::NotFound);
            }
            Ok(())
        })
    }

    pub fn set_user_photo(&self, id: UserId, photo_url: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let affected = conn.execute(
                "UPDATE users SET photo_url = ?1 WHERE id = ?2",
                params![photo_url, id],
            )?;
            if affected == 0 {
                return Err(DbError::NotFound);
            }
            Ok(())
        })
    }

    /// Substring match on display name (ASCII case-insensitive), capped at
    /// [`SEARCH_LIMIT`] rows.
    pub fn search_users(&self, pattern: &str) -> Result<Vec<UserRow>> {
        let like = format!("%{}%", escape_like(pattern));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, photo_url FROM users
                 WHERE name LIKE ?1 ESCAPE '\\'
                 ORDER BY name
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![like, SEARCH_LIMIT], row_to_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DbError::InvalidArgument("name must not be empty".into()));
    }
    Ok(trimmed)
}

fn insert_user(conn: &Connection, name: &str) -> Result<UserId> {
    conn.execute("INSERT INTO users (name) VALUES (?1)", [name])
        .map_err(|e| {
            if is_unique_violation(&e) {
                DbError::Conflict(format!("name '{}' is already in use", name))
            } else {
                e.into()
            }
        })?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn user_exists(conn: &Connection, id: UserId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn query_user_by_id(conn: &Connection, id: UserId) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, photo_url FROM users WHERE id = ?1",
            [id],
            row_to_user,
        )
        .optional()?;
    Ok(row)
}

fn query_user_by_name(conn: &Connection, name: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, photo_url FROM users WHERE name = ?1",
            [name],
            row_to_user,
        )
        .optional()?;
    Ok(row)
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        photo_url: row.get(2)?,
    })
}

fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn ids_are_assigned_in_registration_order() {
        let db = test_db();
        let (alice, created) = db.login_or_register("alice").unwrap();
        assert!(created);
        let (bob, _) = db.login_or_register("bob").unwrap();
        assert_eq!(alice, 1);
        assert_eq!(bob, 2);

        // Second login with the same name returns the same id.
        let (again, created) = db.login_or_register("alice").unwrap();
        assert_eq!(again, alice);
        assert!(!created);
    }

    #[test]
    fn duplicate_name_is_a_conflict() {
        let db = test_db();
        db.create_user("alice").unwrap();
        assert!(matches!(db.create_user("alice"), Err(DbError::Conflict(_))));
    }

    #[test]
    fn empty_name_is_rejected() {
        let db = test_db();
        assert!(matches!(db.create_user("   "), Err(DbError::InvalidArgument(_))));
    }

    #[test]
    fn rename_checks_uniqueness_and_existence() {
        let db = test_db();
        let alice = db.create_user("alice").unwrap();
        db.create_user("bob").unwrap();

        assert!(matches!(db.set_user_name(alice, "bob"), Err(DbError::Conflict(_))));
        assert!(matches!(db.set_user_name(99, "zed"), Err(DbError::NotFound)));

        db.set_user_name(alice, "alicia").unwrap();
        assert_eq!(db.get_user(alice).unwrap().unwrap().name, "alicia");
    }

    #[test]
    fn photo_update_requires_existing_user() {
        let db = test_db();
        let alice = db.create_user("alice").unwrap();
        db.set_user_photo(alice, "/photos/users/1/me.png").unwrap();
        assert_eq!(db.get_user(alice).unwrap().unwrap().photo_url, "/photos/users/1/me.png");
        assert!(matches!(db.set_user_photo(42, "x"), Err(DbError::NotFound)));
    }

    #[test]
    fn search_matches_substrings_and_is_capped() {
        let db = test_db();
        for i in 0..25 {
            db.create_user(&format!("user{:02}", i)).unwrap();
        }
        db.create_user("alice").unwrap();

        assert_eq!(db.search_users("user").unwrap().len(), SEARCH_LIMIT as usize);
        let hits = db.search_users("lic").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "alice");
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let db = test_db();
        db.create_user("alice").unwrap();
        db.create_user("under_score").unwrap();

        assert!(db.search_users("%").unwrap().is_empty());
        let hits = db.search_users("_").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "under_score");
    }
}
