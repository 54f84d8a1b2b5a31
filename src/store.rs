use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use crate::models::{BaseContact, Contact, ContactPatch, User};

pub type Db = Arc<Mutex<Connection>>;

/// Opens the store named by `connection_string` (a SQLite path, or `:memory:`).
pub fn open(connection_string: &str) -> Result<Db> {
    let connection = Connection::open(connection_string)?;
    let conn = Arc::new(Mutex::new(connection));
    init_db(&conn)?;
    Ok(conn)
}

fn lock(conn: &Db) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("database connection lock poisoned"))
}

pub fn init_db(conn: &Db) -> Result<()> {
    let conn = lock(conn)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL,
            email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            created_at    DATETIME NOT NULL,
            updated_at    DATETIME NOT NULL
        );

        CREATE TABLE IF NOT EXISTS contacts (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL,
            phone       TEXT NOT NULL,
            created_at  DATETIME NOT NULL,
            updated_at  DATETIME NOT NULL
        );

        CREATE INDEX IF NOT EXISTS contacts_user_id ON contacts(user_id);
        "#,
    )?;
    Ok(())
}

pub fn ping(conn: &Db) -> bool {
    match lock(conn) {
        Ok(c) => c.execute_batch("SELECT 1").is_ok(),
        Err(_) => false,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Users
// ────────────────────────────────────────────────────────────────────────────

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Inserts a user, or returns `None` if the email is already registered.
pub fn create_user(
    conn: &Db,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<Option<User>> {
    let conn = lock(conn)?;
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email],
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Ok(None);
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.id,
            user.username,
            user.email,
            user.password_hash,
            user.created_at,
            user.updated_at
        ],
    )?;
    debug!(user_id = %user.id, "inserted user");
    Ok(Some(user))
}

pub fn find_user_by_email(conn: &Db, email: &str) -> Result<Option<User>> {
    let conn = lock(conn)?;
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn find_user_by_id(conn: &Db, id: &str) -> Result<Option<User>> {
    let conn = lock(conn)?;
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

// ────────────────────────────────────────────────────────────────────────────
// Contacts
// ────────────────────────────────────────────────────────────────────────────

const CONTACT_COLUMNS: &str = "id, user_id, name, email, phone, created_at, updated_at";

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn fetch_contact_by_id(conn: &Connection, id: &str) -> Result<Option<Contact>> {
    let contact = conn
        .query_row(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
            params![id],
            contact_from_row,
        )
        .optional()?;
    Ok(contact)
}

/// All contacts owned by `user_id`, oldest first.
pub fn list_contacts(conn: &Db, user_id: &str) -> Result<Vec<Contact>> {
    let conn = lock(conn)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts WHERE user_id = ?1 ORDER BY created_at, rowid"
    ))?;
    let contacts = stmt
        .query_map(params![user_id], contact_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(contacts)
}

pub fn get_contact(conn: &Db, id: &str) -> Result<Option<Contact>> {
    let conn = lock(conn)?;
    fetch_contact_by_id(&conn, id)
}

pub fn create_contact(conn: &Db, user_id: &str, input: &BaseContact) -> Result<Contact> {
    let conn = lock(conn)?;
    let now = Utc::now();
    let contact = Contact {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name: input.name.clone(),
        email: input.email.clone(),
        phone: input.phone.clone(),
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO contacts (id, user_id, name, email, phone, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            contact.id,
            contact.user_id,
            contact.name,
            contact.email,
            contact.phone,
            contact.created_at,
            contact.updated_at
        ],
    )?;
    debug!(contact_id = %contact.id, user_id, "inserted contact");
    Ok(contact)
}

/// Applies `patch` and bumps `updated_at`. `None` if the contact does not exist.
pub fn update_contact(conn: &Db, id: &str, patch: &ContactPatch) -> Result<Option<Contact>> {
    let conn = lock(conn)?;
    let Some(mut contact) = fetch_contact_by_id(&conn, id)? else {
        return Ok(None);
    };

    patch.apply_to(&mut contact);
    contact.updated_at = Utc::now();
    conn.execute(
        "UPDATE contacts SET name=?1, email=?2, phone=?3, updated_at=?4 WHERE id=?5",
        params![
            contact.name,
            contact.email,
            contact.phone,
            contact.updated_at,
            id
        ],
    )?;
    Ok(Some(contact))
}

/// Removes a contact and returns what was removed, or `None` if it did not exist.
pub fn delete_contact(conn: &Db, id: &str) -> Result<Option<Contact>> {
    let conn = lock(conn)?;
    let Some(contact) = fetch_contact_by_id(&conn, id)? else {
        return Ok(None);
    };

    let rows_affected = conn.execute("DELETE FROM contacts WHERE id = ?1", params![id])?;
    debug!(contact_id = id, rows_affected, "deleted contact");
    Ok(Some(contact))
}
