use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::core::error::{Error, Result};
use crate::core::gateway::{Part, Role};

/// One persisted transcript entry. `part` is the decoded JSON payload of the
/// `text` column.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub part: Part,
    pub date_time: String,
}

#[derive(Debug, Clone)]
pub struct StoredConversation {
    pub id: String,
    pub last_message_datetime: String,
    pub messages: Vec<StoredMessage>,
}

/// User-visible transcript entry: text parts only, internal function-call
/// bookkeeping excluded.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FrontendMessage {
    pub role: Role,
    pub text: String,
}

/// Append-only conversation store over a single SQLite connection. The
/// connection mutex makes each append (ensure conversation, insert message,
/// touch last_message_datetime) atomic with respect to other requests.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Connection::open(path.as_ref())?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                hostname TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                last_message_datetime TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                text TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'model')),
                date_time TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        info!("conversation store ready at {}", path.as_ref().display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Returns the caller's user id, creating a user row when the supplied id
    /// is absent or unknown.
    pub async fn create_user(&self, hostname: &str, existing_id: Option<&str>) -> Result<String> {
        let db = self.db.lock().await;
        if let Some(id) = existing_id {
            let known: Option<String> = db
                .query_row("SELECT id FROM users WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?;
            if let Some(id) = known {
                return Ok(id);
            }
        }
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO users (id, hostname, created_at) VALUES (?1, ?2, ?3)",
            params![id, hostname, now],
        )?;
        info!(user_id = %id, "registered new user");
        Ok(id)
    }

    pub async fn is_valid_user(&self, user_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let known: Option<String> = db
            .query_row(
                "SELECT id FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(known.is_some())
    }

    pub async fn create_conversation(&self, user_id: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO conversations (id, user_id, last_message_datetime, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, user_id, now, now],
        )?;
        Ok(id)
    }

    /// Appends one message, lazily creating the conversation row. The
    /// conversation insert is conflict-tolerant so concurrent first appends
    /// cannot fail.
    pub async fn add_message(
        &self,
        user_id: &str,
        convo_id: &str,
        role: Role,
        part: &Part,
    ) -> Result<()> {
        let encoded = serde_json::to_string(part)
            .map_err(|e| Error::Storage(format!("encoding message payload: {}", e)))?;
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR IGNORE INTO conversations (id, user_id, last_message_datetime, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![convo_id, user_id, now, now],
        )?;
        db.execute(
            "INSERT INTO messages (id, conversation_id, text, role, date_time, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                convo_id,
                encoded,
                role.as_str(),
                now,
                now
            ],
        )?;
        db.execute(
            "UPDATE conversations SET last_message_datetime = ?1 WHERE id = ?2",
            params![now, convo_id],
        )?;
        Ok(())
    }

    /// Full transcript of one conversation in append order. Unknown or
    /// foreign conversation ids yield an empty vec.
    pub async fn conversation(&self, user_id: &str, convo_id: &str) -> Result<Vec<StoredMessage>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT m.id, m.conversation_id, m.role, m.text, m.date_time
             FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE m.conversation_id = ?1 AND c.user_id = ?2
             ORDER BY m.date_time ASC, m.rowid ASC",
        )?;
        let rows = stmt.query_map(params![convo_id, user_id], row_to_message)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(decode_message(row?)?);
        }
        Ok(messages)
    }

    /// Does this conversation exist and belong to this user.
    pub async fn owns_conversation(&self, user_id: &str, convo_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let found: Option<String> = db
            .query_row(
                "SELECT id FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![convo_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Recent conversations for a user, each truncated to the most recent
    /// `message_limit` messages (still in append order within a
    /// conversation).
    pub async fn history(
        &self,
        user_id: &str,
        conversation_limit: usize,
        message_limit: usize,
    ) -> Result<Vec<StoredConversation>> {
        let db = self.db.lock().await;
        let mut convo_stmt = db.prepare(
            "SELECT id, last_message_datetime FROM conversations
             WHERE user_id = ?1
             ORDER BY last_message_datetime DESC
             LIMIT ?2",
        )?;
        let convo_rows: Vec<(String, String)> = convo_stmt
            .query_map(params![user_id, conversation_limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<_, _>>()?;

        let mut msg_stmt = db.prepare(
            "SELECT id, conversation_id, role, text, date_time FROM (
                 SELECT m.id, m.conversation_id, m.role, m.text, m.date_time, m.rowid AS seq
                 FROM messages m
                 WHERE m.conversation_id = ?1
                 ORDER BY m.date_time DESC, m.rowid DESC
                 LIMIT ?2
             ) ORDER BY date_time ASC, seq ASC",
        )?;

        let mut conversations = Vec::with_capacity(convo_rows.len());
        for (id, last_message_datetime) in convo_rows {
            let rows = msg_stmt.query_map(params![id, message_limit as i64], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(decode_message(row?)?);
            }
            conversations.push(StoredConversation {
                id,
                last_message_datetime,
                messages,
            });
        }
        Ok(conversations)
    }

    /// Transcript filtered to what the frontend shows: plain text parts only.
    pub async fn frontend_messages(
        &self,
        user_id: &str,
        convo_id: &str,
    ) -> Result<Vec<FrontendMessage>> {
        let messages = self.conversation(user_id, convo_id).await?;
        Ok(messages
            .into_iter()
            .filter_map(|m| match m.part {
                Part::Text { text } => Some(FrontendMessage { role: m.role, text }),
                _ => None,
            })
            .collect())
    }
}

type RawMessage = (String, String, String, String, String);

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessage> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_message(raw: RawMessage) -> Result<StoredMessage> {
    let (id, conversation_id, role, text, date_time) = raw;
    let role = match role.as_str() {
        "user" => Role::User,
        "model" => Role::Model,
        other => return Err(Error::Storage(format!("unknown message role `{}`", other))),
    };
    let part: Part = serde_json::from_str(&text)
        .map_err(|e| Error::Storage(format!("decoding message payload: {}", e)))?;
    Ok(StoredMessage {
        id,
        conversation_id,
        role,
        part,
        date_time,
    })
}
