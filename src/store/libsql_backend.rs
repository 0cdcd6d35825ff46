//! libSQL backend: async repository implementations over a local database.
//!
//! Plain reads and single-row writes share one connection. Every unit of
//! work gets its own connection, so a request never joins another request's
//! open transaction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Transaction, params};
use tracing::{debug, info};

use crate::auth::model::{AccessToken, User, UserRole};
use crate::conversations::model::{Conversation, Message, Role};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    ConversationRepository, MessageRepository, Store, TokenRepository, UnitOfWork, UserRepository,
};

/// Milliseconds a writer waits for the database lock. Transactions only
/// span a few local statements, so this is short.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// libSQL database backend.
pub struct LibSqlBackend {
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = open_connection(&db).await?;
        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Get the shared connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Connect and apply per-connection settings.
async fn open_connection(db: &LibSqlDatabase) -> Result<Connection, DatabaseError> {
    let conn = db
        .connect()
        .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

    let pragmas = [
        "PRAGMA journal_mode = WAL".to_string(),
        format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"),
        "PRAGMA foreign_keys = ON".to_string(),
    ];
    for pragma in &pragmas {
        let mut rows = conn
            .query(pragma, ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("{pragma}: {e}")))?;
        // Step once so the pragma takes effect.
        rows.next()
            .await
            .map_err(|e| DatabaseError::Pool(format!("{pragma}: {e}")))?;
    }
    Ok(conn)
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339, so text order matches time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_json(s: Option<String>) -> serde_json::Value {
    s.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null)
}

fn to_json_text(value: &serde_json::Value) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Classify a libsql failure, separating constraint violations.
fn query_error(op: &str, e: libsql::Error) -> DatabaseError {
    let text = e.to_string();
    if text.contains("constraint failed") {
        DatabaseError::Constraint(format!("{op}: {text}"))
    } else {
        DatabaseError::Query(format!("{op}: {text}"))
    }
}

const CONVERSATION_COLUMNS: &str = "id, user_id, title, metadata, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, metadata, created_at, updated_at";

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at, updated_at";

/// Map a libsql Row to a Conversation. Column order matches CONVERSATION_COLUMNS.
fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, libsql::Error> {
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1).ok(),
        title: row.get(2)?,
        metadata: parse_json(row.get(3).ok()),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a Message. Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<Message, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("message row parse: {e}"));
    let role_str: String = row.get(2).map_err(parse)?;
    let created_str: String = row.get(5).map_err(parse)?;
    let updated_str: String = row.get(6).map_err(parse)?;
    Ok(Message {
        id: row.get(0).map_err(parse)?,
        conversation_id: row.get(1).map_err(parse)?,
        role: role_str.parse::<Role>().map_err(DatabaseError::Serialization)?,
        content: row.get(3).map_err(parse)?,
        metadata: parse_json(row.get(4).ok()),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a User. Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    let role_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: role_str.parse::<UserRole>().unwrap_or_default(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Conversation queries ────────────────────────────────────────────

async fn insert_conversation(conn: &Connection, c: &Conversation) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO conversations ({CONVERSATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            c.id.clone(),
            opt_text(c.user_id.as_deref()),
            c.title.clone(),
            to_json_text(&c.metadata)?,
            format_datetime(&c.created_at),
            format_datetime(&c.updated_at),
        ],
    )
    .await
    .map_err(|e| query_error("insert_conversation", e))?;

    debug!(conversation_id = %c.id, "Conversation inserted");
    Ok(())
}

async fn get_conversation(conn: &Connection, id: &str) -> Result<Option<Conversation>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            params![id],
        )
        .await
        .map_err(|e| query_error("get_conversation", e))?;

    match rows.next().await {
        Ok(Some(row)) => {
            let conversation = row_to_conversation(&row)
                .map_err(|e| DatabaseError::Query(format!("get_conversation row parse: {e}")))?;
            Ok(Some(conversation))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(query_error("get_conversation", e)),
    }
}

async fn list_conversations(
    conn: &Connection,
    user_id: Option<&str>,
) -> Result<Vec<Conversation>, DatabaseError> {
    let mut rows = match user_id {
        Some(uid) => {
            conn.query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = ?1
                     ORDER BY updated_at DESC, rowid DESC"
                ),
                params![uid],
            )
            .await
        }
        None => {
            conn.query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id IS NULL
                     ORDER BY updated_at DESC, rowid DESC"
                ),
                (),
            )
            .await
        }
    }
    .map_err(|e| query_error("list_conversations", e))?;

    let mut conversations = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| query_error("list_conversations", e))?
    {
        conversations.push(
            row_to_conversation(&row)
                .map_err(|e| DatabaseError::Query(format!("list_conversations row parse: {e}")))?,
        );
    }
    Ok(conversations)
}

async fn update_conversation_title(
    conn: &Connection,
    id: &str,
    title: &str,
    at: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let affected = conn
        .execute(
            "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
            params![title, format_datetime(&at), id],
        )
        .await
        .map_err(|e| query_error("update_conversation_title", e))?;
    debug!(conversation_id = id, "Conversation title updated");
    Ok(affected > 0)
}

async fn touch_conversation(conn: &Connection, id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
    let affected = conn
        .execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![format_datetime(&at), id],
        )
        .await
        .map_err(|e| query_error("touch_conversation", e))?;
    Ok(affected > 0)
}

async fn delete_conversation(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let affected = conn
        .execute("DELETE FROM conversations WHERE id = ?1", params![id])
        .await
        .map_err(|e| query_error("delete_conversation", e))?;
    debug!(conversation_id = id, deleted = affected > 0, "Conversation deleted");
    Ok(affected > 0)
}

// ── Message queries ─────────────────────────────────────────────────

async fn insert_message(conn: &Connection, m: &Message) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            m.id.clone(),
            m.conversation_id.clone(),
            m.role.to_string(),
            m.content.clone(),
            to_json_text(&m.metadata)?,
            format_datetime(&m.created_at),
            format_datetime(&m.updated_at),
        ],
    )
    .await
    .map_err(|e| query_error("insert_message", e))?;

    debug!(message_id = %m.id, conversation_id = %m.conversation_id, role = %m.role, "Message inserted");
    Ok(())
}

async fn list_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<Message>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ),
            params![conversation_id],
        )
        .await
        .map_err(|e| query_error("list_messages", e))?;

    let mut messages = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| query_error("list_messages", e))?
    {
        messages.push(row_to_message(&row)?);
    }
    Ok(messages)
}

async fn latest_message(conn: &Connection, conversation_id: &str) -> Result<Option<Message>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![conversation_id],
        )
        .await
        .map_err(|e| query_error("latest_message", e))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_message(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(query_error("latest_message", e)),
    }
}

async fn count_messages(conn: &Connection, conversation_id: &str) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
        )
        .await
        .map_err(|e| query_error("count_messages", e))?;

    match rows.next().await {
        Ok(Some(row)) => row.get::<i64>(0).map_err(|e| query_error("count_messages", e)),
        Ok(None) => Ok(0),
        Err(e) => Err(query_error("count_messages", e)),
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ConversationRepository for LibSqlBackend {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), DatabaseError> {
        insert_conversation(self.conn(), conversation).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DatabaseError> {
        get_conversation(self.conn(), id).await
    }

    async fn list_conversations(&self, user_id: Option<&str>) -> Result<Vec<Conversation>, DatabaseError> {
        list_conversations(self.conn(), user_id).await
    }

    async fn update_conversation_title(
        &self,
        id: &str,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        update_conversation_title(self.conn(), id, title, at).await
    }

    async fn touch_conversation(&self, id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        touch_conversation(self.conn(), id, at).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool, DatabaseError> {
        delete_conversation(self.conn(), id).await
    }
}

#[async_trait]
impl MessageRepository for LibSqlBackend {
    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError> {
        insert_message(self.conn(), message).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, DatabaseError> {
        list_messages(self.conn(), conversation_id).await
    }

    async fn latest_message(&self, conversation_id: &str) -> Result<Option<Message>, DatabaseError> {
        latest_message(self.conn(), conversation_id).await
    }

    async fn count_messages(&self, conversation_id: &str) -> Result<i64, DatabaseError> {
        count_messages(self.conn(), conversation_id).await
    }
}

#[async_trait]
impl UserRepository for LibSqlBackend {
    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    user.id.clone(),
                    user.name.clone(),
                    user.email.clone(),
                    user.password_hash.clone(),
                    user.role.to_string(),
                    format_datetime(&user.created_at),
                    format_datetime(&user.updated_at),
                ],
            )
            .await
            .map_err(|e| query_error("insert_user", e))?;

        debug!(user_id = %user.id, "User inserted");
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| query_error("get_user", e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_user(&row).map_err(|e| DatabaseError::Query(format!("get_user row parse: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(query_error("get_user", e)),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
            )
            .await
            .map_err(|e| query_error("get_user_by_email", e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row).map_err(|e| {
                DatabaseError::Query(format!("get_user_by_email row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(query_error("get_user_by_email", e)),
        }
    }
}

#[async_trait]
impl TokenRepository for LibSqlBackend {
    async fn insert_token(&self, token: &AccessToken) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO access_tokens (id, user_id, token_hash, name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    token.id.clone(),
                    token.user_id.clone(),
                    token.token_hash.clone(),
                    token.name.clone(),
                    format_datetime(&token.created_at),
                ],
            )
            .await
            .map_err(|e| query_error("insert_token", e))?;

        debug!(token_id = %token.id, user_id = %token.user_id, "Access token issued");
        Ok(())
    }

    async fn find_token(&self, token_hash: &str) -> Result<Option<AccessToken>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, token_hash, name, created_at FROM access_tokens
                 WHERE token_hash = ?1",
                params![token_hash],
            )
            .await
            .map_err(|e| query_error("find_token", e))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let parse = |e: libsql::Error| DatabaseError::Query(format!("find_token row parse: {e}"));
                let created_str: String = row.get(4).map_err(parse)?;
                Ok(Some(AccessToken {
                    id: row.get(0).map_err(parse)?,
                    user_id: row.get(1).map_err(parse)?,
                    token_hash: row.get(2).map_err(parse)?,
                    name: row.get(3).map_err(parse)?,
                    created_at: parse_datetime(&created_str),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(query_error("find_token", e)),
        }
    }

    async fn delete_token(&self, token_hash: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM access_tokens WHERE token_hash = ?1",
                params![token_hash],
            )
            .await
            .map_err(|e| query_error("delete_token", e))?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl Store for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DatabaseError> {
        let conn = open_connection(&self.db).await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| query_error("begin", e))?;
        debug!("Unit of work opened");
        Ok(Box::new(LibSqlUnitOfWork { tx }))
    }
}

// ── Unit of work ────────────────────────────────────────────────────

/// A transaction on a dedicated connection. Dropping it without commit closes
/// the connection, which discards the transaction.
pub struct LibSqlUnitOfWork {
    tx: Transaction,
}

#[async_trait]
impl ConversationRepository for LibSqlUnitOfWork {
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), DatabaseError> {
        insert_conversation(&self.tx, conversation).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, DatabaseError> {
        get_conversation(&self.tx, id).await
    }

    async fn list_conversations(&self, user_id: Option<&str>) -> Result<Vec<Conversation>, DatabaseError> {
        list_conversations(&self.tx, user_id).await
    }

    async fn update_conversation_title(
        &self,
        id: &str,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        update_conversation_title(&self.tx, id, title, at).await
    }

    async fn touch_conversation(&self, id: &str, at: DateTime<Utc>) -> Result<bool, DatabaseError> {
        touch_conversation(&self.tx, id, at).await
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool, DatabaseError> {
        delete_conversation(&self.tx, id).await
    }
}

#[async_trait]
impl MessageRepository for LibSqlUnitOfWork {
    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError> {
        insert_message(&self.tx, message).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, DatabaseError> {
        list_messages(&self.tx, conversation_id).await
    }

    async fn latest_message(&self, conversation_id: &str) -> Result<Option<Message>, DatabaseError> {
        latest_message(&self.tx, conversation_id).await
    }

    async fn count_messages(&self, conversation_id: &str) -> Result<i64, DatabaseError> {
        count_messages(&self.tx, conversation_id).await
    }
}

#[async_trait]
impl UnitOfWork for LibSqlUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx
            .commit()
            .await
            .map_err(|e| query_error("commit", e))?;
        debug!("Unit of work committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| query_error("rollback", e))?;
        debug!("Unit of work rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_db() -> (tempfile::TempDir, LibSqlBackend) {
        let tmp = tempfile::tempdir().unwrap();
        let db = LibSqlBackend::new_local(&tmp.path().join("test.db"))
            .await
            .unwrap();
        (tmp, db)
    }

    fn make_conversation(owner: Option<&str>) -> Conversation {
        Conversation::start(owner, None, "Hello there", "linkedin", "formal")
    }

    async fn make_user(db: &LibSqlBackend, email: &str) -> User {
        let user = User::new("Ada", email, "stored-hash".to_string());
        db.insert_user(&user).await.unwrap();
        user
    }

    // ── Conversation tests ──────────────────────────────────────────

    #[tokio::test]
    async fn conversation_insert_and_get() {
        let (_tmp, db) = test_db().await;
        let conv = make_conversation(None);
        db.insert_conversation(&conv).await.unwrap();

        let loaded = db.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, conv.id);
        assert_eq!(loaded.title, "Hello there");
        assert_eq!(loaded.metadata["platform"], "linkedin");
        assert_eq!(loaded.created_at, conv.created_at);
        assert!(loaded.user_id.is_none());
    }

    #[tokio::test]
    async fn conversation_get_not_found() {
        let (_tmp, db) = test_db().await;
        assert!(db.get_conversation("01HZZZZZZZZZZZZZZZZZZZZZZZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_orders_by_activity() {
        let (_tmp, db) = test_db().await;
        let user = make_user(&db, "ada@example.com").await;

        let older = make_conversation(Some(&user.id));
        let newer = make_conversation(Some(&user.id));
        let ownerless = make_conversation(None);
        db.insert_conversation(&older).await.unwrap();
        db.insert_conversation(&newer).await.unwrap();
        db.insert_conversation(&ownerless).await.unwrap();

        // Activity on the older one moves it to the top.
        db.touch_conversation(&older.id, Utc::now()).await.unwrap();

        let owned = db.list_conversations(Some(&user.id)).await.unwrap();
        let ids: Vec<&str> = owned.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![older.id.as_str(), newer.id.as_str()]);

        let anonymous = db.list_conversations(None).await.unwrap();
        assert_eq!(anonymous.len(), 1);
        assert_eq!(anonymous[0].id, ownerless.id);
    }

    #[tokio::test]
    async fn update_title_reports_missing_rows() {
        let (_tmp, db) = test_db().await;
        let conv = make_conversation(None);
        db.insert_conversation(&conv).await.unwrap();

        assert!(db.update_conversation_title(&conv.id, "Renamed", Utc::now()).await.unwrap());
        assert!(!db.update_conversation_title("missing", "x", Utc::now()).await.unwrap());

        let loaded = db.get_conversation(&conv.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Renamed");
        assert!(loaded.updated_at >= conv.updated_at);
    }

    #[tokio::test]
    async fn delete_cascades_to_messages() {
        let (_tmp, db) = test_db().await;
        let conv = make_conversation(None);
        db.insert_conversation(&conv).await.unwrap();
        db.insert_message(&Message::user(&conv.id, "Hello", "d", "p", "t"))
            .await
            .unwrap();
        assert_eq!(db.count_messages(&conv.id).await.unwrap(), 1);

        assert!(db.delete_conversation(&conv.id).await.unwrap());
        assert!(db.get_conversation(&conv.id).await.unwrap().is_none());
        assert_eq!(db.count_messages(&conv.id).await.unwrap(), 0);
        assert!(!db.delete_conversation(&conv.id).await.unwrap());
    }

    // ── Message tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn messages_list_in_insertion_order() {
        let (_tmp, db) = test_db().await;
        let conv = make_conversation(None);
        db.insert_conversation(&conv).await.unwrap();

        let user_msg = Message::user(&conv.id, "Hello", "d", "p", "t");
        let assistant_msg = Message::assistant(&conv.id, &json!({"text": "Hi"}), 200);
        db.insert_message(&user_msg).await.unwrap();
        db.insert_message(&assistant_msg).await.unwrap();

        let messages = db.list_messages(&conv.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[0].metadata["details"], "d");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].metadata["response_status"], 200);

        let latest = db.latest_message(&conv.id).await.unwrap().unwrap();
        assert_eq!(latest.id, assistant_msg.id);
    }

    #[tokio::test]
    async fn message_requires_existing_conversation() {
        let (_tmp, db) = test_db().await;
        let orphan = Message::user("no-such-conversation", "Hello", "d", "p", "t");
        let err = db.insert_message(&orphan).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    // ── Unit of work tests ──────────────────────────────────────────

    #[tokio::test]
    async fn unit_of_work_commit_persists() {
        let (_tmp, db) = test_db().await;
        let conv = make_conversation(None);

        let uow = db.begin().await.unwrap();
        uow.insert_conversation(&conv).await.unwrap();
        uow.insert_message(&Message::user(&conv.id, "Hello", "d", "p", "t"))
            .await
            .unwrap();
        // Not yet visible on the shared connection.
        assert!(db.get_conversation(&conv.id).await.unwrap().is_none());
        uow.commit().await.unwrap();

        assert!(db.get_conversation(&conv.id).await.unwrap().is_some());
        assert_eq!(db.count_messages(&conv.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unit_of_work_rollback_discards() {
        let (_tmp, db) = test_db().await;
        let conv = make_conversation(None);

        let uow = db.begin().await.unwrap();
        uow.insert_conversation(&conv).await.unwrap();
        uow.insert_message(&Message::user(&conv.id, "Hello", "d", "p", "t"))
            .await
            .unwrap();
        uow.rollback().await.unwrap();

        assert!(db.get_conversation(&conv.id).await.unwrap().is_none());
        assert_eq!(db.count_messages(&conv.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unit_of_work_dropped_discards() {
        let (_tmp, db) = test_db().await;
        let conv = make_conversation(None);

        {
            let uow = db.begin().await.unwrap();
            uow.insert_conversation(&conv).await.unwrap();
        }

        assert!(db.get_conversation(&conv.id).await.unwrap().is_none());
        // The write lock is released: the same row can be written again.
        db.insert_conversation(&conv).await.unwrap();
        assert!(db.get_conversation(&conv.id).await.unwrap().is_some());
    }

    // ── User and token tests ────────────────────────────────────────

    #[tokio::test]
    async fn user_insert_and_lookup() {
        let (_tmp, db) = test_db().await;
        let user = make_user(&db, "ada@example.com").await;

        let by_id = db.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");
        assert_eq!(by_id.role, UserRole::User);

        let by_email = db.get_user_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert!(db.get_user_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_constraint_error() {
        let (_tmp, db) = test_db().await;
        make_user(&db, "ada@example.com").await;
        let dup = User::new("Other", "ada@example.com", "stored-hash".to_string());
        assert!(matches!(
            db.insert_user(&dup).await,
            Err(DatabaseError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn token_find_and_revoke() {
        let (_tmp, db) = test_db().await;
        let user = make_user(&db, "ada@example.com").await;
        let issued = crate::auth::model::IssuedToken::generate(&user.id);
        db.insert_token(&issued.record).await.unwrap();

        let found = db.find_token(&issued.record.token_hash).await.unwrap().unwrap();
        assert_eq!(found.user_id, user.id);

        assert!(db.delete_token(&issued.record.token_hash).await.unwrap());
        assert!(db.find_token(&issued.record.token_hash).await.unwrap().is_none());
        assert!(!db.delete_token(&issued.record.token_hash).await.unwrap());
    }

    // ── Schema tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn connections_wait_briefly_for_the_write_lock() {
        let (_tmp, db) = test_db().await;
        let mut rows = db.conn().query("PRAGMA busy_timeout", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), BUSY_TIMEOUT_MS as i64);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let (_tmp, db) = test_db().await;
        db.init_schema().await.unwrap();
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("dir").join("test.db");
        let db = LibSqlBackend::new_local(&db_path).await.unwrap();
        assert!(db_path.exists());
        drop(db);
    }
}
