//! libSQL backend — async `Database` trait implementation.
//!
//! Local file or in-memory databases. Timestamps are stored as RFC 3339
//! text, destination lists as JSON arrays, booleans as 0/1 integers.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::config::{ApiConfig, EmailConfig};
use crate::error::DatabaseError;
use crate::pipeline::rules::FilterRule;
use crate::pipeline::types::SmsMessage;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use;
/// every write here is a single-row statement, which gives the atomic
/// read-modify-write the forward-status update needs.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    sender TEXT NOT NULL,
                    body TEXT NOT NULL,
                    received_at TEXT NOT NULL,
                    is_read INTEGER NOT NULL DEFAULT 0,
                    kind INTEGER NOT NULL DEFAULT 1,
                    forwarded INTEGER NOT NULL DEFAULT 0,
                    forwarded_to TEXT NOT NULL DEFAULT '[]',
                    forwarded_at TEXT,
                    api_forwarded_at TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_messages_forwarded ON messages(forwarded);

                CREATE TABLE IF NOT EXISTS filter_rules (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    sender_contains TEXT,
                    message_contains TEXT,
                    exclude_sender_contains TEXT,
                    exclude_message_contains TEXT,
                    enabled INTEGER NOT NULL DEFAULT 1,
                    destinations TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_filter_rules_enabled ON filter_rules(enabled);

                CREATE TABLE IF NOT EXISTS email_config (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    smtp_server TEXT NOT NULL,
                    smtp_port INTEGER NOT NULL,
                    username TEXT NOT NULL,
                    password TEXT NOT NULL,
                    from_address TEXT NOT NULL,
                    use_ssl INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS api_config (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    enabled INTEGER NOT NULL DEFAULT 0,
                    api_url TEXT NOT NULL DEFAULT '',
                    auth_token TEXT NOT NULL DEFAULT '',
                    custom_sender_name TEXT NOT NULL DEFAULT ''
                );",
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Schema init failed: {e}")))?;

        debug!("Database schema ready");
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

fn destinations_to_json(destinations: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(destinations)
        .map_err(|e| DatabaseError::Serialization(format!("destinations: {e}")))
}

fn destinations_from_json(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Map a row to an SmsMessage.
///
/// Column order: 0:id, 1:sender, 2:body, 3:received_at, 4:is_read, 5:kind,
/// 6:forwarded, 7:forwarded_to, 8:forwarded_at, 9:api_forwarded_at
fn row_to_message(row: &libsql::Row) -> Result<SmsMessage, DatabaseError> {
    let map = |e: libsql::Error| DatabaseError::Query(format!("message row: {e}"));

    let received_str: String = row.get(3).map_err(map)?;
    let forwarded_to_json: String = row.get(7).map_err(map)?;
    let forwarded_at_str: Option<String> = row.get(8).map_err(map)?;
    let api_forwarded_at_str: Option<String> = row.get(9).map_err(map)?;

    Ok(SmsMessage {
        id: row.get(0).map_err(map)?,
        sender: row.get(1).map_err(map)?,
        body: row.get(2).map_err(map)?,
        received_at: parse_datetime(&received_str),
        is_read: row.get::<i64>(4).map_err(map)? != 0,
        kind: row.get(5).map_err(map)?,
        forwarded: row.get::<i64>(6).map_err(map)? != 0,
        forwarded_to: destinations_from_json(&forwarded_to_json),
        forwarded_at: parse_optional_datetime(forwarded_at_str),
        api_forwarded_at: parse_optional_datetime(api_forwarded_at_str),
    })
}

/// Map a row to a FilterRule.
///
/// Column order: 0:id, 1:name, 2:sender_contains, 3:message_contains,
/// 4:exclude_sender_contains, 5:exclude_message_contains, 6:enabled,
/// 7:destinations, 8:created_at
fn row_to_rule(row: &libsql::Row) -> Result<FilterRule, DatabaseError> {
    let map = |e: libsql::Error| DatabaseError::Query(format!("rule row: {e}"));

    let destinations_json: String = row.get(7).map_err(map)?;
    let created_str: String = row.get(8).map_err(map)?;

    Ok(FilterRule {
        id: row.get(0).map_err(map)?,
        name: row.get(1).map_err(map)?,
        sender_contains: row.get(2).map_err(map)?,
        message_contains: row.get(3).map_err(map)?,
        exclude_sender_contains: row.get(4).map_err(map)?,
        exclude_message_contains: row.get(5).map_err(map)?,
        enabled: row.get::<i64>(6).map_err(map)? != 0,
        destinations: destinations_from_json(&destinations_json),
        created_at: parse_datetime(&created_str),
    })
}

const MESSAGE_COLUMNS: &str = "id, sender, body, received_at, is_read, kind, \
     forwarded, forwarded_to, forwarded_at, api_forwarded_at";

const RULE_COLUMNS: &str = "id, name, sender_contains, message_contains, \
     exclude_sender_contains, exclude_message_contains, enabled, destinations, created_at";

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn insert_message_if_absent(
        &self,
        message: &SmsMessage,
    ) -> Result<bool, DatabaseError> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO messages
                    (id, sender, body, received_at, is_read, kind,
                     forwarded, forwarded_to, forwarded_at, api_forwarded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    message.id.clone(),
                    message.sender.clone(),
                    message.body.clone(),
                    message.received_at.to_rfc3339(),
                    message.is_read as i64,
                    message.kind,
                    message.forwarded as i64,
                    destinations_to_json(&message.forwarded_to)?,
                    message.forwarded_at.map(|dt| dt.to_rfc3339()),
                    message.api_forwarded_at.map(|dt| dt.to_rfc3339()),
                ],
            )
            .await
            .map_err(query_err)?;

        Ok(inserted > 0)
    }

    async fn get_message(&self, id: &str) -> Result<Option<SmsMessage>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_message(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_unforwarded(&self) -> Result<Vec<SmsMessage>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE forwarded = 0 ORDER BY received_at ASC"
                ),
                (),
            )
            .await
            .map_err(query_err)?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    async fn list_messages(&self, limit: usize) -> Result<Vec<SmsMessage>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     ORDER BY received_at DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(query_err)?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    async fn update_forward_status(
        &self,
        id: &str,
        forwarded: bool,
        forwarded_to: &[String],
        forwarded_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE messages SET forwarded = ?1, forwarded_to = ?2, forwarded_at = ?3
                 WHERE id = ?4",
                params![
                    forwarded as i64,
                    destinations_to_json(forwarded_to)?,
                    forwarded_at.map(|dt| dt.to_rfc3339()),
                    id,
                ],
            )
            .await
            .map_err(query_err)?;

        debug!(id, forwarded, "Forward status updated");
        Ok(())
    }

    async fn mark_api_forwarded(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE messages SET api_forwarded_at = ?1 WHERE id = ?2",
                params![at.to_rfc3339(), id],
            )
            .await
            .map_err(query_err)?;

        debug!(id, "API delivery recorded");
        Ok(())
    }

    async fn list_enabled_rules(&self) -> Result<Vec<FilterRule>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RULE_COLUMNS} FROM filter_rules
                     WHERE enabled = 1 ORDER BY id ASC"
                ),
                (),
            )
            .await
            .map_err(query_err)?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            rules.push(row_to_rule(&row)?);
        }
        Ok(rules)
    }

    async fn list_rules(&self) -> Result<Vec<FilterRule>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM filter_rules ORDER BY id ASC"),
                (),
            )
            .await
            .map_err(query_err)?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            rules.push(row_to_rule(&row)?);
        }
        Ok(rules)
    }

    async fn get_rule(&self, id: i64) -> Result<Option<FilterRule>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM filter_rules WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_rule(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_rule(&self, rule: &FilterRule) -> Result<i64, DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO filter_rules
                    (name, sender_contains, message_contains,
                     exclude_sender_contains, exclude_message_contains,
                     enabled, destinations, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    rule.name.clone(),
                    rule.sender_contains.clone(),
                    rule.message_contains.clone(),
                    rule.exclude_sender_contains.clone(),
                    rule.exclude_message_contains.clone(),
                    rule.enabled as i64,
                    destinations_to_json(&rule.destinations)?,
                    rule.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;

        Ok(self.conn.last_insert_rowid())
    }

    async fn update_rule(&self, rule: &FilterRule) -> Result<(), DatabaseError> {
        let updated = self
            .conn
            .execute(
                "UPDATE filter_rules SET
                    name = ?1, sender_contains = ?2, message_contains = ?3,
                    exclude_sender_contains = ?4, exclude_message_contains = ?5,
                    enabled = ?6, destinations = ?7
                 WHERE id = ?8",
                params![
                    rule.name.clone(),
                    rule.sender_contains.clone(),
                    rule.message_contains.clone(),
                    rule.exclude_sender_contains.clone(),
                    rule.exclude_message_contains.clone(),
                    rule.enabled as i64,
                    destinations_to_json(&rule.destinations)?,
                    rule.id,
                ],
            )
            .await
            .map_err(query_err)?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "filter_rule".into(),
                id: rule.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_rule(&self, id: i64) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM filter_rules WHERE id = ?1", params![id])
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_email_config(&self) -> Result<Option<EmailConfig>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT smtp_server, smtp_port, username, password, from_address, use_ssl
                 FROM email_config WHERE id = 1",
                (),
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };
        let map = |e: libsql::Error| DatabaseError::Query(format!("email_config row: {e}"));

        Ok(Some(EmailConfig {
            smtp_server: row.get(0).map_err(map)?,
            smtp_port: row.get::<i64>(1).map_err(map)? as u16,
            username: row.get(2).map_err(map)?,
            password: row.get(3).map_err(map)?,
            from_address: row.get(4).map_err(map)?,
            use_ssl: row.get::<i64>(5).map_err(map)? != 0,
        }))
    }

    async fn save_email_config(&self, config: &EmailConfig) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO email_config
                    (id, smtp_server, smtp_port, username, password, from_address, use_ssl)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    smtp_server = excluded.smtp_server,
                    smtp_port = excluded.smtp_port,
                    username = excluded.username,
                    password = excluded.password,
                    from_address = excluded.from_address,
                    use_ssl = excluded.use_ssl",
                params![
                    config.smtp_server.clone(),
                    config.smtp_port as i64,
                    config.username.clone(),
                    config.password.clone(),
                    config.from_address.clone(),
                    config.use_ssl as i64,
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_api_config(&self) -> Result<Option<ApiConfig>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT enabled, api_url, auth_token, custom_sender_name
                 FROM api_config WHERE id = 1",
                (),
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };
        let map = |e: libsql::Error| DatabaseError::Query(format!("api_config row: {e}"));

        Ok(Some(ApiConfig {
            enabled: row.get::<i64>(0).map_err(map)? != 0,
            api_url: row.get(1).map_err(map)?,
            auth_token: row.get(2).map_err(map)?,
            custom_sender_name: row.get(3).map_err(map)?,
        }))
    }

    async fn save_api_config(&self, config: &ApiConfig) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO api_config (id, enabled, api_url, auth_token, custom_sender_name)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    enabled = excluded.enabled,
                    api_url = excluded.api_url,
                    auth_token = excluded.auth_token,
                    custom_sender_name = excluded.custom_sender_name",
                params![
                    config.enabled as i64,
                    config.api_url.clone(),
                    config.auth_token.clone(),
                    config.custom_sender_name.clone(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
