//! Append-only communications log in SQLite.
//!
//! The store is shared between the pipeline's persist processor and the
//! HTTP history endpoints; all access goes through a mutex around one
//! connection.  HTTP handlers call it from `spawn_blocking`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use s2_protocol::{OriginType, ValidationDetails, ValidationErrorDetail};

use crate::pipeline::{Message, MessageType};

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}

/// A persisted communication plus its validation-error children.
#[derive(Debug, Clone, Serialize)]
pub struct CommunicationRecord {
    pub id: i64,
    pub session_id: Uuid,
    pub cem_id: String,
    pub rm_id: String,
    pub origin: OriginType,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s2_msg_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s2_msg: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub validation_errors: Vec<ValidationErrorDetail>,
}

impl CommunicationRecord {
    /// Rehydrate the pipeline view of this record, used when replaying
    /// session history to a debugger observer.
    pub fn into_message(self) -> Message {
        let validation = if self.validation_errors.is_empty() {
            None
        } else {
            Some(ValidationDetails {
                msg: self
                    .validation_errors
                    .first()
                    .map(|e| e.msg.clone())
                    .unwrap_or_default(),
                errors: self.validation_errors,
            })
        };
        Message {
            session_id: self.session_id,
            cem_id: self.cem_id,
            rm_id: self.rm_id,
            origin: self.origin,
            timestamp: self.timestamp,
            message_type: self.message_type,
            msg: self.s2_msg,
            s2_msg: None,
            s2_msg_type: self.s2_msg_type,
            s2_validation_error: validation,
        }
    }
}

/// Filters accepted by the history endpoint; all optional, ANDed together.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub session_id: Option<Uuid>,
    pub cem_id: Option<String>,
    pub rm_id: Option<String>,
    pub origin: Option<String>,
    pub s2_msg_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Aggregated view of one persisted session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAggregate {
    pub session_id: Uuid,
    pub cem_id: String,
    pub rm_id: String,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub state: &'static str,
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.apply_pragmas()?;
        store.apply_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(Path::new(":memory:"))
    }

    fn apply_pragmas(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store lock");
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn apply_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store lock");
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Write one communications row (plus validation-error children) for a
    /// pipeline message.  Returns the new row id.
    pub fn insert_communication(&self, message: &Message) -> Result<i64, StoreError> {
        let mut conn = self.conn.lock().expect("store lock");
        let tx = conn.transaction()?;

        let s2_msg = message
            .msg
            .as_ref()
            .map(serde_json::Value::to_string);
        tx.execute(
            "INSERT INTO communications
                 (session_id, cem_id, rm_id, origin, message_type, s2_msg_type, s2_msg, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.session_id.to_string(),
                message.cem_id,
                message.rm_id,
                message.origin.as_str(),
                message.message_type.as_str(),
                message.s2_msg_type,
                s2_msg,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        let communication_id = tx.last_insert_rowid();

        if let Some(validation) = &message.s2_validation_error {
            if validation.errors.is_empty() {
                tx.execute(
                    "INSERT INTO validation_errors (communication_id, type, loc, msg)
                     VALUES (?1, 'validation_error', '', ?2)",
                    params![communication_id, validation.msg],
                )?;
            } else {
                for error in &validation.errors {
                    tx.execute(
                        "INSERT INTO validation_errors (communication_id, type, loc, msg)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![communication_id, error.kind, error.loc, error.msg],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(communication_id)
    }

    /// Filtered history, insertion-ordered.
    pub fn filtered(&self, query: &HistoryQuery) -> Result<Vec<CommunicationRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT id, session_id, cem_id, rm_id, origin, message_type, s2_msg_type, s2_msg, timestamp
             FROM communications WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(session_id) = query.session_id {
            sql.push_str(" AND session_id = ?");
            args.push(Box::new(session_id.to_string()));
        }
        if let Some(cem_id) = &query.cem_id {
            sql.push_str(" AND cem_id = ?");
            args.push(Box::new(cem_id.clone()));
        }
        if let Some(rm_id) = &query.rm_id {
            sql.push_str(" AND rm_id = ?");
            args.push(Box::new(rm_id.clone()));
        }
        if let Some(origin) = &query.origin {
            sql.push_str(" AND origin = ?");
            args.push(Box::new(origin.clone()));
        }
        if let Some(s2_msg_type) = &query.s2_msg_type {
            sql.push_str(" AND s2_msg_type = ?");
            args.push(Box::new(s2_msg_type.clone()));
        }
        if let Some(start) = query.start_date {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(start.to_rfc3339()));
        }
        if let Some(end) = query.end_date {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(end.to_rfc3339()));
        }
        sql.push_str(" ORDER BY id ASC");

        self.query_records(&sql, &args)
    }

    /// Every record of one session, insertion-ordered.  Used for observer
    /// history replay.
    pub fn session_history(&self, session_id: Uuid) -> Result<Vec<CommunicationRecord>, StoreError> {
        self.filtered(&HistoryQuery {
            session_id: Some(session_id),
            ..HistoryQuery::default()
        })
    }

    /// Unique sessions with their min/max timestamps and first-seen peer
    /// ids, most recently ended first.
    pub fn unique_sessions(&self) -> Result<Vec<SessionAggregate>, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let mut statement = conn.prepare(
            "SELECT session_id, MIN(timestamp), MAX(timestamp),
                    (SELECT cem_id FROM communications c2
                      WHERE c2.session_id = c.session_id ORDER BY id ASC LIMIT 1),
                    (SELECT rm_id FROM communications c2
                      WHERE c2.session_id = c.session_id ORDER BY id ASC LIMIT 1)
             FROM communications c
             GROUP BY session_id
             ORDER BY MAX(timestamp) DESC",
        )?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (session_id, start, end, cem_id, rm_id) = row?;
            sessions.push(SessionAggregate {
                session_id: parse_uuid(&session_id)?,
                cem_id,
                rm_id,
                start_timestamp: parse_timestamp(&start)?,
                end_timestamp: parse_timestamp(&end)?,
                state: "closed",
            });
        }
        Ok(sessions)
    }

    fn query_records(
        &self,
        sql: &str,
        args: &[Box<dyn rusqlite::ToSql>],
    ) -> Result<Vec<CommunicationRecord>, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let mut statement = conn.prepare(sql)?;
        let params = rusqlite::params_from_iter(args.iter().map(|a| a.as_ref()));
        let rows = statement.query_map(params, |row| {
            Ok(RawRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                cem_id: row.get(2)?,
                rm_id: row.get(3)?,
                origin: row.get(4)?,
                message_type: row.get(5)?,
                s2_msg_type: row.get(6)?,
                s2_msg: row.get(7)?,
                timestamp: row.get(8)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        // Attach validation errors in one sweep.
        let mut errors_by_communication: HashMap<i64, Vec<ValidationErrorDetail>> = HashMap::new();
        if !records.is_empty() {
            let mut statement = conn.prepare(
                "SELECT communication_id, type, loc, msg FROM validation_errors ORDER BY id ASC",
            )?;
            let error_rows = statement.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    ValidationErrorDetail {
                        kind: row.get(1)?,
                        loc: row.get(2)?,
                        msg: row.get(3)?,
                    },
                ))
            })?;
            for row in error_rows {
                let (communication_id, detail) = row?;
                errors_by_communication
                    .entry(communication_id)
                    .or_default()
                    .push(detail);
            }
        }

        records
            .into_iter()
            .map(|raw| raw.into_record(&mut errors_by_communication))
            .collect()
    }
}

struct RawRow {
    id: i64,
    session_id: String,
    cem_id: String,
    rm_id: String,
    origin: String,
    message_type: String,
    s2_msg_type: Option<String>,
    s2_msg: Option<String>,
    timestamp: String,
}

impl RawRow {
    fn into_record(
        self,
        errors: &mut HashMap<i64, Vec<ValidationErrorDetail>>,
    ) -> Result<CommunicationRecord, StoreError> {
        let origin = match self.origin.as_str() {
            "CEM" => OriginType::Cem,
            "RM" => OriginType::Rm,
            other => return Err(StoreError::InvalidRow(format!("origin {other}"))),
        };
        let message_type = MessageType::parse(&self.message_type)
            .ok_or_else(|| StoreError::InvalidRow(format!("message_type {}", self.message_type)))?;
        let s2_msg = self
            .s2_msg
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::InvalidRow(format!("s2_msg: {e}")))?;
        Ok(CommunicationRecord {
            id: self.id,
            session_id: parse_uuid(&self.session_id)?,
            cem_id: self.cem_id,
            rm_id: self.rm_id,
            origin,
            message_type,
            s2_msg_type: self.s2_msg_type,
            s2_msg,
            timestamp: parse_timestamp(&self.timestamp)?,
            validation_errors: errors.remove(&self.id).unwrap_or_default(),
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    s.parse()
        .map_err(|e| StoreError::InvalidRow(format!("session_id: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidRow(format!("timestamp: {e}")))
}
