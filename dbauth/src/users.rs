//! Reading and locking user accounts in a backing store.
//!
//! [`DbUserHandler`] turns the configured field schema ([`UsersConfig`]) into
//! a [`FieldSchema`] once at construction, then maps every returned row into a
//! fresh [`UserRecord`]. Statements are written with `?` placeholders and
//! rewritten for stores that expect numbered ones.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::{DEFAULT_PASSWORD_COLUMN, DEFAULT_QUERY_SQL, UsersConfig};
use crate::errors::{Error, Result};
use crate::ip::IpChecker;
use crate::store::{ColumnValue, Param, PlaceholderStyle, Row, StoreError, UserStore};
use crate::user::{Claims, UserRecord};

/// Offset-carrying layouts tried after RFC 3339, covering PostgreSQL's text output.
const OFFSET_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Layouts without an offset, read as UTC.
const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Access to user accounts.
#[async_trait]
pub trait UserHandler: Send + Sync {
    /// Every record matching `username`; empty when there is none.
    async fn read_user(&self, username: &str) -> Result<Vec<UserRecord>>;

    /// Mark the account as locked now. A no-op when locking is not configured.
    async fn lock_user(&self, username: &str) -> Result<()>;
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Column names and lock policy resolved from [`UsersConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    password: String,
    block_list: Option<String>,
    locked_at: Option<String>,
    locked_format: Option<String>,
    lock_expiry: Duration,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            password: DEFAULT_PASSWORD_COLUMN.to_string(),
            block_list: None,
            locked_at: None,
            locked_format: None,
            lock_expiry: Duration::ZERO,
        }
    }
}

impl FieldSchema {
    pub fn from_config(config: &UsersConfig) -> Result<Self> {
        let password = non_empty(Some(&config.password)).unwrap_or_else(|| DEFAULT_PASSWORD_COLUMN.to_string());
        let block_list = non_empty(config.block_list.as_ref());
        let locked_at = non_empty(config.locked_at.as_ref());
        let locked_format = non_empty(config.locked_format.as_ref());
        let expires = non_empty(config.locked_time_expires.as_ref());

        if locked_at.is_none() {
            if locked_format.is_some() {
                return Err(Error::config("users.locked_format", "requires users.locked_at"));
            }
            if expires.is_some() {
                return Err(Error::config("users.locked_time_expires", "requires users.locked_at"));
            }
        }

        let lock_expiry = match expires {
            Some(text) => humantime::parse_duration(&text)
                .map_err(|e| Error::config("users.locked_time_expires", format!("'{text}' is not a duration: {e}")))?,
            None => Duration::ZERO,
        };

        Ok(Self {
            password,
            block_list,
            locked_at,
            locked_format,
            lock_expiry,
        })
    }

    pub fn lock_expiry(&self) -> Duration {
        self.lock_expiry
    }

    /// Build a record for `username` from one result row.
    ///
    /// Every column of the row becomes a claim, including the password column.
    pub fn to_record(&self, username: &str, row: &Row) -> Result<UserRecord> {
        let password = match row.get(&self.password) {
            None | Some(ColumnValue::Null) => String::new(),
            Some(value) => value
                .as_text()
                .ok_or_else(|| Error::row_mapping(&self.password, format!("isn't string - {}", value.type_name())))?,
        };

        let locked_at = match &self.locked_at {
            Some(column) => self.read_locked_at(column, row)?,
            None => None,
        };

        let block_list = match &self.block_list {
            Some(column) => read_block_list(column, row)?,
            None => Vec::new(),
        };

        let data: Claims = row.columns().map(|(name, value)| (name.to_string(), value.to_json())).collect();

        Ok(UserRecord::new(username, password)
            .with_lock(locked_at, self.lock_expiry)
            .with_block_list(block_list)
            .with_data(data))
    }

    fn read_locked_at(&self, column: &str, row: &Row) -> Result<Option<DateTime<Utc>>> {
        match row.get(column) {
            None | Some(ColumnValue::Null) => Ok(None),
            Some(ColumnValue::Timestamp(at)) => Ok(Some(*at).filter(|at| !is_zero_time(at))),
            Some(value) => {
                let text = value
                    .as_text()
                    .ok_or_else(|| Error::row_mapping(column, format!("isn't time - {}", value.type_name())))?;
                if text.trim().is_empty() {
                    return Ok(None);
                }
                parse_timestamp(self.locked_format.as_deref(), &text)
                    .map(|at| Some(at).filter(|at| !is_zero_time(at)))
                    .ok_or_else(|| Error::row_mapping(column, format!("isn't time - {text}")))
            }
        }
    }
}

/// `0001-01-01T00:00:00Z`, written by clients that store an unset time as its zero value.
fn is_zero_time(at: &DateTime<Utc>) -> bool {
    at.year() == 1 && at.ordinal() == 1 && at.num_seconds_from_midnight() == 0 && at.nanosecond() == 0
}

fn read_block_list(column: &str, row: &Row) -> Result<Vec<IpChecker>> {
    let entries: Vec<String> = match row.get(column) {
        None | Some(ColumnValue::Null) => return Ok(Vec::new()),
        Some(ColumnValue::Json(value)) => serde_json::from_value(value.clone())
            .map_err(|_| Error::row_mapping(column, format!("isn't []string - {value}")))?,
        Some(value) => {
            let text = value
                .as_text()
                .ok_or_else(|| Error::row_mapping(column, format!("isn't []string - {}", value.type_name())))?;
            serde_json::from_str(&text).map_err(|_| Error::row_mapping(column, format!("isn't []string - {text}")))?
        }
    };

    entries
        .iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpChecker>()
                .map_err(|e| Error::row_mapping(column, format!("isn't valid ip range - {e}")))
        })
        .collect()
}

/// Parse a textual lock timestamp.
///
/// `layout` (a chrono format string) is tried first, then RFC 3339, then the
/// space-separated forms PostgreSQL prints. Values without an offset are UTC.
pub fn parse_timestamp(layout: Option<&str>, text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Some(at) = layout.and_then(|layout| parse_with_layout(layout, text)) {
        return Some(at);
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }

    OFFSET_LAYOUTS
        .iter()
        .find_map(|layout| DateTime::parse_from_str(text, layout).ok())
        .map(|at| at.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
                .map(|at| at.and_utc())
        })
}

fn parse_with_layout(layout: &str, text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text, layout)
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, layout).ok().map(|at| at.and_utc()))
}

/// Rewrite `?` placeholders as `$1, $2, ...`; `??` stands for a literal `?`.
pub fn replace_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '?' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'?') {
            chars.next();
            out.push('?');
        } else {
            index += 1;
            out.push('$');
            out.push_str(&index.to_string());
        }
    }

    out
}

/// [`UserHandler`] over a [`UserStore`].
pub struct DbUserHandler {
    store: Arc<dyn UserStore>,
    query_sql: String,
    lock_sql: Option<String>,
    schema: FieldSchema,
}

impl std::fmt::Debug for DbUserHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbUserHandler")
            .field("query_sql", &self.query_sql)
            .field("lock_sql", &self.lock_sql)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl DbUserHandler {
    pub fn new(store: Arc<dyn UserStore>, config: &UsersConfig) -> Result<Self> {
        let schema = FieldSchema::from_config(config)?;
        let query_sql = non_empty(Some(&config.query_sql)).unwrap_or_else(|| DEFAULT_QUERY_SQL.to_string());
        let lock_sql = non_empty(config.lock_sql.as_ref());

        let (query_sql, lock_sql) = match store.placeholder_style() {
            PlaceholderStyle::Question => (query_sql, lock_sql),
            PlaceholderStyle::Numbered => (
                replace_placeholders(&query_sql),
                lock_sql.as_deref().map(replace_placeholders),
            ),
        };

        Ok(Self {
            store,
            query_sql,
            lock_sql,
            schema,
        })
    }

    pub fn query_sql(&self) -> &str {
        &self.query_sql
    }

    pub fn lock_sql(&self) -> Option<&str> {
        self.lock_sql.as_deref()
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }
}

#[async_trait]
impl UserHandler for DbUserHandler {
    #[instrument(skip(self), err)]
    async fn read_user(&self, username: &str) -> Result<Vec<UserRecord>> {
        let params = [Param::Text(username.to_string())];
        let rows = match self.store.query(&self.query_sql, &params).await {
            Ok(rows) => rows,
            Err(StoreError::NoRows) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        debug!(count = rows.len(), "user rows returned");
        rows.iter().map(|row| self.schema.to_record(username, row)).collect()
    }

    #[instrument(skip(self), err)]
    async fn lock_user(&self, username: &str) -> Result<()> {
        let Some(sql) = &self.lock_sql else {
            debug!("account locking not configured");
            return Ok(());
        };

        let params = [Param::Timestamp(Utc::now()), Param::Text(username.to_string())];
        let affected = self.store.execute(sql, &params).await?;
        if affected == 0 {
            return Err(Error::NoAccountUpdated {
                username: username.to_string(),
            });
        }

        info!(affected, "account locked");
        Ok(())
    }
}
