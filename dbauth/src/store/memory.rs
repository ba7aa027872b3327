//! In-memory [`UserStore`].
//!
//! Statement text is recorded but not interpreted: `query` returns the rows
//! whose key column equals the first parameter, and `execute` treats its
//! parameters as `(locked_at, username)` and stamps the lock column of the
//! matching rows.

use anyhow::anyhow;
use std::sync::{Mutex, RwLock};

use super::{ColumnValue, Param, PlaceholderStyle, Row, StoreError, UserStore};

#[derive(Debug)]
pub struct MemoryStore {
    key_column: String,
    lock_column: Option<String>,
    rows: RwLock<Vec<Row>>,
    statements: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            lock_column: None,
            rows: RwLock::new(Vec::new()),
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Column written by `execute`.
    pub fn with_lock_column(mut self, column: impl Into<String>) -> Self {
        self.lock_column = Some(column.into());
        self
    }

    pub fn with_rows(self, rows: impl IntoIterator<Item = Row>) -> Self {
        if let Ok(mut stored) = self.rows.write() {
            stored.extend(rows);
        }
        self
    }

    pub fn insert(&self, row: Row) -> Result<(), StoreError> {
        self.rows.write().map_err(|_| anyhow!("memory store lock poisoned"))?.push(row);
        Ok(())
    }

    /// Snapshot of the stored rows.
    pub fn rows(&self) -> Vec<Row> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }

    /// Every statement passed to `query` or `execute`, in call order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, sql: &str) -> Result<(), StoreError> {
        self.statements
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .push(sql.to_string());
        Ok(())
    }

    fn matches(&self, row: &Row, key: &str) -> bool {
        row.get(&self.key_column)
            .and_then(ColumnValue::as_text)
            .is_some_and(|value| value == key)
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    async fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, StoreError> {
        self.record(sql)?;
        let Some(Param::Text(key)) = params.first() else {
            return Err(anyhow!("memory store queries take the username as first parameter").into());
        };

        let rows = self.rows.read().map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(rows.iter().filter(|row| self.matches(row, key)).cloned().collect())
    }

    async fn execute(&self, sql: &str, params: &[Param]) -> Result<u64, StoreError> {
        self.record(sql)?;
        let (Some(Param::Timestamp(at)), Some(Param::Text(key))) = (params.first(), params.get(1)) else {
            return Err(anyhow!("memory store updates take (timestamp, username) parameters").into());
        };
        let column = self
            .lock_column
            .as_deref()
            .ok_or_else(|| anyhow!("memory store has no lock column"))?;

        let mut rows = self.rows.write().map_err(|_| anyhow!("memory store lock poisoned"))?;
        let mut affected = 0;
        for row in rows.iter_mut().filter(|row| self.matches(row, key)) {
            row.set(column, ColumnValue::Timestamp(*at));
            affected += 1;
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store() -> MemoryStore {
        MemoryStore::new("username").with_lock_column("locked_at").with_rows([
            Row::new().with("username", "alice").with("password", "a"),
            Row::new().with("username", "bob").with("password", "b1"),
            Row::new().with("username", "bob").with("password", "b2"),
        ])
    }

    #[tokio::test]
    async fn test_query_filters_by_key() {
        let store = store();
        let rows = store.query("SELECT", &[Param::Text("bob".into())]).await.unwrap();
        assert_eq!(rows.len(), 2);
        let rows = store.query("SELECT", &[Param::Text("nobody".into())]).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(store.statements(), vec!["SELECT", "SELECT"]);
    }

    #[tokio::test]
    async fn test_execute_stamps_lock_column() {
        let store = store();
        let now = Utc::now();
        let affected = store
            .execute("UPDATE", &[Param::Timestamp(now), Param::Text("alice".into())])
            .await
            .unwrap();
        assert_eq!(affected, 1);
        let alice = store.rows().into_iter().next().unwrap();
        assert_eq!(alice.get("locked_at"), Some(&ColumnValue::Timestamp(now)));

        let affected = store
            .execute("UPDATE", &[Param::Timestamp(now), Param::Text("nobody".into())])
            .await
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn test_query_requires_key_param() {
        let store = store();
        assert!(store.query("SELECT", &[]).await.is_err());
    }
}
