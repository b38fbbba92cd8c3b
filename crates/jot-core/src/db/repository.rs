//! Item store implementations

use std::future::Future;
use std::path::Path;

use libsql::{Row, Value};

use crate::error::{Error, Result};
use crate::models::{Item, LocalKey, RemoteKey};

use super::Database;

const ITEM_COLUMNS: &str = "local_key, remote_key, text, updated_at, deleted";

/// Which items a full scan should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemFilter {
    /// Every item, tombstones included
    #[default]
    All,
    /// Items not marked deleted
    Live,
    /// Tombstones only
    Deleted,
}

impl ItemFilter {
    /// Whether `item` passes this filter
    pub const fn admits(self, item: &Item) -> bool {
        match self {
            Self::All => true,
            Self::Live => !item.deleted,
            Self::Deleted => item.deleted,
        }
    }

    const fn where_clause(self) -> &'static str {
        match self {
            Self::All => "",
            Self::Live => "WHERE deleted = 0",
            Self::Deleted => "WHERE deleted = 1",
        }
    }
}

/// Durable keyed storage for the local replica
///
/// Pure CRUD: every operation resolves once the change is committed.
pub trait LocalStore: Send + Sync {
    /// Insert or replace an item by its local key
    fn put(&self, item: &Item) -> impl Future<Output = Result<()>> + Send;

    /// Full scan, optionally filtered on the tombstone flag
    fn get_all(&self, filter: ItemFilter) -> impl Future<Output = Result<Vec<Item>>> + Send;

    /// Fetch one item by local key
    fn get_by_key(&self, key: &LocalKey) -> impl Future<Output = Result<Option<Item>>> + Send;

    /// Fetch the item correlated with a remote record
    fn get_by_remote_key(
        &self,
        key: &RemoteKey,
    ) -> impl Future<Output = Result<Option<Item>>> + Send;

    /// Remove an item; removing an absent key is not an error
    fn delete(&self, key: &LocalKey) -> impl Future<Output = Result<()>> + Send;
}

/// libSQL implementation of `LocalStore`
pub struct LibSqlItemStore {
    db: Database,
}

impl LibSqlItemStore {
    /// Wrap an already opened database
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (or create) the local replica at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path).await?))
    }

    /// Open an in-memory replica
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    /// Parse an item from a database row
    fn parse_item(row: &Row) -> Result<Item> {
        let local_key: String = row.get(0)?;
        let local_key = local_key
            .parse::<LocalKey>()
            .map_err(|error| Error::Database(format!("invalid local key {local_key}: {error}")))?;
        let remote_key = match row.get_value(1)? {
            Value::Text(value) => Some(RemoteKey::new(value)),
            Value::Null => None,
            other => {
                return Err(Error::Database(format!(
                    "unexpected remote key value: {other:?}"
                )))
            }
        };

        Ok(Item {
            local_key,
            remote_key,
            text: row.get(2)?,
            updated_at: row.get(3)?,
            deleted: row.get::<i64>(4)? != 0,
        })
    }

    async fn query_items(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams + Send,
    ) -> Result<Vec<Item>> {
        let mut rows = self.db.connection().query(sql, params).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }
        Ok(items)
    }
}

impl LocalStore for LibSqlItemStore {
    async fn put(&self, item: &Item) -> Result<()> {
        let remote_key = item
            .remote_key
            .as_ref()
            .map_or(Value::Null, |key| Value::Text(key.as_str().to_string()));

        self.db
            .connection()
            .execute(
                "INSERT INTO items (local_key, remote_key, text, updated_at, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(local_key) DO UPDATE SET
                    remote_key = excluded.remote_key,
                    text = excluded.text,
                    updated_at = excluded.updated_at,
                    deleted = excluded.deleted",
                libsql::params![
                    item.local_key.as_str(),
                    remote_key,
                    item.text.clone(),
                    item.updated_at,
                    i64::from(item.deleted)
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_all(&self, filter: ItemFilter) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items {} ORDER BY updated_at DESC",
            filter.where_clause()
        );
        self.query_items(&sql, ()).await
    }

    async fn get_by_key(&self, key: &LocalKey) -> Result<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE local_key = ?1");
        let items = self.query_items(&sql, [key.as_str()]).await?;
        Ok(items.into_iter().next())
    }

    async fn get_by_remote_key(&self, key: &RemoteKey) -> Result<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE remote_key = ?1");
        let items = self.query_items(&sql, [key.as_str().to_string()]).await?;
        Ok(items.into_iter().next())
    }

    async fn delete(&self, key: &LocalKey) -> Result<()> {
        self.db
            .connection()
            .execute("DELETE FROM items WHERE local_key = ?1", [key.as_str()])
            .await?;
        Ok(())
    }
}
