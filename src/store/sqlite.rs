use super::{ItemFilter, MenuStore, SavedMenuItem, StoreError};
use crate::model::CanonicalMenuItem;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS menu_items (
    id           TEXT PRIMARY KEY,
    owner_id     TEXT NOT NULL,
    category     TEXT NOT NULL CHECK (length(trim(category)) > 0),
    name         TEXT NOT NULL CHECK (length(trim(name)) > 0),
    description  TEXT NOT NULL DEFAULT '',
    price        REAL NOT NULL CHECK (price >= 0),
    currency     TEXT NOT NULL DEFAULT 'LKR',
    is_available INTEGER NOT NULL DEFAULT 1,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_menu_items_owner_category
    ON menu_items (owner_id, category);
CREATE INDEX IF NOT EXISTS idx_menu_items_owner_available
    ON menu_items (owner_id, is_available);
"#;

/// [`MenuStore`] backed by a SQLite database.
///
/// Each item is its own statement with no surrounding transaction. A
/// constraint failure on one row leaves the rest in place.
#[derive(Clone)]
pub struct SqliteMenuStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMenuStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
}

/// rusqlite is synchronous; keep it off the async worker threads.
async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("sqlite task panicked: {}", e)))?
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<SavedMenuItem> {
    Ok(SavedMenuItem {
        id: row.get(0)?,
        item: CanonicalMenuItem::from_parts(
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ),
        created_at: row.get(8)?,
    })
}

const SELECT_ONE: &str = "SELECT id, owner_id, category, name, description, price, currency, \
     is_available, created_at FROM menu_items WHERE id = ?1 AND owner_id = ?2";

fn find_one(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<SavedMenuItem>, StoreError> {
    Ok(conn
        .query_row(SELECT_ONE, params![id, owner_id], row_to_item)
        .optional()?)
}

fn insert_one(conn: &Connection, saved: &SavedMenuItem) -> Result<(), StoreError> {
    let item = &saved.item;
    conn.execute(
        "INSERT INTO menu_items (id, owner_id, category, name, description, price, \
         currency, is_available, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            saved.id,
            item.owner_id(),
            item.category(),
            item.name(),
            item.description(),
            item.price(),
            item.currency(),
            item.is_available(),
            saved.created_at,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl MenuStore for SqliteMenuStore {
    async fn insert_many(
        &self,
        items: &[CanonicalMenuItem],
    ) -> Result<Vec<Result<SavedMenuItem, StoreError>>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let items = items.to_vec();
        run_blocking(move || {
            let conn = lock(&conn)?;
            let results: Vec<Result<SavedMenuItem, StoreError>> = items
                .into_iter()
                .map(|item| {
                    let saved = SavedMenuItem::assign(item);
                    insert_one(&conn, &saved).map(|()| saved)
                })
                .collect();
            debug!(
                "SQLite batch: {} inserted, {} refused",
                results.iter().filter(|r| r.is_ok()).count(),
                results.iter().filter(|r| r.is_err()).count()
            );
            Ok(results)
        })
        .await
    }

    async fn list(
        &self,
        owner_id: &str,
        filter: &ItemFilter,
    ) -> Result<Vec<SavedMenuItem>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let owner_id = owner_id.to_string();
        let filter = filter.clone();
        run_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, category, name, description, price, currency, \
                 is_available, created_at FROM menu_items \
                 WHERE owner_id = ?1 \
                   AND (?2 IS NULL OR category = ?2) \
                   AND (?3 IS NULL OR is_available = ?3) \
                 ORDER BY category, name",
            )?;
            let rows = stmt.query_map(
                params![owner_id, filter.category, filter.is_available],
                row_to_item,
            )?;
            let items = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }

    async fn find(&self, owner_id: &str, id: &str) -> Result<Option<SavedMenuItem>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let (owner_id, id) = (owner_id.to_string(), id.to_string());
        run_blocking(move || find_one(&*lock(&conn)?, &owner_id, &id)).await
    }

    async fn update(
        &self,
        owner_id: &str,
        id: &str,
        item: &CanonicalMenuItem,
    ) -> Result<SavedMenuItem, StoreError> {
        let conn = Arc::clone(&self.conn);
        let (owner_id, id) = (owner_id.to_string(), id.to_string());
        let item = item.clone();
        run_blocking(move || {
            let conn = lock(&conn)?;
            let changed = conn.execute(
                "UPDATE menu_items SET category = ?3, name = ?4, description = ?5, price = ?6, \
                 currency = ?7, is_available = ?8 WHERE id = ?1 AND owner_id = ?2",
                params![
                    id,
                    owner_id,
                    item.category(),
                    item.name(),
                    item.description(),
                    item.price(),
                    item.currency(),
                    item.is_available(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            find_one(&conn, &owner_id, &id)?.ok_or(StoreError::NotFound(id))
        })
        .await
    }

    async fn delete(&self, owner_id: &str, id: &str) -> Result<(), StoreError> {
        let conn = Arc::clone(&self.conn);
        let (owner_id, id) = (owner_id.to_string(), id.to_string());
        run_blocking(move || {
            let changed = lock(&conn)?.execute(
                "DELETE FROM menu_items WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id],
            )?;
            debug!("SQLite delete {}: {} row(s)", id, changed);
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }
}
