//! SQLite implementation of the clipboard history store

use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::{format_timestamp, parse_timestamp, ClipboardItem};
use crate::clipboard::ContentType;

const SCHEMA_VERSION: u32 = 1;

const ITEM_COLUMNS: &str =
    "id, content, content_type, preview, is_pinned, created_at, updated_at, content_hash";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite failure, including constraint violations
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No row with the given id
    #[error("Clipboard item {0} not found")]
    NotFound(i64),
}

/// Store behavior knobs taken from the settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Pinned flag given to rows first created by an unattended save
    pub pin_on_save: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Pin,
    Save,
}

struct Inner {
    conn: Connection,
    last_stamp: Option<DateTime<Utc>>,
}

impl Inner {
    /// Strictly increasing write timestamp, microsecond precision
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// Content-addressed, size-bounded clipboard history
///
/// All access goes through one async mutex, so writes are serialized and a
/// read never observes a half-applied write. Each committed write that changed
/// a row bumps the revision published by [`HistoryStore::subscribe_changes`].
pub struct HistoryStore {
    inner: Mutex<Inner>,
    options: RwLock<StoreOptions>,
    revision: watch::Sender<u64>,
}

impl HistoryStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        info!("Opened clipboard history at {}", path.display());
        Self::with_connection(conn, options)
    }

    /// Open a private in-memory database
    pub fn open_in_memory(options: StoreOptions) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?, options)
    }

    fn with_connection(conn: Connection, options: StoreOptions) -> Result<Self, StorageError> {
        initialize(&conn)?;

        let last_stamp: Option<String> =
            conn.query_row("SELECT MAX(updated_at) FROM clipboard_items", [], |row| row.get(0))?;
        let (revision, _) = watch::channel(0);

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                last_stamp: last_stamp.as_deref().and_then(parse_timestamp),
            }),
            options: RwLock::new(options),
            revision,
        })
    }

    pub fn options(&self) -> StoreOptions {
        match self.options.read() {
            Ok(options) => *options,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replace the store options; affects writes made after the call
    pub fn set_options(&self, options: StoreOptions) {
        match self.options.write() {
            Ok(mut slot) => *slot = options,
            Err(poisoned) => *poisoned.into_inner() = options,
        }
    }

    /// Receiver for the store revision, bumped after every committed change
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Pin `content`, creating the row if needed
    pub async fn pin(
        &self,
        content: &str,
        content_type: ContentType,
    ) -> Result<ClipboardItem, StorageError> {
        self.upsert(content, content_type, Upsert::Pin).await
    }

    /// Record `content` from passive capture.
    ///
    /// An existing row keeps its pinned flag and only moves to the top; a new
    /// row gets [`StoreOptions::pin_on_save`].
    pub async fn save(
        &self,
        content: &str,
        content_type: ContentType,
    ) -> Result<ClipboardItem, StorageError> {
        self.upsert(content, content_type, Upsert::Save).await
    }

    async fn upsert(
        &self,
        content: &str,
        content_type: ContentType,
        mode: Upsert,
    ) -> Result<ClipboardItem, StorageError> {
        let hash = ClipboardItem::hash_of(content);
        let mut inner = self.inner.lock().await;
        let stamp = inner.next_stamp();
        let tx = inner.conn.transaction()?;

        let existing = tx
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM clipboard_items WHERE content_hash = ?1"),
                params![hash],
                row_to_item,
            )
            .optional()?;

        let item = match existing {
            Some(mut item) => {
                item.updated_at = stamp;
                item.is_pinned = item.is_pinned || mode == Upsert::Pin;
                tx.execute(
                    "UPDATE clipboard_items SET updated_at = ?1, is_pinned = ?2 WHERE id = ?3",
                    params![format_timestamp(&stamp), item.is_pinned, item.id],
                )?;
                debug!("Refreshed clipboard item {} ({:?})", item.id, mode);
                item
            }
            None => {
                let is_pinned = match mode {
                    Upsert::Pin => true,
                    Upsert::Save => self.options().pin_on_save,
                };
                let preview = ClipboardItem::preview_of(content);
                tx.execute(
                    "INSERT INTO clipboard_items
                     (content, content_type, preview, is_pinned, created_at, updated_at, content_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
                    params![
                        content,
                        content_type.as_str(),
                        &preview,
                        is_pinned,
                        format_timestamp(&stamp),
                        &hash,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                debug!("Inserted clipboard item {} ({:?})", id, mode);
                ClipboardItem {
                    id,
                    content: content.to_string(),
                    content_type,
                    preview,
                    is_pinned,
                    created_at: stamp,
                    updated_at: stamp,
                    content_hash: hash,
                }
            }
        };

        tx.commit()?;
        drop(inner);
        self.bump_revision();
        Ok(item)
    }

    /// Pinned rows, most recently updated first
    pub async fn fetch_pinned(&self, limit: usize) -> Result<Vec<ClipboardItem>, StorageError> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM clipboard_items
                 WHERE is_pinned = 1
                 ORDER BY updated_at DESC, id DESC
                 LIMIT ?1"
            ),
            limit,
        )
        .await
    }

    /// All rows, most recently updated first
    pub async fn fetch_all(&self, limit: usize) -> Result<Vec<ClipboardItem>, StorageError> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM clipboard_items
                 ORDER BY updated_at DESC, id DESC
                 LIMIT ?1"
            ),
            limit,
        )
        .await
    }

    async fn query_items(&self, sql: &str, limit: usize) -> Result<Vec<ClipboardItem>, StorageError> {
        let inner = self.inner.lock().await;
        let mut stmt = inner.conn.prepare(sql)?;
        let items = stmt
            .query_map(params![sql_limit(limit)], row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Rows whose content or preview contains `query`, ignoring case
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ClipboardItem>, StorageError> {
        let inner = self.inner.lock().await;
        let mut stmt = inner.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM clipboard_items ORDER BY updated_at DESC, id DESC"
        ))?;

        // Case folding has to cover non-ASCII text, which LIKE does not.
        let mut results = Vec::new();
        for item in stmt.query_map([], row_to_item)? {
            if results.len() >= limit {
                break;
            }
            let item = item?;
            if item.matches(query) {
                results.push(item);
            }
        }
        Ok(results)
    }

    /// Look up a row by id
    pub async fn get(&self, id: i64) -> Result<Option<ClipboardItem>, StorageError> {
        let inner = self.inner.lock().await;
        let item = inner
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM clipboard_items WHERE id = ?1"),
                params![id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Total number of rows
    pub async fn count(&self) -> Result<usize, StorageError> {
        let inner = self.inner.lock().await;
        let count: i64 = inner
            .conn
            .query_row("SELECT COUNT(*) FROM clipboard_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove one row
    pub async fn delete(&self, item: &ClipboardItem) -> Result<bool, StorageError> {
        self.delete_by_id(item.id).await
    }

    /// Remove the row with `id`; returns false when it did not exist
    pub async fn delete_by_id(&self, id: i64) -> Result<bool, StorageError> {
        let removed = self
            .write(|conn| Ok(conn.execute("DELETE FROM clipboard_items WHERE id = ?1", params![id])?))
            .await?;
        Ok(removed > 0)
    }

    /// Remove every pinned row
    pub async fn delete_all_pinned(&self) -> Result<usize, StorageError> {
        self.write(|conn| Ok(conn.execute("DELETE FROM clipboard_items WHERE is_pinned = 1", [])?))
            .await
    }

    /// Remove every row
    pub async fn delete_all(&self) -> Result<usize, StorageError> {
        self.write(|conn| Ok(conn.execute("DELETE FROM clipboard_items", [])?))
            .await
    }

    /// Evict the least recently updated rows until at most `max` remain.
    ///
    /// Returns the number of evicted rows.
    pub async fn enforce_capacity(&self, max: usize) -> Result<usize, StorageError> {
        let evicted = self
            .write(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM clipboard_items", [], |row| row.get(0))?;
                let excess = count - sql_limit(max);
                if excess <= 0 {
                    return Ok(0);
                }
                Ok(conn.execute(
                    "DELETE FROM clipboard_items WHERE id IN (
                         SELECT id FROM clipboard_items
                         ORDER BY updated_at ASC, id ASC
                         LIMIT ?1
                     )",
                    params![excess],
                )?)
            })
            .await?;

        if evicted > 0 {
            info!("Evicted {} clipboard items (capacity {})", evicted, max);
        }
        Ok(evicted)
    }

    /// Run a mutation in its own transaction and publish it if rows changed
    async fn write<F>(&self, op: F) -> Result<usize, StorageError>
    where
        F: FnOnce(&Connection) -> Result<usize, StorageError>,
    {
        let mut inner = self.inner.lock().await;
        let tx = inner.conn.transaction()?;
        let changed = op(&tx)?;
        tx.commit()?;
        drop(inner);

        if changed > 0 {
            self.bump_revision();
        }
        Ok(changed)
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}

fn initialize(conn: &Connection) -> Result<(), StorageError> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema(conn)?;
    } else if version < SCHEMA_VERSION {
        migrate_schema(conn, version)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<u32, StorageError> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<u32> = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn create_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER DEFAULT (strftime('%s', 'now'))
        );

        CREATE TABLE IF NOT EXISTS clipboard_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            content_type TEXT DEFAULT 'text',
            preview TEXT,
            is_pinned BOOLEAN NOT NULL DEFAULT 1,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            content_hash TEXT NOT NULL UNIQUE
        );

        CREATE INDEX IF NOT EXISTS idx_clipboard_items_pinned_created
            ON clipboard_items(is_pinned, created_at);
        ",
    )?;

    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![SCHEMA_VERSION],
    )?;

    Ok(())
}

fn migrate_schema(_conn: &Connection, from_version: u32) -> Result<(), StorageError> {
    debug!("No migrations needed from schema version {}", from_version);
    Ok(())
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp: {}", raw).into(),
        )
    })
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ClipboardItem> {
    let content: String = row.get(1)?;
    let content_type: Option<String> = row.get(2)?;
    let preview: Option<String> = row.get(3)?;

    Ok(ClipboardItem {
        id: row.get(0)?,
        content_type: content_type
            .as_deref()
            .unwrap_or("text")
            .parse()
            .unwrap_or_default(),
        preview: preview.unwrap_or_else(|| ClipboardItem::preview_of(&content)),
        content,
        is_pinned: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        updated_at: timestamp_column(row, 6)?,
        content_hash: row.get(7)?,
    })
}
