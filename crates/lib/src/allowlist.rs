//! Authorized users and their preferred model.
//!
//! Backed by SQLite in production (`SqliteAllowlist`) and by a map in tests (`MemoryAllowlist`).
//! SQLite calls run on tokio's blocking pool so a slow disk does not stall conversation workers.

use crate::channels::UserId;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// A user allowed to talk to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedUser {
    pub id: UserId,
    /// Model override; None means the configured default.
    pub model: Option<String>,
}

impl AuthorizedUser {
    pub fn new(id: UserId) -> Self {
        Self { id, model: None }
    }
}

#[async_trait]
pub trait AllowlistStore: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<AuthorizedUser>>;

    /// Insert the user or replace the stored row.
    async fn upsert(&self, user: AuthorizedUser) -> Result<()>;

    /// Add the user if absent, leaving an existing row (and its model) untouched.
    async fn ensure(&self, user_id: UserId) -> Result<AuthorizedUser> {
        if let Some(user) = self.get(user_id).await? {
            return Ok(user);
        }
        let user = AuthorizedUser::new(user_id);
        self.upsert(user.clone()).await?;
        Ok(user)
    }
}

/// SQLite-backed allowlist: table `user(id INTEGER PRIMARY KEY, model TEXT)`.
#[derive(Clone)]
pub struct SqliteAllowlist {
    db: Arc<Mutex<Connection>>,
}

impl SqliteAllowlist {
    /// Open (or create) the database at `path`, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening allowlist database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory allowlist database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS user (id INTEGER PRIMARY KEY, model TEXT)",
            [],
        )
        .context("creating user table")?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let conn = db
                .lock()
                .map_err(|_| anyhow::anyhow!("allowlist database lock poisoned"))?;
            Ok(f(&conn)?)
        })
        .await
        .context("allowlist database task failed")?
    }
}

#[async_trait]
impl AllowlistStore for SqliteAllowlist {
    async fn get(&self, user_id: UserId) -> Result<Option<AuthorizedUser>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, model FROM user WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(AuthorizedUser {
                        id: row.get(0)?,
                        model: row.get(1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .with_context(|| format!("looking up user {}", user_id))
    }

    async fn upsert(&self, user: AuthorizedUser) -> Result<()> {
        let user_id = user.id;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user (id, model) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET model = excluded.model",
                params![user.id, user.model],
            )
        })
        .await
        .with_context(|| format!("saving user {}", user_id))?;
        Ok(())
    }
}

/// In-process allowlist.
#[derive(Default)]
pub struct MemoryAllowlist {
    users: RwLock<HashMap<UserId, AuthorizedUser>>,
}

impl MemoryAllowlist {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AllowlistStore for MemoryAllowlist {
    async fn get(&self, user_id: UserId) -> Result<Option<AuthorizedUser>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn upsert(&self, user: AuthorizedUser) -> Result<()> {
        self.users.write().await.insert(user.id, user);
        Ok(())
    }
}
