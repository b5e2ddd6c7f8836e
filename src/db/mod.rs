use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection};
use serde_json::Value;
use tokio::sync::oneshot;

mod migrations;

use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// A persisted store record.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub value: Value,
}

/// Handle to the SQLite worker thread backing the store.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let path_for_thread = db_path.clone();
        let inner = Self::spawn_worker(move || {
            let conn = Connection::open(&path_for_thread)?;
            if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                error!("Failed to enable WAL mode: {err}");
            }
            Ok(conn)
        })?;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Opens a private in-memory database; nothing survives the handle.
    pub fn in_memory() -> Result<Self> {
        let inner = Self::spawn_worker(|| Ok(Connection::open_in_memory()?))?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    fn spawn_worker<F>(open: F) -> Result<DatabaseInner>
    where
        F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("predictboard-db".into())
            .spawn(move || {
                let mut conn = match open() {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(
                            anyhow::Error::new(err).context("failed to open SQLite database")
                        ));
                        return;
                    }
                };

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        Ok(DatabaseInner {
            sender: command_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn put_record(
        &self,
        key: &str,
        value: &Value,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let key = key.to_string();
        let serialized = serde_json::to_string(value).context("failed to serialize record")?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO records (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, serialized, updated_at.to_rfc3339()],
            )
            .with_context(|| format!("failed to upsert record '{key}'"))?;
            Ok(())
        })
        .await
    }

    pub async fn load_records(&self) -> Result<Vec<StoredRecord>> {
        self.execute(|conn| {
            let mut stmt = conn
                .prepare("SELECT key, value FROM records ORDER BY key")
                .context("failed to prepare record scan")?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(record_from_row(row)?);
            }
            Ok(records)
        })
        .await
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<StoredRecord> {
    let key: String = row.get(0)?;
    let raw: String = row.get(1)?;
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("record '{key}' holds invalid JSON"))?;
    Ok(StoredRecord { key, value })
}
