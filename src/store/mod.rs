//! Shared key-value store with change notification.
//!
//! Every record is a flat JSON object. `set` replaces a record, `update`
//! merges fields into it (a `null` field removes that field), and
//! `subscribe` hands out a stream that yields the current value first and
//! then every later change to that key in write order. When opened with a
//! [`Database`] the store writes through to SQLite and is seeded from it.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use anyhow::Result;
use chrono::Utc;
use log::{info, warn};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::{
    db::Database,
    error::{BoardError, BoardResult},
};

pub const PREDICTION_KEY: &str = "predictions/current";
pub const TIMER_KEY: &str = "timer";
pub const ANIMATION_KEY: &str = "animations";

/// The value of one key at one point in time. `value` is `None` when the
/// key has never been written.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub key: String,
    pub value: Option<Value>,
}

impl Snapshot {
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

impl Subscription {
    /// Waits for the next snapshot. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Returns an already delivered snapshot without waiting.
    pub fn try_next(&mut self) -> Option<Snapshot> {
        self.rx.try_recv().ok()
    }
}

#[derive(Default)]
struct Entry {
    value: Option<Value>,
    subscribers: Vec<mpsc::UnboundedSender<Snapshot>>,
}

impl Entry {
    fn notify(&mut self, key: &str) {
        let snapshot = Snapshot {
            key: key.to_string(),
            value: self.value.clone(),
        };
        self.subscribers
            .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
    }
}

struct StoreInner {
    entries: Mutex<HashMap<String, Entry>>,
    // Serializes writes so merges and persistence observe one order per store.
    write_lock: AsyncMutex<()>,
    online: AtomicBool,
    db: Option<Database>,
}

#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// A volatile store; records live as long as the handle.
    pub fn new() -> Self {
        Self::build(None, HashMap::new())
    }

    /// A store that writes through to `db`, seeded with what it holds.
    pub async fn with_database(db: Database) -> Result<Self> {
        let records = db.load_records().await?;
        let mut entries = HashMap::new();
        for record in records {
            entries.insert(
                record.key,
                Entry {
                    value: Some(record.value),
                    subscribers: Vec::new(),
                },
            );
        }
        info!("Store seeded with {} persisted records", entries.len());
        Ok(Self::build(Some(db), entries))
    }

    fn build(db: Option<Database>, entries: HashMap<String, Entry>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(entries),
                write_lock: AsyncMutex::new(()),
                online: AtomicBool::new(true),
                db,
            }),
        }
    }

    /// While offline every write fails with [`BoardError::Write`].
    pub fn set_online(&self, online: bool) {
        let previous = self.inner.online.swap(online, Ordering::SeqCst);
        if previous != online {
            info!("Store is now {}", if online { "online" } else { "offline" });
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries()
            .get(key)
            .and_then(|entry| entry.value.clone())
    }

    /// Replaces the whole record at `key`.
    pub async fn set(&self, key: &str, value: Value) -> BoardResult<()> {
        if !value.is_object() {
            return Err(BoardError::InvalidInput(format!(
                "record at '{key}' must be an object"
            )));
        }
        self.write(key, |_| value).await
    }

    /// Merges `fields` into the record at `key`, creating it if absent.
    pub async fn update(&self, key: &str, fields: Map<String, Value>) -> BoardResult<()> {
        self.write(key, move |current| merge(current, fields)).await
    }

    /// Delivers the current value, then every change. Channels are unbounded:
    /// a subscriber that stops draining grows its queue until it is dropped,
    /// after which the next write prunes it.
    pub fn subscribe(&self, key: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut entries = self.entries();
        let entry = entries.entry(key.to_string()).or_default();
        let _ = tx.send(Snapshot {
            key: key.to_string(),
            value: entry.value.clone(),
        });
        entry.subscribers.push(tx);

        Subscription { rx }
    }

    async fn write<F>(&self, key: &str, apply: F) -> BoardResult<()>
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        let _write_guard = self.inner.write_lock.lock().await;

        if !self.is_online() {
            warn!("Rejected write to '{key}': store offline");
            return Err(BoardError::write(key, "store is offline"));
        }

        let next = apply(self.get(key));

        if let Some(db) = &self.inner.db {
            db.put_record(key, &next, Utc::now())
                .await
                .map_err(|err| BoardError::write(key, format!("{err:#}")))?;
        }

        let mut entries = self.entries();
        let entry = entries.entry(key.to_string()).or_default();
        entry.value = Some(next);
        entry.notify(key);
        Ok(())
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        match self.inner.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn merge(current: Option<Value>, fields: Map<String, Value>) -> Value {
    let mut record = match current {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (name, value) in fields {
        if value.is_null() {
            record.remove(&name);
        } else {
            record.insert(name, value);
        }
    }
    Value::Object(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn subscribe_yields_current_value_first() {
        let store = Store::new();
        let mut empty = store.subscribe(TIMER_KEY);
        assert_eq!(empty.next().await.unwrap().value, None);

        store
            .set(TIMER_KEY, json!({"status": "reset", "remaining": 60}))
            .await
            .unwrap();

        let mut late = store.subscribe(TIMER_KEY);
        let first = late.next().await.unwrap();
        assert_eq!(first.key, TIMER_KEY);
        assert_eq!(first.value().unwrap()["remaining"], 60);

        let change = empty.next().await.unwrap();
        assert!(change.exists());
    }

    #[tokio::test]
    async fn update_merges_and_null_removes() {
        let store = Store::new();
        store
            .set(TIMER_KEY, json!({"status": "running", "duration": 60, "remaining": 60}))
            .await
            .unwrap();
        store
            .update(TIMER_KEY, fields(json!({"remaining": 59, "duration": null})))
            .await
            .unwrap();

        assert_eq!(
            store.get(TIMER_KEY).unwrap(),
            json!({"status": "running", "remaining": 59})
        );
    }

    #[tokio::test]
    async fn set_replaces_whole_record() {
        let store = Store::new();
        store
            .set(PREDICTION_KEY, json!({"period": "1", "prediction": "Red"}))
            .await
            .unwrap();
        store
            .set(PREDICTION_KEY, json!({"period": "2"}))
            .await
            .unwrap();
        assert_eq!(store.get(PREDICTION_KEY).unwrap(), json!({"period": "2"}));
    }

    #[tokio::test]
    async fn set_rejects_non_object() {
        let store = Store::new();
        let err = store.set(TIMER_KEY, json!(5)).await.unwrap_err();
        assert!(matches!(err, BoardError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn every_change_is_delivered_in_order() {
        let store = Store::new();
        let mut sub = store.subscribe(TIMER_KEY);
        sub.next().await.unwrap();

        for remaining in (57..=59).rev() {
            store
                .update(TIMER_KEY, fields(json!({"remaining": remaining})))
                .await
                .unwrap();
        }

        let seen: Vec<i64> = (0..3)
            .map(|_| sub.try_next().unwrap().value.unwrap()["remaining"].as_i64().unwrap())
            .collect();
        assert_eq!(seen, vec![59, 58, 57]);
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn offline_writes_fail_and_leave_value_untouched() {
        let store = Store::new();
        store.set(TIMER_KEY, json!({"remaining": 10})).await.unwrap();
        store.set_online(false);

        let err = store
            .update(TIMER_KEY, fields(json!({"remaining": 9})))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Write { .. }));
        assert_eq!(store.get(TIMER_KEY).unwrap()["remaining"], 10);

        store.set_online(true);
        store
            .update(TIMER_KEY, fields(json!({"remaining": 9})))
            .await
            .unwrap();
        assert_eq!(store.get(TIMER_KEY).unwrap()["remaining"], 9);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let store = Store::new();
        let sub = store.subscribe(ANIMATION_KEY);
        drop(sub);
        store
            .set(ANIMATION_KEY, json!({"start": true}))
            .await
            .unwrap();
        assert!(store.entries().get(ANIMATION_KEY).unwrap().subscribers.is_empty());
    }

    #[tokio::test]
    async fn database_backed_store_is_seeded() {
        let db = Database::in_memory().unwrap();
        {
            let store = Store::with_database(db.clone()).await.unwrap();
            store
                .set(PREDICTION_KEY, json!({"period": "7", "prediction": "Green"}))
                .await
                .unwrap();
        }

        let reopened = Store::with_database(db).await.unwrap();
        assert_eq!(reopened.get(PREDICTION_KEY).unwrap()["prediction"], "Green");
    }
}
