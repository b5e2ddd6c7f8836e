use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    error::{BoardError, BoardResult},
    store::{Snapshot, Store, ANIMATION_KEY},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnimationKind {
    Start,
    Finish,
}

/// The `animations` record. `sequence` is monotonic per store so viewers can
/// tell a new signal from one they already played.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnimationSignal {
    #[serde(default)]
    pub start: bool,
    #[serde(default)]
    pub finish: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl AnimationSignal {
    pub fn new(kind: AnimationKind, sequence: u64) -> Self {
        Self {
            start: kind == AnimationKind::Start,
            finish: kind == AnimationKind::Finish,
            timestamp: Utc::now(),
            sequence: Some(sequence),
        }
    }

    pub fn kind(&self) -> Option<AnimationKind> {
        match (self.start, self.finish) {
            (true, false) => Some(AnimationKind::Start),
            (false, true) => Some(AnimationKind::Finish),
            _ => None,
        }
    }

    pub fn from_value(value: &Value) -> BoardResult<Self> {
        serde_json::from_value(value.clone()).map_err(|err| BoardError::malformed(ANIMATION_KEY, err))
    }
}

#[derive(Clone)]
pub struct AnimationSignaler {
    store: Store,
    // Held across the store write so sequences land in the order they are taken.
    next_sequence: Arc<Mutex<u64>>,
}

impl AnimationSignaler {
    /// Continues numbering after whatever signal the store already holds.
    pub fn new(store: Store) -> Self {
        let last = store
            .get(ANIMATION_KEY)
            .and_then(|value| AnimationSignal::from_value(&value).ok())
            .and_then(|signal| signal.sequence)
            .unwrap_or(0);

        Self {
            store,
            next_sequence: Arc::new(Mutex::new(last + 1)),
        }
    }

    pub async fn signal(&self, kind: AnimationKind) -> BoardResult<AnimationSignal> {
        let mut next_sequence = self.next_sequence.lock().await;
        let sequence = *next_sequence;
        let signal = AnimationSignal::new(kind, sequence);
        self.store
            .set(ANIMATION_KEY, serde_json::to_value(&signal)?)
            .await?;
        *next_sequence += 1;
        info!("Published {kind:?} animation signal #{sequence}");
        Ok(signal)
    }
}

/// Decides which animation notifications a viewer should play.
///
/// The first snapshot a viewer receives is whatever was last written, so it
/// only becomes the baseline. After that every signal with a newer sequence
/// plays once. Signals without a sequence play on every change.
#[derive(Debug, Default)]
pub struct AnimationTracker {
    joined: bool,
    last_seen: Option<u64>,
}

impl AnimationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, snapshot: &Snapshot) -> BoardResult<Option<AnimationKind>> {
        let first = !self.joined;
        self.joined = true;

        let Some(value) = snapshot.value() else {
            return Ok(None);
        };
        let signal = AnimationSignal::from_value(value)?;

        let fresh = match (signal.sequence, self.last_seen) {
            (Some(seq), Some(seen)) => seq > seen,
            (Some(_), None) | (None, _) => true,
        };
        if let Some(seq) = signal.sequence {
            self.last_seen = Some(self.last_seen.map_or(seq, |seen| seen.max(seq)));
        }

        if first || !fresh {
            return Ok(None);
        }
        Ok(signal.kind())
    }
}
