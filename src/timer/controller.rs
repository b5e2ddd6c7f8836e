use std::{sync::Arc, time::Duration};

use log::{info, warn};
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::{
    animation::{AnimationKind, AnimationSignaler},
    error::BoardResult,
    store::{Store, TIMER_KEY},
};

use super::{PublishedStatus, TickOutcome, TimerRecord, TimerState, TimerStatus, TimerUpdate};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub ticking: bool,
}

/// Owns the authoritative countdown and republishes it to the store.
///
/// Transitions are serialized on the state mutex and publish while holding
/// it, so the store sees them in the order they happened. At most one tick
/// task exists: `start` replaces the slot, `pause` and `reset` abort it.
#[derive(Clone)]
pub struct TimerController {
    state: Arc<Mutex<TimerState>>,
    store: Store,
    signals: AnimationSignaler,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl TimerController {
    pub fn new(
        store: Store,
        signals: AnimationSignaler,
        duration_secs: u32,
        tick_interval: Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState::new(duration_secs))),
            store,
            signals,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval,
        }
    }

    pub async fn get_state(&self) -> TimerState {
        self.state.lock().await.clone()
    }

    pub async fn get_snapshot(&self) -> TimerSnapshot {
        let state = self.get_state().await;
        let ticking = self
            .ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        TimerSnapshot { state, ticking }
    }

    /// A `running` record left behind by a controller that went away would
    /// freeze every viewer on a stale clock; publish a reset instead.
    pub async fn recover_stale_record(&self) -> BoardResult<bool> {
        let Some(value) = self.store.get(TIMER_KEY) else {
            return Ok(false);
        };
        let stale = TimerRecord::from_value(TIMER_KEY, &value)
            .map(|record| record.status == Some(PublishedStatus::Running))
            .unwrap_or(false);
        if !stale {
            return Ok(false);
        }

        warn!("Recovered timer record left running; publishing reset");
        let mut state = self.state.lock().await;
        if state.is_running() {
            return Ok(false);
        }
        let update = state.reset();
        self.publish(update).await?;
        Ok(true)
    }

    pub async fn start_timer(&self) -> BoardResult<TimerState> {
        let mut state = self.state.lock().await;
        let Some(update) = state.start() else {
            match state.status {
                TimerStatus::Paused => warn!("Timer is paused; reset it before starting again"),
                _ => info!("Timer already running; start ignored"),
            }
            return Ok(state.clone());
        };

        info!("Timer started for {}s", state.duration);
        self.spawn_ticker().await;
        self.publish(update).await?;
        Ok(state.clone())
    }

    pub async fn pause_timer(&self) -> BoardResult<TimerState> {
        let mut state = self.state.lock().await;
        let Some(update) = state.pause() else {
            return Ok(state.clone());
        };

        self.cancel_ticker().await;
        info!("Timer paused at {}s", state.remaining);
        self.publish(update).await?;
        Ok(state.clone())
    }

    pub async fn reset_timer(&self) -> BoardResult<TimerState> {
        let mut state = self.state.lock().await;
        let update = state.reset();

        self.cancel_ticker().await;
        info!("Timer reset to {}s", state.remaining);
        self.publish(update).await?;
        Ok(state.clone())
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !controller.tick().await {
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    /// One decrement-and-publish step. Returns false once the countdown is
    /// no longer running.
    async fn tick(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.tick() {
            None => false,
            Some(TickOutcome::Continue(update)) => {
                if let Err(err) = self.publish(update).await {
                    log_error!("Failed to publish tick: {err}");
                }
                true
            }
            Some(TickOutcome::Finished(update)) => {
                log_info!("Timer finished");
                if let Err(err) = self.publish(update).await {
                    log_error!("Failed to publish finished timer: {err}");
                }
                if let Err(err) = self.signals.signal(AnimationKind::Finish).await {
                    log_error!("Failed to publish finish signal: {err}");
                }
                false
            }
        }
    }

    async fn publish(&self, update: TimerUpdate) -> BoardResult<()> {
        self.store.update(TIMER_KEY, update.into_fields()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        animation::AnimationSignal,
        error::BoardError,
        store::{Subscription, ANIMATION_KEY},
    };
    use serde_json::{json, Value};

    const TICK: Duration = Duration::from_secs(1);

    fn controller(duration: u32) -> (TimerController, Store) {
        let store = Store::new();
        let signals = AnimationSignaler::new(store.clone());
        (TimerController::new(store.clone(), signals, duration, TICK), store)
    }

    async fn advance_ticks(n: u32) {
        for _ in 0..n {
            time::sleep(TICK).await;
        }
        // let the ticker finish publishing the last step
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(sub: &mut Subscription) -> Vec<Value> {
        let mut values = Vec::new();
        while let Some(snapshot) = sub.try_next() {
            if let Some(value) = snapshot.value {
                values.push(value);
            }
        }
        values
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_publish_absolute_remaining() {
        let (timer, store) = controller(60);
        timer.start_timer().await.unwrap();
        assert_eq!(store.get(TIMER_KEY).unwrap()["remaining"], json!(60));
        assert_eq!(store.get(TIMER_KEY).unwrap()["status"], json!("running"));

        advance_ticks(3).await;
        let record = store.get(TIMER_KEY).unwrap();
        assert_eq!(record["remaining"], json!(57));
        assert_eq!(record["duration"], json!(60));
        assert_eq!(timer.get_state().await.remaining, 57);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_finishes_exactly_once() {
        let (timer, store) = controller(60);
        let mut timer_sub = store.subscribe(TIMER_KEY);
        let mut anim_sub = store.subscribe(ANIMATION_KEY);
        drain(&mut timer_sub);
        drain(&mut anim_sub);

        timer.start_timer().await.unwrap();
        advance_ticks(65).await;

        let records = drain(&mut timer_sub);
        let finished = records
            .iter()
            .filter(|record| record["status"] == json!("finished"))
            .count();
        assert_eq!(finished, 1);
        // one start write plus 59 ticks before the finishing write
        assert_eq!(records.len(), 61);
        assert_eq!(records.last().unwrap()["remaining"], json!(0));

        let signals = drain(&mut anim_sub);
        assert_eq!(signals.len(), 1);
        let signal = AnimationSignal::from_value(&signals[0]).unwrap();
        assert_eq!(signal.kind(), Some(AnimationKind::Finish));

        let state = timer.get_state().await;
        assert_eq!(state.status, TimerStatus::Finished);
        assert_eq!(state.remaining, 60);
        assert!(!timer.get_snapshot().await.ticking);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_does_not_reset_or_double_tick() {
        let (timer, store) = controller(60);
        timer.start_timer().await.unwrap();
        advance_ticks(5).await;

        let state = timer.start_timer().await.unwrap();
        assert_eq!(state.remaining, 55);

        advance_ticks(5).await;
        assert_eq!(store.get(TIMER_KEY).unwrap()["remaining"], json!(50));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_published_remaining() {
        let (timer, store) = controller(60);
        timer.start_timer().await.unwrap();
        advance_ticks(10).await;

        timer.pause_timer().await.unwrap();
        let paused = store.get(TIMER_KEY).unwrap();
        assert_eq!(paused["status"], json!("paused"));
        assert_eq!(paused["remaining"], json!(50));

        advance_ticks(10).await;
        assert_eq!(store.get(TIMER_KEY).unwrap()["remaining"], json!(50));
        assert_eq!(timer.get_state().await.remaining, 50);

        // paused timers need a reset before they can run again
        let state = timer.start_timer().await.unwrap();
        assert_eq!(state.status, TimerStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_ticking_from_any_state() {
        let (timer, store) = controller(30);

        timer.reset_timer().await.unwrap();
        assert_eq!(store.get(TIMER_KEY).unwrap()["status"], json!("reset"));

        timer.start_timer().await.unwrap();
        advance_ticks(4).await;
        timer.reset_timer().await.unwrap();

        let record = store.get(TIMER_KEY).unwrap();
        assert_eq!(record["status"], json!("reset"));
        assert_eq!(record["remaining"], json!(30));

        advance_ticks(4).await;
        assert_eq!(store.get(TIMER_KEY).unwrap()["remaining"], json!(30));
        assert_eq!(timer.get_state().await.status, TimerStatus::Idle);

        timer.start_timer().await.unwrap();
        timer.pause_timer().await.unwrap();
        timer.reset_timer().await.unwrap();
        assert_eq!(timer.get_state().await.remaining, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publish_is_reported_without_retry() {
        let (timer, store) = controller(60);
        store.set_online(false);

        let err = timer.start_timer().await.unwrap_err();
        assert!(matches!(err, BoardError::Write { .. }));
        assert!(store.get(TIMER_KEY).is_none());

        // local truth keeps running; the next tick brings the store back in line
        store.set_online(true);
        advance_ticks(1).await;
        assert_eq!(store.get(TIMER_KEY).unwrap()["remaining"], json!(59));
    }

    #[tokio::test]
    async fn stale_running_record_is_reset_on_recovery() {
        let store = Store::new();
        store
            .set(TIMER_KEY, json!({"status": "running", "duration": 60, "remaining": 17}))
            .await
            .unwrap();
        let timer = TimerController::new(store.clone(), AnimationSignaler::new(store.clone()), 60, TICK);

        assert!(timer.recover_stale_record().await.unwrap());
        let record = store.get(TIMER_KEY).unwrap();
        assert_eq!(record["status"], json!("reset"));
        assert_eq!(record["remaining"], json!(60));

        assert!(!timer.recover_stale_record().await.unwrap());
    }
}
