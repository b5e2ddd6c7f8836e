mod render;

pub use render::{format_clock, PredictionView, TimerView, PLACEHOLDER_CLOCK, PLACEHOLDER_TEXT};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    animation::{AnimationKind, AnimationTracker},
    store::{Snapshot, Store, Subscription, ANIMATION_KEY, PREDICTION_KEY, TIMER_KEY},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// What a display needs to redraw after a store change.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "view", rename_all = "camelCase")]
pub enum ViewerEvent {
    Prediction(PredictionView),
    Timer(TimerView),
    Animation(AnimationKind),
}

/// Turns snapshots into views. Malformed snapshots fall back to
/// placeholders and never stop the viewer.
#[derive(Debug, Default)]
pub struct ViewerState {
    animations: AnimationTracker,
}

impl ViewerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, snapshot: &Snapshot) -> Option<ViewerEvent> {
        match snapshot.key.as_str() {
            PREDICTION_KEY => Some(ViewerEvent::Prediction(
                PredictionView::from_snapshot(snapshot).unwrap_or_else(|err| {
                    log_warn!("{err}");
                    PredictionView::placeholder()
                }),
            )),
            TIMER_KEY => Some(ViewerEvent::Timer(TimerView::from_snapshot(snapshot).unwrap_or_else(
                |err| {
                    log_warn!("{err}");
                    TimerView::placeholder()
                },
            ))),
            ANIMATION_KEY => match self.animations.observe(snapshot) {
                Ok(kind) => kind.map(ViewerEvent::Animation),
                Err(err) => {
                    log_warn!("{err}");
                    None
                }
            },
            other => {
                log_warn!("Viewer ignoring snapshot for unknown key '{other}'");
                None
            }
        }
    }
}

/// A running viewer loop; dropping it does not stop the loop, `stop` does.
pub struct ViewerHandle {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ViewerHandle {
    pub async fn stop(self) -> Result<()> {
        self.cancel_token.cancel();
        self.handle.await.context("viewer loop task failed to join")
    }
}

/// Subscribes to the three board records and forwards a [`ViewerEvent`]
/// for every change until stopped or until `events` is closed.
///
/// `events` is unbounded; the receiver must keep draining it for as long as
/// the loop runs.
pub fn spawn_viewer(store: &Store, events: mpsc::UnboundedSender<ViewerEvent>) -> ViewerHandle {
    let cancel_token = CancellationToken::new();
    let predictions = store.subscribe(PREDICTION_KEY);
    let timer = store.subscribe(TIMER_KEY);
    let animations = store.subscribe(ANIMATION_KEY);

    let handle = tokio::spawn(viewer_loop(
        predictions,
        timer,
        animations,
        events,
        cancel_token.clone(),
    ));

    ViewerHandle {
        cancel_token,
        handle,
    }
}

async fn viewer_loop(
    mut predictions: Subscription,
    mut timer: Subscription,
    mut animations: Subscription,
    events: mpsc::UnboundedSender<ViewerEvent>,
    cancel_token: CancellationToken,
) {
    let mut state = ViewerState::new();

    loop {
        let snapshot = tokio::select! {
            Some(snapshot) = predictions.next() => snapshot,
            Some(snapshot) = timer.next() => snapshot,
            Some(snapshot) = animations.next() => snapshot,
            _ = cancel_token.cancelled() => {
                log_info!("viewer loop shutting down");
                break;
            }
            else => break,
        };

        if let Some(event) = state.handle(&snapshot) {
            if events.send(event).is_err() {
                log_info!("viewer receiver dropped; stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        animation::AnimationSignaler,
        timer::TimerController,
    };
    use serde_json::json;
    use std::time::Duration;

    async fn next_timer_view(rx: &mut mpsc::UnboundedReceiver<ViewerEvent>) -> TimerView {
        loop {
            match rx.recv().await.expect("viewer closed") {
                ViewerEvent::Timer(view) => return view,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn new_viewer_renders_current_records() {
        let store = Store::new();
        store
            .set(PREDICTION_KEY, json!({"period": "88", "prediction": "Red"}))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let viewer = spawn_viewer(&store, tx);

        let mut saw_prediction = false;
        let mut saw_timer = false;
        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                ViewerEvent::Prediction(view) => {
                    assert_eq!(view.period, "88");
                    saw_prediction = true;
                }
                ViewerEvent::Timer(view) => {
                    assert_eq!(view, TimerView::placeholder());
                    saw_timer = true;
                }
                ViewerEvent::Animation(_) => panic!("no animation was signalled"),
            }
        }
        assert!(saw_prediction && saw_timer);

        viewer.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_converges_on_published_remaining() {
        let store = Store::new();
        let timer = TimerController::new(
            store.clone(),
            AnimationSignaler::new(store.clone()),
            60,
            Duration::from_secs(1),
        );
        timer.start_timer().await.unwrap();
        for _ in 0..15 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tokio::task::yield_now().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let viewer = spawn_viewer(&store, tx);

        let truth = timer.get_state().await.remaining;
        let view = next_timer_view(&mut rx).await;
        let shown: u32 = {
            let (mins, secs) = view.clock.split_once(':').unwrap();
            mins.parse::<u32>().unwrap() * 60 + secs.parse::<u32>().unwrap()
        };
        assert!(shown.abs_diff(truth) <= 1);
        let percent = view.progress_percent.unwrap();
        assert!((percent - f64::from(shown) / 60.0 * 100.0).abs() < 1e-9);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let view = next_timer_view(&mut rx).await;
        assert_eq!(view.status, Some(crate::timer::PublishedStatus::Running));

        viewer.stop().await.unwrap();
        timer.reset_timer().await.unwrap();
    }

    #[test]
    fn malformed_timer_snapshot_falls_back() {
        let mut state = ViewerState::new();
        let event = state.handle(&Snapshot {
            key: TIMER_KEY.into(),
            value: Some(json!({"remaining": [1, 2]})),
        });
        assert_eq!(event, Some(ViewerEvent::Timer(TimerView::placeholder())));
    }

    #[tokio::test]
    async fn animation_events_only_for_new_signals() {
        let store = Store::new();
        let signaler = AnimationSignaler::new(store.clone());
        signaler.signal(AnimationKind::Start).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let viewer = spawn_viewer(&store, tx);
        signaler.signal(AnimationKind::Finish).await.unwrap();

        let mut animations = Vec::new();
        for _ in 0..3 {
            if let ViewerEvent::Animation(kind) = rx.recv().await.unwrap() {
                animations.push(kind);
            }
        }
        assert_eq!(animations, vec![AnimationKind::Finish]);

        viewer.stop().await.unwrap();
    }
}
