#[cfg(feature = "desktop")]
pub mod commands;

use std::sync::Arc;

use crate::{
    animation::{AnimationKind, AnimationSignal, AnimationSignaler},
    auth::{AdminSession, AuthService},
    error::BoardResult,
    prediction::{PredictionForm, PredictionPublisher, PredictionRecord},
    settings::{AdminAccount, TimerSettings},
    store::Store,
    timer::{TimerController, TimerSnapshot, TimerState},
};

/// The controller's operations, each gated on the caller holding the
/// controller session.
#[derive(Clone)]
pub struct Console {
    auth: Arc<AuthService>,
    timer: TimerController,
    predictions: PredictionPublisher,
    animations: AnimationSignaler,
}

impl Console {
    pub fn new(
        store: Store,
        accounts: Vec<AdminAccount>,
        session_ttl: chrono::Duration,
        timer: &TimerSettings,
    ) -> Self {
        let animations = AnimationSignaler::new(store.clone());
        Self {
            auth: Arc::new(AuthService::new(accounts, session_ttl)),
            timer: TimerController::new(
                store.clone(),
                animations.clone(),
                timer.duration_secs,
                timer.tick_interval(),
            ),
            predictions: PredictionPublisher::new(store),
            animations,
        }
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub fn sign_in(&self, email: &str, password: &str) -> BoardResult<AdminSession> {
        self.auth.sign_in(email, password)
    }

    pub fn sign_out(&self, token: &str) -> bool {
        self.auth.sign_out(token)
    }

    pub fn session(&self, token: &str) -> BoardResult<AdminSession> {
        self.auth.authorize(token)
    }

    pub async fn submit_prediction(
        &self,
        token: &str,
        form: PredictionForm,
    ) -> BoardResult<PredictionRecord> {
        self.auth.authorize(token)?;
        self.predictions.submit(form).await
    }

    pub fn current_prediction(&self) -> BoardResult<Option<PredictionRecord>> {
        self.predictions.current()
    }

    pub async fn start_timer(&self, token: &str) -> BoardResult<TimerState> {
        self.auth.authorize(token)?;
        self.timer.start_timer().await
    }

    pub async fn pause_timer(&self, token: &str) -> BoardResult<TimerState> {
        self.auth.authorize(token)?;
        self.timer.pause_timer().await
    }

    pub async fn reset_timer(&self, token: &str) -> BoardResult<TimerState> {
        self.auth.authorize(token)?;
        self.timer.reset_timer().await
    }

    pub async fn timer_snapshot(&self) -> TimerSnapshot {
        self.timer.get_snapshot().await
    }

    pub async fn trigger_animation(
        &self,
        token: &str,
        kind: AnimationKind,
    ) -> BoardResult<AnimationSignal> {
        self.auth.authorize(token)?;
        self.animations.signal(kind).await
    }
}
