use tauri::State;

use crate::{
    animation::{AnimationKind, AnimationSignal},
    auth::AdminSession,
    prediction::{PredictionForm, PredictionRecord},
    settings::TimerSettings,
    store::{Snapshot, PREDICTION_KEY, TIMER_KEY},
    viewer::{PredictionView, TimerView},
    AppState,
};

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    prediction: PredictionView,
    timer: TimerView,
}

#[tauri::command]
pub fn sign_in(
    state: State<'_, AppState>,
    email: String,
    password: String,
) -> Result<AdminSession, String> {
    state
        .console
        .sign_in(&email, &password)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn sign_out(state: State<'_, AppState>, token: String) -> Result<bool, String> {
    Ok(state.console.sign_out(&token))
}

#[tauri::command]
pub fn get_session(state: State<'_, AppState>, token: String) -> Result<AdminSession, String> {
    state.console.session(&token).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn submit_prediction(
    state: State<'_, AppState>,
    token: String,
    form: PredictionForm,
) -> Result<PredictionRecord, String> {
    state
        .console
        .submit_prediction(&token, form)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn trigger_animation(
    state: State<'_, AppState>,
    token: String,
    kind: AnimationKind,
) -> Result<AnimationSignal, String> {
    state
        .console
        .trigger_animation(&token, kind)
        .await
        .map_err(|e| e.to_string())
}

/// Current rendered board, for a window that has just opened.
#[tauri::command]
pub fn get_board(state: State<'_, AppState>) -> Result<BoardView, String> {
    let snapshot = |key: &str| Snapshot {
        key: key.to_string(),
        value: state.store.get(key),
    };

    Ok(BoardView {
        prediction: PredictionView::from_snapshot(&snapshot(PREDICTION_KEY))
            .unwrap_or_else(|_| PredictionView::placeholder()),
        timer: TimerView::from_snapshot(&snapshot(TIMER_KEY))
            .unwrap_or_else(|_| TimerView::placeholder()),
    })
}

#[tauri::command]
pub fn get_timer_settings(state: State<'_, AppState>) -> Result<TimerSettings, String> {
    Ok(state.settings.timer())
}

/// Persists new timer settings; they apply the next time the board starts.
#[tauri::command]
pub fn update_timer_settings(
    state: State<'_, AppState>,
    token: String,
    settings: TimerSettings,
) -> Result<(), String> {
    state.console.session(&token).map_err(|e| e.to_string())?;
    state
        .settings
        .update_timer(settings)
        .map_err(|e| e.to_string())
}
