use tauri::State;

use crate::{
    timer::{TimerSnapshot, TimerState},
    AppState,
};

#[tauri::command]
pub async fn get_timer_state(state: State<'_, AppState>) -> Result<TimerSnapshot, String> {
    Ok(state.console.timer_snapshot().await)
}

#[tauri::command]
pub async fn start_timer(state: State<'_, AppState>, token: String) -> Result<TimerState, String> {
    state
        .console
        .start_timer(&token)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn pause_timer(state: State<'_, AppState>, token: String) -> Result<TimerState, String> {
    state
        .console
        .pause_timer(&token)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn reset_timer(state: State<'_, AppState>, token: String) -> Result<TimerState, String> {
    state
        .console
        .reset_timer(&token)
        .await
        .map_err(|e| e.to_string())
}
