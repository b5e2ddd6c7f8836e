pub mod admin;
pub mod animation;
pub mod auth;
pub mod db;
pub mod error;
pub mod prediction;
pub mod settings;
pub mod store;
pub mod timer;
mod utils;
pub mod viewer;

pub use error::{BoardError, BoardResult};

#[cfg(feature = "desktop")]
pub(crate) use desktop::AppState;
#[cfg(feature = "desktop")]
pub use desktop::run;

#[cfg(feature = "desktop")]
mod desktop {
    use log::{info, warn};
    use tauri::{Emitter, Manager, RunEvent};
    use tokio::sync::{mpsc, Mutex};

    use crate::{
        admin::{
            commands::{
                get_board, get_session, get_timer_settings, sign_in, sign_out,
                submit_prediction, trigger_animation, update_timer_settings,
            },
            Console,
        },
        db::Database,
        settings::SettingsStore,
        store::Store,
        timer::commands::{get_timer_state, pause_timer, reset_timer, start_timer},
        viewer::{spawn_viewer, ViewerEvent, ViewerHandle},
    };

    pub(crate) struct AppState {
        pub(crate) console: Console,
        pub(crate) store: Store,
        pub(crate) settings: SettingsStore,
        viewer: Mutex<Option<ViewerHandle>>,
    }

    fn event_name(event: &ViewerEvent) -> &'static str {
        match event {
            ViewerEvent::Prediction(_) => "prediction-updated",
            ViewerEvent::Timer(_) => "timer-updated",
            ViewerEvent::Animation(_) => "animation-triggered",
        }
    }

    #[cfg_attr(mobile, tauri::mobile_entry_point)]
    pub fn run() {
        // Initialize logging (reads RUST_LOG env var)
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();

        log::info!("Prediction board starting up...");

        let app = tauri::Builder::default()
            .setup(|app| {
                let result = (|| -> anyhow::Result<()> {
                    let app_data_dir = app
                        .path()
                        .app_data_dir()
                        .map_err(|err| anyhow::anyhow!(err))?;
                    std::fs::create_dir_all(&app_data_dir)?;

                    let settings_store = SettingsStore::new(app_data_dir.join("settings.json"))?;
                    let timer_settings = settings_store.timer();
                    let admins = settings_store.admins();
                    let session_ttl = settings_store.session_ttl();
                    let database = Database::new(app_data_dir.join("predictboard.sqlite3"))?;
                    let app_handle = app.handle().clone();

                    let (store, console, viewer) = tauri::async_runtime::block_on(async move {
                        let store = Store::with_database(database).await?;
                        let console = Console::new(
                            store.clone(),
                            admins,
                            session_ttl,
                            &timer_settings,
                        );

                        // A countdown that was running when the app last died cannot resume.
                        if let Err(err) = console.timer().recover_stale_record().await {
                            warn!("Failed to reset stale timer record: {err}");
                        }

                        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
                        let viewer = spawn_viewer(&store, events_tx);
                        tokio::spawn(async move {
                            while let Some(event) = events_rx.recv().await {
                                let name = event_name(&event);
                                if let Err(err) = app_handle.emit(name, &event) {
                                    warn!("Failed to emit {name}: {err}");
                                }
                            }
                        });

                        Ok::<_, anyhow::Error>((store, console, viewer))
                    })?;

                    app.manage(AppState {
                        console,
                        store,
                        settings: settings_store,
                        viewer: Mutex::new(Some(viewer)),
                    });

                    Ok(())
                })();

                result.map_err(|err| err.into())
            })
            .invoke_handler(tauri::generate_handler![
                sign_in,
                sign_out,
                get_session,
                submit_prediction,
                trigger_animation,
                get_board,
                get_timer_settings,
                update_timer_settings,
                get_timer_state,
                start_timer,
                pause_timer,
                reset_timer,
            ])
            .build(tauri::generate_context!())
            .expect("error while building tauri application");

        app.run(|app_handle, event| {
            if let RunEvent::Exit = event {
                let Some(state) = app_handle.try_state::<AppState>() else {
                    return;
                };
                tauri::async_runtime::block_on(async {
                    if let Some(viewer) = state.viewer.lock().await.take() {
                        if let Err(err) = viewer.stop().await {
                            warn!("Viewer did not stop cleanly: {err:#}");
                        }
                    }
                });
                info!("Prediction board shut down");
            }
        });
    }
}
