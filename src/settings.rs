use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::{
    error::{BoardError, BoardResult},
    timer::state::DEFAULT_DURATION_SECS,
};

const DEBUG_TICK_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSettings {
    pub duration_secs: u32,
    pub tick_interval_ms: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DURATION_SECS,
            tick_interval_ms: 1000,
        }
    }
}

impl TimerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> BoardResult<()> {
        if self.duration_secs == 0 {
            return Err(BoardError::Config("timer.durationSecs must be positive".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(BoardError::Config("timer.tickIntervalMs must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminAccount {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BoardSettings {
    timer: TimerSettings,
    admins: Vec<AdminAccount>,
    session_ttl_minutes: i64,
    /// Accounts supplied through the environment; never written back.
    #[serde(skip)]
    env_admins: Vec<AdminAccount>,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            timer: TimerSettings::default(),
            admins: Vec::new(),
            session_ttl_minutes: 12 * 60,
            env_admins: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<BoardSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        Self::load(path, |name| std::env::var(name).ok())
    }

    fn load<F>(path: PathBuf, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // An unreadable file is an error: falling back to defaults would let
        // the next save wipe the configured admin accounts.
        let mut data: BoardSettings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).map_err(|err| {
                BoardError::Config(format!("invalid settings in {}: {err}", path.display()))
            })?
        } else {
            BoardSettings::default()
        };

        apply_env_overrides(&mut data, env);
        data.timer.validate()?;
        if data.session_ttl_minutes <= 0 {
            return Err(BoardError::Config("sessionTtlMinutes must be positive".into()).into());
        }
        if data.admins.is_empty() && data.env_admins.is_empty() {
            warn!("No admin accounts configured; controller sign-in will always fail");
        }

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn timer(&self) -> TimerSettings {
        self.read().timer.clone()
    }

    pub fn admins(&self) -> Vec<AdminAccount> {
        let data = self.read();
        data.admins
            .iter()
            .chain(data.env_admins.iter())
            .cloned()
            .collect()
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.read().session_ttl_minutes)
    }

    /// Takes effect for the next controller built from these settings.
    pub fn update_timer(&self, settings: TimerSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        guard.timer = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &BoardSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, BoardSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BoardSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn apply_env_overrides<F>(data: &mut BoardSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let (Some(email), Some(password)) = (
        env("PREDICTBOARD_ADMIN_EMAIL"),
        env("PREDICTBOARD_ADMIN_PASSWORD"),
    ) {
        if !data.admins.iter().any(|admin| admin.email == email) {
            info!("Added admin account {email} from environment");
            data.env_admins.push(AdminAccount { email, password });
        }
    }

    let debug_mode = env("PREDICTBOARD_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if debug_mode {
        data.timer.tick_interval_ms = DEBUG_TICK_INTERVAL_MS;
    }
}
