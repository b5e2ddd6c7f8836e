#[cfg(feature = "desktop")]
pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{TimerController, TimerSnapshot};
pub use state::{PublishedStatus, TickOutcome, TimerRecord, TimerState, TimerStatus, TimerUpdate};
