use log::warn;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::{BoardError, BoardResult},
    store::{Snapshot, PREDICTION_KEY},
    timer::PublishedStatus,
};

pub const PLACEHOLDER_CLOCK: &str = "00:00";
pub const PLACEHOLDER_TEXT: &str = "--";

/// Formats whole seconds as `MM:SS`; anything that is not a finite,
/// non-negative number renders as `00:00`.
pub fn format_clock(seconds: Option<f64>) -> String {
    match seconds {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            let total = secs.floor() as u64;
            format!("{:02}:{:02}", total / 60, total % 60)
        }
        _ => PLACEHOLDER_CLOCK.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub clock: String,
    /// `remaining / duration * 100`; `None` leaves the progress bar alone.
    pub progress_percent: Option<f64>,
    pub status: Option<PublishedStatus>,
    pub next_prediction: Option<String>,
    /// Controller panel line, e.g. `running (00:42)`.
    pub status_line: String,
}

impl TimerView {
    pub fn placeholder() -> Self {
        Self {
            clock: PLACEHOLDER_CLOCK.to_string(),
            progress_percent: None,
            status: None,
            next_prediction: None,
            status_line: PLACEHOLDER_TEXT.to_string(),
        }
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> BoardResult<Self> {
        let Some(value) = snapshot.value() else {
            return Ok(Self::placeholder());
        };
        let record = value
            .as_object()
            .ok_or_else(|| BoardError::malformed(&snapshot.key, "record is not an object"))?;

        let remaining = number_field(&snapshot.key, record.get("remaining"), "remaining")?;
        let duration = number_field(&snapshot.key, record.get("duration"), "duration")?;
        // Informational only; a bad value must not blank the countdown.
        let next = number_field(
            &snapshot.key,
            record.get("nextPredictionTime"),
            "nextPredictionTime",
        )
        .unwrap_or_else(|err| {
            warn!("{err}");
            None
        });
        let status = match record.get("status") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                serde_json::from_value::<PublishedStatus>(raw.clone())
                    .map_err(|err| BoardError::malformed(&snapshot.key, err))?,
            ),
        };

        let progress_percent = match (remaining, duration) {
            (Some(remaining), Some(duration)) if duration > 0.0 => {
                Some((remaining / duration * 100.0).clamp(0.0, 100.0))
            }
            _ => None,
        };

        let status_line = match (status, remaining) {
            (Some(status), Some(secs)) if secs > 0.0 => {
                format!("{} ({})", status.as_str(), format_clock(Some(secs)))
            }
            (Some(status), _) => status.as_str().to_string(),
            (None, _) => PLACEHOLDER_TEXT.to_string(),
        };

        Ok(Self {
            clock: format_clock(remaining),
            progress_percent,
            status,
            next_prediction: next.map(|secs| format_clock(Some(secs))),
            status_line,
        })
    }
}

fn number_field(key: &str, raw: Option<&Value>, name: &str) -> BoardResult<Option<f64>> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| BoardError::malformed(key, format!("{name} is not a number"))),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionView {
    pub period: String,
    pub prediction: Option<String>,
    /// Style class for the prediction label, e.g. `prediction red`.
    pub css_class: Option<String>,
}

impl PredictionView {
    pub fn placeholder() -> Self {
        Self {
            period: PLACEHOLDER_TEXT.to_string(),
            prediction: None,
            css_class: None,
        }
    }

    pub fn from_snapshot(snapshot: &Snapshot) -> BoardResult<Self> {
        let Some(value) = snapshot.value() else {
            return Ok(Self::placeholder());
        };
        let record = value
            .as_object()
            .ok_or_else(|| BoardError::malformed(PREDICTION_KEY, "record is not an object"))?;

        let period = match record.get("period") {
            Some(Value::String(text)) if !text.is_empty() => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            _ => PLACEHOLDER_TEXT.to_string(),
        };
        let prediction = record
            .get("prediction")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        let css_class = prediction
            .as_ref()
            .map(|label| format!("prediction {}", label.to_lowercase()));

        Ok(Self {
            period,
            prediction,
            css_class,
        })
    }
}
