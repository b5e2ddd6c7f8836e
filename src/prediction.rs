use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{BoardError, BoardResult},
    store::{Store, PREDICTION_KEY},
};

/// The form the controller fills in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionForm {
    pub period: String,
    pub prediction: String,
    pub start_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub period: String,
    pub prediction: String,
    pub start_time: String,
    pub timestamp: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn from_value(value: &Value) -> BoardResult<Self> {
        serde_json::from_value(value.clone()).map_err(|err| BoardError::malformed(PREDICTION_KEY, err))
    }
}

fn required(name: &str, value: &str) -> BoardResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BoardError::InvalidInput(format!("{name} is required")));
    }
    Ok(trimmed.to_string())
}

#[derive(Clone)]
pub struct PredictionPublisher {
    store: Store,
}

impl PredictionPublisher {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Overwrites the current prediction. Concurrent submissions resolve as
    /// last write wins.
    pub async fn submit(&self, form: PredictionForm) -> BoardResult<PredictionRecord> {
        let record = PredictionRecord {
            period: required("period", &form.period)?,
            prediction: required("prediction", &form.prediction)?,
            start_time: required("startTime", &form.start_time)?,
            timestamp: Utc::now(),
        };

        self.store
            .set(PREDICTION_KEY, serde_json::to_value(&record)?)
            .await?;
        info!(
            "Saved prediction {} for period {}",
            record.prediction, record.period
        );
        Ok(record)
    }

    pub fn current(&self) -> BoardResult<Option<PredictionRecord>> {
        self.store
            .get(PREDICTION_KEY)
            .map(|value| PredictionRecord::from_value(&value))
            .transpose()
    }
}
