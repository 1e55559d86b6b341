use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{AggregateId, Version};

/// The durable form of one aggregate: its full state at a given version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: AggregateId,

    /// The aggregate type (e.g. "Order", "SagaInstance").
    pub record_type: String,

    /// Version this state was written at. Starts at 1.
    pub version: Version,

    pub updated_at: DateTime<Utc>,

    pub state: serde_json::Value,
}

impl StoredRecord {
    /// Serializes `state` into a record.
    pub fn from_state<T: Serialize>(
        id: AggregateId,
        record_type: impl Into<String>,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id,
            record_type: record_type.into(),
            version,
            updated_at: Utc::now(),
            state: serde_json::to_value(state)?,
        })
    }

    /// Deserializes the stored state.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state.clone())
    }
}
