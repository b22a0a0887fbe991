//! Settings shared by every player created for a recording.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::DEFAULT_POOL_CAPACITY;

/// Player settings. Missing fields take their default value when
/// deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    /// How many idle frames each of a stream's pools holds on to.
    pub pool_capacity: usize,
    /// Log the first frame of a stream as a blank placeholder (instead of the
    /// decoded image) until the worker produces a real one. Off by default, so
    /// a stream's first image shows up as it was recorded.
    pub placeholder_first_frame: bool,
    /// The seconds timeline record timestamps are logged on.
    pub timestamp_timeline: String,
    /// The sequence timeline frame counters are logged on.
    pub sequence_timeline: String,
    /// The metadata field holding a data record's frame counter.
    pub sequence_field: String,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            placeholder_first_frame: false,
            timestamp_timeline: "timestamp".to_owned(),
            sequence_timeline: "frame_number".to_owned(),
            sequence_field: "frame_number".to_owned(),
        }
    }
}

impl PlayerOptions {
    /// Parse and validate options from JSON.
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.pool_capacity == 0 {
            return Err(OptionsError::ZeroPoolCapacity);
        }
        if self.timestamp_timeline.is_empty() || self.sequence_timeline.is_empty() {
            return Err(OptionsError::EmptyTimelineName);
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Failed to parse player options: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("The frame pool capacity must be at least 1.")]
    ZeroPoolCapacity,
    #[error("Timeline names can't be empty.")]
    EmptyTimelineName,
}
