//! Executor worker descriptors.
//!
//! `Timeline::deploy` writes one of these for an external process manager to
//! act on; the engine itself never spawns the executor. The descriptor names
//! the topic the worker subscribes to and the timeline it polls.

use serde::{Deserialize, Serialize};

use tempo_core::time::now_epoch_ns;

use crate::error::TimelineError;
use crate::keys;
use crate::timeline::Timeline;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWorker {
    /// Process-manager identifier, `{scope}__SCHEDULE__{timeline}`.
    pub name: String,
    pub scope: String,
    pub timeline: String,
    pub shard: u32,
    /// Topics the worker subscribes to for change notifications.
    pub topics: Vec<String>,
    pub updated_at: i64,
}

impl ScheduleWorker {
    /// Descriptor field name under the scope's worker hash.
    pub fn field_name(scope: &str, timeline: &str) -> String {
        format!("{scope}__SCHEDULE__{timeline}")
    }

    pub fn for_timeline(timeline: &Timeline) -> Self {
        Self {
            name: Self::field_name(&timeline.scope, &timeline.name),
            scope: timeline.scope.clone(),
            timeline: timeline.name.clone(),
            shard: timeline.shard,
            topics: vec![keys::topic(&timeline.scope)],
            updated_at: now_epoch_ns(),
        }
    }

    pub fn to_json(&self) -> Result<String, TimelineError> {
        serde_json::to_string(self).map_err(|e| TimelineError::Serialize(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, TimelineError> {
        serde_json::from_str(json).map_err(|e| TimelineError::Serialize(e.to_string()))
    }
}
