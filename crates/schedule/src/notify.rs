//! Change notifications.
//!
//! Every mutation publishes one JSON envelope to the scope's topic. Executor
//! workers and UIs subscribe to reconcile their view of the schedule without
//! re-polling the whole timeline.

use serde::{Deserialize, Serialize};

use tempo_store::IntervalStore;

use crate::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Created,
    Updated,
    Deleted,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Activity,
    Timeline,
}

/// One published change envelope.
///
/// `data` carries the JSON-encoded entity (or a `{start[,stop]}` stub for
/// deletions); `extra` carries the old start on activity moves so subscribers
/// can drop the stale row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub data: String,
    pub kind: NotificationKind,
    #[serde(rename = "type")]
    pub entity: NotificationType,
    pub timeline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<i64>,
}

impl Notification {
    pub fn activity(kind: NotificationKind, timeline: &str, data: String) -> Self {
        Self {
            data,
            kind,
            entity: NotificationType::Activity,
            timeline: timeline.to_string(),
            extra: None,
        }
    }

    pub fn timeline(kind: NotificationKind, timeline: &str, data: String) -> Self {
        Self {
            data,
            kind,
            entity: NotificationType::Timeline,
            timeline: timeline.to_string(),
            extra: None,
        }
    }
}

/// Serialize and publish one envelope to the scope's topic.
///
/// Callers wrap the error into their domain `Notify` variant; by the time
/// this runs the store write has already committed, so a failure here means
/// "persisted but subscribers were not told".
pub(crate) async fn publish(
    store: &dyn IntervalStore,
    scope: &str,
    note: &Notification,
) -> Result<(), String> {
    let payload =
        serde_json::to_string(note).map_err(|e| format!("serialize notification: {e}"))?;
    store
        .publish(&keys::topic(scope), &payload)
        .await
        .map_err(|e| format!("write to topic {}: {e}", keys::topic(scope)))
}
