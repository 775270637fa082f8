//! Store key layout.
//!
//! One sorted set per `(scope, name)` timeline holds the activities (score =
//! start). Timeline metadata and worker descriptors live in one hash per
//! scope. Notifications go to one topic per scope.

/// Sorted-set key for a timeline's activities.
pub fn timeline(scope: &str, name: &str) -> String {
    format!("{scope}__tempo_timelines__{name}")
}

/// Hash key for a scope's timeline metadata (field = timeline name).
pub fn timeline_meta(scope: &str) -> String {
    format!("{scope}__tempo_timeline_meta")
}

/// Hash key for a scope's executor worker descriptors.
pub fn workers(scope: &str) -> String {
    format!("{scope}__tempo_workers")
}

/// Pub/sub topic carrying a scope's change notifications.
pub fn topic(scope: &str) -> String {
    format!("{scope}__tempo_events")
}
