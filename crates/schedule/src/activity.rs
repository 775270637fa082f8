//! Activities — the schedulable units of work on a timeline.
//!
//! An activity is one `[start, stop)` window (stop exclusive, so back-to-back
//! activities are legal) filed under a `(scope, name)` timeline. It persists
//! as one member of the timeline's sorted set, scored by `start`, carrying
//! its full audit trail of events. Recurring templates expand into one row
//! per occurrence, written as a single atomic batch.

use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use tempo_core::time::{now_epoch_ns, now_epoch_s};
use tempo_store::{IntervalStore, StoreOp};

use crate::error::ActivityError;
use crate::keys;
use crate::notify::{self, Notification, NotificationKind};

/// Longest allowed activity duration in seconds (one day).
///
/// Doubles as the overlap-scan horizon: any activity that could overlap a
/// candidate window must start within `MAX_DURATION` seconds before it.
pub const MAX_DURATION: i64 = 86_400;

// Executor poll window: a 15 s grace period behind `now` (the executor's
// round-robin queue has 15 slots, so a just-missed slot is still picked up)
// and one hour plus one minute of lookahead.
const WINDOW_BEHIND_S: i64 = 15;
const WINDOW_AHEAD_S: i64 = 3660;

const DEFAULT_LIMIT: usize = 100;

/// What the executor does when an activity's window arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Command,
    Script,
    Reserve,
    /// Cleanup marker; exempt from the future-start and max-duration rules.
    Expire,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::Command => write!(f, "command"),
            ActivityKind::Script => write!(f, "script"),
            ActivityKind::Reserve => write!(f, "reserve"),
            ActivityKind::Expire => write!(f, "expire"),
        }
    }
}

/// Step unit for recurring expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringSpan {
    Minutes,
    Hours,
    Days,
}

impl RecurringSpan {
    pub fn seconds(self) -> i64 {
        match self {
            RecurringSpan::Minutes => 60,
            RecurringSpan::Hours => 3600,
            RecurringSpan::Days => 86_400,
        }
    }
}

/// Recurrence template carried by an activity.
///
/// `start` and `uuid` are filled in during expansion: every generated
/// occurrence shares the group `uuid`, which is what cascading deletes match
/// on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurring {
    pub frequency: u32,
    pub span: RecurringSpan,
    /// Last epoch second an occurrence may start at (inclusive).
    pub end: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

impl Recurring {
    /// Seconds between occurrence starts.
    pub fn step_seconds(&self) -> i64 {
        i64::from(self.frequency) * self.span.seconds()
    }
}

/// One audit-trail record. Appended, never truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Epoch seconds.
    pub time: i64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// True for events recorded through `commit` (executor outcomes).
    #[serde(default, skip_serializing_if = "is_false")]
    pub commit: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One scheduled unit of work.
///
/// The serde form is the persisted row and the API body: a flat mapping of
/// `name, updated_at, start, stop, kind, data, scope, fulfillment, uuid,
/// events, recurring`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    pub updated_at: i64,
    pub start: i64,
    pub stop: i64,
    pub kind: ActivityKind,
    pub data: Map<String, Value>,
    pub scope: String,
    #[serde(default)]
    pub fulfillment: bool,
    /// Absent on legacy rows written before uuids were introduced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub events: Vec<ActivityEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurring>,
}

impl Activity {
    /// Construct a validated activity with a fresh uuid.
    pub fn new(
        name: String,
        scope: String,
        start: i64,
        stop: i64,
        kind: ActivityKind,
        data: Map<String, Value>,
    ) -> Result<Self, ActivityError> {
        Self::validate_input(start, stop, kind)?;
        Ok(Self {
            name,
            updated_at: 0,
            start,
            stop,
            kind,
            data,
            scope,
            fulfillment: false,
            uuid: Some(Uuid::new_v4()),
            events: Vec::new(),
            recurring: None,
        })
    }

    /// Attach a recurrence template; `create` will expand it.
    pub fn with_recurring(mut self, recurring: Recurring) -> Self {
        self.recurring = Some(recurring);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ActivityError> {
        serde_json::from_str(json)
            .map_err(|e| ActivityError::Serialize(format!("malformed activity row: {e}")))
    }

    pub fn to_json(&self) -> Result<String, ActivityError> {
        serde_json::to_string(self).map_err(|e| ActivityError::Serialize(e.to_string()))
    }

    fn key(&self) -> String {
        keys::timeline(&self.scope, &self.name)
    }

    // ── Validation ──────────────────────────────────────────────────

    /// Check the scheduling rules for a `[start, stop)` window:
    /// - start and stop must be representable epoch seconds,
    /// - start must not be in the past (unless the kind is `expire`),
    /// - the duration must be positive and under [`MAX_DURATION`]
    ///   (the cap again waived for `expire`).
    ///
    /// Kind membership and the data-must-be-a-mapping rule are enforced by
    /// the types themselves; unknown kinds and non-object data never get past
    /// deserialization.
    pub fn validate_input(start: i64, stop: i64, kind: ActivityKind) -> Result<(), ActivityError> {
        if DateTime::from_timestamp(start, 0).is_none()
            || DateTime::from_timestamp(stop, 0).is_none()
        {
            return Err(ActivityError::Input(format!(
                "start and stop must be epoch seconds: {start}, {stop}"
            )));
        }
        let now = now_epoch_s();
        let duration = stop - start;
        if now >= start && kind != ActivityKind::Expire {
            Err(ActivityError::Input(format!(
                "activity must be in the future, current_time: {now} vs {start}"
            )))
        } else if duration >= MAX_DURATION && kind != ActivityKind::Expire {
            Err(ActivityError::Input(format!(
                "activity can not be longer than {MAX_DURATION} seconds"
            )))
        } else if duration <= 0 {
            Err(ActivityError::Input(format!(
                "start: {start} must be before stop: {stop}"
            )))
        } else {
            Ok(())
        }
    }

    /// Re-validate and apply new scheduling fields.
    pub fn set_input(
        &mut self,
        start: i64,
        stop: i64,
        kind: ActivityKind,
        data: Map<String, Value>,
    ) -> Result<(), ActivityError> {
        Self::validate_input(start, stop, kind)?;
        self.start = start;
        self.stop = stop;
        self.kind = kind;
        self.data = data;
        Ok(())
    }

    /// Scan for an activity overlapping this one's `[start, stop)` window.
    ///
    /// Walks the timeline in descending score order from `stop - 1` back to
    /// `start - MAX_DURATION`. The bounded window is sufficient because no
    /// valid activity lasts longer than `MAX_DURATION`, so anything that
    /// could overlap must start inside it. The walk stops at the first
    /// decision: the nearest entry (skipping `ignore_score`, used by update
    /// to exclude the row being moved) either overlaps — return its start —
    /// or ends at or before our start, in which case every older entry does
    /// too.
    pub async fn validate_time(
        &self,
        store: &dyn IntervalStore,
        ignore_score: Option<i64>,
    ) -> Result<Option<i64>, ActivityError> {
        let rows = store
            .rev_range_by_score(&self.key(), self.stop - 1, self.start - MAX_DURATION)
            .await?;
        for row in rows {
            let existing = Activity::from_json(&row)?;
            if ignore_score == Some(existing.start) {
                continue;
            }
            if existing.stop > self.start {
                return Ok(Some(existing.start));
            }
            return Ok(None);
        }
        Ok(None)
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Persist this activity, expanding the recurrence template when one is
    /// attached. With `overlap` false, any intersection with the existing
    /// schedule fails the whole call and leaves the store untouched.
    pub async fn create(
        &mut self,
        store: &dyn IntervalStore,
        overlap: bool,
    ) -> Result<(), ActivityError> {
        match self.recurring.clone() {
            Some(recurring) => self.create_recurring(store, overlap, recurring).await,
            None => self.create_single(store, overlap).await,
        }
    }

    async fn create_single(
        &mut self,
        store: &dyn IntervalStore,
        overlap: bool,
    ) -> Result<(), ActivityError> {
        Self::validate_input(self.start, self.stop, self.kind)?;
        if !overlap {
            if let Some(collision) = self.validate_time(store, None).await? {
                return Err(ActivityError::Overlap(format!(
                    "activity overlaps existing at {collision}"
                )));
            }
        }

        self.updated_at = now_epoch_ns();
        self.add_event("created");
        store.add(&self.key(), self.start, &self.to_json()?).await?;
        info!(
            timeline = %self.name,
            scope = %self.scope,
            start = self.start,
            stop = self.stop,
            kind = %self.kind,
            "activity created"
        );
        self.notify(store, NotificationKind::Created, None).await
    }

    async fn create_recurring(
        &mut self,
        store: &dyn IntervalStore,
        overlap: bool,
        mut recurring: Recurring,
    ) -> Result<(), ActivityError> {
        // Only the template is validated; later occurrences are offsets of
        // it, so the future-start rule must not apply to them.
        Self::validate_input(self.start, self.stop, self.kind)?;

        let step = recurring.step_seconds();
        if step <= 0 {
            return Err(ActivityError::Input(
                "recurring frequency must be positive".to_string(),
            ));
        }

        // Group uuid ties the occurrences together for cascading deletes.
        recurring.uuid = Some(Uuid::new_v4());
        recurring.start = Some(self.start);
        let series_start = self.start;
        let series_end = recurring.end;
        let duration = self.stop - self.start;
        self.recurring = Some(recurring);

        // One fetch covers every occurrence: rows starting up to MAX_DURATION
        // before the series may still reach into it, and the last occurrence
        // can run `duration` past the series end.
        let existing: Vec<Activity> = if overlap {
            Vec::new()
        } else {
            store
                .rev_range_by_score(
                    &self.key(),
                    series_end + duration - 1,
                    series_start - MAX_DURATION,
                )
                .await?
                .iter()
                .map(|row| Activity::from_json(row))
                .collect::<Result<_, _>>()?
        };

        self.updated_at = now_epoch_ns();
        self.add_event("created");

        let mut ops = Vec::new();
        let mut last_stop: Option<i64> = None;
        let mut start_time = series_start;
        while start_time <= series_end {
            self.start = start_time;
            self.stop = start_time + duration;

            if last_stop.is_some_and(|stop| self.start < stop) {
                self.events.pop();
                return Err(ActivityError::Overlap(
                    "recurring activity overlap, increase the recurrence delta or decrease the \
                     activity duration"
                        .to_string(),
                ));
            }
            for value in &existing {
                if self.start < value.stop && value.start < self.stop {
                    self.events.pop();
                    return Err(ActivityError::Overlap(format!(
                        "activity overlaps existing at {}",
                        value.start
                    )));
                }
            }

            ops.push(StoreOp::Add {
                key: self.key(),
                score: self.start,
                member: self.to_json()?,
            });
            last_stop = Some(self.stop);
            start_time += step;
        }

        let occurrences = ops.len();
        store.exec(ops).await?;
        info!(
            timeline = %self.name,
            scope = %self.scope,
            occurrences,
            series_start,
            series_end,
            "recurring series created"
        );
        // The envelope serializes the object after the last iteration, so its
        // start/stop are the final occurrence's, not the template's.
        self.notify(store, NotificationKind::Created, None).await
    }

    /// Move this activity to a new window and/or payload.
    ///
    /// The activity must still exist at its current score; a miss means the
    /// caller's copy is stale. Removal of the old row (matched by uuid, since
    /// several activities may share a score) and insertion of the new one
    /// apply atomically. Returns the new start.
    pub async fn update(
        &mut self,
        store: &dyn IntervalStore,
        start: i64,
        stop: i64,
        kind: ActivityKind,
        data: Map<String, Value>,
        overlap: bool,
    ) -> Result<i64, ActivityError> {
        let old_start = self.start;
        let old_member = self.fetch_own_row(store, old_start).await?;

        self.set_input(start, stop, kind, data)?;
        if !overlap {
            if let Some(collision) = self.validate_time(store, Some(old_start)).await? {
                return Err(ActivityError::Overlap(format!(
                    "failed to update {old_start}, no activities can overlap, collision: \
                     {collision}"
                )));
            }
        }

        self.updated_at = now_epoch_ns();
        self.add_event("updated");
        store
            .exec(vec![
                StoreOp::RemoveMember {
                    key: self.key(),
                    member: old_member,
                },
                StoreOp::Add {
                    key: self.key(),
                    score: self.start,
                    member: self.to_json()?,
                },
            ])
            .await?;
        info!(
            timeline = %self.name,
            scope = %self.scope,
            old_start,
            start = self.start,
            "activity updated"
        );
        self.notify(store, NotificationKind::Updated, Some(old_start))
            .await?;
        Ok(self.start)
    }

    /// Record an executor outcome: appends a committed event, optionally sets
    /// the fulfillment flag, and rewrites the row in place. Scheduling fields
    /// never change here, so no re-validation happens.
    pub async fn commit(
        &mut self,
        store: &dyn IntervalStore,
        status: &str,
        message: Option<&str>,
        fulfillment: Option<bool>,
    ) -> Result<(), ActivityError> {
        let old_member = self.fetch_own_row(store, self.start).await?;

        self.events.push(ActivityEvent {
            time: now_epoch_s(),
            event: status.to_string(),
            message: message.map(str::to_string),
            commit: true,
        });
        if let Some(fulfillment) = fulfillment {
            self.fulfillment = fulfillment;
        }
        self.updated_at = now_epoch_ns();

        store
            .exec(vec![
                StoreOp::RemoveMember {
                    key: self.key(),
                    member: old_member,
                },
                StoreOp::Add {
                    key: self.key(),
                    score: self.start,
                    member: self.to_json()?,
                },
            ])
            .await?;
        self.notify(store, NotificationKind::Event, None).await
    }

    /// Re-fetch this activity's persisted row at `score`, matching by uuid.
    async fn fetch_own_row(
        &self,
        store: &dyn IntervalStore,
        score: i64,
    ) -> Result<String, ActivityError> {
        let rows = store.range_by_score(&self.key(), score, score, None).await?;
        rows.into_iter()
            .find(|row| {
                Activity::from_json(row).is_ok_and(|existing| existing.uuid == self.uuid)
            })
            .ok_or(ActivityError::NotFound(score))
    }

    /// Remove an activity (or a whole recurring series) at `score`.
    ///
    /// With `recurring` true and a series row at `score`, every row sharing
    /// the series' group uuid is removed first. The direct path then removes
    /// at most one row at the exact score: the one matching `uuid`, or — when
    /// no uuid is given — the first legacy row carrying none. A `deleted`
    /// notification is always published, even when nothing matched, so
    /// subscribers drop whatever view they had of that score. Returns the
    /// count removed by the direct path.
    pub async fn destroy(
        store: &dyn IntervalStore,
        name: &str,
        scope: &str,
        score: i64,
        uuid: Option<Uuid>,
        recurring: bool,
    ) -> Result<u64, ActivityError> {
        let key = keys::timeline(scope, name);

        if recurring {
            Self::destroy_series(store, &key, score).await?;
        }

        let rows = store.range_by_score(&key, score, score, None).await?;
        let mut removed = 0;
        for row in rows {
            let row_uuid = match Activity::from_json(&row) {
                Ok(activity) => activity.uuid,
                Err(_) => {
                    warn!(timeline = %name, scope = %scope, score, "skipping unreadable row");
                    continue;
                }
            };
            let matched = match uuid {
                Some(uuid) => row_uuid == Some(uuid),
                None => row_uuid.is_none(),
            };
            if matched {
                removed += store.remove_member(&key, &row).await?;
                break;
            }
        }

        info!(timeline = %name, scope = %scope, score, removed, "activity destroyed");
        let note = Notification::activity(
            NotificationKind::Deleted,
            name,
            serde_json::json!({ "start": score }).to_string(),
        );
        notify::publish(store, scope, &note)
            .await
            .map_err(ActivityError::Notify)?;
        Ok(removed)
    }

    /// Cascade delete: remove every row in the series containing `score`.
    async fn destroy_series(
        store: &dyn IntervalStore,
        key: &str,
        score: i64,
    ) -> Result<(), ActivityError> {
        let rows = store.range_by_score(key, score, score, None).await?;
        let series = rows
            .iter()
            .filter_map(|row| Activity::from_json(row).ok())
            .find_map(|activity| activity.recurring.filter(|r| r.uuid.is_some()));
        let Some(series) = series else {
            return Ok(());
        };

        let scan_start = series.start.unwrap_or(score);
        let members = store
            .range_by_score(key, scan_start, series.end, None)
            .await?;
        for member in members {
            if let Ok(activity) = Activity::from_json(&member) {
                if activity.recurring.as_ref().and_then(|r| r.uuid) == series.uuid {
                    store.remove_member(key, &member).await?;
                }
            }
        }
        Ok(())
    }

    /// Bulk cleanup: remove every row with score in `[min, max]`.
    pub async fn range_destroy(
        store: &dyn IntervalStore,
        name: &str,
        scope: &str,
        min: i64,
        max: i64,
    ) -> Result<u64, ActivityError> {
        let key = keys::timeline(scope, name);
        let removed = store.remove_by_score(&key, min, max).await?;
        info!(timeline = %name, scope = %scope, min, max, removed, "activity range destroyed");
        let note = Notification::activity(
            NotificationKind::Deleted,
            name,
            serde_json::json!({ "start": min, "stop": max }).to_string(),
        );
        notify::publish(store, scope, &note)
            .await
            .map_err(ActivityError::Notify)?;
        Ok(removed)
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Activities with start in `[start, stop]`, capped at `limit`
    /// (default 100).
    pub async fn get(
        store: &dyn IntervalStore,
        name: &str,
        scope: &str,
        start: i64,
        stop: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Activity>, ActivityError> {
        if start > stop {
            return Err(ActivityError::Input(format!(
                "start: {start} must be before stop: {stop}"
            )));
        }
        let rows = store
            .range_by_score(
                &keys::timeline(scope, name),
                start,
                stop,
                Some(limit.unwrap_or(DEFAULT_LIMIT)),
            )
            .await?;
        rows.iter().map(|row| Activity::from_json(row)).collect()
    }

    /// Every activity on the timeline, capped at `limit` (default 100).
    pub async fn all(
        store: &dyn IntervalStore,
        name: &str,
        scope: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Activity>, ActivityError> {
        let rows = store
            .range_by_score(
                &keys::timeline(scope, name),
                i64::MIN,
                i64::MAX,
                Some(limit.unwrap_or(DEFAULT_LIMIT)),
            )
            .await?;
        rows.iter().map(|row| Activity::from_json(row)).collect()
    }

    /// First activity at exactly `score`, if any.
    pub async fn score(
        store: &dyn IntervalStore,
        name: &str,
        scope: &str,
        score: i64,
    ) -> Result<Option<Activity>, ActivityError> {
        let rows = store
            .range_by_score(&keys::timeline(scope, name), score, score, Some(1))
            .await?;
        rows.first().map(|row| Activity::from_json(row)).transpose()
    }

    /// Number of activities on the timeline.
    pub async fn count(
        store: &dyn IntervalStore,
        name: &str,
        scope: &str,
    ) -> Result<u64, ActivityError> {
        Ok(store.card(&keys::timeline(scope, name)).await?)
    }

    /// The executor's poll window: everything from 15 s behind `now` through
    /// the next 3660 s.
    pub async fn activities(
        store: &dyn IntervalStore,
        name: &str,
        scope: &str,
    ) -> Result<Vec<Activity>, ActivityError> {
        let now = now_epoch_s();
        let rows = store
            .range_by_score(
                &keys::timeline(scope, name),
                now - WINDOW_BEHIND_S,
                now + WINDOW_AHEAD_S,
                None,
            )
            .await?;
        rows.iter().map(|row| Activity::from_json(row)).collect()
    }

    // ── Events & notifications ──────────────────────────────────────

    /// Append an audit event in memory; the caller persists the row.
    fn add_event(&mut self, status: &str) {
        self.events.push(ActivityEvent {
            time: now_epoch_s(),
            event: status.to_string(),
            message: None,
            commit: false,
        });
    }

    async fn notify(
        &self,
        store: &dyn IntervalStore,
        kind: NotificationKind,
        extra: Option<i64>,
    ) -> Result<(), ActivityError> {
        let mut note = Notification::activity(kind, &self.name, self.to_json()?);
        note.extra = extra;
        notify::publish(store, &self.scope, &note)
            .await
            .map_err(ActivityError::Notify)
    }
}
