//! Timelines — named schedules within a scope.
//!
//! A timeline is a pure namespace: activities reference it through the shared
//! key prefix, nothing enforces the link beyond that. The metadata row here
//! carries display color, the executor gate, and the shard assignment.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use tempo_core::time::now_epoch_ns;
use tempo_store::{IntervalStore, StoreOp};

use crate::error::TimelineError;
use crate::keys;
use crate::notify::{self, Notification, NotificationKind};
use crate::worker::ScheduleWorker;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub name: String,
    /// Six hex digits, stored without a leading `#`.
    pub color: String,
    /// Gate for whether the executor runs this timeline's contents.
    pub execute: bool,
    pub shard: u32,
    pub scope: String,
    pub updated_at: i64,
}

impl Timeline {
    /// Construct a timeline; a random color is generated when none is given.
    pub fn new(
        name: String,
        scope: String,
        color: Option<&str>,
        shard: u32,
    ) -> Result<Self, TimelineError> {
        let color = match color {
            Some(color) => normalize_color(color)?,
            None => random_color(),
        };
        Ok(Self {
            name,
            color,
            execute: true,
            shard,
            scope,
            updated_at: 0,
        })
    }

    /// Set the display color; accepts `aabbcc` or `#aabbcc`.
    pub fn set_color(&mut self, color: &str) -> Result<(), TimelineError> {
        self.color = normalize_color(color)?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, TimelineError> {
        serde_json::from_str(json)
            .map_err(|e| TimelineError::Serialize(format!("malformed timeline row: {e}")))
    }

    pub fn to_json(&self) -> Result<String, TimelineError> {
        serde_json::to_string(self).map_err(|e| TimelineError::Serialize(e.to_string()))
    }

    /// Persist the metadata row and announce the new namespace.
    pub async fn create(&mut self, store: &dyn IntervalStore) -> Result<(), TimelineError> {
        self.updated_at = now_epoch_ns();
        store
            .hash_set(&keys::timeline_meta(&self.scope), &self.name, &self.to_json()?)
            .await?;
        info!(timeline = %self.name, scope = %self.scope, shard = self.shard, "timeline created");
        self.notify(store, NotificationKind::Created).await
    }

    /// Toggle the executor gate and announce the change.
    pub async fn set_execute(
        &mut self,
        store: &dyn IntervalStore,
        execute: bool,
    ) -> Result<(), TimelineError> {
        self.execute = execute;
        self.updated_at = now_epoch_ns();
        store
            .hash_set(&keys::timeline_meta(&self.scope), &self.name, &self.to_json()?)
            .await?;
        self.notify(store, NotificationKind::Updated).await
    }

    pub async fn get(
        store: &dyn IntervalStore,
        name: &str,
        scope: &str,
    ) -> Result<Option<Timeline>, TimelineError> {
        store
            .hash_get(&keys::timeline_meta(scope), name)
            .await?
            .map(|row| Timeline::from_json(&row))
            .transpose()
    }

    pub async fn all(
        store: &dyn IntervalStore,
        scope: &str,
    ) -> Result<Vec<Timeline>, TimelineError> {
        store
            .hash_all(&keys::timeline_meta(scope))
            .await?
            .iter()
            .map(|(_, row)| Timeline::from_json(row))
            .collect()
    }

    /// Delete the timeline: its activity key, metadata row, and worker
    /// descriptor go in one atomic batch. Refused while activities remain
    /// unless `force` is set.
    pub async fn destroy(
        store: &dyn IntervalStore,
        name: &str,
        scope: &str,
        force: bool,
    ) -> Result<(), TimelineError> {
        let key = keys::timeline(scope, name);
        let count = store.card(&key).await?;
        if count > 0 && !force {
            return Err(TimelineError::NotEmpty {
                name: name.to_string(),
                count,
            });
        }

        store
            .exec(vec![
                StoreOp::DeleteKey { key },
                StoreOp::HashDel {
                    key: keys::timeline_meta(scope),
                    field: name.to_string(),
                },
                StoreOp::HashDel {
                    key: keys::workers(scope),
                    field: ScheduleWorker::field_name(scope, name),
                },
            ])
            .await?;
        info!(timeline = %name, scope = %scope, dropped = count, "timeline destroyed");

        let note = Notification::timeline(
            NotificationKind::Deleted,
            name,
            json!({ "name": name }).to_string(),
        );
        notify::publish(store, scope, &note)
            .await
            .map_err(TimelineError::Notify)
    }

    /// Register the executor worker for this timeline. Only the descriptor
    /// is written; an external process manager starts the worker.
    pub async fn deploy(&self, store: &dyn IntervalStore) -> Result<(), TimelineError> {
        let worker = ScheduleWorker::for_timeline(self);
        store
            .hash_set(&keys::workers(&self.scope), &worker.name, &worker.to_json()?)
            .await?;
        info!(worker = %worker.name, shard = worker.shard, "schedule worker deployed");
        Ok(())
    }

    /// Remove the executor worker descriptor.
    pub async fn undeploy(&self, store: &dyn IntervalStore) -> Result<(), TimelineError> {
        let field = ScheduleWorker::field_name(&self.scope, &self.name);
        store.hash_del(&keys::workers(&self.scope), &field).await?;
        info!(worker = %field, "schedule worker undeployed");
        Ok(())
    }

    async fn notify(
        &self,
        store: &dyn IntervalStore,
        kind: NotificationKind,
    ) -> Result<(), TimelineError> {
        let note = Notification::timeline(kind, &self.name, self.to_json()?);
        notify::publish(store, &self.scope, &note)
            .await
            .map_err(TimelineError::Notify)
    }
}

fn normalize_color(input: &str) -> Result<String, TimelineError> {
    let hex = input.strip_prefix('#').unwrap_or(input);
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hex.to_ascii_lowercase())
    } else {
        Err(TimelineError::Input(format!(
            "color must be six hex digits, got: {input}"
        )))
    }
}

fn random_color() -> String {
    format!("{:06x}", rand::thread_rng().gen_range(0u32..0x100_0000))
}
