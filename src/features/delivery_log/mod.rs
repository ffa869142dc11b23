//! # Feature: Delivery Log
//!
//! One immutable entry per (reminder, channel) attempt, kept in a rolling
//! window. Retention is enforced on append: each write drops entries older
//! than the window, so there is no background sweep to schedule.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::features::dispatch::{Channel, ChannelOutcome};
use crate::features::queue::ScheduledReminder;
use crate::features::rules::ReminderRule;
use crate::storage::{delivery_logs_key, PersistentStore};

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// One row per channel attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryLogEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub reminder_id: Uuid,
    pub patient_id: String,
    pub rule: ReminderRule,
    pub channel: Channel,
    pub outcome: DeliveryOutcome,
    pub timestamp: DateTime<Utc>,
    pub message_id: Option<String>,
    pub error: Option<String>,
    /// Attempt number of the owning reminder when this entry was written
    pub retry_count: u32,
}

impl DeliveryLogEntry {
    /// Build a log entry from one channel outcome of a reminder attempt
    pub fn from_outcome(
        reminder: &ScheduledReminder,
        channel: Channel,
        outcome: &ChannelOutcome,
    ) -> Self {
        DeliveryLogEntry {
            id: Uuid::new_v4(),
            tenant_id: reminder.tenant_id.clone(),
            reminder_id: reminder.id,
            patient_id: reminder.patient_id.clone(),
            rule: reminder.rule,
            channel,
            outcome: if outcome.sent {
                DeliveryOutcome::Sent
            } else {
                DeliveryOutcome::Failed
            },
            timestamp: outcome.timestamp,
            message_id: outcome.message_id.clone(),
            error: outcome.error.clone(),
            retry_count: reminder.attempts,
        }
    }
}

/// Append-only delivery log with rolling retention
pub struct DeliveryLogger {
    store: Arc<dyn PersistentStore>,
    retention: chrono::Duration,
    write_lock: Mutex<()>,
}

impl DeliveryLogger {
    pub fn new(store: Arc<dyn PersistentStore>, retention: chrono::Duration) -> Self {
        DeliveryLogger {
            store,
            retention,
            write_lock: Mutex::new(()),
        }
    }

    /// Append one entry, pruning entries that fell out of the retention
    /// window relative to `now`.
    pub async fn append(&self, entry: DeliveryLogEntry, now: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let tenant_id = entry.tenant_id.clone();
        let mut entries = self.load(&tenant_id).await?;
        entries.push(entry);

        let cutoff = now - self.retention;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        if entries.len() < before {
            debug!(
                "Pruned {} delivery log entries older than {cutoff} for tenant {tenant_id}",
                before - entries.len()
            );
        }

        self.save(&tenant_id, &entries).await
    }

    /// All retained entries for a tenant
    pub async fn entries(&self, tenant_id: &str) -> Result<Vec<DeliveryLogEntry>> {
        self.load(tenant_id).await
    }

    async fn load(&self, tenant_id: &str) -> Result<Vec<DeliveryLogEntry>> {
        let key = delivery_logs_key(tenant_id);
        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("corrupt delivery log at {key}")),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, tenant_id: &str, entries: &[DeliveryLogEntry]) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.store.put(&delivery_logs_key(tenant_id), raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn entry(tenant: &str, timestamp: &str, error: Option<&str>) -> DeliveryLogEntry {
        DeliveryLogEntry {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            reminder_id: Uuid::new_v4(),
            patient_id: "p1".to_string(),
            rule: ReminderRule::Appointment24h,
            channel: Channel::Push,
            outcome: if error.is_none() {
                DeliveryOutcome::Sent
            } else {
                DeliveryOutcome::Failed
            },
            timestamp: timestamp.parse().unwrap(),
            message_id: None,
            error: error.map(String::from),
            retry_count: 1,
        }
    }

    fn logger() -> DeliveryLogger {
        DeliveryLogger::new(Arc::new(MemoryStore::new()), chrono::Duration::days(30))
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let logger = logger();
        let now: DateTime<Utc> = "2024-01-09T14:00:00Z".parse().unwrap();

        logger
            .append(entry("t1", "2024-01-09T14:00:00Z", Some("missing destination")), now)
            .await
            .unwrap();

        let entries = logger.entries("t1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, DeliveryOutcome::Failed);
        assert_eq!(entries[0].error.as_deref(), Some("missing destination"));
    }

    #[tokio::test]
    async fn test_append_prunes_entries_past_retention() {
        let logger = logger();
        let now: DateTime<Utc> = "2024-02-15T00:00:00Z".parse().unwrap();

        // Old entry from more than 30 days before `now`
        logger
            .append(
                entry("t1", "2024-01-01T00:00:00Z", None),
                "2024-01-01T00:00:00Z".parse().unwrap(),
            )
            .await
            .unwrap();

        logger.append(entry("t1", "2024-02-15T00:00:00Z", None), now).await.unwrap();

        let entries = logger.entries("t1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].timestamp,
            "2024-02-15T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_entries_exactly_at_cutoff_survive() {
        let logger = logger();
        let now: DateTime<Utc> = "2024-01-31T00:00:00Z".parse().unwrap();

        logger
            .append(
                entry("t1", "2024-01-01T00:00:00Z", None),
                "2024-01-01T00:00:00Z".parse().unwrap(),
            )
            .await
            .unwrap();
        logger.append(entry("t1", "2024-01-31T00:00:00Z", None), now).await.unwrap();

        assert_eq!(logger.entries("t1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let logger = logger();
        let now: DateTime<Utc> = "2024-01-09T14:00:00Z".parse().unwrap();

        logger.append(entry("t1", "2024-01-09T14:00:00Z", None), now).await.unwrap();
        assert!(logger.entries("t2").await.unwrap().is_empty());
    }
}
