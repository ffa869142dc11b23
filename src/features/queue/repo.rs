//! Reminder repository over the persistent store.
//!
//! One JSON array per tenant (`scheduled_reminders:{tenant}`) plus a flat
//! tenant index so due-selection can poll every tenant. Due-selection stamps
//! a claim on each returned reminder before handing it out, which is the
//! mutual-exclusion mechanism for deployments running more than one worker
//! against a shared store.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::storage::{reminders_key, PersistentStore, TENANT_INDEX_KEY};

use super::{Claim, ReminderStatus, ScheduledReminder};

pub struct ReminderQueue {
    store: Arc<dyn PersistentStore>,
    write_lock: Mutex<()>,
}

impl ReminderQueue {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        ReminderQueue {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Insert a freshly generated reminder
    pub async fn insert(&self, reminder: &ScheduledReminder) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        self.register_tenant(&reminder.tenant_id).await?;
        let mut all = self.load(&reminder.tenant_id).await?;
        all.push(reminder.clone());
        self.save(&reminder.tenant_id, &all).await?;

        debug!(
            "Queued reminder {} ({}) for patient {} at {}",
            reminder.id,
            reminder.rule.as_str(),
            reminder.patient_id,
            reminder.scheduled_for
        );
        Ok(())
    }

    pub async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<ScheduledReminder>> {
        let all = self.load(tenant_id).await?;
        Ok(all.into_iter().find(|r| r.id == id))
    }

    /// Due, pending, unclaimed reminders across every known tenant, oldest
    /// due first, each stamped with a claim for `owner` before it is
    /// returned.
    pub async fn claim_due_pending(
        &self,
        now: DateTime<Utc>,
        owner: &str,
        lease: chrono::Duration,
    ) -> Result<Vec<ScheduledReminder>> {
        let _guard = self.write_lock.lock().await;

        let mut claimed = Vec::new();
        for tenant_id in self.tenants().await? {
            let mut all = self.load(&tenant_id).await?;
            let mut dirty = false;

            for reminder in all.iter_mut() {
                if reminder.selectable(now, owner) {
                    reminder.claim = Some(Claim {
                        owner: owner.to_string(),
                        expires_at: now + lease,
                    });
                    claimed.push(reminder.clone());
                    dirty = true;
                }
            }
            if dirty {
                self.save(&tenant_id, &all).await?;
            }
        }

        claimed.sort_by_key(|r| r.scheduled_for);
        Ok(claimed)
    }

    /// Persist processor-applied changes to a reminder
    pub async fn update(&self, reminder: &ScheduledReminder) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.load(&reminder.tenant_id).await?;
        let slot = all
            .iter_mut()
            .find(|r| r.id == reminder.id)
            .ok_or_else(|| anyhow!("reminder {} not found", reminder.id))?;
        *slot = reminder.clone();
        self.save(&reminder.tenant_id, &all).await
    }

    /// Record that a sent reminder was read by the patient
    pub async fn mark_read(&self, tenant_id: &str, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.load(tenant_id).await?;
        let reminder = all
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("reminder {id} not found"))?;
        if reminder.status != ReminderStatus::Sent {
            return Err(anyhow!("reminder {id} is not sent, cannot mark read"));
        }
        if reminder.read_at.is_none() {
            reminder.read_at = Some(at);
        }
        self.save(tenant_id, &all).await
    }

    /// Every reminder for a tenant (analytics scan)
    pub async fn all(&self, tenant_id: &str) -> Result<Vec<ScheduledReminder>> {
        self.load(tenant_id).await
    }

    async fn tenants(&self) -> Result<Vec<String>> {
        match self.store.get(TENANT_INDEX_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).context("corrupt tenant index"),
            None => Ok(Vec::new()),
        }
    }

    async fn register_tenant(&self, tenant_id: &str) -> Result<()> {
        let mut tenants = self.tenants().await?;
        if !tenants.iter().any(|t| t == tenant_id) {
            tenants.push(tenant_id.to_string());
            self.store
                .put(TENANT_INDEX_KEY, serde_json::to_string(&tenants)?)
                .await?;
        }
        Ok(())
    }

    async fn load(&self, tenant_id: &str) -> Result<Vec<ScheduledReminder>> {
        let key = reminders_key(tenant_id);
        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("corrupt reminder collection at {key}")),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, tenant_id: &str, all: &[ScheduledReminder]) -> Result<()> {
        let raw = serde_json::to_string(all)?;
        self.store.put(&reminders_key(tenant_id), raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dispatch::Channel;
    use crate::features::rules::ReminderRule;
    use crate::storage::MemoryStore;

    fn queue() -> ReminderQueue {
        ReminderQueue::new(Arc::new(MemoryStore::new()))
    }

    fn reminder(tenant: &str, scheduled_for: &str) -> ScheduledReminder {
        ScheduledReminder::new(
            ReminderRule::Appointment24h,
            "p1",
            tenant,
            scheduled_for.parse().unwrap(),
            "title",
            "body",
            vec![Channel::Push],
        )
    }

    fn lease() -> chrono::Duration {
        chrono::Duration::seconds(120)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let queue = queue();
        let r = reminder("t1", "2024-01-09T14:00:00Z");
        queue.insert(&r).await.unwrap();

        let fetched = queue.get("t1", r.id).await.unwrap().unwrap();
        assert_eq!(fetched, r);
        assert!(queue.get("t2", r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_due_selection_orders_oldest_first() {
        let queue = queue();
        let now: DateTime<Utc> = "2024-01-09T14:00:00Z".parse().unwrap();

        let late = reminder("t1", "2024-01-09T13:00:00Z");
        let early = reminder("t1", "2024-01-09T08:00:00Z");
        let future = reminder("t1", "2024-01-09T15:00:00Z");
        queue.insert(&late).await.unwrap();
        queue.insert(&early).await.unwrap();
        queue.insert(&future).await.unwrap();

        let due = queue.claim_due_pending(now, "w1", lease()).await.unwrap();
        let ids: Vec<Uuid> = due.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[tokio::test]
    async fn test_due_selection_spans_tenants() {
        let queue = queue();
        let now: DateTime<Utc> = "2024-01-09T14:00:00Z".parse().unwrap();

        queue.insert(&reminder("t1", "2024-01-09T13:00:00Z")).await.unwrap();
        queue.insert(&reminder("t2", "2024-01-09T13:30:00Z")).await.unwrap();

        let due = queue.claim_due_pending(now, "w1", lease()).await.unwrap();
        assert_eq!(due.len(), 2);
    }

    #[tokio::test]
    async fn test_claim_blocks_other_workers_until_expiry() {
        let queue = queue();
        let now: DateTime<Utc> = "2024-01-09T14:00:00Z".parse().unwrap();
        let r = reminder("t1", "2024-01-09T13:00:00Z");
        queue.insert(&r).await.unwrap();

        let first = queue.claim_due_pending(now, "worker-a", lease()).await.unwrap();
        assert_eq!(first.len(), 1);

        // Another worker sees nothing while the lease holds
        let second = queue.claim_due_pending(now, "worker-b", lease()).await.unwrap();
        assert!(second.is_empty());

        // After lease expiry the reminder is selectable again
        let later = now + chrono::Duration::seconds(121);
        let third = queue.claim_due_pending(later, "worker-b", lease()).await.unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].id, r.id);
    }

    #[tokio::test]
    async fn test_update_persists_terminal_status() {
        let queue = queue();
        let now: DateTime<Utc> = "2024-01-09T14:00:00Z".parse().unwrap();
        let r = reminder("t1", "2024-01-09T13:00:00Z");
        queue.insert(&r).await.unwrap();

        let mut claimed = queue
            .claim_due_pending(now, "w1", lease())
            .await
            .unwrap()
            .remove(0);
        claimed.mark_sent(now);
        queue.update(&claimed).await.unwrap();

        let fetched = queue.get("t1", r.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ReminderStatus::Sent);
        assert!(fetched.claim.is_none());

        // Terminal reminders never come back from due selection
        let due = queue.claim_due_pending(now, "w1", lease()).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_requires_sent() {
        let queue = queue();
        let now: DateTime<Utc> = "2024-01-09T14:00:00Z".parse().unwrap();
        let r = reminder("t1", "2024-01-09T13:00:00Z");
        queue.insert(&r).await.unwrap();

        assert!(queue.mark_read("t1", r.id, now).await.is_err());

        let mut sent = r.clone();
        sent.mark_sent(now);
        queue.update(&sent).await.unwrap();
        queue.mark_read("t1", r.id, now).await.unwrap();

        let fetched = queue.get("t1", r.id).await.unwrap().unwrap();
        assert_eq!(fetched.read_at, Some(now));
    }
}
