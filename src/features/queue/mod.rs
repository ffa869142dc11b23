//! # Feature: Reminder Queue
//!
//! The persisted collection of scheduled reminders across all tenants.
//! Reminders are created by the rule engine, live here as `pending`, and
//! leave future processing once they reach a terminal status. Status moves
//! one direction only; the single loop back is pending -> pending on a
//! quiet-hours reschedule, which bumps `reschedule_count`.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Claim/lease marker for multi-worker deployments
//! - 1.0.0: Initial release with status machine and due-time selection

pub mod repo;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::features::dispatch::{Channel, ChannelOutcome};
use crate::features::rules::ReminderRule;

pub use repo::ReminderQueue;

/// Lifecycle state of a scheduled reminder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl ReminderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReminderStatus::Pending)
    }
}

/// Lease stamped on a reminder while a worker processes it.
///
/// A claimed, unexpired reminder is invisible to other workers' due
/// selection; expiry makes it selectable again so a crashed worker cannot
/// strand reminders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

/// Bookkeeping carried alongside a reminder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderMeta {
    /// Due time at generation, before any quiet-hours reschedule
    pub original_scheduled_for: DateTime<Utc>,
    pub reschedule_count: u32,
    pub failure_reason: Option<String>,
    /// Per-channel outcome of the last attempt
    pub channel_results: HashMap<Channel, ChannelOutcome>,
}

/// A reminder scheduled for delivery at a specific time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledReminder {
    pub id: Uuid,
    pub rule: ReminderRule,
    pub patient_id: String,
    pub tenant_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub channels: Vec<Channel>,
    pub status: ReminderStatus,
    pub attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub claim: Option<Claim>,
    pub meta: ReminderMeta,
}

impl ScheduledReminder {
    pub fn new(
        rule: ReminderRule,
        patient_id: &str,
        tenant_id: &str,
        scheduled_for: DateTime<Utc>,
        title: impl Into<String>,
        body: impl Into<String>,
        channels: Vec<Channel>,
    ) -> Self {
        ScheduledReminder {
            id: Uuid::new_v4(),
            rule,
            patient_id: patient_id.to_string(),
            tenant_id: tenant_id.to_string(),
            scheduled_for,
            title: title.into(),
            body: body.into(),
            channels,
            status: ReminderStatus::Pending,
            attempts: 0,
            last_attempt: None,
            sent_at: None,
            read_at: None,
            claim: None,
            meta: ReminderMeta {
                original_scheduled_for: scheduled_for,
                reschedule_count: 0,
                failure_reason: None,
                channel_results: HashMap::new(),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move a pending reminder back to pending at a later time
    /// (quiet-hours suppression). No-op on terminal reminders.
    pub fn reschedule(&mut self, to: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.scheduled_for = to;
        self.meta.reschedule_count += 1;
        self.claim = None;
    }

    /// Terminal transition: at least one channel succeeded
    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.status = ReminderStatus::Sent;
        self.sent_at = Some(at);
        self.claim = None;
    }

    /// Terminal transition: every attempted channel failed
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.status = ReminderStatus::Failed;
        self.meta.failure_reason = Some(reason.into());
        self.claim = None;
    }

    /// Terminal transition: configuration error (settings missing or
    /// disabled); never retried.
    pub fn mark_cancelled(&mut self, reason: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.status = ReminderStatus::Cancelled;
        self.meta.failure_reason = Some(reason.into());
        self.claim = None;
    }

    /// Whether this reminder is due and selectable by `owner` at `now`
    pub fn selectable(&self, now: DateTime<Utc>, owner: &str) -> bool {
        if self.status != ReminderStatus::Pending || self.scheduled_for > now {
            return false;
        }
        match &self.claim {
            None => true,
            Some(claim) => claim.owner == owner || claim.expires_at <= now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reminder() -> ScheduledReminder {
        ScheduledReminder::new(
            ReminderRule::Appointment24h,
            "p1",
            "t1",
            "2024-01-09T14:00:00Z".parse().unwrap(),
            "title",
            "body",
            vec![Channel::Push],
        )
    }

    #[test]
    fn test_new_reminder_is_pending() {
        let r = reminder();
        assert_eq!(r.status, ReminderStatus::Pending);
        assert_eq!(r.attempts, 0);
        assert_eq!(r.meta.reschedule_count, 0);
        assert_eq!(r.meta.original_scheduled_for, r.scheduled_for);
    }

    #[test]
    fn test_reschedule_keeps_pending_and_counts() {
        let mut r = reminder();
        let original = r.meta.original_scheduled_for;
        let later = "2024-01-10T07:00:00Z".parse().unwrap();

        r.reschedule(later);
        assert_eq!(r.status, ReminderStatus::Pending);
        assert_eq!(r.scheduled_for, later);
        assert_eq!(r.meta.reschedule_count, 1);
        assert_eq!(r.meta.original_scheduled_for, original);
    }

    #[test]
    fn test_terminal_states_do_not_transition() {
        let mut r = reminder();
        r.mark_sent("2024-01-09T14:00:05Z".parse().unwrap());
        assert_eq!(r.status, ReminderStatus::Sent);

        r.mark_failed("too late");
        assert_eq!(r.status, ReminderStatus::Sent);
        assert!(r.meta.failure_reason.is_none());

        r.reschedule("2024-01-11T00:00:00Z".parse().unwrap());
        assert_eq!(r.meta.reschedule_count, 0);
    }

    #[test]
    fn test_cancelled_records_reason() {
        let mut r = reminder();
        r.mark_cancelled("reminders disabled");
        assert_eq!(r.status, ReminderStatus::Cancelled);
        assert_eq!(r.meta.failure_reason.as_deref(), Some("reminders disabled"));
    }

    #[test]
    fn test_selectable_respects_claims() {
        let now: DateTime<Utc> = "2024-01-09T14:00:00Z".parse().unwrap();
        let mut r = reminder();
        assert!(r.selectable(now, "worker-b"));

        r.claim = Some(Claim {
            owner: "worker-a".to_string(),
            expires_at: now + chrono::Duration::seconds(120),
        });
        assert!(!r.selectable(now, "worker-b"));
        assert!(r.selectable(now, "worker-a"));

        // Expired claim opens the reminder back up
        assert!(r.selectable(now + chrono::Duration::seconds(120), "worker-b"));
    }

    #[test]
    fn test_selectable_requires_due_pending() {
        let now: DateTime<Utc> = "2024-01-09T14:00:00Z".parse().unwrap();
        let mut r = reminder();
        r.scheduled_for = now + chrono::Duration::minutes(1);
        assert!(!r.selectable(now, "w"));

        r.scheduled_for = now;
        r.mark_sent(now);
        assert!(!r.selectable(now, "w"));
    }
}
