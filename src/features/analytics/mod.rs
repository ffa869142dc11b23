//! # Feature: Reminder Analytics
//!
//! Delivery and read rates over a requested period, derived on demand from
//! the scheduled reminder records. Nothing here is cached or incrementally
//! maintained; every call recomputes from storage, so there is no derived
//! state to keep consistent.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::features::dispatch::Channel;
use crate::features::queue::{ReminderQueue, ReminderStatus, ScheduledReminder};
use crate::features::rules::ReminderRule;

/// Query bounds for an analytics computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsFilter {
    pub tenant_id: String,
    pub patient_id: Option<String>,
    pub rule: Option<ReminderRule>,
    /// Defaults to the trailing analytics window ending now
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AnalyticsFilter {
    pub fn for_tenant(tenant_id: &str) -> Self {
        AnalyticsFilter {
            tenant_id: tenant_id.to_string(),
            patient_id: None,
            rule: None,
            from: None,
            to: None,
        }
    }
}

/// Per-channel delivery counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelStats {
    pub sent: u64,
    pub failed: u64,
    pub rate: f64,
}

/// Derived snapshot over a period; regenerated on every call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderAnalytics {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_scheduled: u64,
    pub total_sent: u64,
    pub total_failed: u64,
    pub total_read: u64,
    /// sent / (sent + failed) over terminal reminders
    pub delivery_rate: f64,
    /// read / sent
    pub read_rate: f64,
    pub by_channel: HashMap<Channel, ChannelStats>,
}

pub struct AnalyticsAggregator {
    queue: Arc<ReminderQueue>,
    clock: Arc<dyn Clock>,
    default_window: chrono::Duration,
}

impl AnalyticsAggregator {
    pub fn new(
        queue: Arc<ReminderQueue>,
        clock: Arc<dyn Clock>,
        default_window: chrono::Duration,
    ) -> Self {
        AnalyticsAggregator {
            queue,
            clock,
            default_window,
        }
    }

    /// Compute a snapshot for the filtered reminders
    pub async fn compute(&self, filter: &AnalyticsFilter) -> Result<ReminderAnalytics> {
        let to = filter.to.unwrap_or_else(|| self.clock.now());
        let from = filter.from.unwrap_or(to - self.default_window);

        let reminders = self.queue.all(&filter.tenant_id).await?;
        Ok(aggregate(&reminders, filter, from, to))
    }
}

/// Pure aggregation over a reminder set
pub fn aggregate(
    reminders: &[ScheduledReminder],
    filter: &AnalyticsFilter,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> ReminderAnalytics {
    let matching: Vec<&ScheduledReminder> = reminders
        .iter()
        .filter(|r| r.scheduled_for >= from && r.scheduled_for <= to)
        .filter(|r| {
            filter
                .patient_id
                .as_ref()
                .map(|p| &r.patient_id == p)
                .unwrap_or(true)
        })
        .filter(|r| filter.rule.map(|rule| r.rule == rule).unwrap_or(true))
        .collect();

    let total_scheduled = matching.len() as u64;
    let total_sent = count_status(&matching, ReminderStatus::Sent);
    let total_failed = count_status(&matching, ReminderStatus::Failed);
    let total_read = matching.iter().filter(|r| r.read_at.is_some()).count() as u64;

    let mut by_channel: HashMap<Channel, ChannelStats> = HashMap::new();
    for reminder in &matching {
        for (channel, outcome) in &reminder.meta.channel_results {
            let stats = by_channel.entry(*channel).or_default();
            if outcome.sent {
                stats.sent += 1;
            } else {
                stats.failed += 1;
            }
        }
    }
    for stats in by_channel.values_mut() {
        stats.rate = ratio(stats.sent, stats.sent + stats.failed);
    }

    ReminderAnalytics {
        period_start: from,
        period_end: to,
        total_scheduled,
        total_sent,
        total_failed,
        total_read,
        delivery_rate: ratio(total_sent, total_sent + total_failed),
        read_rate: ratio(total_read, total_sent),
        by_channel,
    }
}

fn count_status(reminders: &[&ScheduledReminder], status: ReminderStatus) -> u64 {
    reminders.iter().filter(|r| r.status == status).count() as u64
}

/// Zero denominators yield 0.0 rather than NaN
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dispatch::ChannelOutcome;

    fn reminder(
        rule: ReminderRule,
        patient: &str,
        scheduled_for: &str,
        status: ReminderStatus,
    ) -> ScheduledReminder {
        let mut r = ScheduledReminder::new(
            rule,
            patient,
            "t1",
            scheduled_for.parse().unwrap(),
            "title",
            "body",
            vec![Channel::Push],
        );
        r.status = status;
        r
    }

    fn with_outcome(mut r: ScheduledReminder, channel: Channel, sent: bool) -> ScheduledReminder {
        r.meta.channel_results.insert(
            channel,
            ChannelOutcome {
                sent,
                timestamp: r.scheduled_for,
                message_id: sent.then(|| "m1".to_string()),
                error: (!sent).then(|| "boom".to_string()),
            },
        );
        r
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            "2024-01-01T00:00:00Z".parse().unwrap(),
            "2024-01-31T00:00:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn test_rates_over_terminal_reminders() {
        let (from, to) = window();
        let reminders = vec![
            with_outcome(
                reminder(ReminderRule::Appointment24h, "p1", "2024-01-09T14:00:00Z", ReminderStatus::Sent),
                Channel::Push,
                true,
            ),
            with_outcome(
                reminder(ReminderRule::Appointment24h, "p1", "2024-01-10T14:00:00Z", ReminderStatus::Failed),
                Channel::Push,
                false,
            ),
            // Pending reminder in window counts as scheduled but not in rates
            reminder(ReminderRule::ExerciseDaily, "p1", "2024-01-11T09:00:00Z", ReminderStatus::Pending),
        ];

        let analytics = aggregate(&reminders, &AnalyticsFilter::for_tenant("t1"), from, to);
        assert_eq!(analytics.total_scheduled, 3);
        assert_eq!(analytics.total_sent, 1);
        assert_eq!(analytics.total_failed, 1);
        assert!((analytics.delivery_rate - 0.5).abs() < f64::EPSILON);

        let push = analytics.by_channel.get(&Channel::Push).unwrap();
        assert_eq!(push.sent, 1);
        assert_eq!(push.failed, 1);
        assert!((push.rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_read_rate() {
        let (from, to) = window();
        let mut sent =
            reminder(ReminderRule::Appointment24h, "p1", "2024-01-09T14:00:00Z", ReminderStatus::Sent);
        sent.read_at = Some("2024-01-09T15:00:00Z".parse().unwrap());
        let unread =
            reminder(ReminderRule::Appointment24h, "p1", "2024-01-10T14:00:00Z", ReminderStatus::Sent);

        let analytics = aggregate(&[sent, unread], &AnalyticsFilter::for_tenant("t1"), from, to);
        assert_eq!(analytics.total_read, 1);
        assert!((analytics.read_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_filters_by_patient_and_rule() {
        let (from, to) = window();
        let reminders = vec![
            reminder(ReminderRule::Appointment24h, "p1", "2024-01-09T14:00:00Z", ReminderStatus::Sent),
            reminder(ReminderRule::ExerciseDaily, "p1", "2024-01-09T09:00:00Z", ReminderStatus::Sent),
            reminder(ReminderRule::Appointment24h, "p2", "2024-01-09T14:00:00Z", ReminderStatus::Sent),
        ];

        let mut filter = AnalyticsFilter::for_tenant("t1");
        filter.patient_id = Some("p1".to_string());
        filter.rule = Some(ReminderRule::Appointment24h);

        let analytics = aggregate(&reminders, &filter, from, to);
        assert_eq!(analytics.total_scheduled, 1);
    }

    #[test]
    fn test_out_of_window_reminders_excluded() {
        let (from, to) = window();
        let reminders = vec![reminder(
            ReminderRule::Appointment24h,
            "p1",
            "2023-12-01T14:00:00Z",
            ReminderStatus::Sent,
        )];

        let analytics = aggregate(&reminders, &AnalyticsFilter::for_tenant("t1"), from, to);
        assert_eq!(analytics.total_scheduled, 0);
        assert_eq!(analytics.delivery_rate, 0.0);
        assert_eq!(analytics.read_rate, 0.0);
    }

    #[tokio::test]
    async fn test_compute_defaults_to_trailing_window() {
        use crate::clock::ManualClock;
        use crate::storage::MemoryStore;

        let queue = Arc::new(ReminderQueue::new(Arc::new(MemoryStore::new())));
        let in_window =
            reminder(ReminderRule::Appointment24h, "p1", "2024-01-20T14:00:00Z", ReminderStatus::Pending);
        let out_of_window =
            reminder(ReminderRule::Appointment24h, "p1", "2023-11-01T14:00:00Z", ReminderStatus::Pending);
        queue.insert(&in_window).await.unwrap();
        queue.insert(&out_of_window).await.unwrap();

        let clock = Arc::new(ManualClock::new("2024-02-01T00:00:00Z".parse().unwrap()));
        let aggregator = AnalyticsAggregator::new(queue, clock, chrono::Duration::days(30));

        let analytics = aggregator
            .compute(&AnalyticsFilter::for_tenant("t1"))
            .await
            .unwrap();
        assert_eq!(analytics.total_scheduled, 1);
    }
}
