//! # Feature: Reminder Processor
//!
//! The periodic loop that drains due reminders. Each tick claims due
//! pending reminders, snapshots the patient's settings, applies the
//! quiet-hours gate, fans out to enabled channels, records delivery logs,
//! and lands the reminder in a terminal status. Failure of one reminder
//! never aborts the tick; failure of one channel never blocks the others.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

pub mod quiet_hours;

use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::core::EngineConfig;
use crate::features::delivery_log::{DeliveryLogEntry, DeliveryLogger};
use crate::features::dispatch::ChannelDispatcher;
use crate::features::queue::{ReminderQueue, ScheduledReminder};
use crate::features::settings::{ReminderSettings, SettingsStore};

pub use quiet_hours::{in_quiet_hours, next_allowed_time};

pub struct ReminderProcessor {
    queue: Arc<ReminderQueue>,
    settings: Arc<SettingsStore>,
    dispatcher: Arc<ChannelDispatcher>,
    logger: Arc<DeliveryLogger>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    /// Worker identity stamped into claims
    owner: String,
}

impl ReminderProcessor {
    pub fn new(
        queue: Arc<ReminderQueue>,
        settings: Arc<SettingsStore>,
        dispatcher: Arc<ChannelDispatcher>,
        logger: Arc<DeliveryLogger>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        ReminderProcessor {
            queue,
            settings,
            dispatcher,
            logger,
            clock,
            config,
            owner: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// One polling pass: claim and process everything currently due.
    ///
    /// Returns the number of reminders handled this tick.
    pub async fn tick(&self) -> Result<usize> {
        let now = self.clock.now();
        let due = self
            .queue
            .claim_due_pending(now, &self.owner, self.config.claim_lease())
            .await?;

        if due.is_empty() {
            return Ok(0);
        }
        debug!("Processing {} due reminder(s)", due.len());

        let mut processed = 0;
        for reminder in due {
            let id = reminder.id;
            if let Err(e) = self.process_one(reminder).await {
                error!("Failed to process reminder {id}: {e}");
            } else {
                processed += 1;
            }
        }
        Ok(processed)
    }

    async fn process_one(&self, mut reminder: ScheduledReminder) -> Result<()> {
        let now = self.clock.now();

        // Settings snapshot for this tick; concurrent updates apply from
        // the next tick onward.
        let settings = self
            .settings
            .get(&reminder.tenant_id, &reminder.patient_id)
            .await?;
        let Some(settings) = settings else {
            info!(
                "Cancelling reminder {}: no settings for patient {}",
                reminder.id, reminder.patient_id
            );
            reminder.mark_cancelled("no reminder settings for patient");
            return self.queue.update(&reminder).await;
        };

        if !settings.enabled {
            info!(
                "Cancelling reminder {}: reminders disabled for patient {}",
                reminder.id, reminder.patient_id
            );
            reminder.mark_cancelled("reminders disabled");
            return self.queue.update(&reminder).await;
        }

        let rule_enabled = settings
            .rule_settings(reminder.rule)
            .map(|t| t.enabled)
            .unwrap_or(true);
        if !rule_enabled {
            info!(
                "Cancelling reminder {}: rule {} disabled for patient {}",
                reminder.id, reminder.rule, reminder.patient_id
            );
            reminder.mark_cancelled(format!("{} reminders disabled", reminder.rule));
            return self.queue.update(&reminder).await;
        }

        let exempt = reminder.channels.iter().any(|c| c.quiet_hours_exempt());
        if in_quiet_hours(&settings, now) && !exempt {
            let next = next_allowed_time(&settings, now);
            debug!(
                "Quiet hours: rescheduling reminder {} from {} to {next}",
                reminder.id, reminder.scheduled_for
            );
            reminder.reschedule(next);
            return self.queue.update(&reminder).await;
        }

        self.dispatch_all(&mut reminder, &settings).await?;
        self.queue.update(&reminder).await
    }

    /// Fan a reminder out to its enabled channels and land it in a
    /// terminal status: `sent` when any channel succeeded, else `failed`.
    async fn dispatch_all(
        &self,
        reminder: &mut ScheduledReminder,
        settings: &ReminderSettings,
    ) -> Result<()> {
        let now = self.clock.now();
        reminder.attempts += 1;
        reminder.last_attempt = Some(now);

        let mut any_sent = false;
        let mut errors = Vec::new();

        for channel in reminder.channels.clone() {
            if !settings.channel_enabled(channel) {
                debug!(
                    "Skipping disabled channel {channel} for reminder {}",
                    reminder.id
                );
                continue;
            }

            let outcome = self
                .dispatcher
                .dispatch(channel, reminder, settings, now)
                .await;

            let entry = DeliveryLogEntry::from_outcome(reminder, channel, &outcome);
            if let Err(e) = self.logger.append(entry, now).await {
                warn!("Failed to record delivery log for reminder {}: {e}", reminder.id);
            }

            if outcome.sent {
                any_sent = true;
            } else if let Some(error) = &outcome.error {
                errors.push(format!("{channel}: {error}"));
            }
            reminder.meta.channel_results.insert(channel, outcome);
        }

        if any_sent {
            reminder.mark_sent(now);
            info!(
                "Reminder {} sent (attempt {}, {} channel result(s))",
                reminder.id,
                reminder.attempts,
                reminder.meta.channel_results.len()
            );
        } else if errors.is_empty() {
            reminder.mark_failed("no enabled channels");
            warn!("Reminder {} failed: no enabled channels", reminder.id);
        } else {
            let reason = errors.join("; ");
            warn!("Reminder {} failed: {reason}", reminder.id);
            reminder.mark_failed(reason);
        }
        Ok(())
    }

    /// Polling loop: an immediate first pass, then one pass per interval,
    /// until the shutdown channel fires.
    pub async fn run(self: Arc<Self>, mut shutdown: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        info!(
            "Reminder processor started (interval: {}s, owner: {})",
            self.config.poll_interval_secs, self.owner
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(0) => {}
                        Ok(n) => debug!("Tick processed {n} reminder(s)"),
                        Err(e) => error!("Processing tick failed: {e}"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Reminder processor stopping");
                    break;
                }
            }
        }
    }
}
