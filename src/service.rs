//! Engine facade.
//!
//! `ReminderService` wires the repositories, dispatcher, and processor
//! together from injected collaborators (clock, store, patient directory,
//! channel senders) and owns the polling task's lifecycle. Nothing here is
//! a module-level singleton; construct one service per storage backend and
//! keep it alive for as long as reminders should flow.

use anyhow::Result;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::Clock;
use crate::core::EngineConfig;
use crate::domain::{Appointment, Patient, PatientDirectory, Prescription, Therapist};
use crate::features::analytics::{AnalyticsAggregator, AnalyticsFilter, ReminderAnalytics};
use crate::features::delivery_log::DeliveryLogger;
use crate::features::dispatch::{Channel, ChannelDispatcher, ChannelSender};
use crate::features::processor::ReminderProcessor;
use crate::features::queue::{ReminderQueue, ScheduledReminder};
use crate::features::rules;
use crate::features::settings::{ReminderSettings, SettingsPatch, SettingsStore};
use crate::features::{get_engine_version, get_features};

struct LoopHandle {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

pub struct ReminderService {
    clock: Arc<dyn Clock>,
    directory: Arc<dyn PatientDirectory>,
    settings: Arc<SettingsStore>,
    queue: Arc<ReminderQueue>,
    analytics: AnalyticsAggregator,
    processor: Arc<ReminderProcessor>,
    loop_handle: Mutex<Option<LoopHandle>>,
}

impl ReminderService {
    pub fn new(
        clock: Arc<dyn Clock>,
        store: Arc<dyn crate::storage::PersistentStore>,
        directory: Arc<dyn PatientDirectory>,
        senders: HashMap<Channel, Arc<dyn ChannelSender>>,
        config: EngineConfig,
    ) -> Self {
        let settings = Arc::new(SettingsStore::new(store.clone(), clock.clone()));
        let queue = Arc::new(ReminderQueue::new(store.clone()));
        let logger = Arc::new(DeliveryLogger::new(store, config.log_retention()));
        let dispatcher = Arc::new(ChannelDispatcher::new(senders, config.send_timeout()));
        let analytics = AnalyticsAggregator::new(
            queue.clone(),
            clock.clone(),
            chrono::Duration::days(config.analytics_window_days),
        );
        let processor = Arc::new(ReminderProcessor::new(
            queue.clone(),
            settings.clone(),
            dispatcher,
            logger,
            clock.clone(),
            config,
        ));

        ReminderService {
            clock,
            directory,
            settings,
            queue,
            analytics,
            processor,
            loop_handle: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub async fn get_settings(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Option<ReminderSettings>> {
        self.settings.get(tenant_id, patient_id).await
    }

    /// Create the patient's settings record, seeded from the patient
    /// directory. Safe to call repeatedly; existing settings win.
    pub async fn initialize_settings(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<ReminderSettings> {
        let contact = self.directory.contact(tenant_id, patient_id).await?;
        self.settings
            .initialize(tenant_id, patient_id, contact.as_ref())
            .await
    }

    pub async fn update_settings(
        &self,
        tenant_id: &str,
        patient_id: &str,
        patch: SettingsPatch,
    ) -> Result<ReminderSettings> {
        self.settings.update(tenant_id, patient_id, patch).await
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Generate and queue lead-time reminders for an appointment
    pub async fn schedule_appointment_reminders(
        &self,
        appointment: &Appointment,
        patient: &Patient,
        therapist: &Therapist,
    ) -> Result<Vec<ScheduledReminder>> {
        let settings = self
            .settings
            .initialize(&appointment.tenant_id, &patient.id, Some(&patient.contact()))
            .await?;

        let reminders = rules::appointment_reminders(
            appointment,
            patient,
            therapist,
            &settings,
            self.clock.now(),
        );
        for reminder in &reminders {
            self.queue.insert(reminder).await?;
        }
        info!(
            "Scheduled {} appointment reminder(s) for appointment {}",
            reminders.len(),
            appointment.id
        );
        Ok(reminders)
    }

    /// Generate and queue the next week of daily exercise reminders
    pub async fn schedule_daily_exercise_reminders(
        &self,
        patient: &Patient,
        prescriptions: &[Prescription],
    ) -> Result<Vec<ScheduledReminder>> {
        let settings = self
            .settings
            .initialize(&patient.tenant_id, &patient.id, Some(&patient.contact()))
            .await?;

        let reminders =
            rules::daily_exercise_reminders(patient, prescriptions, &settings, self.clock.now());
        for reminder in &reminders {
            self.queue.insert(reminder).await?;
        }
        info!(
            "Scheduled {} exercise reminder(s) for patient {}",
            reminders.len(),
            patient.id
        );
        Ok(reminders)
    }

    /// Record that the patient read a sent reminder
    pub async fn mark_reminder_read(&self, tenant_id: &str, id: Uuid) -> Result<()> {
        self.queue.mark_read(tenant_id, id, self.clock.now()).await
    }

    // ------------------------------------------------------------------
    // Analytics
    // ------------------------------------------------------------------

    pub async fn get_analytics(&self, filter: &AnalyticsFilter) -> Result<ReminderAnalytics> {
        self.analytics.compute(filter).await
    }

    // ------------------------------------------------------------------
    // Processor lifecycle
    // ------------------------------------------------------------------

    /// Run one processing pass inline (deterministic alternative to the
    /// polling loop, used by tests and batch callers)
    pub async fn process_due(&self) -> Result<usize> {
        self.processor.tick().await
    }

    /// Spawn the polling loop. Idempotent: a second call while the loop
    /// runs is a no-op.
    pub async fn start(&self) {
        let mut handle = self.loop_handle.lock().await;
        if handle.is_some() {
            warn!("Reminder processor already running");
            return;
        }

        info!(
            "Starting carebell {} (features: {})",
            get_engine_version(),
            get_features()
                .iter()
                .map(|(name, version)| format!("{name} {version}"))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let (shutdown, receiver) = mpsc::channel(1);
        let task = tokio::spawn(self.processor.clone().run(receiver));
        *handle = Some(LoopHandle { shutdown, task });
    }

    /// Signal the polling loop to stop and wait for it to wind down.
    /// In-flight claims simply expire, so stopping mid-dispatch cannot
    /// strand a reminder.
    pub async fn stop(&self) {
        let handle = self.loop_handle.lock().await.take();
        if let Some(LoopHandle { shutdown, task }) = handle {
            let _ = shutdown.send(()).await;
            if let Err(e) = task.await {
                warn!("Reminder processor task ended abnormally: {e}");
            }
        }
    }
}
