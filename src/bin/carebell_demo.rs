//! Demo runner: wires the engine to logging channel senders and walks one
//! patient through scheduling, delivery, and analytics.

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

use carebell::{
    get_engine_version, AnalyticsFilter, Appointment, Channel, ChannelSender, DeliveryRequest,
    EngineConfig, MemoryStore, Patient, PatientContact, PatientDirectory, Prescription,
    ReminderService, SystemClock, Therapist,
};

/// Sender that logs instead of calling a real gateway
struct LoggingSender;

#[async_trait]
impl ChannelSender for LoggingSender {
    async fn send(&self, request: &DeliveryRequest) -> Result<String> {
        info!(
            "[{}] -> {}: {} / {}",
            request.channel, request.destination, request.title, request.body
        );
        Ok(format!("demo-{}", uuid::Uuid::new_v4()))
    }
}

/// Directory over a fixed patient list
struct StaticDirectory {
    patients: Vec<Patient>,
}

#[async_trait]
impl PatientDirectory for StaticDirectory {
    async fn contact(&self, tenant_id: &str, patient_id: &str) -> Result<Option<PatientContact>> {
        Ok(self
            .patients
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.id == patient_id)
            .map(|p| p.contact()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    info!("carebell demo, engine version {}", get_engine_version());

    let patient = Patient {
        id: "patient-1".to_string(),
        tenant_id: "clinic-demo".to_string(),
        name: "Ana Souza".to_string(),
        email: Some("ana@example.com".to_string()),
        phone: Some("+55 11 99999-0000".to_string()),
    };
    let therapist = Therapist {
        id: "therapist-1".to_string(),
        name: "Dr. Silva".to_string(),
    };

    let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
    for channel in Channel::ALL {
        senders.insert(channel, Arc::new(LoggingSender));
    }

    let service = ReminderService::new(
        Arc::new(SystemClock),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticDirectory {
            patients: vec![patient.clone()],
        }),
        senders,
        EngineConfig::from_env(),
    );

    service
        .initialize_settings(&patient.tenant_id, &patient.id)
        .await?;

    let appointment = Appointment {
        id: "appt-1".to_string(),
        patient_id: patient.id.clone(),
        tenant_id: patient.tenant_id.clone(),
        starts_at: chrono::Utc::now() + chrono::Duration::hours(26),
        location: Some("Room 2".to_string()),
    };
    let scheduled = service
        .schedule_appointment_reminders(&appointment, &patient, &therapist)
        .await?;
    for reminder in &scheduled {
        info!("Queued {} reminder for {}", reminder.rule, reminder.scheduled_for);
    }

    let prescriptions = vec![Prescription {
        id: "rx-1".to_string(),
        patient_id: patient.id.clone(),
        name: "Knee rehabilitation plan".to_string(),
        active: true,
    }];
    let exercise = service
        .schedule_daily_exercise_reminders(&patient, &prescriptions)
        .await?;
    info!("Queued {} exercise reminder(s) for the coming week", exercise.len());

    service.start().await;
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    service.stop().await;

    let analytics = service
        .get_analytics(&AnalyticsFilter::for_tenant(&patient.tenant_id))
        .await?;
    info!(
        "Analytics: {} scheduled, {} sent, {} failed (delivery rate {:.2})",
        analytics.total_scheduled,
        analytics.total_sent,
        analytics.total_failed,
        analytics.delivery_rate
    );

    Ok(())
}
