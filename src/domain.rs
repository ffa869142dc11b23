//! Domain inputs from the surrounding application.
//!
//! These types cross the boundary into the engine (appointments to remind
//! about, prescriptions that drive exercise reminders) but are owned and
//! persisted elsewhere. `PatientDirectory` is the read-only contact lookup
//! used to seed default notification settings.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Patient as seen by the reminder engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Therapist conducting an appointment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Therapist {
    pub id: String,
    pub name: String,
}

/// An upcoming appointment to generate lead-time reminders for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub tenant_id: String,
    pub starts_at: DateTime<Utc>,
    pub location: Option<String>,
}

/// A prescribed exercise plan; only `active` plans drive daily reminders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub name: String,
    pub active: bool,
}

/// Contact fields used to seed default channel settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientContact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Patient {
    pub fn contact(&self) -> PatientContact {
        PatientContact {
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Read-only patient contact lookup, implemented by the surrounding app
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn contact(&self, tenant_id: &str, patient_id: &str) -> Result<Option<PatientContact>>;
}
