//! Settings repository over the persistent store.
//!
//! One JSON map per tenant (`reminder_settings:{tenant}`, patient id ->
//! settings). Read-modify-write cycles are serialized behind a single lock;
//! reads go straight to the store so there is no in-memory mirror to drift.

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::domain::PatientContact;
use crate::storage::{settings_key, PersistentStore};

use super::{ReminderSettings, SettingsPatch};

pub struct SettingsStore {
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn PersistentStore>, clock: Arc<dyn Clock>) -> Self {
        SettingsStore {
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Settings for one patient, if initialized
    pub async fn get(&self, tenant_id: &str, patient_id: &str) -> Result<Option<ReminderSettings>> {
        let all = self.load(tenant_id).await?;
        Ok(all.get(patient_id).cloned())
    }

    /// Create the settings record for a patient unless one already exists.
    ///
    /// Idempotent: calling this again returns the existing record untouched,
    /// it never duplicates or overwrites.
    pub async fn initialize(
        &self,
        tenant_id: &str,
        patient_id: &str,
        contact: Option<&PatientContact>,
    ) -> Result<ReminderSettings> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.load(tenant_id).await?;
        if let Some(existing) = all.get(patient_id) {
            debug!("Settings already initialized for patient {patient_id}");
            return Ok(existing.clone());
        }

        let settings =
            ReminderSettings::defaults(tenant_id, patient_id, contact, self.clock.now());
        all.insert(patient_id.to_string(), settings.clone());
        self.save(tenant_id, &all).await?;

        info!("Initialized reminder settings for patient {patient_id} (tenant {tenant_id})");
        Ok(settings)
    }

    /// Apply a partial update to an existing settings record
    pub async fn update(
        &self,
        tenant_id: &str,
        patient_id: &str,
        patch: SettingsPatch,
    ) -> Result<ReminderSettings> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.load(tenant_id).await?;
        let settings = all
            .get_mut(patient_id)
            .ok_or_else(|| anyhow!("no reminder settings for patient {patient_id}"))?;

        patch.apply(settings);
        settings.updated_at = self.clock.now();
        let updated = settings.clone();
        self.save(tenant_id, &all).await?;

        debug!("Updated reminder settings for patient {patient_id}");
        Ok(updated)
    }

    async fn load(&self, tenant_id: &str) -> Result<HashMap<String, ReminderSettings>> {
        let key = settings_key(tenant_id);
        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("corrupt settings collection at {key}")),
            None => Ok(HashMap::new()),
        }
    }

    async fn save(&self, tenant_id: &str, all: &HashMap<String, ReminderSettings>) -> Result<()> {
        let raw = serde_json::to_string(all)?;
        self.store.put(&settings_key(tenant_id), raw).await
    }
}
