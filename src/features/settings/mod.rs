//! # Feature: Reminder Settings
//!
//! Per-patient notification preferences: global toggle, preferred channels,
//! quiet hours, timezone/language, per-channel sub-settings, per-rule
//! sub-settings, and smart scheduling policy flags. Exactly one record
//! exists per patient once initialized; initialization is idempotent.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Holiday date list backing the skip_holidays policy flag
//! - 1.0.0: Initial release with channel, quiet-hours, and rule settings

pub mod store;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::PatientContact;
use crate::features::dispatch::Channel;
use crate::features::rules::ReminderRule;

pub use store::SettingsStore;

/// Daily local-time window during which non-exempt channels are suppressed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for QuietHours {
    fn default() -> Self {
        QuietHours {
            enabled: false,
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        }
    }
}

/// Push notification sub-settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushSettings {
    pub enabled: bool,
    pub sound: bool,
    pub vibration: bool,
    /// Show message body on the lock screen
    pub preview: bool,
}

impl Default for PushSettings {
    fn default() -> Self {
        PushSettings {
            enabled: true,
            sound: true,
            vibration: true,
            preview: true,
        }
    }
}

/// Email sub-settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailSettings {
    pub enabled: bool,
    pub address: Option<String>,
}

/// SMS sub-settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmsSettings {
    pub enabled: bool,
    pub phone_number: Option<String>,
}

/// Chat-style messenger sub-settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessengerSettings {
    pub enabled: bool,
    pub handle: Option<String>,
}

/// In-app notification sub-settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InAppSettings {
    pub enabled: bool,
}

impl Default for InAppSettings {
    fn default() -> Self {
        InAppSettings { enabled: true }
    }
}

/// All per-channel sub-settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    pub push: PushSettings,
    pub email: EmailSettings,
    pub sms: SmsSettings,
    pub messenger: MessengerSettings,
    pub in_app: InAppSettings,
}

impl ChannelConfig {
    pub fn is_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Push => self.push.enabled,
            Channel::Email => self.email.enabled,
            Channel::Sms => self.sms.enabled,
            Channel::Messenger => self.messenger.enabled,
            Channel::InApp => self.in_app.enabled,
        }
    }

    /// Destination for a channel. Push and in-app deliver to the patient's
    /// device/session, so the patient id is the destination there.
    pub fn destination(&self, channel: Channel, patient_id: &str) -> Option<String> {
        let value = match channel {
            Channel::Push | Channel::InApp => Some(patient_id.to_string()),
            Channel::Email => self.email.address.clone(),
            Channel::Sms => self.sms.phone_number.clone(),
            Channel::Messenger => self.messenger.handle.clone(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

/// Per-rule sub-settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeSettings {
    pub enabled: bool,
    /// Channels for this rule; empty means fall back to preferred_channels
    pub channels: Vec<Channel>,
    /// Local time-of-day for time-of-day rules (exercise reminders)
    pub custom_time: Option<NaiveTime>,
    /// Allowed snooze durations in minutes
    pub snooze_options: Vec<u32>,
}

impl Default for TypeSettings {
    fn default() -> Self {
        TypeSettings {
            enabled: true,
            channels: Vec::new(),
            custom_time: None,
            snooze_options: vec![10, 30, 60],
        }
    }
}

/// Smart scheduling policy flags
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmartPolicy {
    pub adaptive_scheduling: bool,
    pub skip_weekends: bool,
    pub skip_holidays: bool,
    /// Dates treated as holidays when skip_holidays is set
    pub holidays: Vec<NaiveDate>,
    pub consolidate_reminders: bool,
}

/// One settings record per patient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderSettings {
    pub patient_id: String,
    pub tenant_id: String,
    /// Global toggle; disabled cancels pending reminders at processing time
    pub enabled: bool,
    pub preferred_channels: Vec<Channel>,
    pub quiet_hours: QuietHours,
    /// IANA timezone name; invalid names fall back to UTC at evaluation time
    pub timezone: String,
    pub language: String,
    pub channels: ChannelConfig,
    pub types: HashMap<ReminderRule, TypeSettings>,
    pub smart: SmartPolicy,
    pub updated_at: DateTime<Utc>,
}

impl ReminderSettings {
    /// Build the default settings record for a patient, seeding email/SMS
    /// channels from known contact data.
    pub fn defaults(
        tenant_id: &str,
        patient_id: &str,
        contact: Option<&PatientContact>,
        now: DateTime<Utc>,
    ) -> Self {
        let email = contact.and_then(|c| c.email.clone());
        let phone = contact.and_then(|c| c.phone.clone());

        let mut types = HashMap::new();
        for rule in ReminderRule::ALL {
            let mut settings = TypeSettings::default();
            if rule == ReminderRule::ExerciseDaily {
                settings.custom_time = NaiveTime::from_hms_opt(9, 0, 0);
            }
            types.insert(rule, settings);
        }

        ReminderSettings {
            patient_id: patient_id.to_string(),
            tenant_id: tenant_id.to_string(),
            enabled: true,
            preferred_channels: vec![Channel::Push],
            quiet_hours: QuietHours::default(),
            timezone: "UTC".to_string(),
            language: "en".to_string(),
            channels: ChannelConfig {
                email: EmailSettings {
                    enabled: email.is_some(),
                    address: email,
                },
                sms: SmsSettings {
                    enabled: phone.is_some(),
                    phone_number: phone,
                },
                ..ChannelConfig::default()
            },
            types,
            smart: SmartPolicy::default(),
            updated_at: now,
        }
    }

    pub fn channel_enabled(&self, channel: Channel) -> bool {
        self.channels.is_enabled(channel)
    }

    pub fn rule_settings(&self, rule: ReminderRule) -> Option<&TypeSettings> {
        self.types.get(&rule)
    }

    /// Channels a rule should use: its own list, or preferred_channels
    /// when the rule has none configured.
    pub fn channels_for_rule(&self, rule: ReminderRule) -> Vec<Channel> {
        let from_rule = self
            .rule_settings(rule)
            .map(|t| t.channels.clone())
            .unwrap_or_default();
        if !from_rule.is_empty() {
            return from_rule;
        }
        if !self.preferred_channels.is_empty() {
            return self.preferred_channels.clone();
        }
        vec![Channel::Push]
    }

    /// Parsed timezone, falling back to UTC on invalid names
    pub fn tz(&self) -> Tz {
        match self.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(
                    "Invalid timezone {:?} for patient {}, falling back to UTC",
                    self.timezone, self.patient_id
                );
                Tz::UTC
            }
        }
    }
}

/// Field-wise partial update for `ReminderSettings`; `None` leaves the
/// current value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub enabled: Option<bool>,
    pub preferred_channels: Option<Vec<Channel>>,
    pub quiet_hours: Option<QuietHours>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub push: Option<PushSettings>,
    pub email: Option<EmailSettings>,
    pub sms: Option<SmsSettings>,
    pub messenger: Option<MessengerSettings>,
    pub in_app: Option<InAppSettings>,
    pub types: Option<HashMap<ReminderRule, TypeSettings>>,
    pub smart: Option<SmartPolicy>,
}

impl SettingsPatch {
    /// Apply this patch to a settings record
    pub fn apply(self, settings: &mut ReminderSettings) {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(channels) = self.preferred_channels {
            settings.preferred_channels = channels;
        }
        if let Some(quiet_hours) = self.quiet_hours {
            settings.quiet_hours = quiet_hours;
        }
        if let Some(timezone) = self.timezone {
            settings.timezone = timezone;
        }
        if let Some(language) = self.language {
            settings.language = language;
        }
        if let Some(push) = self.push {
            settings.channels.push = push;
        }
        if let Some(email) = self.email {
            settings.channels.email = email;
        }
        if let Some(sms) = self.sms {
            settings.channels.sms = sms;
        }
        if let Some(messenger) = self.messenger {
            settings.channels.messenger = messenger;
        }
        if let Some(in_app) = self.in_app {
            settings.channels.in_app = in_app;
        }
        if let Some(types) = self.types {
            settings.types = types;
        }
        if let Some(smart) = self.smart {
            settings.smart = smart;
        }
    }
}
