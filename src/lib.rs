//! # carebell
//!
//! Reminder scheduling and delivery engine for patient care: rule-driven
//! scheduling, per-patient preferences with quiet hours, multi-channel
//! dispatch, delivery logging, and on-demand analytics.
//!
//! The crate is layered bottom-up: `core` holds configuration and shared
//! helpers, `storage` the persistence seam, `features` the engine's
//! components, and [`ReminderService`] ties them together behind one facade.

// Core layer: configuration and shared helpers
pub mod core;

// Time source seam; swap in ManualClock for deterministic tests
pub mod clock;

// Care-domain records the engine schedules against
pub mod domain;

// Persistence seam and the in-memory backend
pub mod storage;

// Engine components, one concern per module
pub mod features;

// Facade wiring the components together
pub mod service;

pub use crate::core::EngineConfig;
pub use clock::{Clock, SystemClock};
pub use domain::{Appointment, Patient, PatientContact, PatientDirectory, Prescription, Therapist};
pub use features::{
    get_engine_version, get_features, AnalyticsFilter, Channel, ChannelSender, DeliveryRequest,
    ReminderAnalytics, ReminderRule, ReminderSettings, ReminderStatus, ScheduledReminder,
    SettingsPatch,
};
pub use service::ReminderService;
pub use storage::{MemoryStore, PersistentStore};
