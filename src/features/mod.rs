//! # Features Layer
//!
//! Each feature owns one concern of the reminder engine and lives in its
//! own module with its version noted in the module header.

pub mod analytics;
pub mod delivery_log;
pub mod dispatch;
pub mod processor;
pub mod queue;
pub mod rules;
pub mod settings;

// Re-export the items callers reach for most often
pub use analytics::{AnalyticsAggregator, AnalyticsFilter, ChannelStats, ReminderAnalytics};
pub use delivery_log::{DeliveryLogEntry, DeliveryLogger, DeliveryOutcome};
pub use dispatch::{
    Channel, ChannelDispatcher, ChannelOutcome, ChannelSender, DeliveryRequest,
};
pub use processor::ReminderProcessor;
pub use queue::{ReminderQueue, ReminderStatus, ScheduledReminder};
pub use rules::ReminderRule;
pub use settings::{ReminderSettings, SettingsPatch, SettingsStore};

/// Engine version from the crate manifest
pub fn get_engine_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Feature names with their current versions, for startup logging
pub fn get_features() -> Vec<(&'static str, &'static str)> {
    vec![
        ("settings", "1.1.0"),
        ("rules", "1.0.0"),
        ("queue", "1.1.0"),
        ("dispatch", "1.0.0"),
        ("processor", "1.0.0"),
        ("delivery_log", "1.0.0"),
        ("analytics", "1.0.0"),
    ]
}
