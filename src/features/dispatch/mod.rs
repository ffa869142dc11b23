//! # Feature: Channel Dispatch
//!
//! Fans a reminder out to delivery channels. Transport implementations are
//! injected as `ChannelSender`s at construction; the dispatcher treats them
//! uniformly, so adding a channel means registering a sender, not changing
//! dispatch logic. Pre-flight validation (channel enabled, destination
//! present) turns predictable problems into deterministic failed outcomes
//! instead of errors, and every send is bounded by a timeout so one slow
//! transport cannot stall a processing tick.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::features::queue::ScheduledReminder;
use crate::features::settings::ReminderSettings;

/// Deterministic failure for a channel without destination data
pub const ERR_MISSING_DESTINATION: &str = "missing destination";

/// Deterministic failure for a channel nobody registered a sender for
pub const ERR_NO_SENDER: &str = "no sender registered";

/// Failure recorded when a send exceeds the configured timeout
pub const ERR_SEND_TIMEOUT: &str = "send timed out";

/// A delivery mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    Email,
    Sms,
    Messenger,
    InApp,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Push,
        Channel::Email,
        Channel::Sms,
        Channel::Messenger,
        Channel::InApp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Messenger => "messenger",
            Channel::InApp => "in_app",
        }
    }

    /// Email is exempt from quiet-hours suppression in the baseline policy
    pub fn quiet_hours_exempt(&self) -> bool {
        matches!(self, Channel::Email)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a transport needs to deliver one message
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub channel: Channel,
    pub destination: String,
    pub title: String,
    pub body: String,
    /// Channel hints (push sound/vibration/preview flags, reminder ids)
    pub metadata: HashMap<String, String>,
}

/// One transport implementation, injected by the surrounding application.
///
/// Returns the provider message id on success.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, request: &DeliveryRequest) -> Result<String>;
}

/// Result of one channel attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub sent: bool,
    pub timestamp: DateTime<Utc>,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl ChannelOutcome {
    fn success(timestamp: DateTime<Utc>, message_id: String) -> Self {
        ChannelOutcome {
            sent: true,
            timestamp,
            message_id: Some(message_id),
            error: None,
        }
    }

    fn failure(timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        ChannelOutcome {
            sent: false,
            timestamp,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Channel-agnostic dispatcher over a registry of senders
pub struct ChannelDispatcher {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    send_timeout: Duration,
}

impl ChannelDispatcher {
    pub fn new(senders: HashMap<Channel, Arc<dyn ChannelSender>>, send_timeout: Duration) -> Self {
        ChannelDispatcher {
            senders,
            send_timeout,
        }
    }

    /// Attempt delivery of a reminder on one channel.
    ///
    /// Never returns an error: expected failure modes (disabled channel,
    /// missing destination, transport failure, timeout) all become failed
    /// outcomes with a human-readable reason.
    pub async fn dispatch(
        &self,
        channel: Channel,
        reminder: &ScheduledReminder,
        settings: &ReminderSettings,
        now: DateTime<Utc>,
    ) -> ChannelOutcome {
        if !settings.channel_enabled(channel) {
            return ChannelOutcome::failure(now, format!("{channel} channel disabled"));
        }

        let Some(destination) = settings.channels.destination(channel, &reminder.patient_id)
        else {
            debug!(
                "No {channel} destination for patient {}, reminder {}",
                reminder.patient_id, reminder.id
            );
            return ChannelOutcome::failure(now, ERR_MISSING_DESTINATION);
        };

        let Some(sender) = self.senders.get(&channel) else {
            warn!("No sender registered for channel {channel}");
            return ChannelOutcome::failure(now, ERR_NO_SENDER);
        };

        let request = self.build_request(channel, destination, reminder, settings);
        match timeout(self.send_timeout, sender.send(&request)).await {
            Ok(Ok(message_id)) => {
                debug!(
                    "Delivered reminder {} via {channel} (message id {message_id})",
                    reminder.id
                );
                ChannelOutcome::success(now, message_id)
            }
            Ok(Err(e)) => ChannelOutcome::failure(now, e.to_string()),
            Err(_) => {
                warn!(
                    "Send of reminder {} via {channel} exceeded {:?}",
                    reminder.id, self.send_timeout
                );
                ChannelOutcome::failure(now, ERR_SEND_TIMEOUT)
            }
        }
    }

    fn build_request(
        &self,
        channel: Channel,
        destination: String,
        reminder: &ScheduledReminder,
        settings: &ReminderSettings,
    ) -> DeliveryRequest {
        let mut metadata = HashMap::new();
        metadata.insert("reminder_id".to_string(), reminder.id.to_string());
        metadata.insert("rule".to_string(), reminder.rule.as_str().to_string());
        metadata.insert("patient_id".to_string(), reminder.patient_id.clone());
        if channel == Channel::Push {
            let push = &settings.channels.push;
            metadata.insert("sound".to_string(), push.sound.to_string());
            metadata.insert("vibration".to_string(), push.vibration.to_string());
            metadata.insert("preview".to_string(), push.preview.to_string());
        }

        DeliveryRequest {
            channel,
            destination,
            title: reminder.title.clone(),
            body: reminder.body.clone(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::queue::ScheduledReminder;
    use crate::features::rules::ReminderRule;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// Sender that records requests and returns a scripted result
    pub struct MockSender {
        pub result: Result<String, String>,
        pub requests: Mutex<Vec<DeliveryRequest>>,
    }

    impl MockSender {
        fn ok(message_id: &str) -> Arc<Self> {
            Arc::new(MockSender {
                result: Ok(message_id.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(error: &str) -> Arc<Self> {
            Arc::new(MockSender {
                result: Err(error.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChannelSender for MockSender {
        async fn send(&self, request: &DeliveryRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.result {
                Ok(id) => Ok(id.clone()),
                Err(e) => Err(anyhow!("{e}")),
            }
        }
    }

    fn now() -> DateTime<Utc> {
        "2024-01-09T14:00:00Z".parse().unwrap()
    }

    fn reminder(channels: Vec<Channel>) -> ScheduledReminder {
        ScheduledReminder::new(
            ReminderRule::Appointment24h,
            "p1",
            "t1",
            now(),
            "Appointment reminder",
            "See you tomorrow",
            channels,
        )
    }

    fn settings() -> ReminderSettings {
        let mut settings = ReminderSettings::defaults("t1", "p1", None, now());
        settings.channels.email.enabled = true;
        settings
    }

    fn dispatcher(channel: Channel, sender: Arc<MockSender>) -> ChannelDispatcher {
        let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert(channel, sender);
        ChannelDispatcher::new(senders, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_dispatch_success_carries_message_id() {
        let sender = MockSender::ok("msg-1");
        let dispatcher = dispatcher(Channel::Push, sender.clone());

        let outcome = dispatcher
            .dispatch(Channel::Push, &reminder(vec![Channel::Push]), &settings(), now())
            .await;

        assert!(outcome.sent);
        assert_eq!(outcome.message_id.as_deref(), Some("msg-1"));
        assert!(outcome.error.is_none());

        let requests = sender.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].destination, "p1");
        assert_eq!(requests[0].metadata.get("sound").unwrap(), "true");
    }

    #[tokio::test]
    async fn test_dispatch_missing_destination_is_deterministic_failure() {
        let sender = MockSender::ok("msg-1");
        let dispatcher = dispatcher(Channel::Email, sender.clone());

        // Email enabled but no address configured
        let outcome = dispatcher
            .dispatch(Channel::Email, &reminder(vec![Channel::Email]), &settings(), now())
            .await;

        assert!(!outcome.sent);
        assert_eq!(outcome.error.as_deref(), Some(ERR_MISSING_DESTINATION));
        assert!(sender.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_disabled_channel_fails_without_send() {
        let sender = MockSender::ok("msg-1");
        let dispatcher = dispatcher(Channel::Sms, sender.clone());

        let outcome = dispatcher
            .dispatch(Channel::Sms, &reminder(vec![Channel::Sms]), &settings(), now())
            .await;

        assert!(!outcome.sent);
        assert_eq!(outcome.error.as_deref(), Some("sms channel disabled"));
        assert!(sender.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_unregistered_sender() {
        let dispatcher = ChannelDispatcher::new(HashMap::new(), Duration::from_secs(5));

        let outcome = dispatcher
            .dispatch(Channel::Push, &reminder(vec![Channel::Push]), &settings(), now())
            .await;

        assert!(!outcome.sent);
        assert_eq!(outcome.error.as_deref(), Some(ERR_NO_SENDER));
    }

    #[tokio::test]
    async fn test_dispatch_sender_error_becomes_failed_outcome() {
        let sender = MockSender::failing("provider rejected");
        let dispatcher = dispatcher(Channel::Push, sender);

        let outcome = dispatcher
            .dispatch(Channel::Push, &reminder(vec![Channel::Push]), &settings(), now())
            .await;

        assert!(!outcome.sent);
        assert_eq!(outcome.error.as_deref(), Some("provider rejected"));
    }

    #[tokio::test]
    async fn test_dispatch_times_out_slow_sender() {
        struct SlowSender;

        #[async_trait]
        impl ChannelSender for SlowSender {
            async fn send(&self, _request: &DeliveryRequest) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("never".to_string())
            }
        }

        let mut senders: HashMap<Channel, Arc<dyn ChannelSender>> = HashMap::new();
        senders.insert(Channel::Push, Arc::new(SlowSender));
        let dispatcher = ChannelDispatcher::new(senders, Duration::from_millis(20));

        let outcome = dispatcher
            .dispatch(Channel::Push, &reminder(vec![Channel::Push]), &settings(), now())
            .await;

        assert!(!outcome.sent);
        assert_eq!(outcome.error.as_deref(), Some(ERR_SEND_TIMEOUT));
    }

    #[test]
    fn test_channel_serde_names() {
        assert_eq!(serde_json::to_string(&Channel::InApp).unwrap(), "\"in_app\"");
        assert_eq!(
            serde_json::from_str::<Channel>("\"messenger\"").unwrap(),
            Channel::Messenger
        );
    }

    #[test]
    fn test_only_email_is_quiet_hours_exempt() {
        for channel in Channel::ALL {
            assert_eq!(channel.quiet_hours_exempt(), channel == Channel::Email);
        }
    }
}
