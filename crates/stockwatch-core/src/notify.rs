//! Transition notifications
//!
//! [`compose_message`] renders a [`Notification`] as lightweight markup and
//! [`Notifier`] delivers it through a [`NotificationChannel`] under a time
//! budget. Delivery never fails the caller: every outcome, including
//! timeouts and transport errors, is reported as a [`DeliveryOutcome`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::Error;
use crate::config::ChannelConfig;
use crate::model::{AvailabilityRecord, Resource, Status};
use crate::traits::NotificationChannel;

/// Timestamp layout used in messages
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Direction of a status change, judged by the availability predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    BecameAvailable,
    BecameUnavailable,
    /// Both sides read the same way (e.g. `"72H"` -> `"available"`)
    Changed { from: Status, to: Status },
}

impl StatusChange {
    pub fn between(previous: &Status, current: &Status) -> Self {
        match (previous.is_available(), current.is_available()) {
            (false, true) => StatusChange::BecameAvailable,
            (true, false) => StatusChange::BecameUnavailable,
            _ => StatusChange::Changed {
                from: previous.clone(),
                to: current.clone(),
            },
        }
    }
}

impl fmt::Display for StatusChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusChange::BecameAvailable => f.write_str("✅ Status change: unavailable → available"),
            StatusChange::BecameUnavailable => {
                f.write_str("❌ Status change: available → unavailable")
            }
            StatusChange::Changed { from, to } => write!(
                f,
                "🔄 Status change: {} → {}",
                escape_markdown(from.as_str()),
                escape_markdown(to.as_str())
            ),
        }
    }
}

/// Everything needed to describe one transition
#[derive(Debug, Clone)]
pub struct Notification {
    pub resource: Resource,
    /// Index into `resource.locations`
    pub location_index: usize,
    /// Whether the rule narrows to specific locations
    pub scoped: bool,
    pub now: DateTime<Utc>,
    /// Human readable time since the previous transition
    pub elapsed: Option<String>,
    pub previous_status: Option<Status>,
}

impl Notification {
    /// The location this notification is about
    pub fn location(&self) -> Option<&AvailabilityRecord> {
        self.resource.locations.get(self.location_index)
    }

    pub fn change(&self) -> Option<StatusChange> {
        let current = self.location()?;
        self.previous_status
            .as_ref()
            .map(|previous| StatusChange::between(previous, &current.status))
    }
}

/// Render a notification as Markdown
///
/// Returns `None` when `location_index` is out of range.
pub fn compose_message(notification: &Notification) -> Option<String> {
    let location = notification.location()?;
    let resource = &notification.resource;

    let mut lines = vec![
        "🔔 *Server availability changed!*".to_string(),
        String::new(),
        format!("*Model:* {}", escape_markdown(&resource.display_name)),
        format!("*Plan code:* {}", escape_markdown(&resource.plan_code)),
        format!("*FQN:* {}", escape_markdown(&resource.identifier)),
        format!("*Memory:* {}", escape_markdown(&resource.memory)),
        format!("*Storage:* {}", escape_markdown(&resource.storage)),
        format!("*System storage:* {}", escape_markdown(&resource.system_storage)),
    ];
    if !resource.gpu.is_empty() {
        lines.push(format!("*GPU:* {}", escape_markdown(&resource.gpu)));
    }

    lines.push(String::new());
    lines.push(format!("*Datacenter:* {}", escape_markdown(&location.location)));
    lines.push(format!(
        "*Current status:* {}",
        escape_markdown(location.status.as_str())
    ));
    lines.push(String::new());

    if let Some(change) = notification.change() {
        lines.push(change.to_string());
    }
    lines.push(format!(
        "🕒 Notification time: {}",
        notification.now.format(TIME_FORMAT)
    ));
    if let Some(elapsed) = &notification.elapsed {
        lines.push(format!("⏱️ Since last change: {}", elapsed));
    }

    Some(lines.join("\n"))
}

/// Escape characters that legacy Markdown would read as entity markers
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The channel acknowledged the message
    Delivered,
    /// The channel answered but refused the message
    Rejected,
    /// Preconditions failed; nothing was sent
    Skipped(String),
    /// Transport error or timeout
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Delivered => f.write_str("delivered"),
            DeliveryOutcome::Rejected => f.write_str("rejected by channel"),
            DeliveryOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            DeliveryOutcome::Failed(error) => write!(f, "failed: {}", error),
        }
    }
}

/// Formats and delivers transition messages
pub struct Notifier {
    channel: Arc<dyn NotificationChannel>,
    timeout: Duration,
}

impl Notifier {
    pub fn new(channel: Arc<dyn NotificationChannel>, timeout: Duration) -> Self {
        Self { channel, timeout }
    }

    /// Send a notification
    ///
    /// The channel must be enabled and carry a destination and credential,
    /// otherwise nothing is sent.
    pub async fn send(&self, config: &ChannelConfig, notification: &Notification) -> DeliveryOutcome {
        if !config.enabled {
            return DeliveryOutcome::Skipped("channel disabled".to_string());
        }
        if config.destination.is_empty() || config.credential.is_empty() {
            return DeliveryOutcome::Skipped("channel destination or credential missing".to_string());
        }

        let Some(message) = compose_message(notification) else {
            return DeliveryOutcome::Skipped(format!(
                "location index {} out of range for {}",
                notification.location_index, notification.resource.identifier
            ));
        };

        debug!(
            channel = self.channel.channel_name(),
            scoped = notification.scoped,
            "Delivering notification for {}",
            notification.resource.identifier
        );

        let delivery = self
            .channel
            .deliver(&config.destination, &config.credential, &message);

        let outcome = match tokio::time::timeout(self.timeout, delivery).await {
            Ok(Ok(true)) => DeliveryOutcome::Delivered,
            Ok(Ok(false)) => DeliveryOutcome::Rejected,
            Ok(Err(e)) => DeliveryOutcome::Failed(e.to_string()),
            Err(_) => DeliveryOutcome::Failed(
                Error::timeout(format!(
                    "{} delivery exceeded {}s",
                    self.channel.channel_name(),
                    self.timeout.as_secs()
                ))
                .to_string(),
            ),
        };

        match &outcome {
            DeliveryOutcome::Delivered => info!(
                channel = self.channel.channel_name(),
                "Notification delivered for {}", notification.resource.identifier
            ),
            other => warn!(
                channel = self.channel.channel_name(),
                "Notification for {} not delivered: {}", notification.resource.identifier, other
            ),
        }

        outcome
    }

    pub fn channel_name(&self) -> &'static str {
        self.channel.channel_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationChannel for Capture {
        async fn deliver(&self, _: &str, _: &str, message: &str) -> Result<bool, Error> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(true)
        }

        fn channel_name(&self) -> &'static str {
            "capture"
        }
    }

    struct Hang;

    #[async_trait]
    impl NotificationChannel for Hang {
        async fn deliver(&self, _: &str, _: &str, _: &str) -> Result<bool, Error> {
            std::future::pending().await
        }

        fn channel_name(&self) -> &'static str {
            "hang"
        }
    }

    struct Broken;

    #[async_trait]
    impl NotificationChannel for Broken {
        async fn deliver(&self, _: &str, _: &str, _: &str) -> Result<bool, Error> {
            Err(Error::http("connection refused"))
        }

        fn channel_name(&self) -> &'static str {
            "broken"
        }
    }

    fn config() -> ChannelConfig {
        ChannelConfig::telegram("12345", "token")
    }

    fn notification(previous: Option<&str>) -> Notification {
        Notification {
            resource: Resource::new("baremetal_ab-2-14", "ab-2-14")
                .with_display_name("AB-2-14")
                .with_location("gra1", "available"),
            location_index: 0,
            scoped: true,
            now: Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap(),
            elapsed: Some("2m 5s".to_string()),
            previous_status: previous.map(Status::new),
        }
    }

    #[test]
    fn test_status_change_direction() {
        let s = Status::new;
        assert_eq!(
            StatusChange::between(&s("unavailable"), &s("72H")),
            StatusChange::BecameAvailable
        );
        assert_eq!(
            StatusChange::between(&s("available"), &s("unknown")),
            StatusChange::BecameUnavailable
        );
        assert_eq!(
            StatusChange::between(&s("72H"), &s("available")),
            StatusChange::Changed { from: s("72H"), to: s("available") }
        );
    }

    #[test]
    fn test_message_contents() {
        let message = compose_message(&notification(Some("unavailable"))).unwrap();

        assert!(message.contains("*Model:* AB-2-14"));
        assert!(message.contains("*FQN:* baremetal\\_ab-2-14"));
        assert!(message.contains("*Datacenter:* gra1"));
        assert!(message.contains("*Current status:* available"));
        assert!(message.contains("unavailable → available"));
        assert!(message.contains("2025-03-01 08:30:00 UTC"));
        assert!(message.contains("Since last change: 2m 5s"));
    }

    #[test]
    fn test_message_omits_change_without_previous_status() {
        let mut n = notification(None);
        n.elapsed = None;
        let message = compose_message(&n).unwrap();
        assert!(!message.contains("Status change"));
        assert!(!message.contains("Since last change"));
    }

    #[test]
    fn test_scoped_flag_does_not_change_message() {
        let scoped = notification(Some("unavailable"));
        let mut unscoped = scoped.clone();
        unscoped.scoped = false;
        assert_eq!(compose_message(&scoped), compose_message(&unscoped));
    }

    #[tokio::test]
    async fn test_send_delivers_composed_message() {
        let channel = Arc::new(Capture::default());
        let notifier = Notifier::new(channel.clone(), Duration::from_secs(1));

        let outcome = notifier.send(&config(), &notification(Some("unavailable"))).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(channel.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_checks_preconditions() {
        let channel = Arc::new(Capture::default());
        let notifier = Notifier::new(channel.clone(), Duration::from_secs(1));
        let n = notification(Some("unavailable"));

        let mut disabled = config();
        disabled.enabled = false;
        assert!(matches!(notifier.send(&disabled, &n).await, DeliveryOutcome::Skipped(_)));

        let mut no_token = config();
        no_token.credential.clear();
        assert!(matches!(notifier.send(&no_token, &n).await, DeliveryOutcome::Skipped(_)));

        let mut bad_index = n.clone();
        bad_index.location_index = 7;
        assert!(matches!(notifier.send(&config(), &bad_index).await, DeliveryOutcome::Skipped(_)));

        assert!(channel.messages.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out() {
        let notifier = Notifier::new(Arc::new(Hang), Duration::from_secs(10));
        let outcome = notifier.send(&config(), &notification(Some("unavailable"))).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed("Timed out: hang delivery exceeded 10s".to_string())
        );
    }

    #[tokio::test]
    async fn test_send_reports_transport_error() {
        let notifier = Notifier::new(Arc::new(Broken), Duration::from_secs(1));
        let outcome = notifier.send(&config(), &notification(Some("unavailable"))).await;
        assert!(matches!(outcome, DeliveryOutcome::Failed(ref e) if e.contains("connection refused")));
        assert!(!outcome.is_delivered());
    }
}
