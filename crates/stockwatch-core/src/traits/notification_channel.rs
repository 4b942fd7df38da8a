// # Notification Channel Trait
//
// Defines the outbound messaging primitive the Notifier delivers through.
//
// ## Implementations
//
// - Telegram Bot API: `stockwatch-notify-telegram` crate

use async_trait::async_trait;

/// Trait for outbound channel implementations
///
/// The channel receives an already composed message. Message text uses
/// lightweight markup (`*bold*`, `_italic_`) the channel is expected to render.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform one API call per delivery
///
/// ## Forbidden Capabilities
/// - ❌ Retry or queue messages (delivery is at-most-once per transition)
/// - ❌ Enforce its own timeout budget (the `Notifier` bounds every call)
/// - ❌ Log the credential
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver a message
    ///
    /// # Parameters
    ///
    /// - `destination`: Channel-specific recipient (e.g. a chat id)
    /// - `credential`: Channel-specific secret (e.g. a bot token)
    /// - `message`: Message text
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The remote acknowledged the message
    /// - `Ok(false)`: The remote rejected the message
    /// - `Err(Error)`: Transport failure
    async fn deliver(
        &self,
        destination: &str,
        credential: &str,
        message: &str,
    ) -> Result<bool, crate::Error>;

    /// Get the channel name (for logging)
    fn channel_name(&self) -> &'static str;
}

/// Helper trait for constructing channels from configuration
pub trait NotificationChannelFactory: Send + Sync {
    /// Create a NotificationChannel instance from configuration
    fn create(
        &self,
        config: &crate::config::ChannelConfig,
    ) -> Result<Box<dyn NotificationChannel>, crate::Error>;
}
