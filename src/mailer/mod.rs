//! Outbound notifications.
//!
//! Handlers never call a [`Notifier`] inline; dispatch runs inside a tracked
//! background task so the response is not held up by delivery.

use async_trait::async_trait;

use crate::store::UserId;

/// Contents of the account welcome message.
#[derive(Debug, Clone)]
pub struct WelcomeMessage {
    pub user_id: UserId,
    pub name: String,
    /// Plaintext activation credential. Must not be logged.
    pub activation_token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(&self, recipient: &str, message: WelcomeMessage) -> Result<(), NotifyError>;
}

/// Records dispatches through tracing instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_welcome(&self, recipient: &str, message: WelcomeMessage) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %recipient,
            user_id = message.user_id,
            "Welcome message dispatched"
        );
        Ok(())
    }
}
