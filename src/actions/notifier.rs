use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Outbound message channel used by `notify` actions
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, message: &str) -> Result<()>;
}

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, channel: &str, message: &str) -> Result<()> {
        info!(channel = %channel, message = %message, "Notification dispatched");
        Ok(())
    }
}
