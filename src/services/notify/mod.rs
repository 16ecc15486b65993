pub mod smtp;
pub mod twilio;

use async_trait::async_trait;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Logs outgoing mail instead of delivering it. Default in development.
pub struct ConsoleEmailProvider;

#[async_trait]
impl EmailProvider for ConsoleEmailProvider {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to = %to, subject = %subject, "email (console):\n{body}");
        Ok(())
    }
}

/// Logs outgoing SMS instead of delivering it. Default in development.
pub struct ConsoleSmsProvider;

#[async_trait]
impl SmsProvider for ConsoleSmsProvider {
    async fn send_sms(&self, to: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(to = %to, "sms (console): {body}");
        Ok(())
    }
}
