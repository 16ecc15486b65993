use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::EmailProvider;

pub struct SmtpEmailProvider {
    transport: SmtpTransport,
    from: String,
}

impl SmtpEmailProvider {
    pub fn new(
        server: &str,
        port: u16,
        username: String,
        password: String,
        from: String,
    ) -> anyhow::Result<Self> {
        let transport = SmtpTransport::relay(server)
            .context("failed to configure SMTP relay")?
            .port(port)
            .credentials(Credentials::new(username, password))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse().context("invalid sender address")?)
            .to(to.parse().context("invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("failed to build email")?;

        // lettre's SMTP transport is synchronous; keep it off the runtime
        // worker threads.
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .context("email send task panicked")?
            .context("SMTP delivery failed")?;

        Ok(())
    }
}
