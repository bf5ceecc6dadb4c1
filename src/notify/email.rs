use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{AlertEvent, Notifier};

/// Primary alert channel: SMTP to the monitored authority inbox.
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// All settings from env; any missing variable disables the channel
    /// (the mux skips it) instead of panicking at startup.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SMTP_HOST").context("SMTP_HOST missing")?;
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr =
            std::env::var("ALERT_EMAIL_FROM").context("ALERT_EMAIL_FROM missing")?;
        let to_addr = std::env::var("ALERT_EMAIL_TO").context("ALERT_EMAIL_TO missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr.parse().context("invalid ALERT_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid ALERT_EMAIL_TO")?;

        Ok(Self { mailer, from, to })
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, ev: &AlertEvent) -> Result<()> {
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(ev.subject.clone())
            .header(header::ContentType::TEXT_PLAIN)
            .body(ev.body.clone())
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
