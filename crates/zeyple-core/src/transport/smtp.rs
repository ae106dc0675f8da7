//! SMTP relay transport

use super::Transport;
use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info};
use zeyple_common::config::RelayConfig;
use zeyple_common::{Error, Result};

/// SMTP command timeout
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers over a plain SMTP connection to the configured relay, normally
/// the MTA's re-injection port
pub struct SmtpRelay {
    host: String,
    port: u16,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpRelay {
    pub fn new(config: &RelayConfig) -> Self {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Self {
            host: config.host.clone(),
            port: config.port,
            mailer,
        }
    }

    /// `host:port` of the relay
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Build the SMTP envelope for a single recipient
fn envelope(from: Option<&str>, to: &str) -> Result<Envelope> {
    let sender = from
        .map(|f| {
            f.parse::<Address>()
                .map_err(|e| Error::Transport(format!("Invalid sender address {}: {}", f, e)))
        })
        .transpose()?;
    let recipient = to
        .parse::<Address>()
        .map_err(|e| Error::Transport(format!("Invalid recipient address {}: {}", to, e)))?;

    Envelope::new(sender, vec![recipient])
        .map_err(|e| Error::Transport(format!("Invalid envelope: {}", e)))
}

#[async_trait]
impl Transport for SmtpRelay {
    async fn deliver(&self, from: Option<&str>, to: &str, message: &[u8]) -> Result<()> {
        let envelope = envelope(from, to)?;

        info!("Sending message to {} via {}", to, self.endpoint());
        let response = self
            .mailer
            .send_raw(&envelope, message)
            .await
            .map_err(|e| Error::Transport(format!("Relay {} rejected message: {}", self.endpoint(), e)))?;
        debug!("Relay response: {:?}", response);
        info!("Message sent");

        Ok(())
    }
}
