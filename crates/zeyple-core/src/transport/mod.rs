//! Delivery of processed messages

mod smtp;

pub use smtp::SmtpRelay;

use async_trait::async_trait;
use zeyple_common::Result;

/// Hands a finished message to the next hop for one recipient
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `message` to `to`. `from` is the envelope sender; `None`
    /// sends with a null reverse-path.
    async fn deliver(&self, from: Option<&str>, to: &str, message: &[u8]) -> Result<()>;
}
