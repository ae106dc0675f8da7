//! Message processing pipeline
//!
//! Parses one outgoing message and walks every recipient through key
//! resolution, the policy decision, envelope construction, annotation and
//! delivery. Recipients are handled strictly in order and each one gets an
//! independently derived message.

use crate::crypto::Encryptor;
use crate::keys::{AliasTable, KeyDirectory, KeyResolver};
use crate::mime::{build_encrypted_message, flatten_for_encryption, Message};
use crate::policy::{Decision, EncryptionPolicy};
use crate::transport::Transport;
use tracing::{debug, error, info, warn};
use zeyple_common::types::RecipientKey;
use zeyple_common::{Config, Result};

/// A message handed to the transport for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub recipient: String,
    pub message: Message,
}

/// The outbound encryption filter
pub struct Zeyple<D: KeyDirectory, T: Transport> {
    directory: D,
    transport: T,
    aliases: AliasTable,
    policy: EncryptionPolicy,
}

impl<D: KeyDirectory, T: Transport> Zeyple<D, T> {
    pub fn new(directory: D, transport: T, aliases: AliasTable, policy: EncryptionPolicy) -> Self {
        Self {
            directory,
            transport,
            aliases,
            policy,
        }
    }

    /// Create a filter using the policy and aliases of `config`
    pub fn from_config(config: &Config, directory: D, transport: T) -> Self {
        let aliases = AliasTable::from(&config.keyaliases);
        debug!("Loaded {} key alias(es)", aliases.len());

        Self::new(
            directory,
            transport,
            aliases,
            EncryptionPolicy::from(&config.zeyple),
        )
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Process a raw message for `recipients`.
    ///
    /// Returns the delivered messages in recipient order; dropped recipients
    /// are left out. Any parse, key, engine or transport error aborts the
    /// whole call. Deliveries already made are not rolled back.
    pub async fn process_message(&self, data: &[u8], recipients: &[String]) -> Result<Vec<Delivered>> {
        let message = Message::parse(data).map_err(|e| {
            error!("Failed to parse incoming message: {}", e);
            e
        })?;

        let message_id = message
            .message_id()
            .unwrap_or_else(|| "<no message id>".to_string());
        info!("Processing outgoing message {}", message_id);

        if recipients.is_empty() {
            warn!("Cannot find any recipients, ignoring");
        }

        let sender = message.sender();
        let mut delivered = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            match self
                .process_recipient(&message, sender.as_deref(), recipient)
                .await
            {
                Ok(Some(outgoing)) => delivered.push(Delivered {
                    recipient: recipient.clone(),
                    message: outgoing,
                }),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        "Aborting message {} at recipient {}: {}",
                        message_id, recipient, e
                    );
                    return Err(e);
                }
            }
        }

        Ok(delivered)
    }

    /// Run one recipient through the pipeline. `None` means dropped.
    async fn process_recipient(
        &self,
        message: &Message,
        sender: Option<&str>,
        recipient: &str,
    ) -> Result<Option<Message>> {
        let key = KeyResolver::new(&self.directory, &self.aliases)
            .resolve(recipient)
            .await?;

        let outgoing = match self.policy.decide(recipient, key) {
            Decision::Encrypt(key) => self.encrypt_message(message, &key).await?,
            Decision::PassThrough => message.clone(),
            Decision::Drop => return Ok(None),
        };
        let outgoing = self.policy.annotate(outgoing);

        self.transport
            .deliver(sender, recipient, &outgoing.to_bytes())
            .await?;

        Ok(Some(outgoing))
    }

    /// Build the PGP/MIME message for `key`
    pub async fn encrypt_message(&self, message: &Message, key: &RecipientKey) -> Result<Message> {
        let plaintext = flatten_for_encryption(message);
        let ciphertext = Encryptor::new(&self.directory)
            .encrypt(&plaintext, key)
            .await?;

        Ok(build_encrypted_message(message, &ciphertext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::{Body, ENCRYPTED_FILENAME};
    use crate::testing::{MemoryDirectory, RecordingTransport};
    use pretty_assertions::assert_eq;
    use zeyple_common::config::FileFormat;
    use zeyple_common::types::PROVENANCE_HEADER;
    use zeyple_common::Error;

    const PLAIN: &[u8] = b"Message-ID: <1@example.com>\nFrom: Alice <alice@example.com>\nTo: bob@example.com\nSubject: hi\nContent-Type: text/plain\n\nhello";

    fn zeyple(
        directory: MemoryDirectory,
        force_encrypt: bool,
        add_header: bool,
    ) -> Zeyple<MemoryDirectory, RecordingTransport> {
        Zeyple::new(
            directory,
            RecordingTransport::new(),
            AliasTable::new(),
            EncryptionPolicy::new(force_encrypt, add_header),
        )
    }

    fn recipients(addresses: &[&str]) -> Vec<String> {
        addresses.iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn test_pass_through_keeps_body() {
        let zeyple = zeyple(MemoryDirectory::new(), false, false);

        let delivered = zeyple
            .process_message(PLAIN, &recipients(&["bob@example.com"]))
            .await
            .unwrap();

        assert_eq!(delivered.len(), 1);
        let original = Message::parse(PLAIN).unwrap();
        assert_eq!(delivered[0].message.body_bytes(), original.body_bytes());

        let deliveries = zeyple.transport().deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].2, PLAIN.to_vec());
    }

    #[tokio::test]
    async fn test_encrypted_envelope() {
        let directory = MemoryDirectory::new().with_key("bob@example.com", "BOB00001");
        let zeyple = zeyple(directory, false, false);

        let delivered = zeyple
            .process_message(PLAIN, &recipients(&["bob@example.com"]))
            .await
            .unwrap();
        let message = &delivered[0].message;

        let content_type = message.content_type();
        assert_eq!(content_type.mime_type(), "multipart/encrypted");
        assert_eq!(content_type.param("protocol"), Some("application/pgp-encrypted"));
        assert_eq!(message.header("Subject").as_deref(), Some("hi"));

        let parts = message.parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].content_type().mime_type(), "application/pgp-encrypted");
        assert_eq!(parts[0].body_bytes(), b"Version: 1\n");
        assert_eq!(parts[1].content_type().mime_type(), "application/octet-stream");
        assert_eq!(parts[1].content_type().param("name"), Some(ENCRYPTED_FILENAME));

        let encryptions = zeyple.directory().encryptions();
        assert_eq!(encryptions.len(), 1);
        let (plaintext, key_ids) = &encryptions[0];
        assert_eq!(key_ids, &vec!["BOB00001".to_string()]);
        assert_eq!(
            parts[1].body_bytes(),
            MemoryDirectory::ciphertext_for(plaintext, key_ids).as_slice()
        );

        // The plaintext is the message wrapped in multipart/mixed
        let inner = Message::parse(plaintext).unwrap();
        assert_eq!(inner.content_type().mime_type(), "multipart/mixed");
        assert_eq!(inner.parts()[0].content_type().mime_type(), "text/plain");
        assert_eq!(inner.parts()[0].body_bytes(), b"hello");

        // What went over the wire is what was returned
        let deliveries = zeyple.transport().deliveries();
        assert_eq!(deliveries[0].2, message.to_bytes());
    }

    #[tokio::test]
    async fn test_recipients_get_independent_messages() {
        let directory = MemoryDirectory::new()
            .with_key("bob@example.com", "BOB00001")
            .with_key("carol@example.com", "CAROL001");
        let zeyple = zeyple(directory, false, false);

        let delivered = zeyple
            .process_message(
                PLAIN,
                &recipients(&["bob@example.com", "dave@example.com", "carol@example.com"]),
            )
            .await
            .unwrap();

        let order: Vec<&str> = delivered.iter().map(|d| d.recipient.as_str()).collect();
        assert_eq!(order, vec!["bob@example.com", "dave@example.com", "carol@example.com"]);

        let bob = &delivered[0].message;
        let dave = &delivered[1].message;
        let carol = &delivered[2].message;

        assert_ne!(bob, carol);
        assert!(String::from_utf8_lossy(bob.parts()[1].body_bytes()).contains("BOB00001"));
        assert!(String::from_utf8_lossy(carol.parts()[1].body_bytes()).contains("CAROL001"));

        // The clear copy is unaffected by the encrypted ones around it
        assert_eq!(dave.to_bytes(), PLAIN.to_vec());
        assert!(!dave.is_multipart());
    }

    #[tokio::test]
    async fn test_force_encrypt_drops_recipient() {
        let directory = MemoryDirectory::new().with_key("bob@example.com", "BOB00001");
        let zeyple = zeyple(directory, true, false);

        let delivered = zeyple
            .process_message(PLAIN, &recipients(&["dave@example.com", "bob@example.com"]))
            .await
            .unwrap();

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].recipient, "bob@example.com");
        assert_eq!(zeyple.transport().recipients(), vec!["bob@example.com"]);
    }

    #[tokio::test]
    async fn test_add_header() {
        let directory = MemoryDirectory::new().with_key("bob@example.com", "BOB00001");
        let zeyple = zeyple(directory, false, true);

        let delivered = zeyple
            .process_message(PLAIN, &recipients(&["bob@example.com", "dave@example.com"]))
            .await
            .unwrap();

        for item in &delivered {
            assert_eq!(item.message.header_count(PROVENANCE_HEADER), 1);
            assert!(item
                .message
                .header(PROVENANCE_HEADER)
                .unwrap()
                .starts_with("processed by Zeyple v"));
        }
    }

    #[tokio::test]
    async fn test_no_header_by_default() {
        let directory = MemoryDirectory::new().with_key("bob@example.com", "BOB00001");
        let zeyple = zeyple(directory, false, false);

        let delivered = zeyple
            .process_message(PLAIN, &recipients(&["bob@example.com"]))
            .await
            .unwrap();
        assert_eq!(delivered[0].message.header_count(PROVENANCE_HEADER), 0);
    }

    #[tokio::test]
    async fn test_empty_recipient_list() {
        let zeyple = zeyple(MemoryDirectory::new(), false, false);

        let delivered = zeyple.process_message(PLAIN, &[]).await.unwrap();
        assert!(delivered.is_empty());
        assert!(zeyple.transport().deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_parse_error_aborts() {
        let zeyple = zeyple(MemoryDirectory::new(), false, false);

        let err = zeyple
            .process_message(b"not a header block", &recipients(&["bob@example.com"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(zeyple.transport().deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_expired_key_aborts_call() {
        let directory = MemoryDirectory::new()
            .with_key("bob@example.com", "BOB00001")
            .with_expired_key("old@example.com", "OLD00001");
        let zeyple = zeyple(directory, false, false);

        let err = zeyple
            .process_message(
                PLAIN,
                &recipients(&["bob@example.com", "old@example.com", "dave@example.com"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::KeyExpired { .. }));
        assert_eq!(zeyple.transport().recipients(), vec!["bob@example.com"]);
        assert_eq!(zeyple.directory().encryptions().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_aborts_call() {
        let directory = MemoryDirectory::new()
            .with_key("bob@example.com", "BOB00001")
            .failing_encryption();
        let zeyple = zeyple(directory, false, false);

        let err = zeyple
            .process_message(PLAIN, &recipients(&["bob@example.com"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
        assert!(zeyple.transport().deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_without_rollback() {
        let zeyple = Zeyple::new(
            MemoryDirectory::new(),
            RecordingTransport::new().failing_for("carol@example.com"),
            AliasTable::new(),
            EncryptionPolicy::default(),
        );

        let err = zeyple
            .process_message(
                PLAIN,
                &recipients(&["bob@example.com", "carol@example.com", "dave@example.com"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(zeyple.transport().recipients(), vec!["bob@example.com"]);
    }

    #[tokio::test]
    async fn test_envelope_sender_from_header() {
        let with_from = zeyple(MemoryDirectory::new(), false, false);
        with_from
            .process_message(PLAIN, &recipients(&["bob@example.com"]))
            .await
            .unwrap();
        assert_eq!(
            with_from.transport().deliveries()[0].0.as_deref(),
            Some("alice@example.com")
        );

        let without_from = zeyple(MemoryDirectory::new(), false, false);
        without_from
            .process_message(b"Subject: no sender\n\nhello\n", &recipients(&["bob@example.com"]))
            .await
            .unwrap();
        assert_eq!(without_from.transport().deliveries()[0].0, None);
    }

    #[tokio::test]
    async fn test_duplicate_recipients_resolved_each_time() {
        let directory = MemoryDirectory::new().with_key("bob@example.com", "BOB00001");
        let zeyple = zeyple(directory, false, false);

        let delivered = zeyple
            .process_message(PLAIN, &recipients(&["bob@example.com", "bob@example.com"]))
            .await
            .unwrap();

        assert_eq!(delivered.len(), 2);
        assert_eq!(zeyple.directory().searches().len(), 2);
        assert_eq!(zeyple.directory().encryptions().len(), 2);
    }

    #[tokio::test]
    async fn test_aliases_from_config() {
        let config = Config::parse(
            "[gpg]\nhome = /tmp\n\n[relay]\nhost = localhost\nport = 10026\n\n[keyaliases]\nteam@example.com = bob@example.com\n",
            FileFormat::Ini,
        )
        .unwrap();
        let directory = MemoryDirectory::new().with_key("bob@example.com", "BOB00001");
        let zeyple = Zeyple::from_config(&config, directory, RecordingTransport::new());

        let delivered = zeyple
            .process_message(PLAIN, &recipients(&["team@example.com"]))
            .await
            .unwrap();

        assert_eq!(delivered[0].recipient, "team@example.com");
        assert!(matches!(delivered[0].message.body(), Body::Multipart(_)));
        assert_eq!(zeyple.transport().recipients(), vec!["team@example.com"]);
    }
}
