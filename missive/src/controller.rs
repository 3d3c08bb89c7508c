use std::sync::{Arc, LazyLock};

use missive_common::{Mailbox, Signal, internal};
use missive_delivery::{
    AddressValidator, Audience, BulkSendError, BulkSender, DispatchOutcome, DnsResolver,
    FeedbackDispatcher, FeedbackEvent, Message, Recipient, Resolver, Roster, SendReport, Template,
    UnsubscribeLinks, ValidationError,
};
use missive_store::{MemorySubscriberStore, MemorySuppressionList, StoreError, SubscriberStore};
use tokio::sync::broadcast;

use crate::{config::Config, outbox::FileTransport, quota::StaticQuota, subscribers};

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Wait for CTRL+C or SIGTERM, then broadcast [`Signal::Shutdown`].
///
/// # Errors
///
/// If the signal handlers cannot be installed.
pub async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, stopping after the current message");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

/// Every component wired together from one [`Config`].
#[derive(Debug)]
pub struct Missive {
    config: Config,
    store: MemorySubscriberStore,
    suppression: MemorySuppressionList,
    validator: AddressValidator,
    links: UnsubscribeLinks,
}

impl Missive {
    /// Build from configuration, using live DNS and the configured
    /// subscriber file.
    ///
    /// # Errors
    ///
    /// If the resolver cannot be created, the links are invalid, or the
    /// subscriber file cannot be loaded.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let resolver = DnsResolver::with_dns_config(config.dns.clone())?;
        let store = match &config.subscribers {
            Some(path) => subscribers::load(path).await?,
            None => MemorySubscriberStore::new(),
        };
        let suppression = match &config.suppressions {
            Some(path) => subscribers::load_suppressions(path).await?,
            None => MemorySuppressionList::new(),
        };

        Self::new(config, Arc::new(resolver), store, suppression)
    }

    /// # Errors
    ///
    /// If the unsubscribe link settings are invalid.
    pub fn new(
        config: Config,
        resolver: Arc<dyn Resolver>,
        store: MemorySubscriberStore,
        suppression: MemorySuppressionList,
    ) -> anyhow::Result<Self> {
        let links = UnsubscribeLinks::new(&config.unsubscribe_email, &config.api_base_url)?;

        Ok(Self {
            config,
            store,
            suppression,
            validator: AddressValidator::new(resolver),
            links,
        })
    }

    #[must_use]
    pub const fn store(&self) -> &MemorySubscriberStore {
        &self.store
    }

    #[must_use]
    pub const fn suppression(&self) -> &MemorySuppressionList {
        &self.suppression
    }

    /// Validate each address concurrently, in input order.
    pub async fn validate(
        &self,
        addresses: &[String],
    ) -> Vec<(String, Result<Mailbox, ValidationError>)> {
        let results =
            futures_util::future::join_all(addresses.iter().map(|a| self.validator.validate(a)))
                .await;

        addresses.iter().cloned().zip(results).collect()
    }

    /// Render `message` as it would be sent to `to`.
    ///
    /// A verified subscriber gets their unsubscribe link; anyone else gets
    /// the message without one.
    ///
    /// # Errors
    ///
    /// If the message is invalid, the store cannot be read, or rendering
    /// fails.
    pub async fn render(&self, message: &Message, to: &str) -> anyhow::Result<Vec<u8>> {
        let message = self.with_sender(message);
        message.validate()?;

        let recipient = match self.store.get(to).await {
            Ok(subscriber) if subscriber.is_verified() => {
                Recipient::from_subscriber(&subscriber, &self.links)
            }
            Ok(_) | Err(StoreError::NotFound(_)) => Recipient::new(to),
            Err(err) => return Err(err.into()),
        };

        Ok(Template::new(&message).render(&recipient)?)
    }

    /// Run a bulk send into the outbox.
    ///
    /// # Errors
    ///
    /// If the outbox cannot be created, or as [`BulkSender::send`].
    pub async fn send(
        &self,
        message: &Message,
        audience: Audience,
        shutdown: broadcast::Receiver<Signal>,
    ) -> anyhow::Result<SendReport> {
        let transport = FileTransport::new(&self.config.outbox);
        transport.init().await?;

        let sender = BulkSender::new(
            Arc::new(self.store.clone()),
            self.validator.clone(),
            Arc::new(transport),
            Arc::new(StaticQuota(self.config.quota)),
            self.links.clone(),
            self.config.throttle.clone(),
        );

        match sender.send(&self.with_sender(message), audience, shutdown).await {
            Ok(report) => Ok(report),
            Err(BulkSendError::Halted { source, report }) => {
                internal!(
                    level = ERROR,
                    sent = report.sent,
                    error = %source,
                    retryable = source.is_retryable(),
                    "Bulk send halted"
                );
                Ok(report)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parse one feedback notification and apply it.
    ///
    /// # Errors
    ///
    /// If the payload does not parse. Per-recipient failures are logged by
    /// the dispatcher and counted in the outcome.
    pub async fn feedback(&self, payload: &str, sns: bool) -> anyhow::Result<DispatchOutcome> {
        let event = if sns {
            FeedbackEvent::from_sns(payload)?
        } else {
            FeedbackEvent::from_json(payload)?
        };

        let roster = Roster::new(
            Arc::new(self.store.clone()),
            Arc::new(self.suppression.clone()),
            self.validator.clone(),
        );

        Ok(FeedbackDispatcher::new(Arc::new(roster)).dispatch(&event).await)
    }

    /// Write the store and the suppression list back to their configured
    /// files, if any.
    ///
    /// # Errors
    ///
    /// If either file cannot be written.
    pub async fn save(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.config.subscribers {
            subscribers::save(&self.store as &dyn SubscriberStore, path).await?;
            internal!(path = %path.display(), "Subscribers saved");
        }
        if let Some(path) = &self.config.suppressions {
            subscribers::save_suppressions(&self.suppression, path).await?;
            internal!(path = %path.display(), "Suppressions saved");
        }
        Ok(())
    }

    fn with_sender(&self, message: &Message) -> Message {
        let mut message = message.clone();
        if message.from.is_empty() {
            message.from.clone_from(&self.config.sender);
        }
        message
    }
}
