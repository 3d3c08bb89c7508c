//! Bulk sends to the whole list or to an explicit set of addresses.
//!
//! A run is one sequential loop. Everything that can fail for the run as a
//! whole (an unsendable message, invalid recipients, too little quota) is
//! checked before the first message goes out. After that, per-recipient
//! failures are collected into the [`SendReport`] and the loop carries on.
//!
//! ```text
//! validate message -> template -> recipients -> capacity check
//!   for each recipient:
//!     shutdown? -> pace -> render -> transport -> record
//! ```

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use futures_util::future::join_all;
use missive_common::{Signal, Subscriber, SubscriberStatus, internal, outbound};
use missive_store::{StoreError, SubscriberStore};
use thiserror::Error;
use tokio::{
    sync::broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    time::Instant,
};

use crate::{
    Message,
    error::{DeliveryError, ExternalServiceError, MessageError, ThrottleError, ValidationError},
    recipient::{Recipient, UnsubscribeLinks},
    render::Template,
    throttle::{QuotaSource, Throttle, ThrottleConfig},
    transport::Transport,
    validator::AddressValidator,
};

/// Who a bulk send goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every verified subscriber.
    Subscribers,
    /// These addresses only, each validated first.
    Addresses(Vec<String>),
}

/// A recipient whose message could not be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub address: String,
    pub error: String,
    /// The same message might go through on a later run.
    pub retryable: bool,
}

/// The outcome of a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub sent: usize,
    pub failures: Vec<SendFailure>,
    /// The run was stopped by a shutdown signal before reaching every
    /// recipient.
    pub cancelled: bool,
}

/// An address rejected before the run started.
#[derive(Debug)]
pub struct InvalidRecipient {
    pub address: String,
    pub error: ValidationError,
}

#[derive(Debug, Error)]
pub enum BulkSendError {
    #[error("Message cannot be sent: {0}")]
    Message(#[from] MessageError),

    #[error("{} invalid recipient(s): {}", .0.len(), describe(.0))]
    InvalidRecipients(Vec<InvalidRecipient>),

    #[error(transparent)]
    Throttle(#[from] ThrottleError),

    #[error(transparent)]
    External(#[from] ExternalServiceError),

    #[error("Bulk send halted after {} message(s): {source}", .report.sent)]
    Halted {
        #[source]
        source: ThrottleError,
        report: SendReport,
    },
}

fn describe(invalid: &[InvalidRecipient]) -> String {
    invalid
        .iter()
        .map(|i| format!("{} ({})", i.address, i.error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Drives bulk runs.
#[derive(Debug, Clone)]
pub struct BulkSender {
    store: Arc<dyn SubscriberStore>,
    validator: AddressValidator,
    transport: Arc<dyn Transport>,
    quota: Arc<dyn QuotaSource>,
    links: UnsubscribeLinks,
    config: ThrottleConfig,
}

impl BulkSender {
    #[must_use]
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        validator: AddressValidator,
        transport: Arc<dyn Transport>,
        quota: Arc<dyn QuotaSource>,
        links: UnsubscribeLinks,
        config: ThrottleConfig,
    ) -> Self {
        Self {
            store,
            validator,
            transport,
            quota,
            links,
            config,
        }
    }

    /// Send `message` to `audience`, one recipient at a time.
    ///
    /// # Errors
    ///
    /// Fails before sending anything if the message is invalid, any
    /// explicit address is invalid, the subscriber list cannot be read, or
    /// the quota cannot cover every recipient. A throttle failure during the
    /// run returns [`BulkSendError::Halted`] with what was sent so far.
    pub async fn send(
        &self,
        message: &Message,
        audience: Audience,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<SendReport, BulkSendError> {
        message.validate()?;
        let template = Template::new(message);

        let recipients = self.recipients(audience).await?;
        let mut throttle = Throttle::new(
            Arc::clone(&self.quota),
            self.config.max_bulk_capacity,
            Instant::now(),
        )
        .await?;
        throttle.bulk_capacity_available(recipients.len() as u64)?;

        internal!(
            level = INFO,
            recipients = recipients.len(),
            capacity = %self.config.max_bulk_capacity,
            "Starting bulk send"
        );

        let mut report = SendReport::default();
        for recipient in &recipients {
            if shutdown_requested(&mut shutdown) {
                report.cancelled = true;
                break;
            }

            let wait = match self.reserve(&mut throttle).await {
                Ok(wait) => wait,
                Err(source) => return Err(BulkSendError::Halted { source, report }),
            };
            if wait_or_shutdown(wait, &mut shutdown).await {
                report.cancelled = true;
                break;
            }

            match self.deliver(&template, &message.from, recipient).await {
                Ok(message_id) => {
                    report.sent += 1;
                    outbound!(
                        level = INFO,
                        email = %recipient.email,
                        %message_id,
                        "Message sent"
                    );
                }
                Err(error) => {
                    let retryable = error.is_retryable();
                    outbound!(
                        level = WARN,
                        email = %recipient.email,
                        %error,
                        retryable,
                        "Message not sent"
                    );
                    report.failures.push(SendFailure {
                        address: recipient.email.clone(),
                        error: error.to_string(),
                        retryable,
                    });
                }
            }
        }

        internal!(
            level = INFO,
            sent = report.sent,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "Bulk send finished"
        );
        Ok(report)
    }

    async fn reserve(&self, throttle: &mut Throttle) -> Result<Duration, ThrottleError> {
        throttle
            .refresh_if_expired(self.config.refresh_max_age(), Instant::now())
            .await?;
        throttle.reserve_send(Instant::now())
    }

    async fn deliver(
        &self,
        template: &Template,
        from: &str,
        recipient: &Recipient,
    ) -> Result<String, DeliveryError> {
        let raw = template.render(recipient)?;
        Ok(self.transport.send(&recipient.email, from, &raw).await?)
    }

    async fn recipients(&self, audience: Audience) -> Result<Vec<Recipient>, BulkSendError> {
        match audience {
            Audience::Subscribers => {
                let mut verified = Vec::new();
                self.store
                    .scan(SubscriberStatus::Verified, &mut |page| {
                        verified.extend(page);
                        ControlFlow::Continue(())
                    })
                    .await
                    .map_err(ExternalServiceError::from)?;

                Ok(verified
                    .iter()
                    .map(|subscriber| Recipient::from_subscriber(subscriber, &self.links))
                    .collect())
            }
            Audience::Addresses(addresses) => self.explicit_recipients(addresses).await,
        }
    }

    /// Validate every address concurrently, then look each up so list
    /// members still get their unsubscribe link.
    async fn explicit_recipients(
        &self,
        addresses: Vec<String>,
    ) -> Result<Vec<Recipient>, BulkSendError> {
        let results = join_all(addresses.iter().map(|a| self.validator.validate(a))).await;

        let mut valid = Vec::with_capacity(addresses.len());
        let mut invalid = Vec::new();
        for (address, result) in addresses.into_iter().zip(results) {
            match result {
                Ok(mailbox) => valid.push(mailbox.to_string()),
                Err(error) => invalid.push(InvalidRecipient { address, error }),
            }
        }
        if !invalid.is_empty() {
            return Err(BulkSendError::InvalidRecipients(invalid));
        }

        let mut recipients = Vec::with_capacity(valid.len());
        for email in valid {
            let recipient = match self.store.get(&email).await {
                Ok(subscriber) => self.member(&subscriber),
                Err(StoreError::NotFound(_)) => Recipient::new(email),
                Err(err) => return Err(ExternalServiceError::from(err).into()),
            };
            recipients.push(recipient);
        }
        Ok(recipients)
    }

    fn member(&self, subscriber: &Subscriber) -> Recipient {
        if subscriber.is_verified() {
            Recipient::from_subscriber(subscriber, &self.links)
        } else {
            Recipient::new(subscriber.email.clone())
        }
    }
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<Signal>) -> bool {
    loop {
        match shutdown.try_recv() {
            Ok(Signal::Shutdown | Signal::Finalised) | Err(TryRecvError::Closed) => {
                internal!(level = INFO, "Bulk send received shutdown signal");
                return true;
            }
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) => return false,
        }
    }
}

/// Sleep for `wait`, returning `true` if shutdown was requested meanwhile.
async fn wait_or_shutdown(wait: Duration, shutdown: &mut broadcast::Receiver<Signal>) -> bool {
    if wait.is_zero() {
        return false;
    }

    let sleep = tokio::time::sleep(wait);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => return false,
            sig = shutdown.recv() => match sig {
                Ok(Signal::Shutdown | Signal::Finalised) | Err(RecvError::Closed) => {
                    internal!(level = INFO, "Bulk send received shutdown signal while pacing");
                    return true;
                }
                Err(RecvError::Lagged(_)) => {}
            }
        }
    }
}
