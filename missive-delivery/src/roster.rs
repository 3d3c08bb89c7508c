//! Subscriber lifecycle on top of the subscriber store and suppression list
//!
//! ```text
//!             subscribe                verify(uid)
//!   (none) -------------> Pending ------------------> Verified
//!     ^                    |  ^                         |
//!     |   unsubscribe(uid) |  | restore                 | unsubscribe(uid)
//!     +--------------------+  |                         |
//!     +-----------------------|-------------------------+
//!     |                       |
//!   remove (bounce, complaint) -> suppressed
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use missive_common::{Subscriber, SubscriberStatus, internal};
use missive_store::{StoreError, SubscriberStore, SuppressionList};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{ExternalServiceError, ValidationError},
    validator::AddressValidator,
};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Address is suppressed: {0}")]
    Suppressed(String),

    #[error("Already subscribed: {0}")]
    AlreadyVerified(String),

    #[error("No matching subscriber: {0}")]
    NotFound(String),

    #[error(transparent)]
    External(#[from] ExternalServiceError),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(email) => Self::NotFound(email),
            other => Self::External(other.into()),
        }
    }
}

/// The two operations feedback processing drives.
///
/// Both must be idempotent: feedback may be delivered more than once.
#[async_trait]
pub trait SubscriberLifecycle: Send + Sync + std::fmt::Debug {
    /// Delete the subscriber and suppress the address.
    async fn remove(&self, email: &str, reason: &str) -> Result<(), LifecycleError>;

    /// Re-subscribe the address as unverified and lift any suppression.
    async fn restore(&self, email: &str) -> Result<(), LifecycleError>;
}

/// Mailing list membership.
#[derive(Debug, Clone)]
pub struct Roster {
    store: Arc<dyn SubscriberStore>,
    suppression: Arc<dyn SuppressionList>,
    validator: AddressValidator,
}

impl Roster {
    #[must_use]
    pub fn new(
        store: Arc<dyn SubscriberStore>,
        suppression: Arc<dyn SuppressionList>,
        validator: AddressValidator,
    ) -> Self {
        Self {
            store,
            suppression,
            validator,
        }
    }

    /// Add `address` as a pending subscriber.
    ///
    /// Subscribing again while still pending issues a new uid, invalidating
    /// the earlier verification link.
    ///
    /// # Errors
    ///
    /// Fails if the address is invalid, suppressed or already verified, or
    /// if the store cannot be reached.
    pub async fn subscribe(&self, address: &str) -> Result<Subscriber, LifecycleError> {
        let email = self.validator.validate(address).await?.to_string();

        if self.suppression.is_suppressed(&email).await? {
            return Err(LifecycleError::Suppressed(email));
        }

        match self.store.get(&email).await {
            Ok(existing) if existing.is_verified() => {
                return Err(LifecycleError::AlreadyVerified(email));
            }
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        let subscriber = Subscriber::pending(email, Utc::now());
        self.store.put(&subscriber).await?;

        internal!(level = INFO, email = %subscriber.email, "Subscriber pending verification");
        Ok(subscriber)
    }

    /// Confirm a pending subscription.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] unless `email` is pending with
    /// this `uid`.
    pub async fn verify(&self, email: &str, uid: Uuid) -> Result<Subscriber, LifecycleError> {
        let pending = self.store.get(email).await?;
        if pending.status != SubscriberStatus::Pending || pending.uid != uid {
            return Err(LifecycleError::NotFound(email.to_string()));
        }

        let verified = pending.into_verified(Utc::now());
        self.store.put(&verified).await?;

        internal!(level = INFO, email = %verified.email, "Subscriber verified");
        Ok(verified)
    }

    /// Remove a subscriber at their own request.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotFound`] if `uid` does not match.
    pub async fn unsubscribe(&self, email: &str, uid: Uuid) -> Result<(), LifecycleError> {
        let subscriber = self.store.get(email).await?;
        if subscriber.uid != uid {
            return Err(LifecycleError::NotFound(email.to_string()));
        }

        self.store.delete(email).await?;

        internal!(level = INFO, email, "Subscriber unsubscribed");
        Ok(())
    }
}

#[async_trait]
impl SubscriberLifecycle for Roster {
    async fn remove(&self, email: &str, reason: &str) -> Result<(), LifecycleError> {
        self.store.delete(email).await?;
        self.suppression.suppress(email, reason).await?;

        internal!(level = INFO, email, reason, "Subscriber removed and suppressed");
        Ok(())
    }

    async fn restore(&self, email: &str) -> Result<(), LifecycleError> {
        self.store.put(&Subscriber::pending(email, Utc::now())).await?;
        self.suppression.unsuppress(email).await?;

        internal!(level = INFO, email, "Subscriber restored");
        Ok(())
    }
}
