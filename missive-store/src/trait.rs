use std::ops::ControlFlow;

use async_trait::async_trait;
use missive_common::{Subscriber, SubscriberStatus};

/// Opaque position in a paginated scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartKey(pub String);

/// One page of a status-partitioned scan
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub subscribers: Vec<Subscriber>,
    /// Where the next page starts; `None` once the scan is exhausted
    pub next: Option<StartKey>,
}

/// Page size used by [`SubscriberStore::scan`]
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Persistent subscriber storage, keyed by email address
#[async_trait]
pub trait SubscriberStore: Send + Sync + std::fmt::Debug {
    /// Fetch a subscriber
    ///
    /// # Errors
    /// `StoreError::NotFound` if no record exists, or a backend failure
    async fn get(&self, email: &str) -> crate::Result<Subscriber>;

    /// Insert or replace a subscriber
    ///
    /// # Errors
    /// If the backend fails to persist the record
    async fn put(&self, subscriber: &Subscriber) -> crate::Result<()>;

    /// Delete a subscriber. Deleting an absent record succeeds.
    ///
    /// # Errors
    /// If the backend fails to delete the record
    async fn delete(&self, email: &str) -> crate::Result<()>;

    /// Fetch one page of subscribers with the given status
    ///
    /// # Errors
    /// If the backend fails to read the page
    async fn page(
        &self,
        status: SubscriberStatus,
        start: Option<StartKey>,
        limit: usize,
    ) -> crate::Result<Page>;

    /// Walk every subscriber with the given status, one page at a time
    ///
    /// The handler is invoked once per non-empty page and may stop the scan
    /// early by returning [`ControlFlow::Break`].
    ///
    /// # Errors
    /// If any page cannot be read
    async fn scan(
        &self,
        status: SubscriberStatus,
        handler: &mut (dyn FnMut(Vec<Subscriber>) -> ControlFlow<()> + Send),
    ) -> crate::Result<()> {
        let mut start = None;

        loop {
            let page = self.page(status, start, DEFAULT_PAGE_SIZE).await?;

            if !page.subscribers.is_empty() && handler(page.subscribers).is_break() {
                return Ok(());
            }

            match page.next {
                Some(next) => start = Some(next),
                None => return Ok(()),
            }
        }
    }
}

/// Addresses that must not receive mail
#[async_trait]
pub trait SuppressionList: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// If the backend cannot be queried
    async fn is_suppressed(&self, email: &str) -> crate::Result<bool>;

    /// Add an address, recording why. Suppressing twice succeeds.
    ///
    /// # Errors
    /// If the backend fails to record the address
    async fn suppress(&self, email: &str, reason: &str) -> crate::Result<()>;

    /// Remove an address. Removing an absent address succeeds.
    ///
    /// # Errors
    /// If the backend fails to remove the address
    async fn unsuppress(&self, email: &str) -> crate::Result<()>;
}
