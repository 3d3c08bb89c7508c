use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use missive_common::{Subscriber, SubscriberStatus};

use crate::{
    StoreError,
    r#trait::{Page, StartKey, SubscriberStore, SuppressionList},
};

/// In-memory subscriber store
///
/// Records are kept in a `BTreeMap` ordered by email address, so paginated
/// scans are stable and the start key is simply the last address returned.
///
/// # Concurrency
/// Uses an `RwLock` for interior mutability. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemorySubscriberStore {
    subscribers: Arc<RwLock<BTreeMap<String, Subscriber>>>,
}

impl MemorySubscriberStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with the given subscribers
    #[must_use]
    pub fn with_subscribers(subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        let map = subscribers
            .into_iter()
            .map(|sub| (sub.email.clone(), sub))
            .collect();

        Self {
            subscribers: Arc::new(RwLock::new(map)),
        }
    }

    /// Number of stored subscribers, of any status
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn get(&self, email: &str) -> crate::Result<Subscriber> {
        self.subscribers
            .read()?
            .get(email)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(email.to_string()))
    }

    async fn put(&self, subscriber: &Subscriber) -> crate::Result<()> {
        self.subscribers
            .write()?
            .insert(subscriber.email.clone(), subscriber.clone());
        Ok(())
    }

    async fn delete(&self, email: &str) -> crate::Result<()> {
        self.subscribers.write()?.remove(email);
        Ok(())
    }

    async fn page(
        &self,
        status: SubscriberStatus,
        start: Option<StartKey>,
        limit: usize,
    ) -> crate::Result<Page> {
        let subscribers = self.subscribers.read()?;
        let lower = start.map_or(Bound::Unbounded, |StartKey(key)| Bound::Excluded(key));

        let mut matching = subscribers
            .range((lower, Bound::Unbounded))
            .map(|(_, sub)| sub)
            .filter(|sub| sub.status == status);

        let page: Vec<Subscriber> = matching.by_ref().take(limit).cloned().collect();
        let next = match (page.last(), matching.next()) {
            (Some(last), Some(_)) => Some(StartKey(last.email.clone())),
            _ => None,
        };
        drop(subscribers);

        Ok(Page {
            subscribers: page,
            next,
        })
    }
}

/// In-memory suppression list, mapping address to the recorded reason
#[derive(Debug, Clone, Default)]
pub struct MemorySuppressionList {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySuppressionList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A list pre-populated with `(email, reason)` pairs
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries.into_iter().collect())),
        }
    }

    /// Every suppressed address with its reason, ordered by address
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|(email, reason)| (email.clone(), reason.clone()))
            .collect()
    }

    /// The reason an address was suppressed, if it is
    #[must_use]
    pub fn reason(&self, email: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(email)
            .cloned()
    }
}

#[async_trait]
impl SuppressionList for MemorySuppressionList {
    async fn is_suppressed(&self, email: &str) -> crate::Result<bool> {
        Ok(self.entries.read()?.contains_key(email))
    }

    async fn suppress(&self, email: &str, reason: &str) -> crate::Result<()> {
        self.entries
            .write()?
            .insert(email.to_string(), reason.to_string());
        Ok(())
    }

    async fn unsuppress(&self, email: &str) -> crate::Result<()> {
        self.entries.write()?.remove(email);
        Ok(())
    }
}
