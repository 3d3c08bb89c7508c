//! Subscriber records
//!
//! A subscriber is owned by the storage backend; everything else treats it as
//! an immutable value for the duration of one operation.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a subscriber is in the double opt-in flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    /// Subscribed, but has not yet followed the verification link
    Pending,
    /// Verified, and eligible for bulk sends
    Verified,
}

impl Display for SubscriberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
        })
    }
}

/// A mailing list subscriber
///
/// The `uid` is unique per email at any point in time. It is regenerated
/// whenever a pending record is resubscribed or verified, which invalidates
/// any previously issued verification or unsubscribe link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub email: String,
    pub uid: Uuid,
    pub status: SubscriberStatus,
    pub timestamp: DateTime<Utc>,
}

impl Subscriber {
    /// A new pending subscriber with a freshly generated uid
    #[must_use]
    pub fn pending(email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            email: email.into(),
            uid: Uuid::new_v4(),
            status: SubscriberStatus::Pending,
            timestamp: now,
        }
    }

    /// This subscriber as verified, with a regenerated uid
    #[must_use]
    pub fn into_verified(self, now: DateTime<Utc>) -> Self {
        Self {
            uid: Uuid::new_v4(),
            status: SubscriberStatus::Verified,
            timestamp: now,
            ..self
        }
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.status == SubscriberStatus::Verified
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_pending_subscriber() {
        let now = Utc::now();
        let sub = Subscriber::pending("reader@acme.io", now);
        assert_eq!(sub.status, SubscriberStatus::Pending);
        assert_eq!(sub.timestamp, now);
        assert!(!sub.is_verified());
    }

    #[test]
    fn test_verification_regenerates_uid() {
        let now = Utc::now();
        let pending = Subscriber::pending("reader@acme.io", now);
        let verified = pending.clone().into_verified(now);

        assert!(verified.is_verified());
        assert_eq!(verified.email, pending.email);
        assert_ne!(verified.uid, pending.uid);
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&SubscriberStatus::Verified).unwrap();
        assert_eq!(json, "\"verified\"");
        assert_eq!(SubscriberStatus::Pending.to_string(), "pending");
    }
}
