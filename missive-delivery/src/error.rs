//! Typed error handling for delivery operations.
//!
//! Errors are grouped by the component that raises them:
//! - Validation failures (bad address, failed DNS checks) are terminal for
//!   that one address
//! - Throttle failures end the current bulk run; the caller retries later
//! - External failures wrap a collaborator (store, transport, quota source)
//! - Render failures are input or programming defects

use std::net::IpAddr;

use missive_common::AddressError;
use missive_store::StoreError;
use thiserror::Error;

use crate::DnsError;

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Throttle(#[from] ThrottleError),

    #[error(transparent)]
    External(#[from] ExternalServiceError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl DeliveryError {
    /// Returns `true` if retrying later might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Throttle(err) => err.is_retryable(),
            Self::External(_) => true,
            Self::Validation(_) | Self::Render(_) => false,
        }
    }

    /// Returns `true` if the same input will always fail.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }
}

/// An address that failed validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("Address {address} is not accepted: {reason}")]
    Blocked {
        address: String,
        reason: BlockReason,
    },

    #[error("No mail servers for {domain}: {source}")]
    NoMailServers {
        domain: String,
        #[source]
        source: DnsError,
    },

    #[error("No mail server for {domain} passed forward-confirmed reverse DNS: {}", join(.failures))]
    NoVerifiedMailHost {
        domain: String,
        failures: Vec<HopFailure>,
    },
}

/// Why an address was rejected without a DNS lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockReason {
    #[error("role account")]
    User,
    #[error("IP address literal domain")]
    AddressLiteral,
    #[error("blocked domain")]
    Domain,
}

/// One failed step of the forward, reverse, forward walk for an MX host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HopFailure {
    #[error("{host}: {source}")]
    HostLookup {
        host: String,
        #[source]
        source: DnsError,
    },

    #[error("{host} -> {ip}: {source}")]
    ReverseLookup {
        host: String,
        ip: IpAddr,
        #[source]
        source: DnsError,
    },

    #[error("{host} -> {ip} -> {name}: {source}")]
    ConfirmLookup {
        host: String,
        ip: IpAddr,
        name: String,
        #[source]
        source: DnsError,
    },

    #[error("{host} -> {ip} -> {name}: does not resolve back to {ip}")]
    Mismatch {
        host: String,
        ip: IpAddr,
        name: String,
    },
}

fn join(failures: &[HopFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures raised by the send throttle.
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("24 hour send quota exhausted ({sent} of {max} sent)")]
    QuotaExhausted { sent: u64, max: u64 },

    #[error("Bulk capacity exceeded: {requested} requested, {available} available")]
    BulkCapacityExceeded { requested: u64, available: u64 },

    #[error("Capacity must be between 0 and 1, got {0}")]
    InvalidCapacity(f64),

    #[error("Provider reported an unusable send rate: {0}")]
    InvalidSendRate(f64),

    #[error(transparent)]
    External(#[from] ExternalServiceError),
}

impl ThrottleError {
    /// Returns `true` for limits that lift with time. Bad configuration and
    /// bad provider figures stay bad until someone fixes them.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::QuotaExhausted { .. } | Self::BulkCapacityExceeded { .. } | Self::External(_)
        )
    }
}

/// A failure reported by a collaborator outside this crate.
#[derive(Debug, Error)]
pub enum ExternalServiceError {
    #[error("Subscriber store: {0}")]
    Store(#[from] StoreError),

    #[error("Transport: {0}")]
    Transport(String),

    #[error("Quota source: {0}")]
    Quota(String),
}

/// Problems with a message that make it unsendable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Message has no {0}")]
    Missing(&'static str),

    #[error("{0} does not contain the unsubscribe URL placeholder")]
    MissingPlaceholder(&'static str),

    #[error("HTML body and HTML footer must be set together")]
    UnpairedHtml,

    #[error("{0} must be a single line")]
    LineBreak(&'static str),
}

/// Failures while rendering a message for one recipient.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn test_error_classification() {
        let err = DeliveryError::from(ThrottleError::QuotaExhausted { sent: 10, max: 10 });
        assert!(err.is_retryable());
        assert!(!err.is_terminal());

        let err = DeliveryError::from(ExternalServiceError::Transport("timeout".to_string()));
        assert!(err.is_retryable());

        let err = DeliveryError::from(RenderError::Message(MessageError::Missing("subject")));
        assert!(err.is_terminal());
        assert!(!err.is_retryable());

        let err = DeliveryError::from(ValidationError::Blocked {
            address: "abuse@acme.io".to_string(),
            reason: BlockReason::User,
        });
        assert!(err.is_terminal());
    }

    #[test]
    fn test_invalid_throttle_settings_are_terminal() {
        for err in [ThrottleError::InvalidCapacity(1.5), ThrottleError::InvalidSendRate(0.0)] {
            assert!(!err.is_retryable(), "{err}");
            assert!(DeliveryError::from(err).is_terminal());
        }

        let err = ThrottleError::BulkCapacityExceeded {
            requested: 10,
            available: 5,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_aggregated_failures_are_all_reported() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        let err = ValidationError::NoVerifiedMailHost {
            domain: "acme.io".to_string(),
            failures: vec![
                HopFailure::HostLookup {
                    host: "mx1.acme.io".to_string(),
                    source: DnsError::DomainNotFound("mx1.acme.io".to_string()),
                },
                HopFailure::Mismatch {
                    host: "mx2.acme.io".to_string(),
                    ip,
                    name: "mail.hosting.test".to_string(),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("mx1.acme.io: Domain does not exist"));
        assert!(message.contains("mx2.acme.io -> 192.0.2.1 -> mail.hosting.test"));
    }
}
