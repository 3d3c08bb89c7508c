//! Send pacing against the provider's sending quota
//!
//! The provider imposes two limits: a maximum send rate (messages per
//! second) and a rolling 24 hour cap. A bulk run may only use a fraction of
//! the 24 hour cap (its [`Capacity`]) so that transactional mail such as
//! verification requests can still go out afterwards.
//!
//! # Pacing
//!
//! ```text
//! pause = 1s / max_send_rate
//! next  = last_send + pause
//! now < next  -> sleep (next - now), last_send = next
//! now >= next -> no sleep,           last_send = now
//! ```
//!
//! Sends therefore keep a steady cadence without sleeping longer than
//! needed when the caller is itself slower than the provider's rate.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use missive_common::internal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{ExternalServiceError, ThrottleError};

/// A fraction of the 24 hour quota, between 0 and 1 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Capacity(f64);

impl Capacity {
    /// # Errors
    ///
    /// Returns [`ThrottleError::InvalidCapacity`] unless `0 <= value <= 1`.
    pub fn new(value: f64) -> Result<Self, ThrottleError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ThrottleError::InvalidCapacity(value))
        }
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Capacity {
    type Error = ThrottleError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Capacity> for f64 {
    fn from(capacity: Capacity) -> Self {
        capacity.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

/// The provider's live sending limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SendQuota {
    /// Messages per second
    pub max_send_rate: f64,
    pub max_24_hour_send: u64,
    pub sent_last_24_hours: u64,
}

/// Where the current [`SendQuota`] comes from.
#[async_trait]
pub trait QuotaSource: Send + Sync + fmt::Debug {
    async fn send_quota(&self) -> Result<SendQuota, ExternalServiceError>;
}

/// Throttle settings for bulk runs
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    /// Fraction of the 24 hour quota one bulk run may use (default: 0.8)
    #[serde(default = "default_max_bulk_capacity")]
    pub max_bulk_capacity: Capacity,

    /// Re-query the quota during a run once it is this old (default: 60)
    #[serde(default = "default_refresh_max_age_secs")]
    pub refresh_max_age_secs: u64,
}

const fn default_max_bulk_capacity() -> Capacity {
    Capacity(0.8)
}

const fn default_refresh_max_age_secs() -> u64 {
    60
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_bulk_capacity: default_max_bulk_capacity(),
            refresh_max_age_secs: default_refresh_max_age_secs(),
        }
    }
}

impl ThrottleConfig {
    #[must_use]
    pub const fn refresh_max_age(&self) -> Duration {
        Duration::from_secs(self.refresh_max_age_secs)
    }
}

/// Quota tracking and pacing for one bulk run.
///
/// Owned by a single send loop; it is not shared between runs.
#[derive(Debug)]
pub struct Throttle {
    source: Arc<dyn QuotaSource>,
    capacity: Capacity,
    refreshed_at: Instant,
    pause_interval: Duration,
    last_send_at: Option<Instant>,
    max_24_hour_send: u64,
    sent_last_24_hours: u64,
    max_bulk_sendable: u64,
}

impl Throttle {
    /// Create a throttle from the provider's current quota.
    ///
    /// # Errors
    ///
    /// Fails if the quota source cannot be reached or reports an unusable
    /// send rate.
    pub async fn new(
        source: Arc<dyn QuotaSource>,
        capacity: Capacity,
        now: Instant,
    ) -> Result<Self, ThrottleError> {
        let mut throttle = Self {
            source,
            capacity,
            refreshed_at: now,
            pause_interval: Duration::ZERO,
            last_send_at: None,
            max_24_hour_send: 0,
            sent_last_24_hours: 0,
            max_bulk_sendable: 0,
        };
        throttle.refresh(now).await?;
        Ok(throttle)
    }

    /// Re-query the quota source.
    ///
    /// # Errors
    ///
    /// Fails if the quota source cannot be reached or reports an unusable
    /// send rate. The previous quota is kept on failure.
    pub async fn refresh(&mut self, now: Instant) -> Result<(), ThrottleError> {
        let quota = self.source.send_quota().await?;

        if !quota.max_send_rate.is_finite() || quota.max_send_rate <= 0.0 {
            return Err(ThrottleError::InvalidSendRate(quota.max_send_rate));
        }

        self.pause_interval = Duration::from_secs_f64(1.0 / quota.max_send_rate);
        self.max_24_hour_send = quota.max_24_hour_send;
        self.sent_last_24_hours = quota.sent_last_24_hours;
        self.max_bulk_sendable = bulk_sendable(quota.max_24_hour_send, self.capacity);
        self.refreshed_at = now;

        internal!(
            level = DEBUG,
            max_send_rate = quota.max_send_rate,
            max_24_hour_send = self.max_24_hour_send,
            sent_last_24_hours = self.sent_last_24_hours,
            max_bulk_sendable = self.max_bulk_sendable,
            "Send quota refreshed"
        );
        Ok(())
    }

    /// Refresh only if the quota is at least `max_age` old.
    ///
    /// # Errors
    ///
    /// As [`Self::refresh`].
    pub async fn refresh_if_expired(
        &mut self,
        max_age: Duration,
        now: Instant,
    ) -> Result<(), ThrottleError> {
        if now.saturating_duration_since(self.refreshed_at) >= max_age {
            self.refresh(now).await
        } else {
            Ok(())
        }
    }

    /// Check up front that `num_to_send` messages fit in this run's share of
    /// the quota.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::BulkCapacityExceeded`] otherwise.
    pub fn bulk_capacity_available(&self, num_to_send: u64) -> Result<(), ThrottleError> {
        let available = self.max_bulk_sendable.saturating_sub(self.sent_last_24_hours);
        if num_to_send > available {
            return Err(ThrottleError::BulkCapacityExceeded {
                requested: num_to_send,
                available,
            });
        }
        Ok(())
    }

    /// Count one send and return how long to wait before making it.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::QuotaExhausted`] once the 24 hour quota is
    /// used up. Nothing is counted in that case.
    pub fn reserve_send(&mut self, now: Instant) -> Result<Duration, ThrottleError> {
        if self.sent_last_24_hours >= self.max_24_hour_send {
            return Err(ThrottleError::QuotaExhausted {
                sent: self.sent_last_24_hours,
                max: self.max_24_hour_send,
            });
        }

        let wait = match self.last_send_at {
            Some(last) if last + self.pause_interval > now => {
                let next = last + self.pause_interval;
                self.last_send_at = Some(next);
                next - now
            }
            _ => {
                self.last_send_at = Some(now);
                Duration::ZERO
            }
        };

        self.sent_last_24_hours += 1;
        Ok(wait)
    }

    /// Sleep until the next send is allowed, counting it.
    ///
    /// # Errors
    ///
    /// As [`Self::reserve_send`].
    pub async fn pause_before_next_send(&mut self, now: Instant) -> Result<(), ThrottleError> {
        let wait = self.reserve_send(now)?;
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    #[must_use]
    pub const fn pause_interval(&self) -> Duration {
        self.pause_interval
    }

    #[must_use]
    pub const fn max_bulk_sendable(&self) -> u64 {
        self.max_bulk_sendable
    }

    #[must_use]
    pub const fn sent_last_24_hours(&self) -> u64 {
        self.sent_last_24_hours
    }

    #[must_use]
    pub const fn max_24_hour_send(&self) -> u64 {
        self.max_24_hour_send
    }
}

/// `floor(max_24_hour_send * capacity)`
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn bulk_sendable(max_24_hour_send: u64, capacity: Capacity) -> u64 {
    (max_24_hour_send as f64 * capacity.value()).floor() as u64
}
