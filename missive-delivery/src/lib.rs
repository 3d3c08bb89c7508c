//! Bulk-send pipeline for a mailing list
//!
//! This crate provides functionality to:
//! - Validate recipient addresses against block lists and DNS
//! - Render a message per recipient with its unsubscribe footer and headers
//! - Pace sends against the provider's rate and 24 hour quota
//! - Apply bounce and complaint feedback to the subscriber set
//! - Drive a cancellable bulk run over all of the above

mod broadcast;
mod dns;
mod error;
pub mod feedback;
mod message;
mod recipient;
pub mod render;
mod roster;
mod throttle;
mod transport;
mod validator;

#[cfg(test)]
mod testing;

// Re-export orchestration types
pub use broadcast::{Audience, BulkSendError, BulkSender, InvalidRecipient, SendFailure, SendReport};
// Re-export DNS types
pub use dns::{DnsConfig, DnsError, DnsResolver, MailServer, Resolver};
// Re-export error types
pub use error::{
    BlockReason, DeliveryError, ExternalServiceError, HopFailure, MessageError, RenderError,
    ThrottleError, ValidationError,
};
pub use feedback::{DispatchOutcome, FeedbackDispatcher, FeedbackEvent, FeedbackParseError};
pub use message::{Message, UNSUBSCRIBE_URL};
pub use recipient::{LinkError, Recipient, Unsubscribe, UnsubscribeLinks};
pub use render::Template;
pub use roster::{LifecycleError, Roster, SubscriberLifecycle};
pub use throttle::{Capacity, QuotaSource, SendQuota, Throttle, ThrottleConfig};
pub use transport::Transport;
pub use validator::AddressValidator;
