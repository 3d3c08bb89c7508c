pub mod address_parser;
pub mod logging;
pub mod subscriber;

pub use address_parser::{AddressError, Mailbox, parse_mailbox};
pub use subscriber::{Subscriber, SubscriberStatus};
pub use tracing;

/// Process-wide control signal, broadcast to long-running operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
