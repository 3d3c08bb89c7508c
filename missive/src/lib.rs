//! The `missive` command: configuration, dry-run collaborators and the
//! controller that wires the delivery pipeline together.

pub mod config;
pub mod controller;
pub mod outbox;
pub mod quota;
pub mod subscribers;

pub use config::{Config, find_config_file};
pub use controller::{Missive, SHUTDOWN_BROADCAST, shutdown};
pub use outbox::FileTransport;
pub use quota::StaticQuota;
