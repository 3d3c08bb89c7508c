pub mod backends;
pub mod error;
pub mod r#trait;

pub use backends::{MemorySubscriberStore, MemorySuppressionList};
pub use error::{Result, StoreError};
pub use r#trait::{DEFAULT_PAGE_SIZE, Page, StartKey, SubscriberStore, SuppressionList};
