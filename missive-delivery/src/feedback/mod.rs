//! Delivery feedback: parsing provider events and applying them to the
//! subscriber set.

mod dispatcher;
mod event;

pub use dispatcher::{DispatchOutcome, FeedbackDispatcher};
pub use event::{FeedbackEvent, FeedbackParseError, MailHeaders};
