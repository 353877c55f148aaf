//! Topic-based event bus: subscription index, filter matching, publish
//! fan-out, and in-process topic handlers.

pub mod bus;
pub mod filter;

pub use bus::{EventBus, Subscription, TopicHandler};
