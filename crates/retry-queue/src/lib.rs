pub mod item;
pub mod queue;

pub use item::QueuedItem;
pub use queue::{ExhaustionHandler, RetryProcessor, RetryQueue, RetryQueueCounters};
