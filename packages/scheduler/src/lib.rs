mod channel;
mod error;

pub use channel::{PriorityConsumer, PrioritySender, priority_channel};
pub use error::SchedulerError;
