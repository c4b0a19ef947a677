use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Weight outside [0, 100].
    #[error("high priority weight must be in 0..=100, got {0}")]
    InvalidWeight(u8),

    /// All senders dropped and both queues drained.
    #[error("priority channel disconnected")]
    Disconnected,
}
