//! Error types for the orchestrator.
//!
//! Every error here signals illegal use of the lifecycle API. Payload
//! processing failures belong to the registered producers and consumers;
//! the orchestrator never observes them.

use thiserror::Error;

/// The main error type for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    /// An operation that requires a not-yet-started orchestrator was
    /// attempted while it is running
    #[error("orchestrator is already running")]
    AlreadyRunning,

    /// An operation was attempted on an orchestrator that has ended
    #[error("orchestrator has already ended")]
    AlreadyEnded,

    /// Reserved for operations that require a started orchestrator
    #[error("orchestrator has not been started")]
    NotStarted,
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_distinct_kinds() {
        assert_ne!(Error::AlreadyRunning, Error::AlreadyEnded);
        assert_ne!(Error::AlreadyEnded, Error::NotStarted);
        assert_ne!(Error::AlreadyRunning, Error::NotStarted);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::AlreadyRunning.to_string(),
            "orchestrator is already running"
        );
        assert_eq!(
            Error::AlreadyEnded.to_string(),
            "orchestrator has already ended"
        );
        assert_eq!(
            Error::NotStarted.to_string(),
            "orchestrator has not been started"
        );
    }
}
