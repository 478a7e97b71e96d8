//! Error taxonomy for the collection pipeline.
//!
//! Three fatal classes, raised eagerly or propagated to the consumer:
//!
//! - [`CollectorError::Config`]: rejected at construction, never retried.
//! - [`CollectorError::Protocol`]: a control channel produced an unexpected
//!   reply or went away. Terminates the offending interaction.
//! - [`CollectorError::Consistency`]: an environment violated its contract
//!   (e.g. a lane reporting `done` right after an explicit reset).
//!
//! Transient conditions (a full output queue, a poll timeout with no pending
//! message) are handled inside the worker loop and never surface here.

use thiserror::Error;

/// Errors produced by collectors, engines and the worker protocol.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Invalid configuration, detected eagerly at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Control protocol violation: unexpected reply tag or a dead worker
    /// channel.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// An external collaborator broke its contract.
    #[error("consistency violation: {0}")]
    Consistency(String),
}

impl CollectorError {
    /// Shorthand for a [`CollectorError::Config`] with a formatted message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for a [`CollectorError::Protocol`] with a formatted message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Shorthand for a [`CollectorError::Consistency`] with a formatted message.
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }
}
