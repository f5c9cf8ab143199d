//! Error handling for wirecast
//!
//! This module defines the crate error type and a Result alias used
//! throughout the broker, barrier, node and circuit layers.

use crate::pipeline::id::NodeId;
use thiserror::Error;

/// Main error type for wirecast operations
#[derive(Error, Debug)]
pub enum WireError {
    /// Malformed instruction text
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// An instruction that cannot be evaluated (wrong arity, missing outputs)
    #[error("Invalid instruction: {0}")]
    Instruction(String),

    /// The broker loop has exited; no further subscribe/publish is possible
    #[error("Broker stopped")]
    BrokerStopped,

    /// A subscriber mailbox lost its sender (unsubscribed or broker stopped)
    #[error("Mailbox for topic '{0}' closed")]
    MailboxClosed(String),

    /// More arrivals than the barrier was sized for
    #[error("Barrier overrun: all {0} arrivals already recorded")]
    BarrierOverrun(usize),

    /// The barrier was aborted before every node arrived
    #[error("Barrier aborted with {remaining} of {total} arrivals outstanding")]
    BarrierAborted { remaining: usize, total: usize },

    /// A wait exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Every node finished but a watched topic never received a value
    #[error("Topic '{0}' was never published")]
    Unpublished(String),

    /// A node task failed
    #[error("Node {node} failed: {message}")]
    Node { node: NodeId, message: String },

    /// A node thread could not be spawned or panicked
    #[error("Thread error: {0}")]
    Thread(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<WireError>,
    },
}

impl WireError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        WireError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a parse error for a 1-based line number
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        WireError::Parse {
            line,
            message: message.into(),
        }
    }

    /// Strip any context layers and return the underlying error
    pub fn root(&self) -> &WireError {
        match self {
            WireError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error only means the broker went away underneath the caller
    pub fn is_broker_stopped(&self) -> bool {
        matches!(self.root(), WireError::BrokerStopped)
    }

    /// Whether this error is the consequence of a run being torn down
    /// (broker stopped, mailbox closed or barrier aborted) rather than a fault
    /// of its own.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.root(),
            WireError::BrokerStopped
                | WireError::MailboxClosed(_)
                | WireError::BarrierAborted { .. }
        )
    }
}

/// Result type alias for wirecast operations
pub type Result<T> = std::result::Result<T, WireError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WireError::parse(3, "unknown gate 'NAND'");
        assert_eq!(err.to_string(), "Parse error on line 3: unknown gate 'NAND'");
    }

    #[test]
    fn test_error_with_context() {
        let err = WireError::Instruction("test".to_string());
        let with_ctx = err.with_context("Failed to build circuit");
        assert!(with_ctx.to_string().contains("Failed to build circuit"));
    }

    #[test]
    fn test_root_unwraps_context() {
        let err = WireError::BrokerStopped
            .with_context("publishing d")
            .with_context("node 4");
        assert!(err.is_broker_stopped());
        assert!(matches!(err.root(), WireError::BrokerStopped));
        assert!(err.is_cancellation());
        assert!(!WireError::Timeout("x".into()).is_cancellation());
    }

    #[test]
    fn test_barrier_aborted_message() {
        let err = WireError::BarrierAborted {
            remaining: 2,
            total: 5,
        };
        assert!(err.to_string().contains("2 of 5"));
    }
}
