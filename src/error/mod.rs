//! Error types.
//!
//! Two distinct shapes, on purpose: [`SchedulerError`] is a conventional
//! `Result` error for construction and setup paths, while [`KernelStatus`]
//! is plain data carried on every node. Execution errors never abort
//! sibling work, so they surface as node fields the caller inspects after
//! the call, not as `Err` values that would unwind the dispatch loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate-level errors, raised only from construction and configuration.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Discovery finished with every manager disabled.
    #[error("no usable kernel manager after discovery")]
    NoUsableManager,
    /// A section index was out of range for its graph.
    #[error("section index {0} out of range")]
    InvalidSection(usize),
    /// Configuration could not be parsed or was inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Per-node completion code, written by a manager's `execute` as a side
/// effect. A fresh node reports [`KernelStatus::Failure`] until some
/// manager records a result for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelStatus {
    /// Generic failure, also the initial state of an unexecuted node.
    Failure,
    /// The node ran to completion.
    Success,
    /// A supplied parameter was rejected by the kernel.
    InvalidParameter,
    /// A resource the kernel needed was unavailable.
    NoResource,
    /// The manager advertises the kernel but has no implementation for it.
    NotImplemented,
}

impl Default for KernelStatus {
    fn default() -> Self {
        KernelStatus::Failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_error_display() {
        assert_eq!(
            SchedulerError::NoUsableManager.to_string(),
            "no usable kernel manager after discovery"
        );
        assert_eq!(
            SchedulerError::InvalidSection(3).to_string(),
            "section index 3 out of range"
        );
        assert_eq!(
            SchedulerError::InvalidConfig("bad".into()).to_string(),
            "invalid configuration: bad"
        );
    }

    #[test]
    fn test_fresh_status_is_failure() {
        assert_eq!(KernelStatus::default(), KernelStatus::Failure);
    }
}
