//! Saga error types and the abort sentinel.

use command_log::{CommandId, CommandLogError};
use thiserror::Error;

/// Boxed error type returned by transaction and compensation bodies.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of one step body invocation.
pub type StepResult = std::result::Result<(), StepError>;

/// Sentinel error returned by a forward transaction to trigger the
/// compensating phase.
///
/// The sentinel may be wrapped in another error; [`is_abort_saga`] detects it
/// anywhere in the source chain, so bodies can add context without defeating
/// the check. Compensations must never return it; the coordinator demotes a
/// sentinel from a compensation to a generic retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("saga aborted")]
pub struct AbortSaga;

/// Returns true if `err` is the abort sentinel, or wraps it anywhere in its
/// source chain.
pub fn is_abort_saga(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<AbortSaga>().is_some() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Errors that can occur during saga operations.
///
/// These are coordinator-level failures: the input command is left
/// uncommitted so at-least-once redelivery re-drives it. Step bodies failing
/// is not an error at this level; it is handled through the command flow.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No transaction or compensation is registered under the step ID.
    #[error("no transaction or compensation with id {0}")]
    UnknownStep(String),

    /// No saga is registered under the name carried by a command.
    #[error("no saga with name {0} exists")]
    UnknownSaga(String),

    /// Reading the next command from the log failed.
    #[error("command read failed: {0}")]
    Read(#[source] CommandLogError),

    /// Writing the follow-up command failed.
    #[error("command {id} write failed: {source}")]
    Write {
        id: CommandId,
        #[source]
        source: CommandLogError,
    },

    /// Committing the input command failed.
    #[error("command {id} commit failed: {source}")]
    Commit {
        id: CommandId,
        #[source]
        source: CommandLogError,
    },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Errors reported by [`SagaBuilder::end`](crate::SagaBuilder::end).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A name was used more than once. Transactions and compensations share
    /// the step-ID namespace at navigation time, so the check spans both.
    #[error("duplicate step name {0}")]
    DuplicateStepName(String),

    /// `begin` was called on a builder that already had a transaction.
    #[error("begin called after the first transaction was added")]
    BeginAfterFirst,
}
