//! Saga execution coordination over a durable command log.
//!
//! This crate orchestrates long-running business transactions composed of a
//! linear sequence of forward steps, each optionally paired with a
//! compensating step. Execution is driven entirely by commands read from and
//! written to an external at-least-once command log, which makes the
//! coordinator crash-safe and horizontally replayable: it holds no
//! per-instance state.
//!
//! A saga is declared with the fluent [`SagaBuilder`], registered with a
//! [`SagaCoordinator`], and started by writing a `BeginSaga` command to the
//! log. On failure the coordinator walks the compensation chain backwards
//! and, where a save-point is declared, snaps forward again after it. A
//! forward step triggers that rollback by returning the [`AbortSaga`]
//! sentinel; any other error is retried indefinitely.

pub mod builder;
pub mod coordinator;
pub mod definition;
pub mod error;

pub use builder::{SagaBuilder, TransactionBuilder};
pub use coordinator::{ErrorSink, MemoryErrorSink, SagaCoordinator, TracingErrorSink};
pub use definition::{
    Compensation, CompensationPolicy, Saga, StepFn, StepFuture, Transaction,
};
pub use error::{
    AbortSaga, BuildError, Result, SagaError, StepError, StepResult, is_abort_saga,
};
