//! The saga execution coordinator: the loop that reads commands, executes
//! steps, and writes follow-up commands.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use command_log::{Command, CommandKind, CommandLog};
use tokio_util::sync::CancellationToken;

use crate::definition::Saga;
use crate::error::{Result, SagaError, is_abort_saga};

/// Receives coordinator-level errors.
///
/// Intended for operational visibility, never for flow control: every error
/// handed to the sink also leaves the input command uncommitted, so
/// at-least-once redelivery re-drives it.
pub trait ErrorSink: Send + Sync {
    /// Records one error.
    fn log(&self, err: &SagaError);
}

/// Forwards every error to `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn log(&self, err: &SagaError) {
        tracing::error!(error = %err, "coordinator error");
    }
}

/// In-memory error sink for testing.
#[derive(Debug, Clone, Default)]
pub struct MemoryErrorSink {
    errors: Arc<Mutex<Vec<String>>>,
}

impl MemoryErrorSink {
    /// Creates a new empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the formatted errors recorded so far.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    /// Returns the number of errors recorded so far.
    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl ErrorSink for MemoryErrorSink {
    fn log(&self, err: &SagaError) {
        self.errors.lock().unwrap().push(err.to_string());
    }
}

/// The Saga Execution Coordinator.
///
/// Holds the command log, the error sink, and the saga definitions keyed by
/// name. It holds no per-instance state: the next command in the log is the
/// source of truth, so a coordinator can crash at any point and another one
/// can pick the saga up by replaying the uncommitted command.
///
/// Registration takes `&mut self` while [`start`](SagaCoordinator::start)
/// borrows the coordinator for its whole run, so no saga can be added while
/// the loop is live.
pub struct SagaCoordinator<L> {
    log: L,
    errors: Arc<dyn ErrorSink>,
    sagas: HashMap<String, Saga>,
}

impl<L: CommandLog> SagaCoordinator<L> {
    /// Creates a coordinator over the given command log and error sink.
    pub fn new(log: L, errors: Arc<dyn ErrorSink>) -> Self {
        Self {
            log,
            errors,
            sagas: HashMap::new(),
        }
    }

    /// Registers a saga definition under its name, replacing any previous
    /// definition with the same name.
    pub fn register_saga(&mut self, saga: Saga) {
        self.sagas.insert(saga.name().to_string(), saga);
    }

    /// Runs the coordinator loop until `shutdown` is cancelled.
    ///
    /// One iteration is read → process → commit, strictly serial. Every
    /// failure goes to the error sink and skips the commit; the command is
    /// redelivered. Cancellation takes effect at the next iteration
    /// boundary; an in-flight read is abandoned uncommitted.
    pub async fn start(&self, shutdown: CancellationToken) {
        loop {
            let command = tokio::select! {
                biased;
                () = shutdown.cancelled() => return,
                read = self.log.read() => match read {
                    Ok(command) => command,
                    Err(err) => {
                        self.errors.log(&SagaError::Read(err));
                        continue;
                    }
                },
            };

            if let Err(err) = self.process_command(&shutdown, &command).await {
                self.errors.log(&err);
                continue;
            }

            if let Err(source) = self.log.commit(&command).await {
                self.errors.log(&SagaError::Commit {
                    id: command.id,
                    source,
                });
            }
        }
    }

    /// Processes one command: dispatch on its kind, invoke the step body
    /// where the kind calls for one, and write the single follow-up command
    /// (none for the terminal kind).
    #[tracing::instrument(
        skip(self, shutdown, command),
        fields(
            command_id = %command.id,
            kind = %command.kind,
            saga_name = %command.saga_name,
            saga_id = %command.saga_id,
        )
    )]
    pub async fn process_command(
        &self,
        shutdown: &CancellationToken,
        command: &Command,
    ) -> Result<()> {
        metrics::counter!("saga_commands_processed").increment(1);

        let saga = self
            .sagas
            .get(&command.saga_name)
            .ok_or_else(|| SagaError::UnknownSaga(command.saga_name.clone()))?;

        match command.kind {
            CommandKind::BeginSaga => {
                let first = saga.first_transaction();
                let follow_up = if first.is_empty() {
                    Command::end_saga(&command.saga_name, command.saga_id)
                } else {
                    Command::begin_transaction(
                        &command.saga_name,
                        command.saga_id,
                        first,
                        command.saga_params.clone(),
                    )
                };
                self.write(follow_up).await
            }
            CommandKind::BeginTransaction => {
                let outcome = saga
                    .execute_step(
                        shutdown.child_token(),
                        &command.transaction_id,
                        command.saga_params.clone(),
                    )
                    .await?;
                let follow_up = match outcome {
                    Ok(()) => Command::end_transaction_compensate(
                        &command.saga_name,
                        command.saga_id,
                        &command.transaction_id,
                        &command.compensation_id,
                        command.saga_params.clone(),
                    ),
                    Err(err) if is_abort_saga(err.as_ref()) => {
                        if saga.is_compensation(&command.transaction_id) {
                            // A compensation must not abort the saga; demote
                            // the sentinel to a retryable failure.
                            metrics::counter!("saga_step_retried").increment(1);
                            tracing::warn!(
                                step = %command.transaction_id,
                                "compensation returned the abort sentinel; retrying it instead"
                            );
                            Command::abort_transaction(
                                &command.saga_name,
                                command.saga_id,
                                &command.transaction_id,
                                command.saga_params.clone(),
                            )
                        } else {
                            metrics::counter!("saga_aborted").increment(1);
                            tracing::warn!(
                                step = %command.transaction_id,
                                error = %err,
                                "transaction aborted the saga; compensating"
                            );
                            Command::abort_saga(
                                &command.saga_name,
                                command.saga_id,
                                &command.transaction_id,
                                command.saga_params.clone(),
                            )
                        }
                    }
                    Err(err) => {
                        metrics::counter!("saga_step_retried").increment(1);
                        tracing::warn!(
                            step = %command.transaction_id,
                            error = %err,
                            "step failed; it will be retried"
                        );
                        Command::abort_transaction(
                            &command.saga_name,
                            command.saga_id,
                            &command.transaction_id,
                            command.saga_params.clone(),
                        )
                    }
                };
                self.write(follow_up).await
            }
            CommandKind::AbortTransaction => {
                self.write(Command::begin_transaction(
                    &command.saga_name,
                    command.saga_id,
                    &command.transaction_id,
                    command.saga_params.clone(),
                ))
                .await
            }
            CommandKind::AbortSaga => {
                let compensation = saga.compensation_for_abort(&command.transaction_id);
                self.write(Command::end_transaction_compensate(
                    &command.saga_name,
                    command.saga_id,
                    &command.transaction_id,
                    compensation,
                    command.saga_params.clone(),
                ))
                .await
            }
            CommandKind::EndTransaction => {
                // A non-empty compensation ID enters (or continues) the
                // compensating phase; otherwise navigation decides.
                let next_step = if command.compensation_id.is_empty() {
                    saga.next(&command.transaction_id)
                } else {
                    &command.compensation_id
                };
                let follow_up = if next_step.is_empty() {
                    Command::end_saga(&command.saga_name, command.saga_id)
                } else {
                    Command::begin_transaction(
                        &command.saga_name,
                        command.saga_id,
                        next_step,
                        command.saga_params.clone(),
                    )
                };
                self.write(follow_up).await
            }
            CommandKind::EndSaga => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!("saga reached its terminal command");
                Ok(())
            }
        }
    }

    async fn write(&self, command: Command) -> Result<()> {
        let id = command.id;
        self.log
            .write(command)
            .await
            .map_err(|source| SagaError::Write { id, source })
    }
}
