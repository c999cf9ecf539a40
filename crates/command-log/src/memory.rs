use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::{Command, CommandLog, CommandLogError, Result};

#[derive(Debug, Default)]
struct LogState {
    pending: VecDeque<Command>,
    in_flight: Vec<Command>,
    history: Vec<Command>,
    committed: usize,
}

/// In-memory command log implementation for tests and examples.
///
/// Behaves as a single partition: one FIFO queue with explicit commit, so
/// per-saga ordering holds trivially. Reading moves a command into the
/// in-flight set; committing removes it. [`redeliver_uncommitted`] pushes all
/// in-flight commands back to the front of the queue, simulating the
/// redelivery a durable transport performs after a consumer crash.
///
/// [`redeliver_uncommitted`]: InMemoryCommandLog::redeliver_uncommitted
#[derive(Clone, Default)]
pub struct InMemoryCommandLog {
    state: Arc<Mutex<LogState>>,
    notify: Arc<Notify>,
}

impl InMemoryCommandLog {
    /// Creates a new empty in-memory command log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every command ever written, in write order.
    pub async fn history(&self) -> Vec<Command> {
        self.state.lock().await.history.clone()
    }

    /// Returns the number of written-but-unread commands.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Returns the number of read-but-uncommitted commands.
    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Returns the number of committed commands.
    pub async fn committed_count(&self) -> usize {
        self.state.lock().await.committed
    }

    /// Requeues all read-but-uncommitted commands at the front of the queue,
    /// preserving their original order. Returns how many were requeued.
    pub async fn redeliver_uncommitted(&self) -> usize {
        let mut state = self.state.lock().await;
        let in_flight = std::mem::take(&mut state.in_flight);
        let requeued = in_flight.len();
        for command in in_flight.into_iter().rev() {
            state.pending.push_front(command);
        }
        drop(state);
        if requeued > 0 {
            self.notify.notify_one();
        }
        requeued
    }
}

#[async_trait]
impl CommandLog for InMemoryCommandLog {
    async fn read(&self) -> Result<Command> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(command) = state.pending.pop_front() {
                    state.in_flight.push(command.clone());
                    return Ok(command);
                }
            }
            notified.await;
        }
    }

    async fn write(&self, command: Command) -> Result<()> {
        let mut state = self.state.lock().await;
        state.history.push(command.clone());
        state.pending.push_back(command);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn commit(&self, command: &Command) -> Result<()> {
        let mut state = self.state.lock().await;
        let position = state
            .in_flight
            .iter()
            .position(|c| c.id == command.id)
            .ok_or(CommandLogError::NotInFlight(command.id))?;
        state.in_flight.remove(position);
        state.committed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::CommandKind;

    fn command(name: &str) -> Command {
        Command::begin_saga(name, json!({"n": 1}))
    }

    #[tokio::test]
    async fn write_then_read_preserves_order() {
        let log = InMemoryCommandLog::new();
        let a = command("A");
        let b = command("B");
        log.write(a.clone()).await.unwrap();
        log.write(b.clone()).await.unwrap();

        assert_eq!(log.read().await.unwrap().id, a.id);
        assert_eq!(log.read().await.unwrap().id, b.id);
        assert_eq!(log.in_flight_count().await, 2);
    }

    #[tokio::test]
    async fn read_blocks_until_a_write_arrives() {
        let log = InMemoryCommandLog::new();
        let reader = tokio::spawn({
            let log = log.clone();
            async move { log.read().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        let c = command("A");
        log.write(c.clone()).await.unwrap();
        let got = reader.await.unwrap().unwrap();
        assert_eq!(got.id, c.id);
    }

    #[tokio::test]
    async fn commit_consumes_in_flight_command() {
        let log = InMemoryCommandLog::new();
        let c = command("A");
        log.write(c.clone()).await.unwrap();

        let read = log.read().await.unwrap();
        log.commit(&read).await.unwrap();

        assert_eq!(log.in_flight_count().await, 0);
        assert_eq!(log.committed_count().await, 1);
    }

    #[tokio::test]
    async fn commit_of_unread_command_fails() {
        let log = InMemoryCommandLog::new();
        let c = command("A");

        let err = log.commit(&c).await.unwrap_err();
        assert!(matches!(err, CommandLogError::NotInFlight(id) if id == c.id));
    }

    #[tokio::test]
    async fn double_commit_fails() {
        let log = InMemoryCommandLog::new();
        log.write(command("A")).await.unwrap();

        let read = log.read().await.unwrap();
        log.commit(&read).await.unwrap();
        let err = log.commit(&read).await.unwrap_err();
        assert!(matches!(err, CommandLogError::NotInFlight(_)));
    }

    #[tokio::test]
    async fn redeliver_requeues_uncommitted_in_order() {
        let log = InMemoryCommandLog::new();
        let a = command("A");
        let b = command("B");
        log.write(a.clone()).await.unwrap();
        log.write(b.clone()).await.unwrap();
        log.read().await.unwrap();
        log.read().await.unwrap();

        assert_eq!(log.redeliver_uncommitted().await, 2);
        assert_eq!(log.in_flight_count().await, 0);

        // Same commands come back, in the original order.
        assert_eq!(log.read().await.unwrap().id, a.id);
        assert_eq!(log.read().await.unwrap().id, b.id);
    }

    #[tokio::test]
    async fn history_records_every_write() {
        let log = InMemoryCommandLog::new();
        let a = command("A");
        log.write(a.clone()).await.unwrap();
        let read = log.read().await.unwrap();
        log.commit(&read).await.unwrap();
        log.write(command("B")).await.unwrap();

        let history = log.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, a.id);
        assert_eq!(history[0].kind, CommandKind::BeginSaga);
    }
}
