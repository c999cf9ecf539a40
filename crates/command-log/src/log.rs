use async_trait::async_trait;

use crate::{Command, Result};

/// Contract for an at-least-once durable command log partitioned by saga ID.
///
/// All implementations must be thread-safe (Send + Sync). Writes belonging to
/// the same saga ID must preserve order; implementations typically achieve
/// this by keying transport partitions on the saga ID, which also routes all
/// commands of one saga instance to a single coordinator at a time.
#[async_trait]
pub trait CommandLog: Send + Sync {
    /// Returns the next command in log order.
    ///
    /// Blocks until a command is available; callers cancel by dropping the
    /// future (the coordinator selects it against a shutdown token). Delivery
    /// is at-least-once: a command read but never committed will be returned
    /// again.
    async fn read(&self) -> Result<Command>;

    /// Appends a command to the log.
    ///
    /// The command must be durable before this returns success.
    async fn write(&self, command: Command) -> Result<()>;

    /// Marks a previously read command as consumed.
    ///
    /// Only called after the follow-up write succeeded. Committing a command
    /// that was never read, or was already committed, fails with
    /// [`CommandLogError::NotInFlight`](crate::CommandLogError::NotInFlight).
    async fn commit(&self, command: &Command) -> Result<()>;
}
