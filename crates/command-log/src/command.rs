//! The command model driving the saga state machine.

use chrono::{DateTime, Utc};
use common::{CommandId, SagaId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a command.
///
/// On the wire this is the bare integer `1..=6`, matching the `name` field of
/// the command record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CommandKind {
    /// Starts a new saga instance.
    BeginSaga = 1,
    /// Terminal command; consumed with no follow-up.
    EndSaga = 2,
    /// Executes the step (transaction or compensation) named by `transactionID`.
    BeginTransaction = 3,
    /// A step finished; navigation decides the next step.
    EndTransaction = 4,
    /// A step failed transiently; it will be re-issued.
    AbortTransaction = 5,
    /// A forward step returned the abort sentinel; compensation begins.
    AbortSaga = 6,
}

impl CommandKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::BeginSaga => "BeginSaga",
            CommandKind::EndSaga => "EndSaga",
            CommandKind::BeginTransaction => "BeginTransaction",
            CommandKind::EndTransaction => "EndTransaction",
            CommandKind::AbortTransaction => "AbortTransaction",
            CommandKind::AbortSaga => "AbortSaga",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<CommandKind> for u8 {
    fn from(kind: CommandKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CommandKind::BeginSaga),
            2 => Ok(CommandKind::EndSaga),
            3 => Ok(CommandKind::BeginTransaction),
            4 => Ok(CommandKind::EndTransaction),
            5 => Ok(CommandKind::AbortTransaction),
            6 => Ok(CommandKind::AbortSaga),
            other => Err(format!("unknown command kind {other}")),
        }
    }
}

/// A saga command: one durable event driving the coordinator state machine.
///
/// Commands are immutable once emitted. `id` is unique per emission, while
/// `saga_id` is stable across every command belonging to one saga instance.
/// `saga_params` is an opaque payload carried through every command verbatim.
/// The kind determines which of the optional string fields are populated;
/// unused ones are empty, and serialize as `""` rather than being omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    #[serde(rename = "name")]
    pub kind: CommandKind,
    #[serde(rename = "sagaID")]
    pub saga_id: SagaId,
    #[serde(rename = "sagaName")]
    pub saga_name: String,
    #[serde(rename = "sagaParams")]
    pub saga_params: Value,
    #[serde(rename = "transactionID")]
    pub transaction_id: String,
    #[serde(rename = "compensationID")]
    pub compensation_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Command {
    /// Returns a command to begin a new saga instance with a fresh saga ID.
    pub fn begin_saga(saga_name: impl Into<String>, params: Value) -> Self {
        Self {
            id: CommandId::new(),
            kind: CommandKind::BeginSaga,
            saga_id: SagaId::new(),
            saga_name: saga_name.into(),
            saga_params: params,
            transaction_id: String::new(),
            compensation_id: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Returns the terminal command for an existing saga instance.
    pub fn end_saga(saga_name: impl Into<String>, saga_id: SagaId) -> Self {
        Self {
            id: CommandId::new(),
            kind: CommandKind::EndSaga,
            saga_id,
            saga_name: saga_name.into(),
            saga_params: Value::Null,
            transaction_id: String::new(),
            compensation_id: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Returns a command to begin the step (transaction or compensation)
    /// named by `transaction_id`.
    pub fn begin_transaction(
        saga_name: impl Into<String>,
        saga_id: SagaId,
        transaction_id: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id: CommandId::new(),
            kind: CommandKind::BeginTransaction,
            saga_id,
            saga_name: saga_name.into(),
            saga_params: params,
            transaction_id: transaction_id.into(),
            compensation_id: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Returns a command to end the step named by `transaction_id`.
    pub fn end_transaction(
        saga_name: impl Into<String>,
        saga_id: SagaId,
        transaction_id: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id: CommandId::new(),
            kind: CommandKind::EndTransaction,
            saga_id,
            saga_name: saga_name.into(),
            saga_params: params,
            transaction_id: transaction_id.into(),
            compensation_id: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Returns a command to end the step named by `transaction_id` while
    /// carrying the compensation to run next. Emitted when a saga enters the
    /// compensating phase; an empty `compensation_id` is equivalent to
    /// [`Command::end_transaction`].
    pub fn end_transaction_compensate(
        saga_name: impl Into<String>,
        saga_id: SagaId,
        transaction_id: impl Into<String>,
        compensation_id: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id: CommandId::new(),
            kind: CommandKind::EndTransaction,
            saga_id,
            saga_name: saga_name.into(),
            saga_params: params,
            transaction_id: transaction_id.into(),
            compensation_id: compensation_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Returns a command to re-issue the step named by `transaction_id`.
    pub fn abort_transaction(
        saga_name: impl Into<String>,
        saga_id: SagaId,
        transaction_id: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id: CommandId::new(),
            kind: CommandKind::AbortTransaction,
            saga_id,
            saga_name: saga_name.into(),
            saga_params: params,
            transaction_id: transaction_id.into(),
            compensation_id: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Returns a command to abort the saga, starting the compensating phase
    /// from the failed step named by `transaction_id`. Params are carried so
    /// compensations receive the original forward payload.
    pub fn abort_saga(
        saga_name: impl Into<String>,
        saga_id: SagaId,
        transaction_id: impl Into<String>,
        params: Value,
    ) -> Self {
        Self {
            id: CommandId::new(),
            kind: CommandKind::AbortSaga,
            saga_id,
            saga_name: saga_name.into(),
            saga_params: params,
            transaction_id: transaction_id.into(),
            compensation_id: String::new(),
            created_at: Utc::now(),
        }
    }
}
