//! Immutable saga definitions and the navigation over them.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{SagaError, StepResult};

/// Future returned by a step body.
pub type StepFuture = Pin<Box<dyn Future<Output = StepResult> + Send>>;

/// A transaction or compensation body.
///
/// Receives a cancellation token derived from the coordinator's shutdown
/// token and the saga's opaque params. Bodies must be idempotent: at-least-
/// once delivery may invoke them more than once for the same step.
pub type StepFn = Arc<dyn Fn(CancellationToken, Value) -> StepFuture + Send + Sync>;

pub(crate) fn step_fn<F, Fut>(f: F) -> StepFn
where
    F: Fn(CancellationToken, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    Arc::new(move |ctx, params| Box::pin(f(ctx, params)))
}

/// Controls which compensation starts the rollback when a transaction
/// returns the abort sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompensationPolicy {
    /// Roll back starting from the failing transaction's own compensation.
    /// If the failing transaction declared none, earlier compensations are
    /// skipped entirely and the saga ends at once. This matches the
    /// historical behavior of command-driven coordinators that key the
    /// rollback on the failed step alone.
    #[default]
    FailingStepOnly,

    /// Fall back to the compensation of the nearest earlier transaction that
    /// declared one when the failing transaction has none.
    NearestCompensated,
}

/// One forward step in a saga.
#[derive(Clone)]
pub struct Transaction {
    /// Step name, unique within the saga.
    pub name: String,
    /// Name of the next transaction in forward order; empty if last.
    pub next_transaction_name: String,
    /// Name of the attached compensation; empty if none.
    pub compensation_name: String,
    /// Save-point flag: compensation traversal stops here and forward flow
    /// resumes after this transaction.
    pub is_save_point: bool,
    /// The forward body.
    pub func: StepFn,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("name", &self.name)
            .field("next_transaction_name", &self.next_transaction_name)
            .field("compensation_name", &self.compensation_name)
            .field("is_save_point", &self.is_save_point)
            .finish_non_exhaustive()
    }
}

/// The undo step paired with a transaction.
#[derive(Clone)]
pub struct Compensation {
    /// Step name, unique within the saga.
    pub name: String,
    /// Name of the compensation attached to the nearest earlier transaction
    /// that declared one; empty if none.
    pub next_compensation_name: String,
    /// The compensating body. Must be idempotent and must not return the
    /// abort sentinel.
    pub func: StepFn,
}

impl fmt::Debug for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compensation")
            .field("name", &self.name)
            .field("next_compensation_name", &self.next_compensation_name)
            .finish_non_exhaustive()
    }
}

/// A named, ordered sequence of forward transactions with optional
/// compensations and save-points.
///
/// Immutable once produced by [`SagaBuilder::end`](crate::SagaBuilder::end).
/// The logical order is encoded in the `next_*` links and the recorded first
/// transaction; lookup is by name.
#[derive(Clone)]
pub struct Saga {
    pub(crate) name: String,
    pub(crate) first_transaction: String,
    pub(crate) transactions: HashMap<String, Transaction>,
    pub(crate) compensations: HashMap<String, Compensation>,
    /// Transaction names in declaration order.
    pub(crate) order: Vec<String>,
    pub(crate) policy: CompensationPolicy,
}

impl fmt::Debug for Saga {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Saga")
            .field("name", &self.name)
            .field("first_transaction", &self.first_transaction)
            .field("order", &self.order)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Saga {
    /// Returns the name of the saga.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the first transaction, or empty for a saga with
    /// no steps.
    pub fn first_transaction(&self) -> &str {
        &self.first_transaction
    }

    /// Returns the compensation name attached to `transaction_id`, or empty
    /// if the transaction is unknown or declared no compensation.
    pub fn compensation_of(&self, transaction_id: &str) -> &str {
        self.transactions
            .get(transaction_id)
            .map(|t| t.compensation_name.as_str())
            .unwrap_or("")
    }

    /// Returns the compensation that starts the rollback when
    /// `transaction_id` aborts the saga, honoring the configured
    /// [`CompensationPolicy`].
    pub fn compensation_for_abort(&self, transaction_id: &str) -> &str {
        let own = self.compensation_of(transaction_id);
        if !own.is_empty() || self.policy == CompensationPolicy::FailingStepOnly {
            return own;
        }
        let Some(index) = self.order.iter().position(|n| n == transaction_id) else {
            return "";
        };
        for name in self.order[..index].iter().rev() {
            let compensation = &self.transactions[name].compensation_name;
            if !compensation.is_empty() {
                return compensation;
            }
        }
        ""
    }

    /// Returns true if `step_id` names a compensation.
    pub fn is_compensation(&self, step_id: &str) -> bool {
        self.compensations.contains_key(step_id)
    }

    /// Returns the transaction registered under `name`.
    pub fn transaction(&self, name: &str) -> Option<&Transaction> {
        self.transactions.get(name)
    }

    /// Returns the compensation registered under `name`.
    pub fn compensation(&self, name: &str) -> Option<&Compensation> {
        self.compensations.get(name)
    }

    /// Returns the ID of the step following `step_id`, or empty when the
    /// saga is finished.
    ///
    /// For a transaction this is its forward successor. For a compensation
    /// the traversal runs backwards: the nearest earlier transaction with a
    /// compensation continues the rollback, unless a save-point is reached
    /// first, in which case forward flow resumes at the transaction after
    /// the save-point. Empty means the saga is fully rolled back.
    pub fn next(&self, step_id: &str) -> &str {
        if let Some(transaction) = self.transactions.get(step_id) {
            return &transaction.next_transaction_name;
        }
        if let Some(compensation) = self.compensations.get(step_id) {
            return self.next_after_compensation(compensation);
        }
        ""
    }

    fn next_after_compensation<'a>(&'a self, compensation: &'a Compensation) -> &'a str {
        let Some(owner_index) = self
            .order
            .iter()
            .position(|n| self.transactions[n].compensation_name == compensation.name)
        else {
            return &compensation.next_compensation_name;
        };

        // The save-point's own compensation has just run; resume after it.
        let owner = &self.transactions[&self.order[owner_index]];
        if owner.is_save_point {
            return &owner.next_transaction_name;
        }

        for name in self.order[..owner_index].iter().rev() {
            let transaction = &self.transactions[name];
            if !transaction.compensation_name.is_empty() {
                return &transaction.compensation_name;
            }
            if transaction.is_save_point {
                return &transaction.next_transaction_name;
            }
        }
        ""
    }

    /// Invokes the forward or compensating body bound to `step_id`.
    ///
    /// The outer error is a coordinator-level failure (no such step); the
    /// inner result is the body's own outcome.
    pub async fn execute_step(
        &self,
        ctx: CancellationToken,
        step_id: &str,
        params: Value,
    ) -> Result<StepResult, SagaError> {
        if let Some(transaction) = self.transactions.get(step_id) {
            return Ok((transaction.func)(ctx, params).await);
        }
        if let Some(compensation) = self.compensations.get(step_id) {
            return Ok((compensation.func)(ctx, params).await);
        }
        Err(SagaError::UnknownStep(step_id.to_string()))
    }
}
