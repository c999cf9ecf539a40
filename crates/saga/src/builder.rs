//! Fluent construction of saga definitions.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::definition::{Compensation, CompensationPolicy, Saga, Transaction, step_fn};
use crate::error::{BuildError, StepResult};

/// Builds a [`Saga`] as a fluent chain:
///
/// ```ignore
/// let saga = SagaBuilder::new("HotelBooking")
///     .begin("BookHotel", book_hotel)
///     .with_compensation("CancelHotelBooking", cancel_hotel)
///     .then("PayHotelBooking", pay_hotel)
///     .save_point()
///     .no_compensation()
///     .end()?;
/// ```
///
/// The builder moves by value through every call. Cloning an intermediate
/// builder yields fully independent chains; no cross-chain interference can
/// occur. Validation is deferred to [`end`](SagaBuilder::end), which rejects
/// duplicate step names (transactions and compensations share one namespace)
/// and a `begin` issued after the first transaction.
#[derive(Clone)]
pub struct SagaBuilder {
    name: String,
    transactions: Vec<Transaction>,
    compensations: Vec<Compensation>,
    policy: CompensationPolicy,
    error: Option<BuildError>,
}

impl SagaBuilder {
    /// Returns a new builder for a saga with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transactions: Vec::new(),
            compensations: Vec::new(),
            policy: CompensationPolicy::default(),
            error: None,
        }
    }

    /// Sets the rollback policy used when an aborting transaction declared
    /// no compensation. Defaults to [`CompensationPolicy::FailingStepOnly`].
    pub fn compensation_policy(mut self, policy: CompensationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Starts the first transaction of the saga.
    ///
    /// Calling `begin` after a transaction has already been added is
    /// reported by [`end`](SagaBuilder::end).
    pub fn begin<F, Fut>(mut self, name: impl Into<String>, f: F) -> TransactionBuilder
    where
        F: Fn(CancellationToken, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        if !self.transactions.is_empty() && self.error.is_none() {
            self.error = Some(BuildError::BeginAfterFirst);
        }
        TransactionBuilder {
            builder: self,
            transaction: Transaction {
                name: name.into(),
                next_transaction_name: String::new(),
                compensation_name: String::new(),
                is_save_point: false,
                func: step_fn(f),
            },
        }
    }

    /// Starts a subsequent transaction, linking the previous one forward to
    /// it.
    pub fn then<F, Fut>(mut self, name: impl Into<String>, f: F) -> TransactionBuilder
    where
        F: Fn(CancellationToken, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        let name = name.into();
        if let Some(previous) = self.transactions.last_mut() {
            previous.next_transaction_name = name.clone();
        }
        TransactionBuilder {
            builder: self,
            transaction: Transaction {
                name,
                next_transaction_name: String::new(),
                compensation_name: String::new(),
                is_save_point: false,
                func: step_fn(f),
            },
        }
    }

    /// Produces the immutable saga definition.
    ///
    /// A builder with no transactions yields an empty saga that is
    /// processable only as a degenerate `BeginSaga → EndSaga`.
    pub fn end(self) -> Result<Saga, BuildError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut seen = HashSet::new();
        for transaction in &self.transactions {
            if !seen.insert(transaction.name.clone()) {
                return Err(BuildError::DuplicateStepName(transaction.name.clone()));
            }
        }
        for compensation in &self.compensations {
            if !seen.insert(compensation.name.clone()) {
                return Err(BuildError::DuplicateStepName(compensation.name.clone()));
            }
        }

        let first_transaction = self
            .transactions
            .first()
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let order: Vec<String> = self.transactions.iter().map(|t| t.name.clone()).collect();
        let transactions: HashMap<String, Transaction> = self
            .transactions
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        let compensations: HashMap<String, Compensation> = self
            .compensations
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        Ok(Saga {
            name: self.name,
            first_transaction,
            transactions,
            compensations,
            order,
            policy: self.policy,
        })
    }
}

/// Holds the transaction under construction until it is finalised with
/// [`with_compensation`](TransactionBuilder::with_compensation) or
/// [`no_compensation`](TransactionBuilder::no_compensation).
#[derive(Clone)]
pub struct TransactionBuilder {
    builder: SagaBuilder,
    transaction: Transaction,
}

impl TransactionBuilder {
    /// Marks the pending transaction as a save-point: compensation traversal
    /// stops here and forward flow resumes after it. Idempotent.
    pub fn save_point(mut self) -> Self {
        self.transaction.is_save_point = true;
        self
    }

    /// Finalises the pending transaction, attaching a compensation.
    ///
    /// The new compensation's backward link points at the compensation of
    /// the nearest earlier transaction that declared one, skipping
    /// uncompensated transactions.
    pub fn with_compensation<F, Fut>(mut self, name: impl Into<String>, f: F) -> SagaBuilder
    where
        F: Fn(CancellationToken, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        let mut compensation = Compensation {
            name: name.into(),
            next_compensation_name: String::new(),
            func: step_fn(f),
        };
        self.transaction.compensation_name = compensation.name.clone();

        for earlier in self.builder.transactions.iter().rev() {
            if !earlier.compensation_name.is_empty() {
                compensation.next_compensation_name = earlier.compensation_name.clone();
                break;
            }
        }

        self.builder.transactions.push(self.transaction);
        self.builder.compensations.push(compensation);
        self.builder
    }

    /// Finalises the pending transaction without a compensation. Use this
    /// for transactions that are not reversible.
    pub fn no_compensation(mut self) -> SagaBuilder {
        self.builder.transactions.push(self.transaction);
        self.builder
    }
}
