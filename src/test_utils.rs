//! Helpers for tests: fault injection around a real engine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::{BindValue, ColumnType, Engine, EngineError, StepResult};

/// A step result to inject instead of calling the wrapped engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Busy,
    SchemaChanged,
    Error(EngineError),
}

#[derive(Debug, Default)]
struct PlanState {
    queue: VecDeque<Fault>,
    always_busy: bool,
    steps: usize,
    prepares: usize,
}

/// Shared handle for scripting faults into a [`FaultyEngine`] after it was moved into a
/// connection.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    state: Arc<Mutex<PlanState>>,
}

impl FaultPlan {
    fn with_state<R>(&self, f: impl FnOnce(&mut PlanState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Queue one fault for an upcoming `step` call.
    pub fn push(&self, fault: Fault) {
        self.with_state(|s| s.queue.push_back(fault));
    }

    pub fn push_n(&self, fault: &Fault, count: usize) {
        self.with_state(|s| s.queue.extend(std::iter::repeat_n(fault.clone(), count)));
    }

    /// Make every step report busy until turned off again.
    pub fn set_always_busy(&self, always_busy: bool) {
        self.with_state(|s| s.always_busy = always_busy);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.with_state(|s| s.queue.len())
    }

    /// Number of `step` calls seen, faulted or not.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.with_state(|s| s.steps)
    }

    /// Number of `prepare` calls seen.
    #[must_use]
    pub fn prepares(&self) -> usize {
        self.with_state(|s| s.prepares)
    }

    fn next_fault(&self) -> Option<Fault> {
        self.with_state(|s| {
            s.steps += 1;
            if s.always_busy {
                Some(Fault::Busy)
            } else {
                s.queue.pop_front()
            }
        })
    }
}

/// An [`Engine`] that delegates to `E` but answers `step` from a [`FaultPlan`] first.
#[derive(Debug)]
pub struct FaultyEngine<E> {
    inner: E,
    plan: FaultPlan,
}

impl<E: Engine> FaultyEngine<E> {
    /// Wrap `inner`, returning the plan used to inject faults.
    pub fn new(inner: E) -> (Self, FaultPlan) {
        let plan = FaultPlan::default();
        (
            Self {
                inner,
                plan: plan.clone(),
            },
            plan,
        )
    }
}

impl<E: Engine> Engine for FaultyEngine<E> {
    type Statement = E::Statement;

    fn prepare(&mut self, sql: &str) -> Result<Self::Statement, EngineError> {
        self.plan.with_state(|s| s.prepares += 1);
        self.inner.prepare(sql)
    }

    fn prepare_first(
        &mut self,
        sql: &str,
    ) -> Result<(Option<Self::Statement>, usize), EngineError> {
        self.inner.prepare_first(sql)
    }

    fn bind(
        &mut self,
        stmt: &mut Self::Statement,
        index: usize,
        value: BindValue<'_>,
    ) -> Result<(), EngineError> {
        self.inner.bind(stmt, index, value)
    }

    fn bind_parameter_count(&self, stmt: &Self::Statement) -> usize {
        self.inner.bind_parameter_count(stmt)
    }

    fn bind_parameter_name(&self, stmt: &Self::Statement, index: usize) -> Option<String> {
        self.inner.bind_parameter_name(stmt, index)
    }

    fn step(&mut self, stmt: &mut Self::Statement) -> StepResult {
        match self.plan.next_fault() {
            Some(Fault::Busy) => StepResult::Busy,
            Some(Fault::SchemaChanged) => StepResult::SchemaChanged,
            Some(Fault::Error(err)) => StepResult::Error(err),
            None => self.inner.step(stmt),
        }
    }

    fn reset(&mut self, stmt: &mut Self::Statement) -> Result<(), EngineError> {
        self.inner.reset(stmt)
    }

    fn clear_bindings(&mut self, stmt: &mut Self::Statement) {
        self.inner.clear_bindings(stmt);
    }

    fn finalize(&mut self, stmt: Self::Statement) {
        self.inner.finalize(stmt);
    }

    fn column_count(&self, stmt: &Self::Statement) -> usize {
        self.inner.column_count(stmt)
    }

    fn column_name(&self, stmt: &Self::Statement, index: usize) -> String {
        self.inner.column_name(stmt, index)
    }

    fn column_decltype(&self, stmt: &Self::Statement, index: usize) -> Option<String> {
        self.inner.column_decltype(stmt, index)
    }

    fn column_type(&self, stmt: &Self::Statement, index: usize) -> ColumnType {
        self.inner.column_type(stmt, index)
    }

    fn column_int64(&self, stmt: &Self::Statement, index: usize) -> i64 {
        self.inner.column_int64(stmt, index)
    }

    fn column_double(&self, stmt: &Self::Statement, index: usize) -> f64 {
        self.inner.column_double(stmt, index)
    }

    fn column_text<'s>(&self, stmt: &'s Self::Statement, index: usize) -> &'s [u8] {
        self.inner.column_text(stmt, index)
    }

    fn column_blob<'s>(&self, stmt: &'s Self::Statement, index: usize) -> &'s [u8] {
        self.inner.column_blob(stmt, index)
    }

    fn changes(&self) -> u64 {
        self.inner.changes()
    }

    fn last_insert_rowid(&self) -> i64 {
        self.inner.last_insert_rowid()
    }

    fn is_complete(&self, sql: &str) -> bool {
        self.inner.is_complete(sql)
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.inner.close()
    }
}
