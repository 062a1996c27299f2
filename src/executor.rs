//! Stepping statements with lock-contention retry.

use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::engine::{Engine, EngineError, StepResult};
use crate::error::SqlCursorError;

/// Sleep schedule between busy retries; the last delay repeats until the deadline.
const BUSY_DELAYS: &[Duration] = &[
    Duration::from_millis(1),
    Duration::from_millis(2),
    Duration::from_millis(5),
    Duration::from_millis(10),
    Duration::from_millis(15),
    Duration::from_millis(20),
    Duration::from_millis(25),
    Duration::from_millis(25),
    Duration::from_millis(25),
    Duration::from_millis(50),
    Duration::from_millis(50),
    Duration::from_millis(100),
];

/// A step that produced something to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Row,
    Done,
}

/// A step that failed after retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    /// The lock stayed contended for the whole timeout.
    Busy(Duration),
    /// Left to the caller, which may recompile and try once more.
    SchemaChanged,
    Engine(EngineError),
}

impl From<StepFailure> for SqlCursorError {
    fn from(failure: StepFailure) -> Self {
        match failure {
            StepFailure::Busy(timeout) => SqlCursorError::Busy { timeout },
            StepFailure::SchemaChanged => {
                SqlCursorError::OperationalError("database schema has changed".into())
            }
            StepFailure::Engine(err) => err.into(),
        }
    }
}

fn backoff(attempt: usize) -> Duration {
    BUSY_DELAYS
        .get(attempt)
        .or(BUSY_DELAYS.last())
        .copied()
        .unwrap_or(Duration::from_millis(1))
}

/// Step `stmt` once, retrying while the engine reports a busy lock and `timeout` has not
/// elapsed.
///
/// # Errors
/// Returns `StepFailure::Busy` once the deadline passes, `SchemaChanged` or the engine's
/// error otherwise.
pub fn step_with_retry<E: Engine>(
    engine: &mut E,
    stmt: &mut E::Statement,
    timeout: Duration,
) -> Result<StepOutcome, StepFailure> {
    let started = Instant::now();
    let mut attempt = 0usize;
    loop {
        match engine.step(stmt) {
            StepResult::Row => return Ok(StepOutcome::Row),
            StepResult::Done => return Ok(StepOutcome::Done),
            StepResult::SchemaChanged => return Err(StepFailure::SchemaChanged),
            StepResult::Error(err) => return Err(StepFailure::Engine(err)),
            StepResult::Busy => {
                let elapsed = started.elapsed();
                if elapsed >= timeout {
                    trace!(attempt, ?timeout, "busy retries exhausted");
                    return Err(StepFailure::Busy(timeout));
                }
                let delay = backoff(attempt).min(timeout - elapsed);
                trace!(attempt, ?delay, "database busy; retrying step");
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// Step `stmt` until it is done, discarding any rows.
///
/// # Errors
/// Same as [`step_with_retry`].
pub fn run_to_completion<E: Engine>(
    engine: &mut E,
    stmt: &mut E::Statement,
    timeout: Duration,
) -> Result<(), StepFailure> {
    while step_with_retry(engine, stmt, timeout)? == StepOutcome::Row {}
    Ok(())
}

/// Compile `sql`, run it to completion with retry and finalize it.
///
/// # Errors
/// Returns `OperationalError` if the text does not compile, or the converted step failure.
pub fn execute_one_shot<E: Engine>(
    engine: &mut E,
    sql: &str,
    timeout: Duration,
) -> Result<(), SqlCursorError> {
    let mut stmt = engine.prepare(sql)?;
    let result = run_to_completion(engine, &mut stmt, timeout);
    engine.finalize(stmt);
    result.map_err(SqlCursorError::from)
}
