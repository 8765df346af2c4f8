//! Blocking / async execution duality.
//!
//! Engine algorithms are written once as `async fn`s that take an
//! [`ExecutionMode`]. In [`ExecutionMode::Blocking`] every awaited step calls
//! the synchronous driver or hook and is immediately ready, so the whole
//! future completes on its first poll; [`complete_blocking`] performs that
//! poll. In [`ExecutionMode::Async`] the same steps await the driver's async
//! methods and honor cancellation through the [`Cx`].

use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll, Waker};

use asupersync::{Cx, Outcome};

use crate::error::{Error, Result};

/// How one logical call performs its I/O.
#[derive(Clone, Copy)]
pub enum ExecutionMode<'a> {
    /// Plain blocking driver calls, no cancellation.
    Blocking,
    /// Async driver calls under the given capability context.
    Async(&'a Cx),
}

impl ExecutionMode<'_> {
    pub fn is_async(&self) -> bool {
        matches!(self, ExecutionMode::Async(_))
    }

    /// Cancellation checkpoint.
    ///
    /// Returns `Some(Outcome::Cancelled(..))` if the context has been
    /// cancelled; always `None` in blocking mode.
    pub fn checkpoint<T>(&self) -> Option<Outcome<T, Error>> {
        match self {
            ExecutionMode::Blocking => None,
            ExecutionMode::Async(cx) => cx.cancel_reason().map(Outcome::Cancelled),
        }
    }
}

impl fmt::Debug for ExecutionMode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Blocking => f.write_str("Blocking"),
            ExecutionMode::Async(_) => f.write_str("Async"),
        }
    }
}

/// Propagate any non-`Ok` outcome from the enclosing function.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            $crate::Outcome::Ok(value) => value,
            $crate::Outcome::Err(err) => return $crate::Outcome::Err(err),
            $crate::Outcome::Cancelled(reason) => return $crate::Outcome::Cancelled(reason),
            $crate::Outcome::Panicked(payload) => return $crate::Outcome::Panicked(payload),
        }
    };
}

/// Lift a blocking driver result into an outcome.
pub fn from_result<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(value) => Outcome::Ok(value),
        Err(err) => Outcome::Err(err),
    }
}

/// Collapse an outcome into a `Result` for the blocking API.
pub fn into_result<T>(outcome: Outcome<T, Error>) -> Result<T> {
    match outcome {
        Outcome::Ok(value) => Ok(value),
        Outcome::Err(err) => Err(err),
        Outcome::Cancelled(reason) => Err(Error::cancelled(&reason)),
        Outcome::Panicked(payload) => Err(Error::Custom(format!("panicked: {payload:?}"))),
    }
}

/// Drive a future built in [`ExecutionMode::Blocking`] to completion.
///
/// Such futures never suspend. If one does, a driver or interceptor returned a
/// pending future from a blocking entry point and the call fails instead of
/// spinning.
pub fn complete_blocking<T, F>(future: F) -> Result<T>
where
    F: Future<Output = Outcome<T, Error>>,
{
    let mut future = pin!(future);
    let mut task_cx = Context::from_waker(Waker::noop());
    match future.as_mut().poll(&mut task_cx) {
        Poll::Ready(outcome) => into_result(outcome),
        Poll::Pending => Err(Error::Custom(
            "blocking execution suspended on an asynchronous operation".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn add_one(mode: ExecutionMode<'_>, value: i64) -> Outcome<i64, Error> {
        if let Some(cancelled) = mode.checkpoint() {
            return cancelled;
        }
        let doubled = try_outcome!(from_result(Ok::<_, Error>(value)));
        Outcome::Ok(doubled + 1)
    }

    #[test]
    fn test_complete_blocking_runs_ready_future() {
        let result = complete_blocking(add_one(ExecutionMode::Blocking, 41));
        assert_eq!(result.ok(), Some(42));
    }

    #[test]
    fn test_complete_blocking_rejects_pending_future() {
        let result: Result<()> = complete_blocking(async {
            std::future::pending::<()>().await;
            Outcome::Ok(())
        });
        assert!(matches!(result, Err(Error::Custom(_))));
    }

    #[test]
    fn test_try_outcome_propagates_error() {
        async fn failing() -> Outcome<i64, Error> {
            let v: i64 = try_outcome!(from_result(Err(Error::Custom("boom".into()))));
            Outcome::Ok(v)
        }
        let result = complete_blocking(failing());
        assert_eq!(result.err().map(|e| e.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn test_blocking_mode_is_never_cancelled() {
        assert!(ExecutionMode::Blocking.checkpoint::<()>().is_none());
        assert!(!ExecutionMode::Blocking.is_async());
    }
}
