//! Interception results.

/// Boxed future returned by async interceptor hooks.
///
/// Hooks are called through `dyn` trait objects, so their futures are boxed.
pub use futures_util::future::BoxFuture;

/// Outcome of a "before" hook.
///
/// `NoResult` lets the default action run. `HasResult` replaces the action:
/// the native call is skipped and the carried value is used instead.
#[derive(Debug, Clone, PartialEq)]
pub enum InterceptionResult<T> {
    NoResult,
    HasResult(T),
}

impl<T> InterceptionResult<T> {
    pub fn has_result(&self) -> bool {
        matches!(self, InterceptionResult::HasResult(_))
    }

    /// The supplied value, if any.
    pub fn into_result(self) -> Option<T> {
        match self {
            InterceptionResult::NoResult => None,
            InterceptionResult::HasResult(value) => Some(value),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> InterceptionResult<U> {
        match self {
            InterceptionResult::NoResult => InterceptionResult::NoResult,
            InterceptionResult::HasResult(value) => InterceptionResult::HasResult(f(value)),
        }
    }
}

impl<T> Default for InterceptionResult<T> {
    fn default() -> Self {
        InterceptionResult::NoResult
    }
}

impl<T> From<Option<T>> for InterceptionResult<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(InterceptionResult::NoResult, InterceptionResult::HasResult)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interception_result() {
        let none: InterceptionResult<i64> = InterceptionResult::default();
        assert!(!none.has_result());
        assert_eq!(none.into_result(), None);

        let some = InterceptionResult::HasResult(5_i64).map(|v| v * 2);
        assert!(some.has_result());
        assert_eq!(some.into_result(), Some(10));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(
            InterceptionResult::from(Some(1)),
            InterceptionResult::HasResult(1)
        );
        assert_eq!(
            InterceptionResult::<i32>::from(None),
            InterceptionResult::NoResult
        );
    }
}
