//! Deferred query results.
//!
//! Every read accessor returns a [`Deferred`] instead of touching the
//! store immediately. The wrapped computation runs exactly once, when
//! [`Deferred::resolve`] is called; until then it can be passed around,
//! composed with [`Deferred::map`]/[`Deferred::and_then`], or chained
//! into relation traversals. Dropping an unresolved `Deferred` performs
//! no I/O at all.

use crate::error::CoreResult;

/// A single-shot, lazily evaluated query result.
#[must_use = "a deferred query does nothing until resolved"]
pub struct Deferred<T> {
    thunk: Box<dyn FnOnce() -> CoreResult<T> + Send>,
}

impl<T: 'static> Deferred<T> {
    /// Wraps a computation to run on resolve.
    pub fn new(thunk: impl FnOnce() -> CoreResult<T> + Send + 'static) -> Self {
        Self {
            thunk: Box::new(thunk),
        }
    }

    /// Wraps an already-available value.
    pub fn ready(value: T) -> Self
    where
        T: Send,
    {
        Self::new(move || Ok(value))
    }

    /// Runs the query and returns its result.
    ///
    /// # Errors
    ///
    /// Propagates any error raised while executing the underlying
    /// lookup chain.
    pub fn resolve(self) -> CoreResult<T> {
        (self.thunk)()
    }

    /// Post-processes the result with an infallible function.
    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + Send + 'static) -> Deferred<U> {
        Deferred::new(move || Ok(f(self.resolve()?)))
    }

    /// Chains another fallible step onto the result.
    pub fn and_then<U: 'static>(
        self,
        f: impl FnOnce(T) -> CoreResult<U> + Send + 'static,
    ) -> Deferred<U> {
        Deferred::new(move || f(self.resolve()?))
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Deferred(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_only_on_resolve() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let d = Deferred::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(d.resolve().unwrap(), 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_deferred_never_runs() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        drop(Deferred::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn map_and_and_then_compose() {
        let d = Deferred::ready(2).map(|n| n * 10).and_then(|n| {
            if n == 20 {
                Ok(n + 1)
            } else {
                Err(CoreError::result_mismatch("wrong"))
            }
        });
        assert_eq!(d.resolve().unwrap(), 21);
    }

    #[test]
    fn errors_propagate_through_map() {
        let d: Deferred<i32> = Deferred::new(|| Err(CoreError::result_mismatch("boom")));
        let err = d.map(|n| n + 1).resolve().unwrap_err();
        assert!(matches!(err, CoreError::ResultMismatch { .. }));
    }
}
