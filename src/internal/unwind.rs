//! Panic containment for bean code.

use std::panic::{self, AssertUnwindSafe};

use crate::error::{BoxError, PanicError};

/// Runs `f`, turning a panic that unwinds out of it into a [`PanicError`].
///
/// Bean code and interceptors run behind this so a panic reaches the
/// container's exception classification instead of the caller's thread.
pub(crate) fn catch_panic<T, F>(f: F) -> Result<T, BoxError>
where
    F: FnOnce() -> Result<T, BoxError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(Box::new(PanicError::from_payload(payload))),
    }
}
