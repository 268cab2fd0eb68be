//! Cooperative cancellation.
//!
//! The range scanner polls once per page of its general path. A raised
//! signal ends the scan with whatever was found so far.

use std::sync::atomic::{AtomicBool, Ordering};

/// A cancellation signal polled between pages.
pub trait Cancellation: Sync {
    fn is_cancelled(&self) -> bool;
}

/// Never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Adapts a predicate into a [`Cancellation`].
pub struct CancelFn<F>(pub F);

impl<F: Fn() -> bool + Sync> Cancellation for CancelFn<F> {
    fn is_cancelled(&self) -> bool {
        (self.0)()
    }
}
