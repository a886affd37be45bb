use crate::{reclaim::Retired, stats};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

/// Trash that has been queued for destruction by the GC, together with the code that destroys it.
pub struct Queued {
    reclaim: Box<dyn FnOnce() + Send + 'static>,
}

impl Queued {
    #[inline]
    pub fn new<T, F>(retired: Retired<T>, on_reclaimed: F) -> Self
    where
        T: 'static + Send,
        F: FnOnce(Box<T>) + Send + 'static,
    {
        Queued {
            reclaim: Box::new(move || {
                // only reachable through `call`, which runs after a grace period
                let value = unsafe { retired.into_box() };
                on_reclaimed(value)
            }),
        }
    }

    /// Destroys the queued value. A panic in the reclamation code is contained, so that it can't
    /// prevent the rest of a bag from being collected. Returns false if it panicked.
    ///
    /// Must only be called after a grace period has elapsed for the queued value.
    #[inline]
    pub unsafe fn call(self) -> bool {
        let reclaim = self.reclaim;
        match panic::catch_unwind(AssertUnwindSafe(reclaim)) {
            Ok(()) => {
                stats::reclaimed();
                true
            }
            Err(payload) => {
                stats::reclaim_panic();
                tracing::error!(
                    panic = panic_message(&*payload),
                    "reclamation callback panicked, continuing with remaining garbage"
                );
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
