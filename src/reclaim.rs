//! Deferred destruction of values that readers may still be looking at.
//!
//! A value that has been unlinked from a shared structure becomes [`Retired`]. A `Retired` is a
//! single owner hand-off token: the only ways to consume it are
//! [`ThreadKey::retire_sync`](crate::thread_key::ThreadKey::retire_sync) and
//! [`ThreadKey::retire_async`](crate::thread_key::ThreadKey::retire_async), and both consume it by
//! value, so a retired value can not be destroyed twice.
//!
//! # Examples
//!
//! ```
//! use rcu_catalog::{reclaim::Retired, thread_key};
//!
//! let thread_key = thread_key::get();
//!
//! // block until no pinned reader can see the value, then drop it
//! thread_key.retire_sync(Retired::new(Box::new(String::from("old")))).unwrap();
//!
//! // or queue it and carry on, the callback receives the value once it is safe
//! thread_key
//!     .retire_async(Retired::new(Box::new(42)), |value| assert_eq!(*value, 42))
//!     .unwrap();
//! thread_key.barrier().unwrap();
//! ```

use core::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    ptr::NonNull,
};

/// Selects how a writer hands a retired value to the reclamation machinery.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Block the writer until every reader that could observe the value has unpinned, then destroy
    /// it inline.
    Sync,

    /// Queue the value and return immediately. It is destroyed later, once safe, by the writer's
    /// thread.
    Async,
}

impl Default for Mode {
    #[inline]
    fn default() -> Self {
        Mode::Sync
    }
}

/// An owned, heap allocated value that is no longer reachable by new readers but may still be
/// referenced by readers that pinned before it was unlinked.
///
/// Dropping a `Retired` without handing it to a [`ThreadKey`](crate::thread_key::ThreadKey) leaks
/// the value.
pub struct Retired<T> {
    ptr:     NonNull<T>,
    phantom: PhantomData<Box<T>>,
}

// The value is only ever touched again by whichever thread reclaims it.
unsafe impl<T: Send> Send for Retired<T> {}

impl<T> Debug for Retired<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retired")
            .field("address", &self.ptr.as_ptr())
            .finish()
    }
}

impl<T> Retired<T> {
    /// Retires a box that was never shared, or whose sharing ended before this call.
    #[inline]
    pub fn new(value: Box<T>) -> Self {
        Retired {
            ptr:     NonNull::from(Box::leak(value)),
            phantom: PhantomData,
        }
    }

    /// Creates a new [`Retired`] from a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `Box::into_raw` (or an allocation with the same layout), must no
    /// longer be reachable from any shared location, and no other `Retired` may exist for it.
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Retired {
            ptr,
            phantom: PhantomData,
        }
    }

    /// Returns the address of the retired value.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Takes back ownership of the value.
    ///
    /// # Safety
    ///
    /// A grace period must have elapsed since the value was unlinked.
    #[inline]
    pub(crate) unsafe fn into_box(self) -> Box<T> {
        Box::from_raw(self.ptr.as_ptr())
    }
}
