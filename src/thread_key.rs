//! Thread local state, [`thread_key::ThreadKey`], used to read shared data and to retire it.
//!
//! A handle to the thread local state can be acquired by calling [`thread_key::get`].

use crate::{
    error::Error,
    internal::{phoenix_tls::Phoenix, thread::Thread},
    reclaim::Retired,
    stats,
};
use core::fmt::{self, Debug, Formatter};

/// A handle to the calling thread's reclamation state.
///
/// `ThreadKey` can be acquired by calling [`get`]. It is not `Send`; every thread gets its own.
#[derive(Clone)]
pub struct ThreadKey {
    thread: Phoenix<Thread>,
}

impl Debug for ThreadKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ThreadKey")
            .field("pinned", &self.is_pinned())
            .finish()
    }
}

impl ThreadKey {
    /// Enters a read-side critical section. Nothing reachable from shared data while the returned
    /// [`Pin`] is alive will be reclaimed until it is dropped.
    ///
    /// Pins nest. A nested pin keeps the epoch of the outermost one.
    ///
    /// # Examples
    ///
    /// ```
    /// use rcu_catalog::{catalog::Catalog, thread_key};
    ///
    /// let catalog = Catalog::new();
    /// catalog.add(102, "BOOK1", "xyz").unwrap();
    ///
    /// let thread_key = thread_key::get();
    /// let pin = thread_key.pin();
    /// let titles: Vec<&str> = catalog.iter(&pin).map(|record| record.title()).collect();
    /// assert_eq!(titles, ["BOOK1"]);
    /// ```
    #[inline]
    pub fn pin(&self) -> Pin<'_> {
        if self.thread.pin() {
            stats::read_pin();
        }
        Pin {
            thread: &self.thread,
        }
    }

    /// Runs `f` inside a read-side critical section.
    #[inline]
    pub fn read<F, O>(&self, f: F) -> O
    where
        F: FnOnce(&Pin<'_>) -> O,
    {
        f(&self.pin())
    }

    /// Returns true if the calling thread is inside a read-side critical section.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.thread.is_pinned()
    }

    /// Blocks until every thread that could be holding a reference to `retired` has left its
    /// critical section, then drops the value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldDeadlock`] if the calling thread is pinned. The value is then queued as
    /// by [`retire_async`](ThreadKey::retire_async) instead, so it is still dropped exactly once.
    #[inline]
    pub fn retire_sync<T: 'static + Send>(&self, retired: Retired<T>) -> Result<(), Error> {
        self.retire_sync_with(retired, drop)
    }

    /// Like [`retire_sync`](ThreadKey::retire_sync), but hands the value to `on_reclaimed` instead
    /// of dropping it.
    #[inline]
    pub fn retire_sync_with<T, F>(&self, retired: Retired<T>, on_reclaimed: F) -> Result<(), Error>
    where
        T: 'static + Send,
        F: FnOnce(Box<T>) + Send + 'static,
    {
        self.thread.retire_sync(retired, on_reclaimed)
    }

    /// Queues `retired` and returns immediately. Once every thread that could be holding a
    /// reference to it has left its critical section, `on_reclaimed` is called with the value,
    /// always on an unpinned thread. That happens on this thread from
    /// [`try_collect`](ThreadKey::try_collect), [`barrier`](ThreadKey::barrier), or thread exit.
    /// Values still waiting when this thread exits are handed over to whichever thread collects
    /// next.
    ///
    /// A panicking `on_reclaimed` is logged and does not prevent other values from being reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the queue could not grow. The value is leaked.
    #[inline]
    pub fn retire_async<T, F>(&self, retired: Retired<T>, on_reclaimed: F) -> Result<(), Error>
    where
        T: 'static + Send,
        F: FnOnce(Box<T>) + Send + 'static,
    {
        self.thread.retire_async(retired, on_reclaimed)
    }

    /// Reserves room so that the next [`retire_async`](ThreadKey::retire_async) can't fail.
    #[inline]
    pub(crate) fn reserve_async(&self) -> Result<(), Error> {
        self.thread.reserve_async()
    }

    /// Reclaims every queued value whose grace period has already elapsed, without waiting. Values
    /// handed over by exited threads are reclaimed along the way.
    ///
    /// Returns the number of values queued by this thread that were reclaimed. Always 0 while the
    /// calling thread is pinned.
    #[inline]
    pub fn try_collect(&self) -> usize {
        self.thread.try_collect()
    }

    /// Blocks until every value queued by this thread with
    /// [`retire_async`](ThreadKey::retire_async) has been reclaimed, along with the values handed
    /// over by exited threads.
    ///
    /// Returns the number of values queued by this thread that were reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldDeadlock`] if the calling thread is pinned.
    #[inline]
    pub fn barrier(&self) -> Result<usize, Error> {
        self.thread.barrier()
    }

    /// Number of values queued by this thread that have not been reclaimed yet.
    #[inline]
    pub fn pending(&self) -> usize {
        self.thread.pending()
    }
}

/// A read-side critical section. Created by [`ThreadKey::pin`].
pub struct Pin<'a> {
    thread: &'a Thread,
}

impl Debug for Pin<'_> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.pad("Pin { .. }")
    }
}

impl Drop for Pin<'_> {
    #[inline]
    fn drop(&mut self) {
        // references handed out under this pin are bounded by its lifetime
        unsafe { self.thread.unpin() }
    }
}

mod tls {
    use crate::internal::thread::Thread;

    phoenix_tls! {
        pub static THREAD_KEY: Thread
    }
}

/// Returns a handle to the calling thread's reclamation state, registering the thread on first
/// use.
///
/// # Note
///
/// Reusing the same [`ThreadKey`] is slightly more efficient due to the costs of accessing thread
/// local memory, and (non-atomic) reference counting.
#[inline]
pub fn get() -> ThreadKey {
    ThreadKey {
        thread: tls::THREAD_KEY.get(),
    }
}
