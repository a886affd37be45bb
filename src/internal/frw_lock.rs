//! A spinning reader-writer lock, sharded one per registered thread to guard the
//! GlobalThreadList.
//!
//! Scanning thread epochs takes the scanning thread's own shard shared, for a single pass over the
//! list. Registering or unregistering a thread takes every shard exclusively.

use crossbeam_utils::Backoff;
use lock_api::{GuardNoSend, RawRwLock};
use std::{
    mem,
    sync::atomic::{AtomicUsize, Ordering::*},
};

/// Set while the lock is held, or requested, exclusively. The remaining bits count shared holders.
const WRITE_BIT: usize = 1 << (mem::size_of::<usize>() * 8 - 1);
const READ_MASK: usize = !WRITE_BIT;

#[inline]
const fn write_locked(state: usize) -> bool {
    state & WRITE_BIT != 0
}

#[inline]
const fn shared_locked(state: usize) -> bool {
    state & READ_MASK != 0
}

#[derive(Debug)]
pub struct FrwLock {
    state: AtomicUsize,
}

unsafe impl RawRwLock for FrwLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: FrwLock = FrwLock {
        state: AtomicUsize::new(0),
    };
    type GuardMarker = GuardNoSend;

    #[inline]
    fn lock_shared(&self) {
        // optimistically count ourselves in, and back out if a writer got there first
        if unlikely!(write_locked(self.state.fetch_add(1, Acquire))) {
            self.lock_shared_slow();
        }
    }

    #[inline]
    fn try_lock_shared(&self) -> bool {
        let state = self.state.load(Relaxed);
        !write_locked(state)
            && state < READ_MASK
            && self
                .state
                .compare_exchange(state, state + 1, Acquire, Relaxed)
                .is_ok()
    }

    #[inline]
    unsafe fn unlock_shared(&self) {
        let _prev = self.state.fetch_sub(1, Release);
        debug_assert!(
            shared_locked(_prev),
            "attempt to unlock an unlocked `FrwLock`"
        );
    }

    #[inline]
    fn lock_exclusive(&self) {
        if unlikely!(!self.try_lock_exclusive()) {
            self.lock_exclusive_slow()
        }
    }

    #[inline]
    fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITE_BIT, Acquire, Relaxed)
            .is_ok()
    }

    #[inline]
    unsafe fn unlock_exclusive(&self) {
        let _prev = self.state.fetch_and(READ_MASK, Release);
        debug_assert!(
            write_locked(_prev),
            "attempt to unlock an unlocked `FrwLock`"
        );
    }
}

impl FrwLock {
    /// A lock that starts out held exclusively, by whoever is registering its owner.
    #[allow(clippy::declare_interior_mutable_const)]
    pub const INIT_LOCKED: Self = FrwLock {
        state: AtomicUsize::new(WRITE_BIT),
    };

    #[cold]
    #[inline(never)]
    fn lock_shared_slow(&self) {
        let _prev = self.state.fetch_sub(1, Relaxed);

        let backoff = Backoff::new();
        loop {
            backoff.snooze();
            let state = self.state.load(Relaxed);
            if write_locked(state) {
                continue;
            }
            assert!(
                state < READ_MASK,
                "overflowed the maximum number of read locks on `FrwLock`"
            );
            if self
                .state
                .compare_exchange_weak(state, state + 1, Acquire, Relaxed)
                .is_ok()
            {
                break;
            }
        }

        debug_assert!(shared_locked(self.state.load(Relaxed)));
    }

    #[inline(never)]
    #[cold]
    fn lock_exclusive_slow(&self) {
        let backoff = Backoff::new();
        // claim the write bit first, so no new shared holder gets in
        let mut state = self.state.load(Relaxed);
        while write_locked(state)
            || self
                .state
                .compare_exchange_weak(state, state | WRITE_BIT, Acquire, Relaxed)
                .is_err()
        {
            backoff.snooze();
            state = self.state.load(Relaxed);
        }

        // then wait for the current shared holders to leave
        backoff.reset();
        while shared_locked(state) {
            backoff.snooze();
            state = self.state.load(Acquire);
        }
    }
}
