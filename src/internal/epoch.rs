//! rcu-catalog uses 2 different types of epochs to decide when retired memory may be destroyed:
//! EpochClock and ThreadEpoch. The common language between them is the unsynchronized
//! QuiesceEpoch.
//!
//! - The EpochClock is a singleton, which holds the current "time".
//! - Each thread holds a ThreadEpoch which contains the "time" at which the thread started reading
//!   from shared memory or a sentinel "INACTIVE_EPOCH", if the thread isn't reading anything.
//!
//! They interact as follows.
//! - An inactive thread reads the current "time" from the EpochClock and stores it in its
//!   ThreadEpoch - pinning the thread. It may then follow any pointer it finds in the catalogue.
//! - A writer unlinks a node, so that no newly pinned thread can find it, then bumps the
//!   EpochClock. The value returned by the bump is the retire epoch of that node.
//! - The node may be destroyed once every ThreadEpoch is greater than the retire epoch. Threads
//!   pinned after the bump hold a greater epoch, and INACTIVE_EPOCH is greater than every epoch.

use core::{
    fmt::{self, Debug, Formatter},
    num::NonZeroUsize,
    sync::atomic::{
        self, AtomicUsize,
        Ordering::{self, Acquire, Relaxed, Release, SeqCst},
    },
};

type Storage = usize;
type NonZeroStorage = NonZeroUsize;

/// ThreadEpoch will hold this value when not pinned. It is conveniently greater than all
/// other epochs.
const INACTIVE_EPOCH: Storage = !0;

/// The beginning of time.
const FIRST: Storage = 1;

/// The smallest difference between points on the EpochClock.
pub const TICK_SIZE: Storage = 1;

/// NonZero representation of epochs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuiesceEpoch(NonZeroStorage);

impl Debug for QuiesceEpoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_active() {
            f.debug_tuple("QuiesceEpoch").field(&self.0.get()).finish()
        } else {
            f.pad("QuiesceEpoch(INACTIVE)")
        }
    }
}

impl QuiesceEpoch {
    /// Creates a new QuiesceEpoch. Returns None if epoch is 0, else it returns Some.
    #[inline]
    fn new(epoch: Storage) -> Option<Self> {
        NonZeroStorage::new(epoch).map(QuiesceEpoch)
    }

    #[inline]
    fn from_raw(epoch: Storage) -> Self {
        debug_assert!(
            epoch >= FIRST,
            "creating a `QuiesceEpoch` before the start of time"
        );
        // Every value stored in the clock or a ThreadEpoch came from a QuiesceEpoch, or FIRST.
        match QuiesceEpoch::new(epoch) {
            Some(epoch) => epoch,
            None => QuiesceEpoch::first(),
        }
    }

    #[inline]
    pub fn first() -> Self {
        QuiesceEpoch(unsafe { NonZeroStorage::new_unchecked(FIRST) })
    }

    /// Returns the maximum value that a QuiesceEpoch can hold. This is useful for finding the
    /// minimum of a set of epochs.
    #[inline]
    pub fn max_value() -> Self {
        QuiesceEpoch(unsafe { NonZeroStorage::new_unchecked(INACTIVE_EPOCH) })
    }

    /// Returns true if self is not the INACTIVE_EPOCH.
    #[inline]
    pub fn is_active(self) -> bool {
        self.0.get() != INACTIVE_EPOCH
    }
}

/// This holds the epoch that a thread pinned at, or INACTIVE_EPOCH if the thread is not currently
/// reading from shared memory.
///
/// Anything retired at an epoch greater than or equal to the ThreadEpoch may still be referenced
/// by the owning thread.
pub struct ThreadEpoch(AtomicUsize);

impl Debug for ThreadEpoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadEpoch")
            .field(&self.get(Relaxed))
            .finish()
    }
}

impl ThreadEpoch {
    #[inline]
    pub const fn inactive() -> Self {
        ThreadEpoch(AtomicUsize::new(INACTIVE_EPOCH))
    }

    /// Returns true if the owning thread can no longer be accessing values retired at
    /// quiesce_epoch.
    #[inline]
    pub fn is_quiesced(&self, quiesce_epoch: QuiesceEpoch, o: Ordering) -> bool {
        self.get(o) > quiesce_epoch
    }

    /// Gets the pinned epoch or returns the inactive epoch.
    #[inline]
    pub fn get(&self, o: Ordering) -> QuiesceEpoch {
        QuiesceEpoch::from_raw(self.0.load(o))
    }

    /// Pins the ThreadEpoch to epoch.
    ///
    /// The store is followed by a full fence. A writer either sees this pin while scanning, or
    /// the pinned thread sees the writer's unlink on its next load.
    #[inline]
    pub fn pin(&self, epoch: QuiesceEpoch) {
        debug_assert!(!self.get(Relaxed).is_active(), "already active ThreadEpoch");
        debug_assert!(
            epoch.is_active(),
            "cannot activate a ThreadEpoch to the inactive state"
        );
        self.0.store(epoch.0.get(), Relaxed);
        atomic::fence(SeqCst);
    }

    /// Unpins the ThreadEpoch, putting it into the INACTIVE_EPOCH.
    ///
    /// Every read made while pinned happens before a scanner's Acquire load of INACTIVE_EPOCH.
    #[inline]
    pub fn unpin(&self) {
        debug_assert!(
            self.get(Relaxed).is_active(),
            "attempt to deactivate an already inactive ThreadEpoch"
        );
        self.0.store(INACTIVE_EPOCH, Release)
    }
}

/// A monotonically increasing clock.
#[derive(Debug)]
#[repr(align(64))]
pub struct EpochClock(AtomicUsize);

/// The world clock. Every retirement bumps it.
pub static EPOCH_CLOCK: EpochClock = EpochClock::new();

impl EpochClock {
    #[inline]
    const fn new() -> EpochClock {
        EpochClock(AtomicUsize::new(FIRST))
    }

    /// Returns the current epoch.
    #[inline]
    pub fn now(&self) -> QuiesceEpoch {
        QuiesceEpoch::from_raw(self.0.load(Acquire))
    }

    /// Increments the clock, and returns the previous epoch.
    ///
    /// Anything unlinked before the call is unreachable to threads that pin at the returned epoch
    /// or later.
    #[inline]
    pub fn fetch_and_tick(&self) -> QuiesceEpoch {
        // On 64 bit platforms, at one tick per nanosecond, reaching INACTIVE_EPOCH takes several
        // centuries, so overflow is assumed impossible.
        let result = self.0.fetch_add(TICK_SIZE, SeqCst);
        debug_assert!(
            result + TICK_SIZE != INACTIVE_EPOCH,
            "EpochClock ran into the inactive epoch"
        );
        QuiesceEpoch::from_raw(result)
    }
}
