use crate::{
    internal::{
        epoch::{QuiesceEpoch, ThreadEpoch},
        frw_lock::FrwLock,
        gc::quiesce::global::FreezeList,
    },
    stats,
};
use crossbeam_utils::Backoff;
use std::sync::atomic::Ordering::Relaxed;

/// The part of a thread's reclamation state shared with every other thread: the epoch it is
/// pinned at, and its shard of the GlobalThreadList lock.
#[derive(Debug)]
pub struct Synch {
    /// The epoch the owning thread is pinned at, or the inactive epoch.
    pub current_epoch: ThreadEpoch,

    /// Held shared by the owning thread while it scans the GlobalThreadList, and exclusively by
    /// anyone modifying the list.
    pub lock: FrwLock,
}

impl Default for Synch {
    #[inline]
    fn default() -> Self {
        Synch::new()
    }
}

impl Synch {
    /// A new Synch is locked, as if by the `Write` that is about to register it. Dropping that
    /// `Write` unlocks it.
    #[inline]
    pub fn new() -> Synch {
        Synch {
            current_epoch: ThreadEpoch::inactive(),
            lock:          FrwLock::INIT_LOCKED,
        }
    }

    /// Locks the GlobalThreadList for reading.
    ///
    /// Must be called by the thread owning self, after self has been registered.
    #[inline]
    pub unsafe fn freeze_list(&self) -> FreezeList<'_> {
        FreezeList::new(self)
    }

    /// Like `freeze_list`, but returns None instead of waiting if the GlobalThreadList is being
    /// modified.
    #[inline]
    pub unsafe fn try_freeze_list(&self) -> Option<FreezeList<'_>> {
        FreezeList::try_new(self)
    }

    /// Waits until every registered thread has moved past `quiesce_epoch`, and returns the minimum
    /// epoch seen on the last pass.
    ///
    /// The GlobalThreadList is unlocked between passes, so threads may come and go while a slow
    /// reader is waited on. Same requirements as `freeze_list`, and the owning thread must not be
    /// pinned at or before `quiesce_epoch`.
    pub unsafe fn quiesce(&self, quiesce_epoch: QuiesceEpoch) -> QuiesceEpoch {
        debug_assert!(
            self.current_epoch.is_quiesced(quiesce_epoch, Relaxed),
            "deadlock detected. `quiesce` called by a pinned thread"
        );
        let backoff = Backoff::new();
        let mut retries = 0;
        loop {
            if let Some(min_epoch) = self.freeze_list().try_quiesce(quiesce_epoch) {
                stats::quiesce_spins(retries);
                break min_epoch;
            }
            retries += 1;
            backoff.snooze();
        }
    }
}
