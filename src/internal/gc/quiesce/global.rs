use crate::internal::{
    epoch::QuiesceEpoch,
    frw_lock::FrwLock,
    gc::{
        quiesce::{synch::Synch, thread_list::ThreadList},
        thread_garbage::SealedBag,
    },
};
use lock_api::RawRwLock;
use parking_lot::Mutex;
use std::{
    cell::UnsafeCell,
    mem,
    ops::{Deref, DerefMut},
    sync::atomic::{
        self,
        Ordering::{Acquire, SeqCst},
    },
};

/// Every thread taking part in reclamation, plus the garbage left behind by threads that exited
/// before it became reclaimable.
///
/// The thread list is read under any one of the registered `Synch` locks, and modified under all of
/// them.
pub struct GlobalThreadList {
    thread_list: UnsafeCell<ThreadList>,

    /// Serializes writers, so two of them never lock the `Synch`s in different orders.
    writer: FrwLock,

    /// Sealed bags of exited threads, in no particular order.
    orphans: Mutex<Vec<SealedBag>>,
}

unsafe impl Sync for GlobalThreadList {}

lazy_static::lazy_static! {
    static ref GLOBAL: GlobalThreadList = GlobalThreadList {
        thread_list: UnsafeCell::new(ThreadList::new()),
        writer:      FrwLock::INIT,
        orphans:     Mutex::new(Vec::new()),
    };
}

impl GlobalThreadList {
    #[inline]
    pub fn instance() -> &'static Self {
        &GLOBAL
    }

    /// Requires one of the locks of the registered `Synch`s to be held.
    #[inline]
    unsafe fn raw(&self) -> &ThreadList {
        &*self.thread_list.get()
    }

    /// Gets write access to the list of threads.
    #[inline]
    pub fn write(&self) -> Write<'_> {
        Write::new(self)
    }

    /// Queues the garbage of an exiting thread, to be reclaimed by whichever thread collects next.
    pub fn adopt(&self, bags: Vec<SealedBag>) {
        if !bags.is_empty() {
            self.orphans.lock().extend(bags)
        }
    }

    /// Removes every adopted bag sealed strictly before `max_epoch`. Gives up and returns nothing if
    /// another thread is touching the adopted bags.
    pub fn try_take_ripe_orphans(&self, max_epoch: QuiesceEpoch) -> Vec<SealedBag> {
        let mut orphans = match self.orphans.try_lock() {
            Some(orphans) => orphans,
            None => return Vec::new(),
        };
        let mut ripe = Vec::new();
        let mut i = 0;
        while i < orphans.len() {
            if orphans[i].quiesce_epoch() < max_epoch {
                ripe.push(orphans.swap_remove(i))
            } else {
                i += 1
            }
        }
        ripe
    }

    /// Removes every adopted bag.
    pub fn take_orphans(&self) -> Vec<SealedBag> {
        mem::take(&mut *self.orphans.lock())
    }

    #[inline]
    pub fn has_orphans(&self) -> bool {
        self.orphans
            .try_lock()
            .map_or(false, |orphans| !orphans.is_empty())
    }
}

/// Exclusive access to the list of threads. Holds every `Synch` lock, so no `FreezeList` exists
/// meanwhile.
pub struct Write<'a> {
    list: &'a GlobalThreadList,
}

impl<'a> Write<'a> {
    #[inline]
    fn new(list: &'a GlobalThreadList) -> Self {
        list.writer.lock_exclusive();
        unsafe {
            // holding `writer` is enough to read the list
            for synch in list.raw().iter() {
                synch.lock.lock_exclusive();
            }
        }
        Write { list }
    }
}

impl<'a> Drop for Write<'a> {
    #[inline]
    fn drop(&mut self) {
        unsafe {
            for synch in self.list.raw().iter() {
                synch.lock.unlock_exclusive();
            }
            self.list.writer.unlock_exclusive();
        }
    }
}

impl<'a> Deref for Write<'a> {
    type Target = ThreadList;

    #[inline]
    fn deref(&self) -> &ThreadList {
        unsafe { self.list.raw() }
    }
}

impl<'a> DerefMut for Write<'a> {
    #[inline]
    fn deref_mut(&mut self) -> &mut ThreadList {
        unsafe { &mut *self.list.thread_list.get() }
    }
}

/// Read access to the list of threads, through the calling thread's own `Synch` lock.
///
/// Only ever held for a single pass over the list. Registering threads wait for it.
pub struct FreezeList<'a> {
    lock: &'a FrwLock,
}

impl<'a> FreezeList<'a> {
    #[inline]
    pub fn new(synch: &'a Synch) -> Self {
        let lock = &synch.lock;
        lock.lock_shared();
        FreezeList { lock }
    }

    #[inline]
    pub fn try_new(synch: &'a Synch) -> Option<Self> {
        let lock = &synch.lock;
        if lock.try_lock_shared() {
            Some(FreezeList { lock })
        } else {
            None
        }
    }

    /// Returns the minimum epoch of all threads if every thread has moved past `epoch`, or None if
    /// some thread may still be reading values retired at `epoch`.
    #[inline]
    pub fn try_quiesce(&self, epoch: QuiesceEpoch) -> Option<QuiesceEpoch> {
        // pairs with the fence in `ThreadEpoch::pin`
        atomic::fence(SeqCst);

        unsafe { GlobalThreadList::instance().raw().iter() }
            .map(|synch| synch.current_epoch.get(Acquire))
            .try_fold(QuiesceEpoch::max_value(), |min, thread_epoch| {
                if likely!(thread_epoch > epoch) {
                    Some(min.min(thread_epoch))
                } else {
                    None
                }
            })
    }

    /// Returns the minimum epoch any thread is currently pinned at, without waiting. Everything
    /// retired strictly before the result is unreachable.
    #[inline]
    pub fn min_active_epoch(&self) -> QuiesceEpoch {
        atomic::fence(SeqCst);

        unsafe { GlobalThreadList::instance().raw().iter() }
            .map(|synch| synch.current_epoch.get(Acquire))
            .min()
            .unwrap_or_else(QuiesceEpoch::max_value)
    }

    /// The number of threads currently registered.
    #[inline]
    pub fn thread_count(&self) -> usize {
        unsafe { GlobalThreadList::instance().raw().len() }
    }
}

impl<'a> Drop for FreezeList<'a> {
    #[inline]
    fn drop(&mut self) {
        unsafe { self.lock.unlock_shared() }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::internal::epoch::EPOCH_CLOCK;
    use std::ptr::NonNull;

    #[test]
    fn register_quiesce_unregister() {
        let list = GlobalThreadList::instance();
        let synch = Box::new(Synch::new());
        let reader = Box::new(Synch::new());
        {
            let mut write = list.write();
            write.register(NonNull::from(&*synch));
            write.register(NonNull::from(&*reader));
        }

        let pinned_at = EPOCH_CLOCK.now();
        reader.current_epoch.pin(pinned_at);
        let retired = EPOCH_CLOCK.fetch_and_tick();
        unsafe {
            let freeze = synch.freeze_list();
            assert!(freeze.min_active_epoch() <= pinned_at);
            assert!(freeze.thread_count() >= 2);
            assert_eq!(freeze.try_quiesce(retired), None);
        }

        reader.current_epoch.unpin();
        unsafe {
            assert!(synch.quiesce(retired) > retired);
        }

        let mut write = list.write();
        write.unregister(NonNull::from(&*synch));
        write.unregister(NonNull::from(&*reader));
    }

    #[test]
    fn writers_are_not_blocked_by_a_waiting_quiesce() {
        let list = GlobalThreadList::instance();
        let synch = Box::new(Synch::new());
        let reader = Box::new(Synch::new());
        {
            let mut write = list.write();
            write.register(NonNull::from(&*synch));
            write.register(NonNull::from(&*reader));
        }
        reader.current_epoch.pin(EPOCH_CLOCK.now());
        let retired = EPOCH_CLOCK.fetch_and_tick();

        crossbeam_utils::thread::scope(|s| {
            let waiter = s.spawn(|_| unsafe { synch.quiesce(retired) });
            // a thread registers and unregisters while the reader holds up the quiesce
            for _ in 0..100 {
                let other = Box::new(Synch::new());
                list.write().register(NonNull::from(&*other));
                list.write().unregister(NonNull::from(&*other));
            }
            reader.current_epoch.unpin();
            assert!(waiter.join().unwrap() > retired);
        })
        .unwrap();

        let mut write = list.write();
        write.unregister(NonNull::from(&*synch));
        write.unregister(NonNull::from(&*reader));
    }
}
