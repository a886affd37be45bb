use crate::{
    error::Error,
    internal::{
        epoch::{QuiesceEpoch, EPOCH_CLOCK},
        gc::{GlobalThreadList, Queued, SealedBag, Synch, ThreadGarbage},
        phoenix_tls::PhoenixTarget,
    },
    reclaim::Retired,
    stats,
};
use std::{
    cell::{Cell, RefCell},
    mem,
    ptr::NonNull,
    time::{Duration, Instant},
};

/// Synchronous reclamation waiting longer than this is logged.
const SLOW_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Thread local state of a thread participating in reclamation.
///
/// `synch` is aliased in the GlobalThreadList by a `NonNull<Synch>` from `subscribe` until
/// `unsubscribe`, so a `Thread` must not move in between. `Phoenix` guarantees that.
#[derive(Default)]
pub struct Thread {
    /// Garbage retired asynchronously by this thread.
    ///
    /// Never borrowed while running reclamation callbacks, so callbacks may retire more garbage.
    garbage: RefCell<ThreadGarbage>,

    /// Number of live `Pin`s. Only the outermost one publishes an epoch.
    pin_depth: Cell<usize>,

    /// The part of a Thread that is visible to other threads (an atomic epoch, and sharded lock).
    pub(crate) synch: Synch,
}

impl PhoenixTarget for Thread {
    fn subscribe(&mut self) {
        GlobalThreadList::instance()
            .write()
            .register(NonNull::from(&self.synch));
    }

    fn unsubscribe(&mut self) {
        if unlikely!(self.is_pinned()) {
            // every borrow of the pin ended with the last `ThreadKey`
            tracing::debug!(
                depth = self.pin_depth.get(),
                "thread exiting with a leaked pin"
            );
            self.pin_depth.set(0);
            self.synch.current_epoch.unpin();
        }

        // never waits on readers, whatever they may still hold is handed over
        let reclaimed = self.try_collect();
        let orphaned = self.garbage.borrow_mut().take_all();
        if !orphaned.is_empty() {
            stats::orphaned_bags(orphaned.len());
            tracing::trace!(
                reclaimed,
                bags = orphaned.len(),
                "handing over unreclaimed garbage on thread exit"
            );
        } else if reclaimed > 0 {
            tracing::trace!(reclaimed, "collected garbage on thread exit");
        }
        GlobalThreadList::instance().adopt(orphaned);

        GlobalThreadList::instance()
            .write()
            .unregister(NonNull::from(&self.synch));
    }
}

impl Thread {
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_depth.get() > 0
    }

    /// Enters a read-side critical section. Returns true if this was the outermost pin.
    #[inline]
    pub fn pin(&self) -> bool {
        let depth = self.pin_depth.get();
        if likely!(depth == 0) {
            self.synch.current_epoch.pin(EPOCH_CLOCK.now());
        } else if unlikely!(depth == usize::max_value()) {
            std::process::abort()
        }
        self.pin_depth.set(depth + 1);
        depth == 0
    }

    /// Leaves a read-side critical section.
    ///
    /// Must be paired with a previous call to `pin`, and nothing read inside the critical section
    /// may be used afterwards.
    #[inline]
    pub unsafe fn unpin(&self) {
        let depth = self.pin_depth.get();
        debug_assert!(depth > 0, "`unpin` called on an unpinned thread");
        self.pin_depth.set(depth - 1);
        if likely!(depth == 1) {
            self.synch.current_epoch.unpin()
        }
    }

    /// Makes sure the next `retire_async` can't fail to allocate.
    #[inline]
    pub fn reserve_async(&self) -> Result<(), Error> {
        Ok(self.garbage.borrow_mut().try_reserve()?)
    }

    /// Waits until no thread can be holding a reference to `retired`, then passes it to
    /// `on_reclaimed`.
    ///
    /// If the calling thread is pinned, waiting would never finish. In that case the value is
    /// queued as if by `retire_async` and `Error::WouldDeadlock` is returned.
    pub fn retire_sync<T, F>(&self, retired: Retired<T>, on_reclaimed: F) -> Result<(), Error>
    where
        T: 'static + Send,
        F: FnOnce(Box<T>) + Send + 'static,
    {
        if unlikely!(self.is_pinned()) {
            self.retire_async(retired, on_reclaimed)?;
            return Err(Error::WouldDeadlock);
        }

        stats::retire_sync();
        let retire_epoch = EPOCH_CLOCK.fetch_and_tick();

        let start = Instant::now();
        let _min_active = unsafe { self.synch.quiesce(retire_epoch) };
        let waited = start.elapsed();
        if unlikely!(waited >= SLOW_GRACE_PERIOD) {
            let threads = unsafe { self.synch.freeze_list().thread_count() };
            tracing::warn!(?waited, ?retire_epoch, threads, "slow grace period");
        }

        let _reclaimed = unsafe { Queued::new(retired, on_reclaimed).call() };
        Ok(())
    }

    /// Queues `retired` to be passed to `on_reclaimed` once no thread can be holding a reference to
    /// it. Never waits on other threads.
    ///
    /// On error, `retired` is leaked.
    pub fn retire_async<T, F>(&self, retired: Retired<T>, on_reclaimed: F) -> Result<(), Error>
    where
        T: 'static + Send,
        F: FnOnce(Box<T>) + Send + 'static,
    {
        let should_collect = {
            let mut garbage = self.garbage.borrow_mut();
            garbage.try_reserve()?;
            garbage.dispose(Queued::new(retired, on_reclaimed));
            garbage.seal_with_epoch(EPOCH_CLOCK.fetch_and_tick())
        };
        stats::retire_async();

        if unlikely!(should_collect) {
            let _reclaimed = self.try_collect();
        }
        Ok(())
    }

    /// Runs the callbacks of every queued value whose grace period has already elapsed, without
    /// waiting, including the ripe ones handed over by exited threads. Returns the number of values
    /// queued by this thread that were reclaimed.
    ///
    /// Callbacks never run on a pinned thread, so this does nothing while pinned.
    pub fn try_collect(&self) -> usize {
        if self.is_pinned() {
            return 0;
        }
        let global = GlobalThreadList::instance();
        if self.garbage.borrow().is_empty() && !global.has_orphans() {
            return 0;
        }

        // someone registering could be holding the list
        let min_active = match unsafe { self.synch.try_freeze_list() } {
            Some(freeze) => freeze.min_active_epoch(),
            None => return 0,
        };
        let reclaimed = self.collect_before(min_active);
        let _adopted = self.collect_sealed(global.try_take_ripe_orphans(min_active));
        reclaimed
    }

    /// Waits until every value queued by this thread, and every value handed over by exited
    /// threads, has been reclaimed. Returns the number of values queued by this thread that were
    /// reclaimed.
    pub fn barrier(&self) -> Result<usize, Error> {
        if unlikely!(self.is_pinned()) {
            return Err(Error::WouldDeadlock);
        }
        Ok(self.collect_all())
    }

    /// Number of values queued by this thread that have not been reclaimed yet.
    #[inline]
    pub fn pending(&self) -> usize {
        self.garbage.borrow().pending()
    }

    fn collect_all(&self) -> usize {
        debug_assert!(!self.is_pinned(), "`collect_all` called by a pinned thread");
        let mut orphans = GlobalThreadList::instance().take_orphans();
        let mut reclaimed = 0;
        // callbacks may queue more garbage
        loop {
            let latest = orphans
                .iter()
                .map(SealedBag::quiesce_epoch)
                .chain(self.latest_epoch())
                .max();
            let latest = match latest {
                Some(latest) => latest,
                None => break reclaimed,
            };
            let ripe_before = unsafe { self.synch.quiesce(latest) };
            reclaimed += self.collect_before(ripe_before);
            let _adopted = self.collect_sealed(mem::take(&mut orphans));
        }
    }

    #[inline]
    fn latest_epoch(&self) -> Option<QuiesceEpoch> {
        self.garbage.borrow().latest_epoch()
    }

    fn collect_before(&self, max_epoch: QuiesceEpoch) -> usize {
        let ripe = self.garbage.borrow_mut().take_ripe(max_epoch);
        self.collect_sealed(ripe)
    }

    /// Runs the callbacks in `sealed`, each of whose grace period must have elapsed.
    fn collect_sealed(&self, sealed: Vec<SealedBag>) -> usize {
        let mut reclaimed = 0;
        for sealed in sealed {
            let mut bag = sealed.into_bag();
            reclaimed += unsafe { bag.collect() };
            self.garbage.borrow_mut().recycle(bag);
        }
        reclaimed
    }
}
