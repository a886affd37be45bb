use crate::{
    internal::{epoch::QuiesceEpoch, gc::queued::Queued},
    stats,
};
use std::{collections::VecDeque, mem};

/// Number of empty bags kept around for reuse.
const UNUSED_BAG_COUNT: usize = 64;

/// Once this many bags are sealed, sealing a new one attempts a non-blocking collection.
pub const COLLECT_THRESHOLD: usize = 32;

/// A contiguous container of trash.
#[derive(Default)]
pub struct Bag {
    queued: Vec<Queued>,
}

impl Bag {
    #[inline]
    fn seal(self, quiesce_epoch: QuiesceEpoch) -> SealedBag {
        debug_assert!(!self.queued.is_empty(), "attempt to seal an empty `Bag`");
        SealedBag {
            bag: self,
            quiesce_epoch,
        }
    }

    /// Runs every queued destructor, leaving the bag empty. Returns the number of destructors that
    /// ran without panicking.
    ///
    /// Must only be called after the grace period of the bag has elapsed.
    #[inline]
    pub unsafe fn collect(&mut self) -> usize {
        let mut reclaimed = 0;
        // the drain leaves the bag empty, and `call` contains panics
        for queued in self.queued.drain(..) {
            if queued.call() {
                reclaimed += 1;
            }
        }
        reclaimed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queued.len()
    }
}

pub struct SealedBag {
    quiesce_epoch: QuiesceEpoch,
    bag:           Bag,
}

impl SealedBag {
    #[inline]
    pub fn quiesce_epoch(&self) -> QuiesceEpoch {
        self.quiesce_epoch
    }

    #[inline]
    pub fn into_bag(self) -> Bag {
        self.bag
    }
}

/// Thread local garbage
pub struct ThreadGarbage {
    /// The bag that new trash will be pushed to.
    speculative_bag: Bag,

    /// Bags that have been queued up for collection, ordered by epoch.
    sealed_bags: VecDeque<SealedBag>,

    /// Store of unused bags from which new bags can be obtained.
    unused_bags: Vec<Bag>,
}

impl Default for ThreadGarbage {
    fn default() -> Self {
        ThreadGarbage::new()
    }
}

impl ThreadGarbage {
    #[inline]
    pub fn new() -> Self {
        ThreadGarbage {
            speculative_bag: Bag::default(),
            sealed_bags:     VecDeque::new(),
            unused_bags:     Vec::new(),
        }
    }

    /// Checks if there is any speculative trash.
    #[inline]
    pub fn is_speculative_bag_empty(&self) -> bool {
        self.speculative_bag.queued.is_empty()
    }

    /// Makes sure that the next `dispose` + `seal_with_epoch` pair can not allocate.
    #[inline]
    pub fn try_reserve(&mut self) -> Result<(), std::collections::TryReserveError> {
        self.speculative_bag.queued.try_reserve(1)?;
        self.sealed_bags.try_reserve(1)
    }

    /// Queues value up to be destroyed after the grace period of the next seal.
    #[inline]
    pub fn dispose(&mut self, queued: Queued) {
        self.speculative_bag.queued.push(queued)
    }

    /// Ends the speculative garbage queuing, and commits the current bag's garbage to be collected
    /// once every thread has quiesced past `quiesce_epoch`.
    ///
    /// Returns true if enough garbage has piled up that collection should be attempted.
    #[inline]
    pub fn seal_with_epoch(&mut self, quiesce_epoch: QuiesceEpoch) -> bool {
        debug_assert!(
            quiesce_epoch.is_active(),
            "attempt to seal with an \"inactive\" epoch"
        );
        if unlikely!(self.is_speculative_bag_empty()) {
            return false;
        }
        debug_assert!(
            self.sealed_bags
                .back()
                .map_or(true, |last| last.quiesce_epoch <= quiesce_epoch),
            "bags sealed out of epoch order"
        );

        let new_bag = self.unused_bags.pop().unwrap_or_default();
        let prev_bag = mem::replace(&mut self.speculative_bag, new_bag);
        self.sealed_bags.push_back(prev_bag.seal(quiesce_epoch));
        self.sealed_bags.len() >= COLLECT_THRESHOLD
    }

    /// Removes the bags sealed strictly before `max_epoch`. The caller is responsible for running
    /// them, and may then hand them back with `recycle`.
    #[inline]
    pub fn take_ripe(&mut self, max_epoch: QuiesceEpoch) -> Vec<SealedBag> {
        let ripe = self
            .sealed_bags
            .iter()
            .take_while(|sealed_bag| sealed_bag.quiesce_epoch < max_epoch)
            .count();
        if ripe > 0 {
            stats::collect_size(ripe);
        }
        self.sealed_bags.drain(..ripe).collect()
    }

    /// Removes every sealed bag, ripe or not.
    #[inline]
    pub fn take_all(&mut self) -> Vec<SealedBag> {
        self.sealed_bags.drain(..).collect()
    }

    /// Returns an empty bag to the pool of reusable bags.
    #[inline]
    pub fn recycle(&mut self, bag: Bag) {
        debug_assert!(bag.queued.is_empty(), "recycling a non-empty `Bag`");
        if self.unused_bags.len() < UNUSED_BAG_COUNT {
            self.unused_bags.push(bag)
        }
    }

    /// Returns true if nothing has been sealed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sealed_bags.is_empty()
    }

    /// Number of values waiting for their grace period.
    #[inline]
    pub fn pending(&self) -> usize {
        self.sealed_bags.iter().map(|sealed| sealed.bag.len()).sum()
    }

    #[inline]
    pub fn latest_epoch(&self) -> Option<QuiesceEpoch> {
        self.sealed_bags.back().map(|sealed| sealed.quiesce_epoch)
    }
}

impl Drop for ThreadGarbage {
    fn drop(&mut self) {
        debug_assert!(
            self.speculative_bag.queued.is_empty(),
            "dropping the thread garbage while the current bag is not empty"
        );
        if !self.sealed_bags.is_empty() {
            // readers may still hold the values, leaking is the only safe option
            tracing::warn!(
                pending = self.pending(),
                "thread garbage dropped with uncollected garbage, leaking it"
            );
            for sealed in self.sealed_bags.drain(..) {
                mem::forget(sealed.bag.queued);
            }
        }
    }
}
