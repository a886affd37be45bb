use crate::internal::gc::quiesce::synch::Synch;
use std::ptr::NonNull;

/// A list of pointers to each threads Synch (sharded lock and current epoch)
#[derive(Debug)]
pub struct ThreadList {
    threads: Vec<NonNull<Synch>>,
}

impl ThreadList {
    pub(crate) fn new() -> Self {
        ThreadList {
            threads: Vec::new(),
        }
    }

    /// Registers a new synch for participation in reclamation.
    ///
    /// Synch must never be moved or dropped, until it is unregistered.
    #[inline]
    pub fn register(&mut self, thread: NonNull<Synch>) {
        self.threads.push(thread)
    }

    /// Unregisters a destructing synch.
    #[inline]
    pub fn unregister(&mut self, thread: NonNull<Synch>) {
        match self.threads.iter().position(|&elem| elem == thread) {
            Some(position) => drop(self.threads.swap_remove(position)),
            None => debug_assert!(false, "failed to find thread in the global thread list"),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[inline]
    pub(crate) unsafe fn iter<'a>(&'a self) -> impl Iterator<Item = &'a Synch> + 'a {
        // register requires that Synchs aren't moved or dropped until after unregister is called
        self.threads.iter().map(
            #[inline(always)]
            |p| p.as_ref(),
        )
    }
}
