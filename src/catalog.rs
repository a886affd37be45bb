//! A lending-library catalogue readable without locks.
//!
//! Writers are serialized by a mutex that readers never touch. Every change publishes a fresh copy
//! of the affected record and retires the old one, either waiting for the grace period inline
//! ([`Mode::Sync`]) or deferring it ([`Mode::Async`]).

use crate::{
    config::Config,
    error::Error,
    list::{Iter, Node, RecordList},
    reclaim::{Mode, Retired},
    record::{Record, RecordId, Text},
    thread_key::{self, Pin, ThreadKey},
};
use core::fmt::{self, Debug, Formatter};

/// A catalogue of [`Record`]s.
///
/// # Examples
///
/// ```
/// use rcu_catalog::{catalog::Catalog, error::Error, reclaim::Mode};
///
/// let catalog = Catalog::new();
/// catalog.add(102, "BOOK1", "xyz").unwrap();
/// catalog.add(114, "BOOK2", "zbc").unwrap();
///
/// catalog.borrow(114, Mode::Sync).unwrap();
/// assert_eq!(catalog.borrow(114, Mode::Sync), Err(Error::AlreadyBorrowed(114)));
/// assert_eq!(catalog.is_borrowed(114), Ok(true));
///
/// catalog.return_record(114, Mode::Async).unwrap();
/// catalog.delete(102, Mode::Async).unwrap();
/// assert_eq!(catalog.is_borrowed(102), Err(Error::NotFound(102)));
/// ```
pub struct Catalog {
    list:   RecordList,
    config: Config,
}

impl Debug for Catalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Catalog {
    #[inline]
    fn default() -> Self {
        Catalog::new()
    }
}

impl Catalog {
    /// Creates an empty catalogue with the default [`Config`].
    #[inline]
    pub fn new() -> Self {
        Catalog::with_config(Config::default())
    }

    #[inline]
    pub fn with_config(config: Config) -> Self {
        Catalog {
            list: RecordList::new(),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Adds a record that is not borrowed. Titles and authors are truncated to
    /// [`Config::max_text_len`].
    ///
    /// Traversals that are already running may or may not see the new record.
    ///
    /// # Errors
    ///
    /// * [`Error::DuplicateKey`] if `id` is present, unless duplicates are allowed by the config.
    /// * [`Error::AllocationFailure`].
    pub fn add(&self, id: RecordId, title: &str, author: &str) -> Result<(), Error> {
        let max_len = self.config.max_text_len;
        let record = Record::new(
            id,
            Text::bounded(title, max_len),
            Text::bounded(author, max_len),
        );

        let guard = self.list.write();
        if !self.config.allow_duplicate_ids && guard.locate(id).is_some() {
            return Err(Error::DuplicateKey(id));
        }
        guard.push_front(record)?;
        drop(guard);

        tracing::debug!(id, "added record");
        Ok(())
    }

    /// Returns the first record with `id`.
    #[inline]
    pub fn find<'a>(&'a self, pin: &'a Pin<'_>, id: RecordId) -> Option<&'a Record> {
        self.iter(pin).find(|record| record.id() == id)
    }

    /// Starts a traversal at the current head. Each call starts over, seeing the latest head.
    #[inline]
    pub fn iter<'a>(&'a self, pin: &'a Pin<'_>) -> Iter<'a> {
        self.list.iter(pin)
    }

    #[inline]
    pub fn len(&self, pin: &Pin<'_>) -> usize {
        self.iter(pin).count()
    }

    #[inline]
    pub fn is_empty(&self, pin: &Pin<'_>) -> bool {
        self.iter(pin).next().is_none()
    }

    /// Returns a copy of every record, most recently added first.
    pub fn list(&self) -> Vec<Record> {
        let thread_key = thread_key::get();
        let pin = thread_key.pin();
        self.iter(&pin)
            .inspect(|record| tracing::trace!(%record, "listing record"))
            .cloned()
            .collect()
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] if no record has `id`.
    pub fn is_borrowed(&self, id: RecordId) -> Result<bool, Error> {
        let thread_key = thread_key::get();
        let pin = thread_key.pin();
        self.find(&pin, id)
            .map(Record::is_borrowed)
            .ok_or(Error::NotFound(id))
    }

    /// Marks the record with `id` as borrowed.
    ///
    /// Of any number of racing `borrow` calls for the same record, exactly one succeeds.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] if no record has `id`.
    /// * [`Error::AlreadyBorrowed`] if it is already borrowed.
    /// * [`Error::WouldDeadlock`] for [`Mode::Sync`] on a pinned thread.
    /// * [`Error::AllocationFailure`].
    #[inline]
    pub fn borrow(&self, id: RecordId, mode: Mode) -> Result<(), Error> {
        self.set_borrowed(id, true, mode)
    }

    /// Marks the record with `id` as no longer borrowed.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] if no record has `id`.
    /// * [`Error::NotBorrowed`] if it is not borrowed.
    /// * [`Error::WouldDeadlock`] for [`Mode::Sync`] on a pinned thread.
    /// * [`Error::AllocationFailure`].
    #[inline]
    pub fn return_record(&self, id: RecordId, mode: Mode) -> Result<(), Error> {
        self.set_borrowed(id, false, mode)
    }

    /// Removes the record with `id`.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`] if no record has `id`.
    /// * [`Error::WouldDeadlock`] for [`Mode::Sync`] on a pinned thread.
    /// * [`Error::AllocationFailure`] if the record could not be queued in [`Mode::Async`].
    pub fn delete(&self, id: RecordId, mode: Mode) -> Result<(), Error> {
        let thread_key = thread_key::get();
        prepare(&thread_key, mode)?;

        let guard = self.list.write();
        let at = guard.locate(id).ok_or(Error::NotFound(id))?;
        let retired = guard.unlink(at);
        drop(guard);

        tracing::debug!(id, ?mode, "deleted record");
        self.retire(&thread_key, retired, mode)
    }

    fn set_borrowed(&self, id: RecordId, borrowed: bool, mode: Mode) -> Result<(), Error> {
        let thread_key = thread_key::get();
        prepare(&thread_key, mode)?;

        let guard = self.list.write();
        let at = guard.locate(id).ok_or(Error::NotFound(id))?;
        let current = at.record();
        if current.is_borrowed() == borrowed {
            return Err(if borrowed {
                Error::AlreadyBorrowed(id)
            } else {
                Error::NotBorrowed(id)
            });
        }
        let replacement = current.with_borrowed(borrowed);
        let retired = guard.replace(at, replacement)?;
        drop(guard);

        tracing::debug!(id, borrowed, ?mode, "updated record");
        self.retire(&thread_key, retired, mode)
    }

    fn retire(
        &self,
        thread_key: &ThreadKey,
        retired: Retired<Node>,
        mode: Mode,
    ) -> Result<(), Error> {
        let hook = self.config.on_reclaim.clone();
        let on_reclaimed = move |node: Box<Node>| {
            tracing::trace!(record = %node.record(), "reclaiming record");
            if let Some(hook) = hook {
                hook(node.record())
            }
        };
        match mode {
            Mode::Sync => thread_key.retire_sync_with(retired, on_reclaimed),
            Mode::Async => thread_key.retire_async(retired, on_reclaimed),
        }
    }
}

/// Fails the cases where retiring would fail, before anything is modified.
#[inline]
fn prepare(thread_key: &ThreadKey, mode: Mode) -> Result<(), Error> {
    match mode {
        Mode::Sync if thread_key.is_pinned() => Err(Error::WouldDeadlock),
        Mode::Sync => Ok(()),
        Mode::Async => thread_key.reserve_async(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Arc,
    };

    #[test]
    fn duplicate_ids() {
        let catalog = Catalog::new();
        catalog.add(1, "a", "b").unwrap();
        assert_eq!(catalog.add(1, "c", "d"), Err(Error::DuplicateKey(1)));
        assert_eq!(catalog.list().len(), 1);

        let catalog = Catalog::with_config(Config::default().with_duplicate_ids(true));
        catalog.add(1, "a", "b").unwrap();
        catalog.add(1, "c", "d").unwrap();
        assert_eq!(catalog.list().len(), 2);
        // the most recent one shadows the older
        let thread_key = thread_key::get();
        let pin = thread_key.pin();
        assert_eq!(catalog.find(&pin, 1).map(Record::title), Some("c"));
    }

    #[test]
    fn errors_leave_the_catalog_untouched() {
        let reclaimed = Arc::new(AtomicUsize::new(0));
        let r = reclaimed.clone();
        let catalog = Catalog::with_config(Config::default().with_reclaim_hook(move |_| {
            r.fetch_add(1, Relaxed);
        }));
        catalog.add(7, "t", "a").unwrap();
        let before = catalog.list();

        assert_eq!(catalog.return_record(7, Mode::Sync), Err(Error::NotBorrowed(7)));
        assert_eq!(catalog.borrow(8, Mode::Async), Err(Error::NotFound(8)));
        assert_eq!(catalog.delete(8, Mode::Sync), Err(Error::NotFound(8)));

        let thread_key = thread_key::get();
        {
            let _pin = thread_key.pin();
            assert_eq!(catalog.borrow(7, Mode::Sync), Err(Error::WouldDeadlock));
            assert_eq!(catalog.delete(7, Mode::Sync), Err(Error::WouldDeadlock));
        }

        assert_eq!(catalog.list(), before);
        assert_eq!(reclaimed.load(Relaxed), 0);
    }

    #[test]
    fn async_while_pinned() {
        let catalog = Catalog::new();
        catalog.add(3, "t", "a").unwrap();
        let thread_key = thread_key::get();
        {
            let pin = thread_key.pin();
            let old = catalog.find(&pin, 3).unwrap();
            catalog.borrow(3, Mode::Async).unwrap();
            // the old version stays readable while pinned
            assert!(!old.is_borrowed());
            assert!(catalog.find(&pin, 3).unwrap().is_borrowed());
        }
        thread_key.barrier().unwrap();
        assert_eq!(thread_key.pending(), 0);
    }

    #[test]
    fn len_and_is_empty() {
        let catalog = Catalog::default();
        let thread_key = thread_key::get();
        assert!(thread_key.read(|pin| catalog.is_empty(pin)));
        catalog.add(1, "a", "b").unwrap();
        catalog.add(2, "a", "b").unwrap();
        assert_eq!(thread_key.read(|pin| catalog.len(pin)), 2);
    }

    #[test]
    fn reclaim_hook_runs_unpinned() {
        const RECORDS: RecordId = 100;

        let reclaimed = Arc::new(AtomicUsize::new(0));
        let pinned = Arc::new(AtomicUsize::new(0));
        let (r, p) = (reclaimed.clone(), pinned.clone());
        let catalog = Catalog::with_config(Config::default().with_reclaim_hook(move |_| {
            if thread_key::get().is_pinned() {
                p.fetch_add(1, Relaxed);
            }
            r.fetch_add(1, Relaxed);
        }));
        for id in 0..RECORDS {
            catalog.add(id, "title", "author").unwrap();
        }

        let thread_key = thread_key::get();
        for id in 0..RECORDS / 3 {
            catalog.delete(id, Mode::Async).unwrap();
        }
        thread_key.read(|_| {
            for id in RECORDS / 3..RECORDS {
                catalog.delete(id, Mode::Async).unwrap();
            }
        });
        thread_key.barrier().unwrap();

        assert_eq!(reclaimed.load(Relaxed), RECORDS as usize);
        assert_eq!(pinned.load(Relaxed), 0);
    }
}
