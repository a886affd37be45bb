//! A read-mostly lending-library catalogue.
//!
//! `rcu-catalog` lets any number of threads traverse a shared collection of records without taking
//! a lock or writing to shared memory, while writers add, update, and delete records. Readers
//! never block, and never see a half-written or freed record.
//!
//! # Examples
//!
//! ```
//! use rcu_catalog::{catalog::Catalog, error::Error, reclaim::Mode, thread_key};
//!
//! let catalog = Catalog::new();
//! catalog.add(102, "BOOK1", "xyz").unwrap();
//! catalog.add(114, "BOOK2", "zbc").unwrap();
//!
//! catalog.borrow(114, Mode::Sync).unwrap();
//! assert_eq!(catalog.borrow(114, Mode::Sync), Err(Error::AlreadyBorrowed(114)));
//! catalog.return_record(114, Mode::Sync).unwrap();
//! catalog.delete(102, Mode::Sync).unwrap();
//!
//! let thread_key = thread_key::get();
//! thread_key.read(|pin| {
//!     let remaining: Vec<_> = catalog.iter(pin).map(|record| record.id()).collect();
//!     assert_eq!(remaining, [114]);
//! });
//! ```
//!
//! # Design
//!
//! * Records are immutable once published. A change links a fresh copy with a single atomic
//!   pointer store, under a mutex that only writers take.
//! * Readers enter a critical section with [`ThreadKey::pin`](thread_key::ThreadKey::pin), which
//!   publishes the global epoch they observed. That is one store and one fence, no locks.
//! * Unlinked records become [`Retired`](reclaim::Retired) and are destroyed only after every
//!   thread pinned at or before their retirement has unpinned. The writer picks between waiting
//!   for that inline ([`Mode::Sync`](reclaim::Mode::Sync)) or queuing a callback
//!   ([`Mode::Async`](reclaim::Mode::Async)).
//! * The reclamation machinery is a small epoch based garbage collector with per thread garbage
//!   bags. It is usable on its own through [`thread_key`].
//!
//! ## Modules
//!
//! * [`catalog`], the catalogue itself.
//! * [`thread_key`], per thread read-side critical sections and retirement.
//! * [`reclaim`], the retirement hand-off types.
//! * [`config`], [`error`], [`record`].
//! * [`stats`], counters enabled by the `stats` feature.

#![warn(macro_use_extern_crate)]
#![warn(missing_debug_implementations)]
#![warn(unused_lifetimes)]
#![cfg_attr(not(test), warn(unused_results))]
#![deny(rust_2018_compatibility)]
#![deny(rust_2018_idioms)]
#![deny(unused_must_use)]

#[macro_use]
mod internal;

pub mod catalog;
pub mod config;
pub mod error;
pub mod list;
pub mod reclaim;
pub mod record;
pub mod stats;
pub mod thread_key;

pub use catalog::Catalog;
pub use error::Error;
pub use reclaim::Mode;
pub use record::{Record, RecordId};

#[cfg(test)]
mod memory {
    use crate::{catalog::Catalog, config::Config, reclaim::Mode, thread_key};
    use crossbeam_utils::thread;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering::Relaxed},
            Arc,
        },
        time::Duration,
    };

    /// Collects until `reclaimed` reaches `expected`. Exited threads hand over what they could not
    /// reclaim, and another thread may be running it meanwhile.
    fn settle(reclaimed: &AtomicUsize, expected: usize) {
        let thread_key = thread_key::get();
        for _ in 0..1_000 {
            thread_key.barrier().unwrap();
            if reclaimed.load(Relaxed) == expected {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(reclaimed.load(Relaxed), expected);
    }

    fn counting_catalog() -> (Catalog, Arc<AtomicUsize>) {
        let reclaimed = Arc::new(AtomicUsize::new(0));
        let r = reclaimed.clone();
        let catalog = Catalog::with_config(Config::default().with_reclaim_hook(move |_| {
            r.fetch_add(1, Relaxed);
        }));
        (catalog, reclaimed)
    }

    #[test]
    fn leak_single() {
        const ITER_COUNT: usize = 100_000;
        let (catalog, reclaimed) = counting_catalog();
        catalog.add(0, "title", "author").unwrap();
        thread::scope(|s| {
            s.spawn(|_| {
                for _ in 0..ITER_COUNT {
                    catalog.borrow(0, Mode::Async).unwrap();
                    catalog.return_record(0, Mode::Async).unwrap();
                }
            })
            .join()
            .unwrap();
        })
        .unwrap();
        settle(&reclaimed, 2 * ITER_COUNT);
    }

    #[test]
    fn leak_multi() {
        const ITER_COUNT: usize = 10_000;
        const THREAD_COUNT: usize = 16;
        let (catalog, reclaimed) = counting_catalog();
        for id in 0..THREAD_COUNT as u32 {
            catalog.add(id, "title", "author").unwrap();
        }
        thread::scope(|s| {
            for id in 0..THREAD_COUNT as u32 {
                let catalog = &catalog;
                s.spawn(move |_| {
                    let mode = if id % 2 == 0 { Mode::Sync } else { Mode::Async };
                    for _ in 0..ITER_COUNT {
                        catalog.borrow(id, mode).unwrap();
                        catalog.return_record(id, mode).unwrap();
                    }
                });
            }
        })
        .unwrap();
        settle(&reclaimed, 2 * ITER_COUNT * THREAD_COUNT);
    }

    #[test]
    fn sync_delete_reclaims_each_record() {
        let (catalog, reclaimed) = counting_catalog();
        for id in 0..100 {
            catalog.add(id, "title", "author").unwrap();
        }
        for id in 0..50 {
            catalog.delete(id, Mode::Sync).unwrap();
        }
        assert_eq!(reclaimed.load(Relaxed), 50);
        assert_eq!(catalog.list().len(), 50);
    }

    #[test]
    fn hook_released_with_catalog() {
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Relaxed);
            }
        }

        let dropped = Arc::new(AtomicUsize::new(0));
        let counted = Counted(dropped.clone());
        let catalog = Catalog::with_config(Config::default().with_reclaim_hook(move |_| {
            let _ = &counted;
        }));
        catalog.add(1, "title", "author").unwrap();
        catalog.borrow(1, Mode::Async).unwrap();
        assert_eq!(thread_key::get().barrier(), Ok(1));
        assert_eq!(dropped.load(Relaxed), 0);
        drop(catalog);
        assert_eq!(dropped.load(Relaxed), 1);
    }
}
