//! Statistics collection. Enabled with `--features stats`.
//!
//! Each thread records into its own [`Stats`] which is merged into a global [`Stats`] when the
//! thread exits, or when [`ThreadStats::flush`] is called.

use crate::internal::phoenix_tls::PhoenixTarget;
use parking_lot::Mutex;
use std::{
    cell::RefCell,
    fmt::{self, Debug, Formatter},
    ops::{Deref, DerefMut},
};

#[derive(Copy, Clone, Default, Debug)]
struct MinMaxTotal {
    min:   u64,
    max:   u64,
    total: u64,
}

#[doc(hidden)]
#[derive(Default)]
pub struct Size {
    min_max_total: Option<MinMaxTotal>,
    count:         u64,
}

impl Debug for Size {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Size")
            .field("count", &self.count)
            .field("min", &self.min_max_total.map(|x| x.min))
            .field("max", &self.min_max_total.map(|x| x.max))
            .field("total", &self.min_max_total.map(|x| x.total))
            .field(
                "avg",
                &self
                    .min_max_total
                    .map(|x| x.total as f64 / self.count as f64),
            )
            .finish()
    }
}

impl Size {
    /// Number of recorded samples.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all recorded samples.
    pub fn total(&self) -> u64 {
        self.min_max_total.map_or(0, |x| x.total)
    }

    pub(crate) fn record(&mut self, size: u64) {
        self.count += 1;
        if let Some(ref mut min_max_total) = &mut self.min_max_total {
            min_max_total.min = min_max_total.min.min(size);
            min_max_total.max = min_max_total.max.max(size);
            min_max_total.total += size;
        } else {
            self.min_max_total = Some(MinMaxTotal {
                min:   size,
                max:   size,
                total: size,
            });
        }
    }

    pub(crate) fn merge(&mut self, rhs: &Self) {
        self.count += rhs.count;
        self.min_max_total = match (self.min_max_total, rhs.min_max_total) {
            (Some(a), Some(b)) => Some(MinMaxTotal {
                min:   a.min.min(b.min),
                max:   a.max.max(b.max),
                total: a.total + b.total,
            }),
            (a, b) => a.or(b),
        };
    }
}

#[doc(hidden)]
#[derive(Default, Debug)]
pub struct Event {
    count: usize,
}

impl Event {
    /// Number of times the event happened.
    pub fn count(&self) -> usize {
        self.count
    }

    fn happened(&mut self) {
        self.count += 1
    }

    fn merge(&mut self, rhs: &Self) {
        self.count += rhs.count
    }
}

macro_rules! stats_func {
    ($(#[$attr:meta])* $name:ident: Event) => {
        cfg_if::cfg_if! {
            if #[cfg(feature = "stats")] {
                #[inline]
                $(#[$attr])*
                pub(crate) fn $name() {
                    THREAD_STAT.with(|stats| stats.get().$name.happened())
                }
            } else {
                #[inline(always)]
                $(#[$attr])*
                pub(crate) fn $name() {}
            }
        }
    };
    ($(#[$attr:meta])* $name:ident: Size) => {
        cfg_if::cfg_if! {
            if #[cfg(feature = "stats")] {
                #[inline]
                $(#[$attr])*
                pub(crate) fn $name(size: usize) {
                    let size = size as u64;
                    THREAD_STAT.with(|stats| stats.get().$name.record(size))
                }
            } else {
                #[inline(always)]
                $(#[$attr])*
                pub(crate) fn $name(_size: usize) {}
            }
        }
    };
}

macro_rules! stats {
    ($($(#[$attr:meta])* $names:ident: $kinds:tt),* $(,)*) => {
        /// A collection of rcu-catalog statistics.
        #[derive(Default, Debug)]
        pub struct Stats {
            $($(#[$attr])*pub $names: $kinds),*
        }

        impl Stats {
            fn merge(&mut self, rhs: &Self) {
                $(self.$names.merge(&rhs.$names));*
            }
        }

        $(stats_func!{$(#[$attr])* $names: $kinds})*
    };
}

stats! {
    /// Outermost read-side pins.
    read_pin:             Event,

    /// Retirements that waited for a grace period inline.
    retire_sync:          Event,

    /// Retirements queued for deferred reclamation.
    retire_async:         Event,

    /// Retired values that have been destroyed.
    reclaimed:            Event,

    /// Reclamation callbacks that panicked.
    reclaim_panic:        Event,

    /// Number of extra passes over the thread list per quiesce.
    quiesce_spins:        Size,

    /// Number of sealed bags an exiting thread handed over to the remaining threads.
    orphaned_bags:        Size,

    /// Number of sealed bags collected per collection.
    collect_size:         Size,

    /// Number of records visited per catalogue write path lookup.
    write_lookup_len:     Size,
}

impl Stats {
    /// Prints a summary of the stats object.
    pub fn print_summary(&self) {
        println!("{:#?}", self);

        let retired = self.retire_sync.count + self.retire_async.count;
        println!(
            "{:>12}: {:>12} {:>9}: {:>12} {:>13}: {:.4}",
            "retired",
            retired,
            "reclaimed",
            self.reclaimed.count,
            "spins avg",
            self.quiesce_spins.total() as f64 / self.quiesce_spins.count.max(1) as f64
        );
    }
}

/// Thread local statistics.
///
/// To reduce overhead of stats tracking, each thread has it's own `Stats` object which is flushed
/// to the global `Stats` object on thread exit or when manually requested.
#[derive(Default)]
pub struct ThreadStats(RefCell<Stats>);

impl Debug for ThreadStats {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.pad("ThreadStats { .. }")
    }
}

impl Drop for ThreadStats {
    fn drop(&mut self) {
        self.flush()
    }
}

impl PhoenixTarget for ThreadStats {
    #[inline]
    fn subscribe(&mut self) {
        // initialize global now, else we may get panics on drop because lazy_static uses
        // thread_locals to initialize it.
        lazy_static::initialize(&GLOBAL);
    }
}

impl ThreadStats {
    /// Returns the actual statistics object.
    pub fn get(&self) -> impl DerefMut<Target = Stats> + '_ {
        self.0.borrow_mut()
    }

    /// Flushes the thread stats to the global thread stats object.
    ///
    /// After flushing, `self` is reset.
    pub fn flush(&self) {
        let mut borrow = self.get();
        GLOBAL.lock().merge(&*borrow);
        *borrow = Default::default()
    }
}

phoenix_tls! {
    static THREAD_STAT: ThreadStats
}

lazy_static::lazy_static! {
    static ref GLOBAL: Mutex<Stats> = Mutex::default();
}

/// Returns the global stats object, or None if the feature is disabled.
pub fn stats() -> Option<impl Deref<Target = Stats>> {
    if cfg!(feature = "stats") {
        Some(GLOBAL.lock())
    } else {
        None
    }
}

/// Flushes the calling thread's statistics into the global stats object.
pub fn flush_thread_stats() {
    if cfg!(feature = "stats") {
        THREAD_STAT.with(ThreadStats::flush)
    }
}

/// Prints a summary of the global stats object.
///
/// It may be necessary to run [`flush_thread_stats`] first.
pub fn print_stats() {
    match self::stats() {
        Some(stats) => stats.print_summary(),
        None => println!("`rcu-catalog/stats` feature is not enabled"),
    }
}

#[cfg(all(test, feature = "stats"))]
mod test {
    use super::*;

    #[test]
    fn flush_merges_into_global() {
        std::thread::spawn(|| {
            retire_async();
            quiesce_spins(3);
            flush_thread_stats();
        })
        .join()
        .unwrap();
        let global = stats().unwrap();
        assert!(global.retire_async.count() >= 1);
        assert!(global.quiesce_spins.total() >= 3);
    }
}
