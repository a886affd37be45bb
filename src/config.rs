//! Catalogue configuration.

use crate::record::Record;
use core::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// The default bound, in bytes, on a record's title and author.
pub const DEFAULT_MAX_TEXT_LEN: usize = 64;

/// Called with each record right before it is destroyed.
pub type ReclaimHook = Arc<dyn Fn(&Record) + Send + Sync + 'static>;

/// Configuration for a [`Catalog`](crate::catalog::Catalog).
///
/// # Examples
///
/// ```
/// use rcu_catalog::{catalog::Catalog, config::Config};
///
/// let catalog = Catalog::with_config(Config::default().with_max_text_len(16));
/// catalog.add(1, "a very long title indeed", "someone").unwrap();
/// assert_eq!(catalog.list()[0].title(), "a very long titl");
/// ```
#[derive(Clone)]
pub struct Config {
    /// Titles and authors longer than this many bytes are truncated.
    pub max_text_len: usize,

    /// When false, `add` rejects ids that are already present.
    pub allow_duplicate_ids: bool,

    /// Invoked from the reclamation context for every retired record.
    pub on_reclaim: Option<ReclaimHook>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_text_len:        DEFAULT_MAX_TEXT_LEN,
            allow_duplicate_ids: false,
            on_reclaim:          None,
        }
    }
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_text_len", &self.max_text_len)
            .field("allow_duplicate_ids", &self.allow_duplicate_ids)
            .field("on_reclaim", &self.on_reclaim.as_ref().map(|_| ".."))
            .finish()
    }
}

impl Config {
    pub fn with_max_text_len(mut self, max_text_len: usize) -> Self {
        self.max_text_len = max_text_len;
        self
    }

    pub fn with_duplicate_ids(mut self, allow: bool) -> Self {
        self.allow_duplicate_ids = allow;
        self
    }

    pub fn with_reclaim_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Record) + Send + Sync + 'static,
    {
        self.on_reclaim = Some(Arc::new(hook));
        self
    }
}
