//! The link chain owning every live record.
//!
//! Readers walk the chain with acquire loads inside a [`Pin`]. Writers hold a [`WriteGuard`] and
//! never modify a published node: they allocate a replacement and swing a single link to it.

use crate::{
    error::Error,
    reclaim::Retired,
    record::{Record, RecordId},
    stats,
    thread_key::Pin,
};
use core::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    ptr::{self, NonNull},
    sync::atomic::{
        AtomicPtr,
        Ordering::{Acquire, Relaxed, Release},
    },
};
use parking_lot::{Mutex, MutexGuard};
use std::alloc::{self, Layout};

/// A record and the link to the next node.
pub struct Node {
    record: Record,
    next:   AtomicPtr<Node>,
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("record", &self.record)
            .finish()
    }
}

impl Node {
    #[inline]
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Allocates an unlinked node, reporting allocation failure instead of aborting.
    fn try_alloc(record: Record) -> Result<NonNull<Node>, Error> {
        let layout = Layout::new::<Node>();
        unsafe {
            let raw = NonNull::new(alloc::alloc(layout) as *mut Node)
                .ok_or(Error::AllocationFailure)?;
            ptr::write(
                raw.as_ptr(),
                Node {
                    record,
                    next: AtomicPtr::new(ptr::null_mut()),
                },
            );
            Ok(raw)
        }
    }
}

/// A singly linked list of records, readable without locks.
pub(crate) struct RecordList {
    head:   AtomicPtr<Node>,
    writer: Mutex<()>,
}

impl RecordList {
    #[inline]
    pub fn new() -> Self {
        RecordList {
            head:   AtomicPtr::new(ptr::null_mut()),
            writer: Mutex::new(()),
        }
    }

    /// Starts a traversal at the current head.
    #[inline]
    pub fn iter<'a>(&'a self, _pin: &'a Pin<'_>) -> Iter<'a> {
        Iter {
            next:    self.head.load(Acquire),
            phantom: PhantomData,
        }
    }

    /// Acquires the writer lock. Readers are never blocked by it.
    #[inline]
    pub fn write(&self) -> WriteGuard<'_> {
        WriteGuard {
            list:  self,
            _lock: self.writer.lock(),
        }
    }
}

impl Drop for RecordList {
    fn drop(&mut self) {
        let mut next = *self.head.get_mut();
        while let Some(node) = NonNull::new(next) {
            // nothing else can reach the list anymore
            let mut node = unsafe { Box::from_raw(node.as_ptr()) };
            next = *node.next.get_mut();
        }
    }
}

/// The position of a node, found under a [`WriteGuard`].
pub(crate) struct Located<'g> {
    link: &'g AtomicPtr<Node>,
    node: NonNull<Node>,
}

impl<'g> Located<'g> {
    #[inline]
    pub fn record(&self) -> &'g Record {
        // linked nodes are only unlinked by the holder of the guard
        unsafe { &(*self.node.as_ptr()).record }
    }
}

/// Exclusive write access to a [`RecordList`].
pub(crate) struct WriteGuard<'a> {
    list:  &'a RecordList,
    _lock: MutexGuard<'a, ()>,
}

impl<'a> WriteGuard<'a> {
    /// Finds the first node holding `id`.
    pub fn locate(&self, id: RecordId) -> Option<Located<'_>> {
        let mut link = &self.list.head;
        let mut visited = 0;
        let result = loop {
            let node = match NonNull::new(link.load(Acquire)) {
                Some(node) => node,
                None => break None,
            };
            visited += 1;
            // the guard keeps every linked node alive
            let node_ref = unsafe { &*node.as_ptr() };
            if node_ref.record.id() == id {
                break Some(Located { link, node });
            }
            link = &node_ref.next;
        };
        stats::write_lookup_len(visited);
        result
    }

    /// Links a new node holding `record` at the head.
    pub fn push_front(&self, record: Record) -> Result<(), Error> {
        let node = Node::try_alloc(record)?;
        unsafe {
            node.as_ref()
                .next
                .store(self.list.head.load(Relaxed), Relaxed);
        }
        // publishes the node's contents
        self.list.head.store(node.as_ptr(), Release);
        Ok(())
    }

    /// Swings the link at `at` to a new node holding `record`. The old node keeps pointing at its
    /// successor, so readers standing on it can carry on.
    pub fn replace(&self, at: Located<'_>, record: Record) -> Result<Retired<Node>, Error> {
        let new = Node::try_alloc(record)?;
        unsafe {
            let old_next = at.node.as_ref().next.load(Relaxed);
            new.as_ref().next.store(old_next, Relaxed);
            at.link.store(new.as_ptr(), Release);
            Ok(Retired::from_raw(at.node))
        }
    }

    /// Removes the node at `at` from the chain.
    pub fn unlink(&self, at: Located<'_>) -> Retired<Node> {
        unsafe {
            let old_next = at.node.as_ref().next.load(Relaxed);
            at.link.store(old_next, Release);
            Retired::from_raw(at.node)
        }
    }
}

/// A lazy traversal of a [`Catalog`](crate::catalog::Catalog). Created by
/// [`Catalog::iter`](crate::catalog::Catalog::iter).
pub struct Iter<'a> {
    next:    *const Node,
    phantom: PhantomData<&'a Record>,
}

impl Debug for Iter<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad("Iter { .. }")
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Record;

    #[inline]
    fn next(&mut self) -> Option<&'a Record> {
        // the pin outlives 'a, so nothing reachable is reclaimed
        let node = unsafe { self.next.as_ref()? };
        self.next = node.next.load(Acquire);
        Some(&node.record)
    }
}
