//! The epoch based garbage collector.
//!
//! Every thread that pins owns a `Synch`, registered in the `GlobalThreadList`. Retired values
//! are either destroyed inline after `Synch::quiesce`, or sealed into a bag of the retiring
//! thread's `ThreadGarbage` tagged with the retire epoch. A sealed bag is collected once the
//! minimum pinned epoch of all threads has moved past its tag. Bags still waiting when their thread
//! exits are adopted by the `GlobalThreadList`, and collected by the next thread that collects.

mod queued;
mod quiesce;
mod thread_garbage;

pub use self::{
    queued::Queued,
    quiesce::{GlobalThreadList, Synch},
    thread_garbage::{SealedBag, ThreadGarbage},
};

#[cfg(test)]
pub use self::thread_garbage::COLLECT_THRESHOLD;
