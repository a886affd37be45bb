mod global;
mod synch;
mod thread_list;

pub use self::{global::GlobalThreadList, synch::Synch};
