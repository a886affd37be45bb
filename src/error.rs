//! Errors returned by catalogue and reclamation operations.

use crate::record::RecordId;
use core::fmt::{self, Debug, Display, Formatter};

/// An error type describing why a catalogue operation did not happen.
///
/// Every operation that returns an `Error` has left the catalogue exactly as it found it. Nothing
/// is retried internally; racing `borrow`/`return_record` callers decide for themselves whether
/// to try again.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// No record with the id is currently in the catalogue.
    NotFound(RecordId),

    /// A record with the id is already in the catalogue.
    DuplicateKey(RecordId),

    /// The record is already borrowed.
    AlreadyBorrowed(RecordId),

    /// The record is not borrowed, so it can't be returned.
    NotBorrowed(RecordId),

    /// Memory for the replacement record, or for queuing the retired one, could not be allocated.
    AllocationFailure,

    /// Synchronous reclamation was requested by a thread that is itself pinned. Waiting for every
    /// pinned reader would include waiting for itself.
    WouldDeadlock,
}

impl Debug for Error {
    #[cold]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(id) => formatter.debug_tuple("NotFound").field(id).finish(),
            Error::DuplicateKey(id) => formatter.debug_tuple("DuplicateKey").field(id).finish(),
            Error::AlreadyBorrowed(id) => {
                formatter.debug_tuple("AlreadyBorrowed").field(id).finish()
            }
            Error::NotBorrowed(id) => formatter.debug_tuple("NotBorrowed").field(id).finish(),
            Error::AllocationFailure => formatter.pad("AllocationFailure"),
            Error::WouldDeadlock => formatter.pad("WouldDeadlock"),
        }
    }
}

impl Display for Error {
    #[cold]
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(id) => write!(formatter, "record {} does not exist", id),
            Error::DuplicateKey(id) => write!(formatter, "record {} already exists", id),
            Error::AlreadyBorrowed(id) => write!(formatter, "record {} is already borrowed", id),
            Error::NotBorrowed(id) => write!(formatter, "record {} is not borrowed", id),
            Error::AllocationFailure => formatter.pad("allocation failed"),
            Error::WouldDeadlock => {
                formatter.pad("synchronous reclamation requested from a pinned thread")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::collections::TryReserveError> for Error {
    #[inline]
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::AllocationFailure
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Error::NotFound(114).to_string(), "record 114 does not exist");
        assert_eq!(
            Error::AlreadyBorrowed(114).to_string(),
            "record 114 is already borrowed"
        );
        assert_eq!(format!("{:?}", Error::NotBorrowed(3)), "NotBorrowed(3)");
        assert_eq!(format!("{:?}", Error::WouldDeadlock), "WouldDeadlock");
    }

    #[test]
    fn try_reserve_maps_to_allocation_failure() {
        let err = Vec::<u64>::new().try_reserve(usize::MAX).unwrap_err();
        assert_eq!(Error::from(err), Error::AllocationFailure);
    }
}
