//! The values stored in the catalogue.
//!
//! A [`Record`] is immutable once it has been published. Changing a record means building a new
//! one (see [`Record::with_borrowed`]) and swapping it in.

use core::{
    fmt::{self, Debug, Display, Formatter},
    ops::Deref,
};

/// The unique key of a record.
pub type RecordId = u32;

/// Text with an upper bound on its length in bytes.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Text(String);

impl Text {
    /// Creates a new `Text`, truncating `text` to at most `max_len` bytes without splitting a
    /// character.
    pub fn bounded(text: &str, max_len: usize) -> Self {
        if likely!(text.len() <= max_len) {
            return Text(text.to_owned());
        }
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        tracing::debug!(len = text.len(), max_len, "truncating text");
        Text(text[..end].to_owned())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Text {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Debug for Text {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for Text {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A catalogue entry.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Record {
    id:       RecordId,
    title:    Text,
    author:   Text,
    borrowed: bool,
}

impl Record {
    /// Creates a record that is not borrowed.
    pub fn new(id: RecordId, title: Text, author: Text) -> Self {
        Record {
            id,
            title,
            author,
            borrowed: false,
        }
    }

    #[inline]
    pub fn id(&self) -> RecordId {
        self.id
    }

    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[inline]
    pub fn author(&self) -> &str {
        &self.author
    }

    #[inline]
    pub fn is_borrowed(&self) -> bool {
        self.borrowed
    }

    /// Returns a copy of self with the borrowed flag set to `borrowed`.
    pub fn with_borrowed(&self, borrowed: bool) -> Self {
        Record {
            borrowed,
            ..self.clone()
        }
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, title: {}, author: {}, borrowed: {}",
            self.id, self.title, self.author, self.borrowed
        )
    }
}
