//! Typed, lazily decoded cursor over list results.
//!
//! `List<T>` checks at construction that the handle's declared element kind
//! matches `T` (an empty `none` list is accepted for every `T`). The element
//! at the current position is extracted on first access and cached until the
//! cursor moves.
//!
//! Each cursor owns its position. Clones share the underlying outcome but
//! walk it independently. A single cursor is not meant to be shared between
//! threads while it is being advanced.

use thiserror::Error;
use tracing::debug;

use crate::models::{Dict, ValueKind};
use crate::result::{ResultHandle, ResultSource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    /// The handle holds a different element kind than requested.
    #[error("Expected list of {expected}, got list of {actual}")]
    WrongType {
        expected: ValueKind,
        actual: ValueKind,
    },

    /// Accessed past the end or on an empty list.
    #[error("List out of range or empty list")]
    OutOfRange,

    /// The kind matched but the element could not be read as one.
    #[error("Failed to extract {kind} at position {position}")]
    Extraction { kind: ValueKind, position: usize },
}

/// Element types a [`List`] can be instantiated for.
pub trait ListElement: Clone + Sized {
    const KIND: ValueKind;

    /// Decode the first element while constructing the cursor.
    const EAGER: bool = false;

    fn extract(source: &dyn ResultSource, index: usize) -> Option<Self>;
}

impl ListElement for i32 {
    const KIND: ValueKind = ValueKind::Int32;

    fn extract(source: &dyn ResultSource, index: usize) -> Option<Self> {
        source.read_int32(index)
    }
}

impl ListElement for u32 {
    const KIND: ValueKind = ValueKind::Uint32;

    fn extract(source: &dyn ResultSource, index: usize) -> Option<Self> {
        source.read_uint32(index)
    }
}

impl ListElement for String {
    const KIND: ValueKind = ValueKind::String;

    fn extract(source: &dyn ResultSource, index: usize) -> Option<Self> {
        source.read_string(index)
    }
}

impl ListElement for Dict {
    const KIND: ValueKind = ValueKind::Dict;
    const EAGER: bool = true;

    fn extract(source: &dyn ResultSource, index: usize) -> Option<Self> {
        source.read_dict(index)
    }
}

#[derive(Debug, Clone)]
pub struct List<T> {
    handle: ResultHandle,
    position: usize,
    cached: Option<T>,
}

impl<T: ListElement> List<T> {
    /// Wrap `handle`, taking a reference on it.
    ///
    /// Fails with [`ListError::WrongType`] when the declared kind is neither
    /// `T`'s kind nor `none`. For dict lists the first element is decoded
    /// here as well and its error is returned as is. No reference is kept
    /// on failure.
    pub fn new(handle: &ResultHandle) -> Result<Self, ListError> {
        let handle = handle.clone();
        let actual = handle.kind();

        if actual != T::KIND && actual != ValueKind::None {
            debug!("Rejecting list of {actual} as list of {}", T::KIND);
            return Err(ListError::WrongType {
                expected: T::KIND,
                actual,
            });
        }

        let mut list = Self {
            handle,
            position: 0,
            cached: None,
        };

        if T::EAGER && actual == T::KIND && list.is_valid() {
            list.get()?;
        }

        Ok(list)
    }

    /// Return to the first entry.
    pub fn first(&mut self) {
        self.position = 0;
        self.cached = None;
    }

    /// Move to the next entry. May move past the end; check [`List::is_valid`].
    pub fn advance(&mut self) {
        self.position = self.position.saturating_add(1);
        self.cached = None;
    }

    /// Whether the cursor points at a real element.
    pub fn is_valid(&self) -> bool {
        self.position < self.handle.len()
    }

    /// The element at the current position, decoding it on first access.
    pub fn get(&mut self) -> Result<&T, ListError> {
        let value = match self.cached.take() {
            Some(value) => value,
            None => self.decode_current()?,
        };
        Ok(self.cached.insert(value))
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// The handle this cursor holds a reference on.
    pub fn handle(&self) -> &ResultHandle {
        &self.handle
    }

    fn decode_current(&self) -> Result<T, ListError> {
        if !self.is_valid() {
            return Err(ListError::OutOfRange);
        }

        T::extract(self.handle.source(), self.position).ok_or(ListError::Extraction {
            kind: T::KIND,
            position: self.position,
        })
    }
}

/// Yields the remaining elements starting at the current position.
impl<T: ListElement> Iterator for List<T> {
    type Item = Result<T, ListError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.is_valid() {
            return None;
        }
        let item = self.get().cloned();
        self.advance();
        Some(item)
    }
}
