//! Typed decoding on top of a raw document source.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::error::{Result, ShimError};
use crate::framing::RawDocSource;

/// Deserializes each record of a [`RawDocSource`] into a caller-chosen type.
///
/// A record that fails to decode is consumed and stops the source; the
/// decode error is then reported by [`err`](DecodedSource::err) and
/// [`close`](DecodedSource::close).
pub struct DecodedSource<S> {
    source: S,
    buf: Vec<u8>,
    decode_err: Option<ShimError>,
}

impl<S: RawDocSource> DecodedSource<S> {
    /// Wrap a raw source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            buf: Vec::new(),
            decode_err: None,
        }
    }

    /// Decode the next document, or `None` at end of stream or on error.
    #[allow(clippy::should_implement_trait)] // generic over the target type
    pub fn next<T: DeserializeOwned>(&mut self) -> Option<T> {
        if self.decode_err.is_some() {
            return None;
        }
        let len = self.source.load_next_into(&mut self.buf)?;
        match bson::from_slice(&self.buf[..len]) {
            Ok(doc) => Some(doc),
            Err(e) => {
                self.decode_err = Some(ShimError::Decode(e));
                None
            }
        }
    }

    /// Decode the next document into `target`, leaving it untouched when
    /// there is none.
    pub fn next_into<T: DeserializeOwned>(&mut self, target: &mut T) -> bool {
        match self.next() {
            Some(doc) => {
                *target = doc;
                true
            }
            None => false,
        }
    }

    /// Iterate the remaining documents as `T`.
    pub fn iter<T: DeserializeOwned>(&mut self) -> Docs<'_, S, T> {
        Docs {
            source: self,
            _marker: PhantomData,
        }
    }

    /// The pending decode error, else the underlying stream error.
    pub fn err(&self) -> Option<&ShimError> {
        self.decode_err.as_ref().or_else(|| self.source.err())
    }

    /// Close the underlying source; a pending decode error wins over
    /// whatever the source reports.
    pub fn close(self) -> Result<()> {
        let closed = self.source.close();
        match self.decode_err {
            Some(err) => Err(err),
            None => closed,
        }
    }
}

/// Iterator over the documents of a [`DecodedSource`].
pub struct Docs<'a, S, T> {
    source: &'a mut DecodedSource<S>,
    _marker: PhantomData<fn() -> T>,
}

impl<S: RawDocSource, T: DeserializeOwned> Iterator for Docs<'_, S, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.source.next()
    }
}
