use std::marker::PhantomData;

use serde::de::DeserializeOwned;

/// Incremental decoder for a body made of concatenated JSON values.
///
/// Chunk boundaries are arbitrary; a value split across chunks stays buffered
/// until its remaining bytes arrive.
pub struct JsonStreamDecoder<T> {
    buf: Vec<u8>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonStreamDecoder<T> {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> JsonStreamDecoder<T> {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every value completed by it.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered bytes are not a prefix of valid JSON.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<T>, serde_json::Error> {
        self.buf.extend_from_slice(chunk);

        let mut values = Vec::new();
        let mut consumed = 0;
        let mut iter = serde_json::Deserializer::from_slice(&self.buf).into_iter::<T>();
        loop {
            match iter.next() {
                Some(Ok(value)) => {
                    values.push(value);
                    consumed = iter.byte_offset();
                }
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => return Err(e),
                None => {
                    consumed = iter.byte_offset();
                    break;
                }
            }
        }

        self.buf.drain(..consumed);
        Ok(values)
    }

    /// Returns the number of buffered bytes not yet decoded.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
