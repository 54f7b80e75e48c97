//! Flat parameter storage
//!
//! All layers' values live in one contiguous `f32` buffer. Slicing hands
//! out borrowed views; `concat` is the only operation that copies values.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::layout::Layout;
use crate::error::{GraftError, Result};

/// Contiguous parameter values for a whole network
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBuffer {
    data: Vec<f32>,
}

impl ParameterBuffer {
    /// Wrap existing values
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self { data }
    }

    /// Buffer of `len` zeros
    pub fn zeros(len: usize) -> Self {
        Self { data: vec![0.0; len] }
    }

    /// Build a new buffer by copying each piece in order
    ///
    /// Borrowed pieces are views into an existing buffer, owned pieces are
    /// freshly initialized values.
    pub fn concat<'a, I>(pieces: I) -> Self
    where
        I: IntoIterator<Item = Cow<'a, [f32]>>,
    {
        let pieces: Vec<Cow<'a, [f32]>> = pieces.into_iter().collect();
        let total = pieces.iter().map(|p| p.len()).sum();
        let mut data = Vec::with_capacity(total);
        for piece in &pieces {
            data.extend_from_slice(piece);
        }
        Self { data }
    }

    /// Borrow the slice of one layer
    ///
    /// # Errors
    /// - `IndexOutOfRange` if `ordinal` is not in the layout
    /// - `ShapeMismatch` if the layout reaches past the end of the buffer
    pub fn slice(&self, layout: &Layout, ordinal: usize) -> Result<&[f32]> {
        let range = layout.range(ordinal)?;
        self.data.get(range.as_range()).ok_or(GraftError::ShapeMismatch {
            location: format!("buffer slice of layer {}", ordinal),
            expected: range.end(),
            actual: self.data.len(),
        })
    }

    /// All values
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Get the number of values
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// SHA-256 of the little-endian bytes, as lowercase hex
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for value in &self.data {
            hasher.update(value.to_le_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}
