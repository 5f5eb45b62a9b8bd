//! Strided access patterns over linear buffers.
//!
//! A pattern walks a buffer from its base offset through a list of dimensions, outermost first.
//! Sizes and strides are expressed in elements, a zero stride repeats the same elements.

use core::fmt::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One dimension of a strided walk.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dim {
    pub size: usize,
    pub stride: usize,
}

/// Addressing limits of a DMA engine.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_dims: usize,
    pub max_dim_size: usize,
}

/// A pattern that cannot be expressed within the [TransferLimits].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("{dims} dimensions remain after collapsing, at most {max} are supported")]
    TooManyDims { dims: usize, max: usize },

    #[error("dimension of size {size} has no factor in 2..={max} and cannot be split")]
    DimTooLarge { size: usize, max: usize },
}

/// Base offset and dimensions, outermost first.
#[derive(new, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessPattern {
    pub offset: usize,
    pub dims: Vec<Dim>,
}

impl AccessPattern {
    /// A contiguous run of `len` elements.
    pub fn contiguous(offset: usize, len: usize) -> Self {
        Self::new(offset, vec![Dim::new(len, 1)])
    }

    /// Builds a pattern from `(size, stride)` pairs, outermost first.
    pub fn from_pairs(offset: usize, dims: &[(usize, usize)]) -> Self {
        Self::new(
            offset,
            dims.iter()
                .map(|(size, stride)| Dim::new(*size, *stride))
                .collect(),
        )
    }

    /// Number of elements moved by the walk.
    pub fn num_elems(&self) -> usize {
        self.dims.iter().map(|dim| dim.size).product()
    }

    pub fn is_empty(&self) -> bool {
        self.num_elems() == 0
    }

    /// Largest offset touched by the walk, `None` when it moves nothing.
    pub fn last_offset(&self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }

        Some(
            self.dims
                .iter()
                .fold(self.offset, |acc, dim| acc + (dim.size - 1) * dim.stride),
        )
    }

    /// Every offset visited, in walk order.
    pub fn offsets(&self) -> Offsets<'_> {
        Offsets {
            pattern: self,
            index: vec![0; self.dims.len()],
            done: self.is_empty(),
        }
    }

    /// Sizes and strides padded with outer unit dimensions up to `rank`.
    pub fn padded(&self, rank: usize) -> (Vec<usize>, Vec<usize>) {
        let pad = rank.saturating_sub(self.dims.len());
        let sizes = core::iter::repeat_n(1, pad)
            .chain(self.dims.iter().map(|dim| dim.size))
            .collect();
        let strides = core::iter::repeat_n(0, pad)
            .chain(self.dims.iter().map(|dim| dim.stride))
            .collect();

        (sizes, strides)
    }

    /// Rewrites the pattern so it fits the given limits while visiting exactly the same offsets
    /// in the same order.
    ///
    /// Unit dimensions are dropped, an outer dimension whose stride continues the inner one is
    /// folded into it, and dimensions longer than `max_dim_size` are split into an outer and
    /// an inner factor.
    pub fn normalize(&self, limits: &TransferLimits) -> Result<Self, PatternError> {
        if self.is_empty() {
            return Ok(Self::new(self.offset, vec![Dim::new(0, 1)]));
        }

        // Innermost first while collapsing.
        let mut collapsed: Vec<Dim> = Vec::with_capacity(self.dims.len());
        for dim in self.dims.iter().rev().filter(|dim| dim.size != 1) {
            match collapsed.last_mut() {
                Some(inner) if dim.stride == inner.size * inner.stride => inner.size *= dim.size,
                _ => collapsed.push(*dim),
            }
        }

        if collapsed.is_empty() {
            collapsed.push(Dim::new(1, 1));
        }

        let mut dims = Vec::with_capacity(collapsed.len());
        for dim in collapsed {
            split_dim(dim, limits.max_dim_size, &mut dims)?;
        }
        dims.reverse();

        if dims.len() > limits.max_dims {
            return Err(PatternError::TooManyDims {
                dims: dims.len(),
                max: limits.max_dims,
            });
        }

        Ok(Self::new(self.offset, dims))
    }
}

// Pushes `dim` innermost first, split into factors no larger than `max`.
fn split_dim(dim: Dim, max: usize, out: &mut Vec<Dim>) -> Result<(), PatternError> {
    let mut remaining = dim;

    while remaining.size > max {
        let factor = (2..=max)
            .rev()
            .find(|factor| remaining.size % factor == 0)
            .ok_or(PatternError::DimTooLarge {
                size: remaining.size,
                max,
            })?;

        out.push(Dim::new(factor, remaining.stride));
        remaining = Dim::new(remaining.size / factor, remaining.stride * factor);
    }

    out.push(remaining);
    Ok(())
}

impl Display for AccessPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "@{} [", self.offset)?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "({}, {})", dim.size, dim.stride)?;
        }
        f.write_str("]")
    }
}

/// Iterator over the offsets of an [AccessPattern].
#[derive(Debug)]
pub struct Offsets<'a> {
    pattern: &'a AccessPattern,
    index: Vec<usize>,
    done: bool,
}

impl Iterator for Offsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let offset = self
            .index
            .iter()
            .zip(self.pattern.dims.iter())
            .fold(self.pattern.offset, |acc, (i, dim)| acc + i * dim.stride);

        // Odometer increment, innermost dimension first.
        self.done = true;
        for (i, dim) in self.index.iter_mut().zip(self.pattern.dims.iter()).rev() {
            *i += 1;
            if *i < dim.size {
                self.done = false;
                break;
            }
            *i = 0;
        }

        Some(offset)
    }
}
