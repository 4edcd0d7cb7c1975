//! Splitting a flat array into fixed-width blocks.

use std::ops::Range;

use crate::error::{ReduceError, Result};

/// Block width used when the caller does not pick one.
pub const DEFAULT_BLOCK_WIDTH: u32 = 1024;

/// Grid/block shape for one reduction pass over `num_elements` values.
///
/// Block `b` owns the indices `[b * block_width, min((b + 1) * block_width, num_elements))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockShape {
    num_elements: usize,
    block_width: u32,
    grid_width: u32,
}

impl BlockShape {
    /// Compute the grid needed to cover `num_elements` with blocks of
    /// `block_width` units.
    ///
    /// Whether the execution target can actually run blocks this wide is not
    /// checked here; the target reports that at launch.
    pub fn new(num_elements: usize, block_width: u32) -> Result<Self> {
        if num_elements == 0 {
            return Err(ReduceError::InvalidConfig("input array is empty".into()));
        }
        if block_width == 0 {
            return Err(ReduceError::InvalidConfig("block width must be at least 1".into()));
        }
        let grid_width = num_elements.div_ceil(block_width as usize);
        let grid_width = u32::try_from(grid_width).map_err(|_| {
            ReduceError::InvalidConfig(format!(
                "{num_elements} elements need {grid_width} blocks of {block_width}, \
                 more than a grid can hold"
            ))
        })?;
        Ok(Self {
            num_elements,
            block_width,
            grid_width,
        })
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn block_width(&self) -> u32 {
        self.block_width
    }

    pub fn grid_width(&self) -> u32 {
        self.grid_width
    }

    /// Input indices summed by `block`.
    pub fn block_range(&self, block: u32) -> Range<usize> {
        let width = self.block_width as usize;
        let start = (block as usize * width).min(self.num_elements);
        let end = (start + width).min(self.num_elements);
        start..end
    }

    /// Number of input elements summed by `block`.
    pub fn block_len(&self, block: u32) -> usize {
        self.block_range(block).len()
    }

    /// Block owning input `index`, if the index is in range.
    pub fn block_of(&self, index: usize) -> Option<u32> {
        (index < self.num_elements).then(|| (index / self.block_width as usize) as u32)
    }
}
