//! The seam between the host orchestrator and whatever runs the blocks.

use std::fmt;

use crate::error::Result;
use crate::partition::BlockShape;

/// Block reducer under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Tree reduction performed in place on the device input buffer.
    GlobalMemory,
    /// Tree reduction over a block-local scratch copy; the input is left intact.
    SharedMemory,
}

impl Variant {
    /// Both variants, in the order a run executes them.
    pub const ALL: [Variant; 2] = [Variant::GlobalMemory, Variant::SharedMemory];
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::GlobalMemory => f.write_str("reduce_neighbored_global"),
            Variant::SharedMemory => f.write_str("reduce_neighbored_shared"),
        }
    }
}

/// An execution layer able to run one reduction pass at a time.
///
/// Each method takes the variant being measured so failures can say which
/// pass they broke.
pub trait ReductionTarget {
    /// Human readable name of the target, used in logs.
    fn name(&self) -> String;

    /// Widest block the target can launch.
    fn max_block_width(&self) -> u32;

    /// Allocate fresh device buffers for `shape`: an input mirror holding a
    /// copy of `input` and one partial-sum slot per block.
    fn stage(&mut self, variant: Variant, shape: &BlockShape, input: &[i32]) -> Result<()>;

    /// Dispatch `variant` over the whole grid described by `shape`.
    fn launch(&mut self, variant: Variant, shape: &BlockShape) -> Result<()>;

    /// Block until every dispatched block has finished.
    fn synchronize(&mut self, variant: Variant) -> Result<()>;

    /// Copy the per-block partial sums back to the host.
    fn read_partial_sums(&mut self, variant: Variant, shape: &BlockShape) -> Result<Vec<i32>>;

    /// Copy the current contents of the device input mirror back to the host.
    fn read_input(&mut self, variant: Variant) -> Result<Vec<i32>>;
}
