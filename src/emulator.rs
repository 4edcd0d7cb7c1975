//! Host-side model of the block reducers.
//!
//! [`HostGrid`] runs the same grid the kernels run: blocks are independent
//! and executed concurrently on the rayon pool in no particular order, and
//! inside a block every stride round completes for all units before the next
//! one starts, which is what `sync_cube()` guarantees on the device.

use rayon::prelude::*;

use crate::error::{buffer_bytes, BufferKind, ReduceError, Result};
use crate::kernels::SCRATCH_CAPACITY;
use crate::partition::BlockShape;
use crate::target::{ReductionTarget, Variant};

const SCRATCH_SLOTS: usize = SCRATCH_CAPACITY as usize;

type Combine = fn(i32, i32) -> Option<i32>;

/// Run the neighbored-pair tree over `slots` for a block of `block_width`
/// units and return slot 0.
///
/// Only the first `slots.len()` units hold data; a unit whose partner falls
/// past that point keeps its value, exactly as if the partner held 0.
/// `combine(own, partner)` produces the new value of the unit's slot and
/// returns `None` on arithmetic fault.
pub fn tree_reduce<F>(slots: &mut [i32], block_width: usize, combine: F) -> Option<i32>
where
    F: Fn(i32, i32) -> Option<i32>,
{
    let live = slots.len().min(block_width);
    let mut stride = 1;
    while stride < block_width {
        // One round: units 0, 2s, 4s, ... fold in their partner. Slots read
        // this round are never written this round.
        for thread_id in (0..live).step_by(2 * stride) {
            let partner = thread_id + stride;
            if partner < block_width && partner < live {
                slots[thread_id] = combine(slots[thread_id], slots[partner])?;
            }
        }
        stride *= 2;
    }
    slots.first().copied()
}

/// Additive combine that faults on `i32` overflow.
pub fn accumulate(own: i32, partner: i32) -> Option<i32> {
    own.checked_add(partner)
}

/// Additive combine that wraps on `i32` overflow, as device adds do.
pub fn accumulate_wrapping(own: i32, partner: i32) -> Option<i32> {
    Some(own.wrapping_add(partner))
}

fn reduce_block_in_place(block: &mut [i32], block_width: usize, combine: Combine) -> Option<i32> {
    tree_reduce(block, block_width, combine)
}

fn reduce_block_in_scratch(block: &[i32], block_width: usize, combine: Combine) -> Option<i32> {
    let mut scratch = [0i32; SCRATCH_SLOTS];
    scratch[..block.len()].copy_from_slice(block);
    tree_reduce(&mut scratch[..block_width], block_width, combine)
}

#[derive(Debug)]
enum LaunchState {
    Idle,
    Completed,
    Faulted(String),
}

#[derive(Debug)]
struct Staged {
    input: Vec<i32>,
    partial_sums: Vec<i32>,
    shape: BlockShape,
}

/// Execution target that models the device on the host.
///
/// Block sums wrap on `i32` overflow like the device's do. With
/// [`with_overflow_checks`](Self::with_overflow_checks) an overflow instead
/// faults the block and is reported when the grid is synchronized.
#[derive(Debug)]
pub struct HostGrid {
    max_block_width: u32,
    memory_limit: usize,
    overflow_checks: bool,
    staged: Option<Staged>,
    state: LaunchState,
}

impl HostGrid {
    /// A grid accepting blocks up to the scratch capacity and buffers of any size.
    pub fn new() -> Self {
        Self {
            max_block_width: SCRATCH_CAPACITY,
            memory_limit: usize::MAX,
            overflow_checks: false,
            staged: None,
            state: LaunchState::Idle,
        }
    }

    /// Limit the widest launchable block. Values above the scratch capacity
    /// are clamped to it.
    pub fn with_max_block_width(mut self, width: u32) -> Self {
        self.max_block_width = width.min(SCRATCH_CAPACITY);
        self
    }

    /// Refuse to stage a pass whose buffers together exceed `bytes`.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Fault blocks whose sum overflows `i32` instead of wrapping.
    pub fn with_overflow_checks(mut self, enabled: bool) -> Self {
        self.overflow_checks = enabled;
        self
    }

    /// Account `len` elements of `T` against the memory limit, on top of
    /// `in_use` bytes already reserved. Returns the new total.
    fn reserve<T>(&self, in_use: usize, buffer: BufferKind, len: usize) -> Result<usize> {
        let bytes = buffer_bytes::<T>(buffer, len)?;
        match in_use.checked_add(bytes) {
            Some(total) if total <= self.memory_limit => Ok(total),
            _ => Err(ReduceError::Allocation { buffer, bytes }),
        }
    }

    fn combine(&self) -> Combine {
        if self.overflow_checks {
            accumulate
        } else {
            accumulate_wrapping
        }
    }
}

impl Default for HostGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl ReductionTarget for HostGrid {
    fn name(&self) -> String {
        format!("host-grid ({} threads)", rayon::current_num_threads())
    }

    fn max_block_width(&self) -> u32 {
        self.max_block_width
    }

    fn stage(&mut self, variant: Variant, shape: &BlockShape, input: &[i32]) -> Result<()> {
        if input.is_empty() {
            return Err(ReduceError::InvalidConfig("input array is empty".into()));
        }
        if input.len() != shape.num_elements() {
            return Err(ReduceError::InvalidConfig(format!(
                "grid covers {} elements but {} were given",
                shape.num_elements(),
                input.len()
            )));
        }
        // The previous pass's buffers are released before this one allocates.
        self.staged = None;
        let in_use = self.reserve::<i32>(0, BufferKind::Input, input.len())?;
        self.reserve::<i32>(in_use, BufferKind::PartialSums, shape.grid_width() as usize)?;

        self.staged = Some(Staged {
            input: input.to_vec(),
            partial_sums: vec![0; shape.grid_width() as usize],
            shape: *shape,
        });
        self.state = LaunchState::Idle;
        tracing::debug!(%variant, elements = input.len(), "staged input");
        Ok(())
    }

    fn launch(&mut self, variant: Variant, shape: &BlockShape) -> Result<()> {
        if shape.block_width() > self.max_block_width {
            return Err(ReduceError::Launch {
                variant,
                reason: format!(
                    "block width {} exceeds the target maximum of {}",
                    shape.block_width(),
                    self.max_block_width
                ),
            });
        }
        let combine = self.combine();
        let Some(staged) = self.staged.as_mut() else {
            return Err(ReduceError::Launch {
                variant,
                reason: "no input staged".into(),
            });
        };
        if staged.shape != *shape {
            return Err(ReduceError::Launch {
                variant,
                reason: format!(
                    "buffers were staged for {:?}, launch asked for {:?}",
                    staged.shape, shape
                ),
            });
        }

        let width = shape.block_width() as usize;
        let partials: Vec<Option<i32>> = match variant {
            Variant::GlobalMemory => staged
                .input
                .par_chunks_mut(width)
                .map(|block| reduce_block_in_place(block, width, combine))
                .collect(),
            Variant::SharedMemory => staged
                .input
                .par_chunks(width)
                .map(|block| reduce_block_in_scratch(block, width, combine))
                .collect(),
        };

        self.state = match partials.iter().position(Option::is_none) {
            Some(block) => LaunchState::Faulted(format!("integer overflow in block {block}")),
            None => {
                for (slot, partial) in staged.partial_sums.iter_mut().zip(partials) {
                    *slot = partial.unwrap_or_default();
                }
                LaunchState::Completed
            }
        };
        tracing::debug!(%variant, grid = shape.grid_width(), block = width, "grid executed");
        Ok(())
    }

    fn synchronize(&mut self, variant: Variant) -> Result<()> {
        match &self.state {
            LaunchState::Faulted(reason) => Err(ReduceError::Synchronization {
                variant,
                reason: reason.clone(),
            }),
            LaunchState::Idle | LaunchState::Completed => Ok(()),
        }
    }

    fn read_partial_sums(&mut self, variant: Variant, shape: &BlockShape) -> Result<Vec<i32>> {
        let transfer_error = |reason: String| ReduceError::Transfer {
            variant,
            buffer: BufferKind::PartialSums,
            reason,
        };
        let Some(staged) = &self.staged else {
            return Err(transfer_error("no kernel has been launched".into()));
        };
        match &self.state {
            LaunchState::Completed if staged.partial_sums.len() == shape.grid_width() as usize => {
                Ok(staged.partial_sums.clone())
            }
            LaunchState::Completed => Err(transfer_error(format!(
                "buffer holds {} slots, expected {}",
                staged.partial_sums.len(),
                shape.grid_width()
            ))),
            LaunchState::Idle => Err(transfer_error("no kernel has been launched".into())),
            LaunchState::Faulted(reason) => Err(transfer_error(reason.clone())),
        }
    }

    fn read_input(&mut self, variant: Variant) -> Result<Vec<i32>> {
        self.staged
            .as_ref()
            .map(|staged| staged.input.clone())
            .ok_or_else(|| ReduceError::Transfer {
                variant,
                buffer: BufferKind::Input,
                reason: "no input staged".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(grid: &mut HostGrid, variant: Variant, input: &[i32], width: u32) -> Vec<i32> {
        let shape = BlockShape::new(input.len(), width).unwrap();
        grid.stage(variant, &shape, input).unwrap();
        grid.launch(variant, &shape).unwrap();
        grid.synchronize(variant).unwrap();
        grid.read_partial_sums(variant, &shape).unwrap()
    }

    #[test]
    fn additive_tree_sums_the_block() {
        let mut slots = [3, -1, 4, 1, -5, 9, 2, 6];
        assert_eq!(tree_reduce(&mut slots, 8, accumulate), Some(19));
    }

    #[test]
    fn overwrite_combine_loses_the_sum() {
        let values = [3, -1, 4, 1, -5, 9, 2, 6];
        let mut slots = values;
        let overwritten = tree_reduce(&mut slots, 8, |_, partner| Some(partner));
        assert_ne!(overwritten, Some(values.iter().sum()));
    }

    #[test]
    fn single_unit_block_returns_its_element() {
        let mut slots = [42];
        assert_eq!(tree_reduce(&mut slots, 1, accumulate), Some(42));
    }

    #[test]
    fn non_power_of_two_width_stays_in_its_block() {
        let input: Vec<i32> = (1..=12).collect();
        let mut grid = HostGrid::new();
        for variant in Variant::ALL {
            let partials = launch(&mut grid, variant, &input, 6);
            assert_eq!(partials, vec![21, 57], "{variant}");
        }
    }

    #[test]
    fn last_block_sums_only_the_remainder() {
        let input = vec![1; 10];
        let mut grid = HostGrid::new();
        for variant in Variant::ALL {
            assert_eq!(launch(&mut grid, variant, &input, 4), vec![4, 4, 2], "{variant}");
        }
    }

    #[test]
    fn global_variant_overwrites_its_input() {
        let input = vec![1, 2, 3, 4];
        let mut grid = HostGrid::new();
        launch(&mut grid, Variant::GlobalMemory, &input, 4);
        let after = grid.read_input(Variant::GlobalMemory).unwrap();
        assert_eq!(after[0], 10);
        assert_ne!(after, input);
    }

    #[test]
    fn shared_variant_leaves_input_intact() {
        let input = vec![1, 2, 3, 4];
        let mut grid = HostGrid::new();
        launch(&mut grid, Variant::SharedMemory, &input, 4);
        assert_eq!(grid.read_input(Variant::SharedMemory).unwrap(), input);
    }

    #[test]
    fn too_wide_block_is_a_launch_failure() {
        let mut grid = HostGrid::new().with_max_block_width(256);
        let shape = BlockShape::new(1024, 512).unwrap();
        grid.stage(Variant::SharedMemory, &shape, &[0; 1024]).unwrap();
        let err = grid.launch(Variant::SharedMemory, &shape).unwrap_err();
        assert!(matches!(
            err,
            ReduceError::Launch {
                variant: Variant::SharedMemory,
                ..
            }
        ));
    }

    #[test]
    fn launch_without_staging_fails() {
        let mut grid = HostGrid::new();
        let shape = BlockShape::new(8, 4).unwrap();
        let err = grid.launch(Variant::GlobalMemory, &shape).unwrap_err();
        assert!(matches!(err, ReduceError::Launch { .. }));
    }

    #[test]
    fn overflow_wraps_like_the_device() {
        let mut grid = HostGrid::new();
        for variant in Variant::ALL {
            let partials = launch(&mut grid, variant, &[i32::MAX, 1], 2);
            assert_eq!(partials, vec![i32::MIN], "{variant}");
        }
    }

    #[test]
    fn checked_overflow_surfaces_at_synchronize() {
        let mut grid = HostGrid::new().with_overflow_checks(true);
        let shape = BlockShape::new(2, 2).unwrap();
        grid.stage(Variant::GlobalMemory, &shape, &[i32::MAX, 1]).unwrap();
        grid.launch(Variant::GlobalMemory, &shape).unwrap();
        let err = grid.synchronize(Variant::GlobalMemory).unwrap_err();
        assert!(matches!(err, ReduceError::Synchronization { .. }));
    }

    #[test]
    fn memory_limit_rejects_staging() {
        let mut grid = HostGrid::new().with_memory_limit(16);
        let shape = BlockShape::new(5, 4).unwrap();
        let err = grid.stage(Variant::GlobalMemory, &shape, &[0; 5]).unwrap_err();
        assert!(matches!(
            err,
            ReduceError::Allocation {
                buffer: BufferKind::Input,
                bytes: 20
            }
        ));
    }

    #[test]
    fn partial_sums_are_allocated_at_staging() {
        let mut grid = HostGrid::new().with_memory_limit(4096);
        let shape = BlockShape::new(1000, 1).unwrap();
        let err = grid.stage(Variant::SharedMemory, &shape, &[0; 1000]).unwrap_err();
        assert!(matches!(
            err,
            ReduceError::Allocation {
                buffer: BufferKind::PartialSums,
                bytes: 4000
            }
        ));
    }

    #[test]
    fn empty_input_is_a_config_error() {
        let mut grid = HostGrid::new();
        let shape = BlockShape::new(4, 4).unwrap();
        let err = grid.stage(Variant::GlobalMemory, &shape, &[]).unwrap_err();
        assert!(matches!(err, ReduceError::InvalidConfig(_)));
    }
}
