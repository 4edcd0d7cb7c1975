//! Neighbored-pair tree reduction kernels.
//!
//! Every cube sums one block of `CUBE_DIM` consecutive elements and writes
//! the block total to `partial_sums[CUBE_POS]`. At stride `s` (1, 2, 4, ...)
//! each unit whose id is a multiple of `2s` folds in the value `s` slots to
//! its right:
//!
//! ```text
//! stride 1:  [a b c d e f g h] -> [a+b . c+d . e+f . g+h .]
//! stride 2:                    -> [a+b+c+d . . . e+f+g+h . . .]
//! stride 4:                    -> [a+...+h . . . . . . .]
//! ```
//!
//! Units whose element lies past the end of the input do not return early:
//! they contribute nothing but still reach every `sync_cube()`. Grids wider
//! than one dispatch dimension are folded into a second one, so the last row
//! may hold padding cubes past the end of the input; those do no work either.
//!
//! Additions are plain `i32` adds and wrap on overflow.

use cubecl::prelude::*;
use cubecl::server::Handle;

/// Scratch slots reserved per cube by the shared-memory kernel.
pub const SCRATCH_CAPACITY: u32 = 1024;

/// Largest cube count accepted in a single dispatch dimension.
pub const MAX_CUBES_PER_DIM: u32 = 65_535;

/// Lay `grid_width` cubes out as an `(x, y)` dispatch with at most
/// [`MAX_CUBES_PER_DIM`] cubes per dimension.
///
/// `x * y` may exceed `grid_width`; the flattened cube position of the
/// surplus cubes is `>= grid_width`. Returns `None` when even two dimensions
/// are not enough.
pub fn dispatch_count(grid_width: u32) -> Option<(u32, u32)> {
    let x = Ord::max(Ord::min(grid_width, MAX_CUBES_PER_DIM), 1);
    let y = Ord::max(grid_width.div_ceil(x), 1);
    (y <= MAX_CUBES_PER_DIM).then_some((x, y))
}

/// In-place reduction over the input buffer itself. The block's slice of
/// `input_data` is overwritten with intermediate sums.
#[cube(launch)]
fn kernel_reduce_global(
    input_data: &mut Array<i32>,
    partial_sums: &mut Array<i32>,
    num_elements: u32,
) {
    let block_id = CUBE_POS;
    let thread_id = UNIT_POS;
    let block_start = block_id * CUBE_DIM;
    let index = block_start + thread_id;

    let mut stride = 1u32;
    loop {
        if stride >= CUBE_DIM {
            break;
        }
        let partner = thread_id + stride;
        if thread_id % (2 * stride) == 0 && partner < CUBE_DIM && index + stride < num_elements {
            input_data[index] += input_data[index + stride];
        }
        sync_cube();
        stride *= 2;
    }

    // Padding cubes start past the end of the input and own no slot.
    if thread_id == 0 && block_start < num_elements {
        partial_sums[block_id] = input_data[block_start];
    }
}

/// Reduction over a shared-memory copy of the block. Slots past the end of
/// the input are staged as 0.
#[cube(launch)]
fn kernel_reduce_shared(
    input_data: &Array<i32>,
    partial_sums: &mut Array<i32>,
    num_elements: u32,
    #[comptime] scratch_len: u32,
) {
    let block_id = CUBE_POS;
    let thread_id = UNIT_POS;
    let block_start = block_id * CUBE_DIM;
    let index = block_start + thread_id;

    let mut scratch = SharedMemory::<i32>::new(scratch_len);
    if index < num_elements {
        scratch[thread_id] = input_data[index];
    } else {
        scratch[thread_id] = 0i32;
    }
    sync_cube();

    let mut stride = 1u32;
    loop {
        if stride >= CUBE_DIM {
            break;
        }
        let partner = thread_id + stride;
        if thread_id % (2 * stride) == 0 && partner < CUBE_DIM {
            scratch[thread_id] += scratch[partner];
        }
        sync_cube();
        stride *= 2;
    }

    if thread_id == 0 && block_start < num_elements {
        partial_sums[block_id] = scratch[0];
    }
}

pub(crate) fn launch_reduce_global<R: Runtime>(
    client: &ComputeClient<R::Server>,
    input_gpu: &Handle,
    partial_sums_gpu: &Handle,
    num_elements: usize,
    block_width: u32,
    (cubes_x, cubes_y): (u32, u32),
    grid_width: u32,
) {
    unsafe {
        kernel_reduce_global::launch::<R>(
            client,
            CubeCount::Static(cubes_x, cubes_y, 1),
            CubeDim::new(block_width, 1, 1),
            ArrayArg::from_raw_parts::<i32>(input_gpu, num_elements, 1),
            ArrayArg::from_raw_parts::<i32>(partial_sums_gpu, grid_width as usize, 1),
            ScalarArg::new(num_elements as u32),
        );
    }
}

pub(crate) fn launch_reduce_shared<R: Runtime>(
    client: &ComputeClient<R::Server>,
    input_gpu: &Handle,
    partial_sums_gpu: &Handle,
    num_elements: usize,
    block_width: u32,
    (cubes_x, cubes_y): (u32, u32),
    grid_width: u32,
) {
    unsafe {
        kernel_reduce_shared::launch::<R>(
            client,
            CubeCount::Static(cubes_x, cubes_y, 1),
            CubeDim::new(block_width, 1, 1),
            ArrayArg::from_raw_parts::<i32>(input_gpu, num_elements, 1),
            ArrayArg::from_raw_parts::<i32>(partial_sums_gpu, grid_width as usize, 1),
            ScalarArg::new(num_elements as u32),
            SCRATCH_CAPACITY,
        );
    }
}
