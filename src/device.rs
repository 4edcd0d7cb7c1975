//! Accelerator execution target backed by a CubeCL compute client.

use cubecl::prelude::*;
use cubecl::server::Handle;

use crate::error::{buffer_bytes, BufferKind, ReduceError, Result};
use crate::kernels::{
    dispatch_count, launch_reduce_global, launch_reduce_shared, MAX_CUBES_PER_DIM,
    SCRATCH_CAPACITY,
};
use crate::partition::BlockShape;
use crate::target::{ReductionTarget, Variant};

struct Staged {
    input: Handle,
    partial_sums: Handle,
    shape: BlockShape,
}

/// Runs both block reducers on a CubeCL runtime.
///
/// The input mirror and the partial-sum buffer are fresh device buffers per
/// [`stage`](ReductionTarget::stage) call, so no pass observes what a
/// previous pass did to its copy.
///
/// Block sums use the device's `i32` addition, which wraps on overflow
/// instead of faulting. [`HostGrid`](crate::HostGrid) does the same unless
/// its overflow checks are turned on.
pub struct DeviceTarget<R: Runtime> {
    client: ComputeClient<R::Server>,
    staged: Option<Staged>,
}

impl<R: Runtime> DeviceTarget<R> {
    /// Select the runtime's default device and create a client for it.
    pub fn new() -> Self
    where
        R::Device: Default,
    {
        let device = Default::default();
        Self::with_device(&device)
    }

    pub fn with_device(device: &R::Device) -> Self {
        let client = R::client(device);
        tracing::info!(runtime = R::name(&client), "device ready");
        Self {
            client,
            staged: None,
        }
    }

    fn hardware_block_width(&self) -> u32 {
        self.client.properties().hardware.max_units_per_cube
    }
}

impl<R: Runtime> Default for DeviceTarget<R>
where
    R::Device: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Runtime> ReductionTarget for DeviceTarget<R> {
    fn name(&self) -> String {
        R::name(&self.client).to_string()
    }

    fn max_block_width(&self) -> u32 {
        Ord::min(self.hardware_block_width(), SCRATCH_CAPACITY)
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
        let input_bytes = buffer_bytes::<i32>(BufferKind::Input, input.len())?;
        let partial_bytes =
            buffer_bytes::<i32>(BufferKind::PartialSums, shape.grid_width() as usize)?;

        // Dropping the previous handles releases the last pass's buffers.
        self.staged = None;
        let input_gpu = self.client.create(i32::as_bytes(input));
        let partial_sums_gpu = self.client.empty(partial_bytes);
        tracing::debug!(
            %variant,
            elements = input.len(),
            input_bytes,
            partial_bytes,
            "staged input"
        );
        self.staged = Some(Staged {
            input: input_gpu,
            partial_sums: partial_sums_gpu,
            shape: *shape,
        });
        Ok(())
    }

    fn launch(&mut self, variant: Variant, shape: &BlockShape) -> Result<()> {
        let Some(staged) = &self.staged else {
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
        let max_width = self.max_block_width();
        if shape.block_width() > max_width {
            return Err(ReduceError::Launch {
                variant,
                reason: format!(
                    "block width {} exceeds the target maximum of {max_width}",
                    shape.block_width()
                ),
            });
        }
        let Some(cubes) = dispatch_count(shape.grid_width()) else {
            return Err(ReduceError::Launch {
                variant,
                reason: format!(
                    "grid width {} exceeds {MAX_CUBES_PER_DIM} x {MAX_CUBES_PER_DIM} cubes",
                    shape.grid_width()
                ),
            });
        };
        // Unit indices, padding cubes included, must not wrap a u32.
        let last_index =
            (u64::from(cubes.0) * u64::from(cubes.1) + 1) * u64::from(shape.block_width());
        if last_index > u64::from(u32::MAX) {
            return Err(ReduceError::Launch {
                variant,
                reason: format!(
                    "{} elements cannot be indexed by a u32",
                    shape.num_elements()
                ),
            });
        }

        match variant {
            Variant::GlobalMemory => launch_reduce_global::<R>(
                &self.client,
                &staged.input,
                &staged.partial_sums,
                shape.num_elements(),
                shape.block_width(),
                cubes,
                shape.grid_width(),
            ),
            Variant::SharedMemory => launch_reduce_shared::<R>(
                &self.client,
                &staged.input,
                &staged.partial_sums,
                shape.num_elements(),
                shape.block_width(),
                cubes,
                shape.grid_width(),
            ),
        }
        tracing::debug!(
            %variant,
            grid = shape.grid_width(),
            cubes_x = cubes.0,
            cubes_y = cubes.1,
            block = shape.block_width(),
            "kernel dispatched"
        );
        Ok(())
    }

    fn synchronize(&mut self, _variant: Variant) -> Result<()> {
        cubecl::future::block_on(self.client.sync());
        Ok(())
    }

    fn read_partial_sums(&mut self, variant: Variant, shape: &BlockShape) -> Result<Vec<i32>> {
        let Some(staged) = &self.staged else {
            return Err(ReduceError::Transfer {
                variant,
                buffer: BufferKind::PartialSums,
                reason: "no kernel has been launched".into(),
            });
        };
        if staged.shape.grid_width() != shape.grid_width() {
            return Err(ReduceError::Transfer {
                variant,
                buffer: BufferKind::PartialSums,
                reason: format!(
                    "buffer holds {} slots, expected {}",
                    staged.shape.grid_width(),
                    shape.grid_width()
                ),
            });
        }
        let result = self.client.read_one(staged.partial_sums.clone());
        let partials = i32::from_bytes(&result).to_vec();
        if partials.len() != shape.grid_width() as usize {
            return Err(ReduceError::Transfer {
                variant,
                buffer: BufferKind::PartialSums,
                reason: format!(
                    "read back {} slots, expected {}",
                    partials.len(),
                    shape.grid_width()
                ),
            });
        }
        Ok(partials)
    }

    fn read_input(&mut self, variant: Variant) -> Result<Vec<i32>> {
        let Some(staged) = &self.staged else {
            return Err(ReduceError::Transfer {
                variant,
                buffer: BufferKind::Input,
                reason: "no input staged".into(),
            });
        };
        let staged_len = staged.shape.num_elements();
        let result = self.client.read_one(staged.input.clone());
        let values = i32::from_bytes(&result).to_vec();
        if values.len() != staged_len {
            return Err(ReduceError::Transfer {
                variant,
                buffer: BufferKind::Input,
                reason: format!("read back {} elements, expected {staged_len}", values.len()),
            });
        }
        Ok(values)
    }
}
