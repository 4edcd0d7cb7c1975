//! Block-wise parallel sum reduction.
//!
//! An integer array is split into blocks, each block is tree-reduced on the
//! device (either in place in global memory or through shared-memory
//! scratch), the per-block partial sums are read back and finished on the
//! host, and the result is checked against a plain sequential sum.
//!
//! ```no_run
//! use block_reduce::{fill::random_input, Orchestrator, Variant, WgpuTarget};
//!
//! let input = random_input(1 << 20, 1);
//! let mut orchestrator = Orchestrator::new(WgpuTarget::new(), 256);
//! let report = orchestrator.run(&input, &Variant::ALL)?;
//! assert!(report.succeeded());
//! # Ok::<(), block_reduce::ReduceError>(())
//! ```

pub mod config;
pub mod device;
pub mod emulator;
pub mod error;
pub mod fill;
pub mod kernels;
pub mod orchestrator;
pub mod partition;
pub mod target;
pub mod verify;

pub use config::RunConfig;
pub use device::DeviceTarget;
pub use emulator::HostGrid;
pub use error::{BufferKind, ReduceError, Result};
pub use orchestrator::{Orchestrator, PassReport, RunReport};
pub use partition::BlockShape;
pub use target::{ReductionTarget, Variant};
pub use verify::Verdict;

/// Device target on the default wgpu adapter.
pub type WgpuTarget = DeviceTarget<cubecl::wgpu::WgpuRuntime>;
