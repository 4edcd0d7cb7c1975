//! Host side of a reduction run: stage, launch, wait, collect, finish, check.

use std::time::{Duration, Instant};

use crate::error::Result;
use crate::partition::BlockShape;
use crate::target::{ReductionTarget, Variant};
use crate::verify::{finish_reduction, sequential_sum, verify, Verdict};

/// Result of one variant's pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub variant: Variant,
    /// Time from launch until the device reported every block finished.
    pub elapsed: Duration,
    pub device_sum: i64,
    pub verdict: Verdict,
}

/// Result of a whole run: the host reference plus one pass per variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub shape: BlockShape,
    pub reference_sum: i64,
    pub reference_elapsed: Duration,
    pub passes: Vec<PassReport>,
}

impl RunReport {
    /// True when the last pass that ran matched the reference.
    pub fn succeeded(&self) -> bool {
        self.passes.last().is_some_and(|pass| pass.verdict.is_match())
    }
}

/// Drives reduction passes on a [`ReductionTarget`].
pub struct Orchestrator<T> {
    target: T,
    block_width: u32,
}

impl<T: ReductionTarget> Orchestrator<T> {
    pub fn new(target: T, block_width: u32) -> Self {
        Self {
            target,
            block_width,
        }
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Sum `input` on the host, then once per entry of `variants` on the
    /// target, checking every device sum against the host one.
    ///
    /// `input` is only ever borrowed, so the reference always sums the
    /// pristine array no matter what a pass does to its device copy.
    pub fn run(&mut self, input: &[i32], variants: &[Variant]) -> Result<RunReport> {
        let shape = BlockShape::new(input.len(), self.block_width)?;
        tracing::info!(
            target_name = %self.target.name(),
            elements = shape.num_elements(),
            grid = shape.grid_width(),
            block = shape.block_width(),
            "starting reduction run"
        );

        let start = Instant::now();
        let reference_sum = sequential_sum(input);
        let reference_elapsed = start.elapsed();
        tracing::info!(reference_sum, ?reference_elapsed, "host reference computed");

        let mut passes = Vec::with_capacity(variants.len());
        for &variant in variants {
            passes.push(self.run_pass(variant, input, &shape, reference_sum)?);
        }

        Ok(RunReport {
            shape,
            reference_sum,
            reference_elapsed,
            passes,
        })
    }

    /// One pass of `variant` over a freshly staged copy of `input`.
    pub fn run_pass(
        &mut self,
        variant: Variant,
        input: &[i32],
        shape: &BlockShape,
        reference_sum: i64,
    ) -> Result<PassReport> {
        self.target.stage(variant, shape, input)?;
        self.target.synchronize(variant)?;

        let start = Instant::now();
        self.target.launch(variant, shape)?;
        self.target.synchronize(variant)?;
        let elapsed = start.elapsed();

        let partial_sums = self.target.read_partial_sums(variant, shape)?;
        let device_sum = finish_reduction(&partial_sums);
        let verdict = verify(device_sum, reference_sum);

        match verdict {
            Verdict::Match => {
                tracing::info!(%variant, device_sum, ?elapsed, "pass matched host reference");
            }
            Verdict::Mismatch { expected, actual } => {
                tracing::warn!(
                    %variant,
                    expected,
                    actual,
                    ?elapsed,
                    "pass disagrees with host reference"
                );
            }
        }

        Ok(PassReport {
            variant,
            elapsed,
            device_sum,
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::HostGrid;

    /// Target whose blocks all report zero.
    struct ZeroTarget;

    impl ReductionTarget for ZeroTarget {
        fn name(&self) -> String {
            "zero".into()
        }

        fn max_block_width(&self) -> u32 {
            1024
        }

        fn stage(&mut self, _variant: Variant, _shape: &BlockShape, _input: &[i32]) -> Result<()> {
            Ok(())
        }

        fn launch(&mut self, _variant: Variant, _shape: &BlockShape) -> Result<()> {
            Ok(())
        }

        fn synchronize(&mut self, _variant: Variant) -> Result<()> {
            Ok(())
        }

        fn read_partial_sums(
            &mut self,
            _variant: Variant,
            shape: &BlockShape,
        ) -> Result<Vec<i32>> {
            Ok(vec![0; shape.grid_width() as usize])
        }

        fn read_input(&mut self, _variant: Variant) -> Result<Vec<i32>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn mismatch_is_reported_not_raised() {
        let mut orchestrator = Orchestrator::new(ZeroTarget, 4);
        let report = orchestrator.run(&[1; 8], &Variant::ALL).unwrap();
        assert_eq!(report.passes.len(), 2);
        for pass in &report.passes {
            assert_eq!(
                pass.verdict,
                Verdict::Mismatch {
                    expected: 8,
                    actual: 0
                }
            );
        }
        assert!(!report.succeeded());
    }

    #[test]
    fn success_follows_the_last_pass() {
        let mut orchestrator = Orchestrator::new(HostGrid::new(), 4);
        let mut report = orchestrator.run(&[1; 8], &Variant::ALL).unwrap();
        assert!(report.succeeded());
        let wrong = Verdict::Mismatch {
            expected: 8,
            actual: 7,
        };
        report.passes[0].verdict = wrong;
        assert!(report.succeeded());
        report.passes[1].verdict = wrong;
        assert!(!report.succeeded());
    }

    #[test]
    fn no_variants_is_not_a_success() {
        let mut orchestrator = Orchestrator::new(HostGrid::new(), 4);
        let report = orchestrator.run(&[1; 8], &[]).unwrap();
        assert!(report.passes.is_empty());
        assert!(!report.succeeded());
    }
}
