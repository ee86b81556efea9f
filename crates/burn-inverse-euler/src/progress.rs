//! Per-step reporting: callback snapshots and progress sinks
//!
//! Both are purely observational and never change sampler results.

use burn::prelude::*;

/// Snapshot handed to the step callback after each outer step
#[derive(Debug, Clone)]
pub struct StepInfo<B: Backend, const D: usize> {
    /// State after the step
    pub x: Tensor<B, D>,
    /// Outer loop index (starts at 1)
    pub i: usize,
    /// Noise level reached by the step
    pub sigma: f32,
    /// Noise level actually used for the step (no churn, so equal to `sigma`)
    pub sigma_hat: f32,
    /// Last denoiser output of the step
    pub denoised: Tensor<B, D>,
}

/// Receives one `advance` per outer sampler step
pub trait ProgressSink {
    fn advance(&mut self);
}

/// Sink that discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&mut self) {}
}

impl<F: FnMut()> ProgressSink for F {
    fn advance(&mut self) {
        self()
    }
}

#[cfg(feature = "progress")]
impl ProgressSink for indicatif::ProgressBar {
    fn advance(&mut self) {
        self.inc(1);
    }
}
