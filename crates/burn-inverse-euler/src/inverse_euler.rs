//! Inverse Euler sampler
//!
//! Euler integration of the probability flow ODE where the derivative is
//! taken at the noise level the step starts from. An optional implicit
//! refinement predicts the end of the step, evaluates the derivative there
//! and averages it with the current estimate (trapezoidal rule), costing one
//! extra model call per pass.
//!
//! The schedule may run in either direction. With a flipped schedule
//! (increasing sigmas) the sampler maps a clean latent back to noise.
//!
//! Uses the k-diffusion formulation for ComfyUI compatibility.

use burn::prelude::*;
use tracing::{debug, trace, warn};

use crate::denoiser::{Denoiser, ExtraArgs};
use crate::derivative::{batch_sigma, to_d};
use crate::error::SampleError;
use crate::progress::{ProgressSink, StepInfo};
use crate::scheduler::zero_divisors;

/// Inverse Euler sampler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InverseEulerConfig {
    /// Corrector passes per step (0 = plain Euler)
    pub refine: usize,
}

/// Stochastic churn parameters
///
/// Accepted for parity with the other k-diffusion samplers. This sampler is
/// deterministic and ignores them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChurnParams {
    pub s_churn: f32,
    pub s_tmin: f32,
    pub s_tmax: f32,
    pub s_noise: f32,
}

impl Default for ChurnParams {
    fn default() -> Self {
        Self {
            s_churn: 0.0,
            s_tmin: 0.0,
            s_tmax: f32::INFINITY,
            s_noise: 1.0,
        }
    }
}

/// Per-run options
pub struct SampleOptions<'a, B: Backend, const D: usize> {
    /// Named arguments forwarded to every denoiser call
    pub extra_args: Option<&'a ExtraArgs>,
    /// Called once per outer step
    pub callback: Option<&'a mut dyn FnMut(&StepInfo<B, D>)>,
    /// Advanced once per outer step
    pub progress: Option<&'a mut dyn ProgressSink>,
    /// Suppress progress reporting
    pub disable: bool,
    /// Ignored
    pub churn: ChurnParams,
}

impl<B: Backend, const D: usize> Default for SampleOptions<'_, B, D> {
    fn default() -> Self {
        Self {
            extra_args: None,
            callback: None,
            progress: None,
            disable: false,
            churn: ChurnParams::default(),
        }
    }
}

impl<'a, B: Backend, const D: usize> SampleOptions<'a, B, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extra_args(mut self, extra_args: &'a ExtraArgs) -> Self {
        self.extra_args = Some(extra_args);
        self
    }

    pub fn with_callback(mut self, callback: &'a mut dyn FnMut(&StepInfo<B, D>)) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_progress(mut self, progress: &'a mut dyn ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn disable_progress(mut self, disable: bool) -> Self {
        self.disable = disable;
        self
    }

    pub fn with_churn(mut self, churn: ChurnParams) -> Self {
        self.churn = churn;
        self
    }
}

/// Inverse Euler sampler
///
/// Holds only configuration; the model, state and schedule are supplied per
/// call to [`sample`](Self::sample).
#[derive(Debug, Clone, Copy, Default)]
pub struct InverseEulerSampler {
    config: InverseEulerConfig,
}

impl InverseEulerSampler {
    /// Create a new inverse Euler sampler
    pub fn new(config: InverseEulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InverseEulerConfig {
        &self.config
    }

    /// Number of corrector passes per step
    pub fn refine(&self) -> usize {
        self.config.refine
    }

    /// Model calls needed for a schedule of `num_sigmas` values
    pub fn model_calls(&self, num_sigmas: usize) -> usize {
        num_sigmas.saturating_sub(1) * (1 + self.config.refine)
    }

    /// Run the sampler over `sigmas`, returning the final state
    pub fn sample<B, const D: usize, M>(
        &self,
        model: &mut M,
        x: Tensor<B, D>,
        sigmas: &[f32],
        options: SampleOptions<'_, B, D>,
    ) -> Result<Tensor<B, D>, SampleError>
    where
        B: Backend,
        M: Denoiser<B, D> + ?Sized,
    {
        sample_inverse_euler(model, x, sigmas, self.config.refine, options)
    }
}

/// Inverse Euler sampling loop
///
/// Steps from `sigmas[i - 1]` to `sigmas[i]` for every `i` in
/// `1..sigmas.len()`. A schedule with fewer than two values returns `x`
/// unchanged. Denoiser errors abort the run.
pub fn sample_inverse_euler<B, const D: usize, M>(
    model: &mut M,
    x: Tensor<B, D>,
    sigmas: &[f32],
    refine: usize,
    options: SampleOptions<'_, B, D>,
) -> Result<Tensor<B, D>, SampleError>
where
    B: Backend,
    M: Denoiser<B, D> + ?Sized,
{
    let SampleOptions {
        extra_args,
        mut callback,
        mut progress,
        disable,
        churn,
    } = options;
    let no_args = ExtraArgs::default();
    let extra_args = extra_args.unwrap_or(&no_args);

    let num_steps = sigmas.len().saturating_sub(1);
    debug!(num_steps, refine, s_churn = churn.s_churn, "inverse euler sampling");

    let zeros = zero_divisors(sigmas, refine);
    if !zeros.is_empty() {
        warn!(indices = ?zeros, "zero sigma used as divisor, output will not be finite");
    }

    let mut x = x;
    for i in 1..sigmas.len() {
        let (next, denoised) =
            inverse_euler_step(model, x, sigmas[i - 1], sigmas[i], refine, extra_args, i)?;
        x = next;

        if let Some(callback) = callback.as_deref_mut() {
            callback(&StepInfo {
                x: x.clone(),
                i,
                sigma: sigmas[i],
                sigma_hat: sigmas[i],
                denoised,
            });
        }

        if !disable {
            if let Some(progress) = progress.as_deref_mut() {
                progress.advance();
            }
        }
    }

    debug!(num_steps, "inverse euler sampling finished");
    Ok(x)
}

/// Perform one inverse Euler step from `sigma` to `sigma_next`
///
/// Returns the new state and the last denoiser output. `step` is only used
/// for error reporting and logs.
pub fn inverse_euler_step<B, const D: usize, M>(
    model: &mut M,
    x: Tensor<B, D>,
    sigma: f32,
    sigma_next: f32,
    refine: usize,
    extra_args: &ExtraArgs,
    step: usize,
) -> Result<(Tensor<B, D>, Tensor<B, D>), SampleError>
where
    B: Backend,
    M: Denoiser<B, D> + ?Sized,
{
    let dt = sigma_next - sigma;
    trace!(step, sigma, sigma_next, dt, "inverse euler step");

    // Derivative at the start of the step
    let (mut denoised, sigma_in) = evaluate(model, x.clone(), sigma, extra_args, step)?;
    let mut d = to_d(x.clone(), sigma_in, denoised.clone());

    for _ in 0..refine {
        let (refined, refined_denoised) =
            refine_derivative(model, &x, d, dt, sigma_next, extra_args, step)?;
        d = refined;
        denoised = refined_denoised;
    }

    Ok((x + d * dt, denoised))
}

/// One corrector pass
///
/// Predicts `x_ = x + d * dt`, evaluates the derivative at `sigma_next` and
/// averages it with `d`. `x` itself is left untouched. Returns the refined
/// derivative and the denoiser output at the predicted point.
pub fn refine_derivative<B, const D: usize, M>(
    model: &mut M,
    x: &Tensor<B, D>,
    d: Tensor<B, D>,
    dt: f32,
    sigma_next: f32,
    extra_args: &ExtraArgs,
    step: usize,
) -> Result<(Tensor<B, D>, Tensor<B, D>), SampleError>
where
    B: Backend,
    M: Denoiser<B, D> + ?Sized,
{
    let x_pred = x.clone() + d.clone() * dt;
    let (denoised, sigma_in) = evaluate(model, x_pred.clone(), sigma_next, extra_args, step)?;
    let d_next = to_d(x_pred, sigma_in, denoised.clone());

    Ok((d * 0.5 + d_next * 0.5, denoised))
}

/// Call the model at a scalar noise level, returning its output and the
/// per-batch sigma it was given
fn evaluate<B, const D: usize, M>(
    model: &mut M,
    x: Tensor<B, D>,
    sigma: f32,
    extra_args: &ExtraArgs,
    step: usize,
) -> Result<(Tensor<B, D>, Tensor<B, 1>), SampleError>
where
    B: Backend,
    M: Denoiser<B, D> + ?Sized,
{
    let sigma_in = batch_sigma::<B>(sigma, x.dims()[0], &x.device());
    let denoised = model
        .denoise(x, sigma_in.clone(), extra_args)
        .map_err(|source| SampleError::Denoiser {
            step,
            sigma,
            source,
        })?;

    Ok((denoised, sigma_in))
}
