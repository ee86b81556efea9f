//! Inverse Euler sampler for diffusion models, built on Burn
//!
//! Integrates the probability flow ODE through a noise schedule with the
//! derivative anchored at the start of each step, optionally refined by
//! predictor-corrector passes. The model is any [`Denoiser`].
//!
//! ```ignore
//! use burn_inverse_euler::{InverseEulerConfig, InverseEulerSampler, SampleOptions, denoiser_fn};
//!
//! let sampler = InverseEulerSampler::new(InverseEulerConfig { refine: 1 });
//! let mut model = denoiser_fn::<MyBackend, 4, _>(|x, sigma, args| unet.denoise(x, sigma, args));
//! let latent = sampler.sample(&mut model, latent, &sigmas, SampleOptions::new())?;
//! ```

pub mod error;
pub mod derivative;
pub mod denoiser;
pub mod progress;
pub mod inverse_euler;
pub mod registry;
pub mod scheduler;

pub use error::{DenoiseError, RegistryError, SampleError};
pub use derivative::{batch_sigma, to_d};
pub use denoiser::{Denoiser, ExtraArg, ExtraArgs, denoiser_fn};
pub use progress::{NoProgress, ProgressSink, StepInfo};
pub use inverse_euler::{
    ChurnParams, InverseEulerConfig, InverseEulerSampler, SampleOptions,
    inverse_euler_step, refine_derivative, sample_inverse_euler,
};
pub use registry::{
    INVERSE_EULER, InputKind, InputSpec, KSampler, NodeDescriptor, SAMPLER_CATEGORY,
    SamplerFactory, SamplerParams, SamplerRegistry, build_sampler, inverse_euler_node,
    register_sampler, registered_samplers,
};
pub use scheduler::{
    FLIP_SIGMA_FLOOR, KARRAS_RHO, SD_SIGMA_MAX, SD_SIGMA_MIN, flip_sigmas, karras_sigmas,
    zero_divisors,
};
