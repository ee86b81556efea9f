//! Error types for sampling and sampler construction

use thiserror::Error;

/// Error type returned by a [`Denoiser`](crate::Denoiser)
pub type DenoiseError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure while running a sampler
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Denoiser failed at step {step} (sigma={sigma}): {source}")]
    Denoiser {
        step: usize,
        sigma: f32,
        #[source]
        source: DenoiseError,
    },
}

/// Failure while looking up or building a sampler by name
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown sampler: {0}")]
    UnknownSampler(String),

    #[error("Sampler already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Unknown parameter `{param}` for sampler {sampler}")]
    UnknownParam { sampler: String, param: String },

    #[error("Parameter `{param}` out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        param: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Registry lock poisoned")]
    Poisoned,
}
