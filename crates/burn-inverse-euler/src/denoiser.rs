//! Denoiser interface
//!
//! Samplers treat the diffusion model as an opaque function
//! `(x, sigma, extra_args) -> denoised`. Anything implementing [`Denoiser`]
//! can be sampled, including plain closures.

use std::collections::BTreeMap;

use burn::prelude::*;

use crate::error::DenoiseError;

/// A model that estimates the clean sample from a noisy one
///
/// `sigma` holds the noise level for each batch item (shape `[batch]`).
/// The returned tensor must have the same shape as `x`.
pub trait Denoiser<B: Backend, const D: usize> {
    fn denoise(
        &mut self,
        x: Tensor<B, D>,
        sigma: Tensor<B, 1>,
        extra_args: &ExtraArgs,
    ) -> Result<Tensor<B, D>, DenoiseError>;
}

impl<B, const D: usize, F> Denoiser<B, D> for F
where
    B: Backend,
    F: FnMut(Tensor<B, D>, Tensor<B, 1>, &ExtraArgs) -> Result<Tensor<B, D>, DenoiseError>,
{
    fn denoise(
        &mut self,
        x: Tensor<B, D>,
        sigma: Tensor<B, 1>,
        extra_args: &ExtraArgs,
    ) -> Result<Tensor<B, D>, DenoiseError> {
        self(x, sigma, extra_args)
    }
}

/// Wrap a closure as a [`Denoiser`]
///
/// Only needed to pin down the closure's argument types.
pub fn denoiser_fn<B, const D: usize, F>(f: F) -> F
where
    B: Backend,
    F: FnMut(Tensor<B, D>, Tensor<B, 1>, &ExtraArgs) -> Result<Tensor<B, D>, DenoiseError>,
{
    f
}

/// A single named argument forwarded to the denoiser
#[derive(Debug, Clone)]
pub enum ExtraArg {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// Backend-independent tensor data (conditioning, masks, ...)
    Tensor(TensorData),
}

impl From<i64> for ExtraArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ExtraArg {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ExtraArg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ExtraArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ExtraArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<TensorData> for ExtraArg {
    fn from(value: TensorData) -> Self {
        Self::Tensor(value)
    }
}

/// Named arguments passed unchanged to every denoiser call of a run
#[derive(Debug, Clone, Default)]
pub struct ExtraArgs {
    args: BTreeMap<String, ExtraArg>,
}

impl ExtraArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ExtraArg>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert an argument, returning the previous value for that name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ExtraArg>) -> Option<ExtraArg> {
        self.args.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&ExtraArg> {
        self.args.get(name)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ExtraArg::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Float lookup; integer arguments are widened
    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            ExtraArg::Float(value) => Some(*value),
            ExtraArg::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            ExtraArg::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ExtraArg::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_tensor(&self, name: &str) -> Option<&TensorData> {
        match self.get(name)? {
            ExtraArg::Tensor(value) => Some(value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtraArg)> {
        self.args.iter().map(|(name, value)| (name.as_str(), value))
    }
}
