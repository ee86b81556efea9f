//! Sampler registry
//!
//! Hosts discover samplers by name. Each node declares its inputs and builds
//! a [`KSampler`] from integer parameters validated against them.
//!
//! A process-wide registry, populated with the built-in nodes on first use,
//! is available through [`build_sampler`] and [`register_sampler`].
//! [`SamplerRegistry`] can also be used standalone.

use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

use burn::prelude::*;
use tracing::debug;

use crate::denoiser::Denoiser;
use crate::error::{RegistryError, SampleError};
use crate::inverse_euler::{InverseEulerConfig, InverseEulerSampler, SampleOptions};

/// Category shared by the custom sampler nodes
pub const SAMPLER_CATEGORY: &str = "sampling/custom_sampling/samplers";

/// Registry name of the inverse Euler node
pub const INVERSE_EULER: &str = "SamplerInverseEuler";

/// Type and bounds of a node input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Int { default: i64, min: i64, max: i64 },
}

/// A named node input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
    pub name: &'static str,
    pub kind: InputKind,
}

impl InputSpec {
    pub const fn int(name: &'static str, default: i64, min: i64, max: i64) -> Self {
        Self {
            name,
            kind: InputKind::Int { default, min, max },
        }
    }

    /// Resolve a supplied value (or the default) and check its range
    pub fn resolve(&self, value: Option<i64>) -> Result<i64, RegistryError> {
        match self.kind {
            InputKind::Int { default, min, max } => {
                let value = value.unwrap_or(default);
                if value < min || value > max {
                    return Err(RegistryError::OutOfRange {
                        param: self.name.to_string(),
                        value,
                        min,
                        max,
                    });
                }
                Ok(value)
            }
        }
    }
}

/// Parameters supplied by the host, keyed by input name
pub type SamplerParams = BTreeMap<String, i64>;

/// Builds a sampler from validated parameters
pub type SamplerFactory = fn(&SamplerParams) -> Result<KSampler, RegistryError>;

/// A constructible sampler
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub enum KSampler {
    InverseEuler(InverseEulerSampler),
}

impl KSampler {
    /// Registry name of the underlying sampler
    pub fn name(&self) -> &'static str {
        match self {
            KSampler::InverseEuler(_) => INVERSE_EULER,
        }
    }

    /// Model calls needed for a schedule of `num_sigmas` values
    pub fn model_calls(&self, num_sigmas: usize) -> usize {
        match self {
            KSampler::InverseEuler(sampler) => sampler.model_calls(num_sigmas),
        }
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
        match self {
            KSampler::InverseEuler(sampler) => sampler.sample(model, x, sigmas, options),
        }
    }
}

/// Registry entry for a sampler node
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    pub inputs: Vec<InputSpec>,
    pub factory: SamplerFactory,
}

impl NodeDescriptor {
    /// Fill defaults and validate `params` against the declared inputs
    pub fn resolve(&self, params: &SamplerParams) -> Result<SamplerParams, RegistryError> {
        if let Some(unknown) = params
            .keys()
            .find(|key| !self.inputs.iter().any(|input| input.name == key.as_str()))
        {
            return Err(RegistryError::UnknownParam {
                sampler: self.name.to_string(),
                param: unknown.clone(),
            });
        }

        self.inputs
            .iter()
            .map(|input| {
                input
                    .resolve(params.get(input.name).copied())
                    .map(|value| (input.name.to_string(), value))
            })
            .collect()
    }

    /// Validate `params` and construct the sampler
    pub fn build(&self, params: &SamplerParams) -> Result<KSampler, RegistryError> {
        let resolved = self.resolve(params)?;
        debug!(sampler = self.name, params = ?resolved, "building sampler");
        (self.factory)(&resolved)
    }
}

/// Descriptor of the built-in inverse Euler node
pub fn inverse_euler_node() -> NodeDescriptor {
    NodeDescriptor {
        name: INVERSE_EULER,
        display_name: "Inverse Euler",
        category: SAMPLER_CATEGORY,
        inputs: vec![InputSpec::int("refine", 0, 0, 1)],
        factory: build_inverse_euler,
    }
}

fn build_inverse_euler(params: &SamplerParams) -> Result<KSampler, RegistryError> {
    let refine = params.get("refine").copied().unwrap_or(0);
    let refine = usize::try_from(refine).map_err(|_| RegistryError::OutOfRange {
        param: "refine".to_string(),
        value: refine,
        min: 0,
        max: i64::MAX,
    })?;

    Ok(KSampler::InverseEuler(InverseEulerSampler::new(
        InverseEulerConfig { refine },
    )))
}

/// Name-to-node map
#[derive(Debug, Clone, Default)]
pub struct SamplerRegistry {
    nodes: BTreeMap<&'static str, NodeDescriptor>,
}

impl SamplerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in nodes
    pub fn with_builtins() -> Self {
        let mut nodes = BTreeMap::new();
        let node = inverse_euler_node();
        nodes.insert(node.name, node);
        Self { nodes }
    }

    /// Add a node; names must be unique
    pub fn register(&mut self, node: NodeDescriptor) -> Result<(), RegistryError> {
        if self.nodes.contains_key(node.name) {
            return Err(RegistryError::AlreadyRegistered(node.name.to_string()));
        }
        debug!(sampler = node.name, category = node.category, "registered sampler");
        self.nodes.insert(node.name, node);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.values()
    }

    /// Build a sampler by name
    pub fn build(&self, name: &str, params: &SamplerParams) -> Result<KSampler, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::UnknownSampler(name.to_string()))?
            .build(params)
    }
}

fn global_registry() -> &'static RwLock<SamplerRegistry> {
    static REGISTRY: OnceLock<RwLock<SamplerRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(SamplerRegistry::with_builtins()))
}

/// Add a node to the process-wide registry
pub fn register_sampler(node: NodeDescriptor) -> Result<(), RegistryError> {
    global_registry()
        .write()
        .map_err(|_| RegistryError::Poisoned)?
        .register(node)
}

/// Build a sampler from the process-wide registry
pub fn build_sampler(name: &str, params: &SamplerParams) -> Result<KSampler, RegistryError> {
    global_registry()
        .read()
        .map_err(|_| RegistryError::Poisoned)?
        .build(name, params)
}

/// Snapshot of the nodes in the process-wide registry
pub fn registered_samplers() -> Result<Vec<NodeDescriptor>, RegistryError> {
    let registry = global_registry()
        .read()
        .map_err(|_| RegistryError::Poisoned)?;
    Ok(registry.nodes().cloned().collect())
}
