//! burn-inverse-euler CLI
//!
//! Exercises the registered samplers without model weights: the model is the
//! exact denoiser of a Gaussian toy distribution, so results can be checked
//! against the known data statistics.
//!
//! Supports:
//! - Listing registered sampler nodes and their inputs
//! - Denoising noise to data, inverting data to noise, and a full roundtrip

use anyhow::{Context, Result, anyhow};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn_inverse_euler::{
    DenoiseError, Denoiser, ExtraArgs, INVERSE_EULER, InputKind, KARRAS_RHO, KSampler,
    SD_SIGMA_MAX, SD_SIGMA_MIN, SampleOptions, SamplerParams, StepInfo, build_sampler,
    flip_sigmas, karras_sigmas, registered_samplers,
};
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

type CliBackend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "burn-inverse-euler")]
#[command(about = "Inverse Euler diffusion sampling in pure Rust")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered samplers and their inputs
    List,

    /// Sample a Gaussian toy distribution with its exact denoiser
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Registered sampler name
    #[arg(long, default_value = INVERSE_EULER)]
    sampler: String,

    /// Corrector passes per step
    #[arg(long, default_value = "0")]
    refine: i64,

    /// Number of sampling steps
    #[arg(long, default_value = "20")]
    steps: usize,

    /// Smallest nonzero noise level of the Karras schedule
    #[arg(long, default_value_t = SD_SIGMA_MIN)]
    sigma_min: f32,

    /// Largest noise level of the Karras schedule
    #[arg(long, default_value_t = SD_SIGMA_MAX)]
    sigma_max: f32,

    /// Karras schedule exponent
    #[arg(long, default_value_t = KARRAS_RHO)]
    rho: f32,

    /// Run the flipped schedule (clean data to noise)
    #[arg(long)]
    invert: bool,

    /// Invert clean data to noise, then sample it back
    #[arg(long, conflicts_with = "invert")]
    roundtrip: bool,

    /// Batch size
    #[arg(long, default_value = "2")]
    batch: usize,

    /// Elements per batch item
    #[arg(long, default_value = "64")]
    dim: usize,

    /// Mean of the toy data distribution
    #[arg(long, default_value = "0.5")]
    mean: f32,

    /// Standard deviation of the toy data distribution
    #[arg(long, default_value = "0.25")]
    std: f32,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,
}

/// Exact denoiser for data drawn from N(mean, std^2)
///
/// Reads `mean` and `std` from the extra arguments on every call.
#[derive(Debug, Clone, Copy, Default)]
struct GaussianDenoiser;

impl<B: Backend> Denoiser<B, 2> for GaussianDenoiser {
    fn denoise(
        &mut self,
        x: Tensor<B, 2>,
        sigma: Tensor<B, 1>,
        extra_args: &ExtraArgs,
    ) -> Result<Tensor<B, 2>, DenoiseError> {
        let mean = extra_args.get_float("mean").ok_or("missing extra arg `mean`")? as f32;
        let std = extra_args.get_float("std").ok_or("missing extra arg `std`")? as f32;
        let var = std * std;

        // E[x0 | x] = (x * var + mean * sigma^2) / (var + sigma^2)
        let sigma2: Tensor<B, 2> = (sigma.clone() * sigma).unsqueeze_dim(1);
        Ok((x * var + sigma2.clone() * mean) / (sigma2 + var))
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Ignore failure when a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn list() -> Result<()> {
    for node in registered_samplers()? {
        println!("{} ({})", node.name, node.display_name);
        println!("  category: {}", node.category);
        for input in &node.inputs {
            match input.kind {
                InputKind::Int { default, min, max } => println!(
                    "  {}: INT default={} min={} max={}",
                    input.name, default, min, max
                ),
            }
        }
    }
    Ok(())
}

/// Per-batch (mean, std)
fn batch_stats(x: Tensor<CliBackend, 2>) -> Result<Vec<(f32, f32)>> {
    let mean: Vec<f32> = x
        .clone()
        .mean_dim(1)
        .into_data()
        .to_vec()
        .map_err(|e| anyhow!("Failed to read means: {e:?}"))?;
    let std: Vec<f32> = x
        .var(1)
        .sqrt()
        .into_data()
        .to_vec()
        .map_err(|e| anyhow!("Failed to read deviations: {e:?}"))?;
    Ok(mean.into_iter().zip(std).collect())
}

fn print_stats(label: &str, x: Tensor<CliBackend, 2>) -> Result<()> {
    for (i, (mean, std)) in batch_stats(x)?.into_iter().enumerate() {
        println!("{label}[{i}]: mean={mean:.4} std={std:.4}");
    }
    Ok(())
}

fn sample_with_progress(
    sampler: &KSampler,
    x: Tensor<CliBackend, 2>,
    sigmas: &[f32],
    extra_args: &ExtraArgs,
    label: &str,
    no_progress: bool,
) -> Result<Tensor<CliBackend, 2>> {
    let steps = sigmas.len().saturating_sub(1);
    let pb = if no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(steps as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(label.to_string());

    let mut sink = pb.clone();
    let mut callback = |info: &StepInfo<CliBackend, 2>| {
        pb.set_message(format!("{label} sigma={:.4}", info.sigma));
        debug!(step = info.i, sigma = info.sigma, "step finished");
    };

    info!(
        label,
        sampler = sampler.name(),
        steps,
        model_calls = sampler.model_calls(sigmas.len()),
        "sampling"
    );
    let options = SampleOptions::new()
        .with_extra_args(extra_args)
        .with_callback(&mut callback)
        .with_progress(&mut sink)
        .disable_progress(no_progress);
    let out = sampler
        .sample(&mut GaussianDenoiser, x, sigmas, options)
        .with_context(|| format!("{label} failed"))?;

    pb.finish_and_clear();
    Ok(out)
}

fn run(args: RunArgs) -> Result<()> {
    let device = NdArrayDevice::default();

    let params: SamplerParams = [("refine".to_string(), args.refine)].into();
    let sampler = build_sampler(&args.sampler, &params)
        .with_context(|| format!("Failed to build sampler {}", args.sampler))?;

    let extra_args = ExtraArgs::new()
        .with("mean", args.mean as f64)
        .with("std", args.std as f64);

    let mut forward = karras_sigmas(args.steps, args.sigma_min, args.sigma_max, args.rho);
    if args.refine > 0 {
        // Refinement divides by the target sigma of every step
        forward.pop();
        info!("dropping final zero sigma for refinement");
    }
    let backward = flip_sigmas(&forward);

    let shape = [args.batch, args.dim];
    let data = || {
        Tensor::<CliBackend, 2>::random(shape, Distribution::Normal(0.0, 1.0), &device) * args.std
            + args.mean
    };

    if args.roundtrip {
        let clean = data();
        print_stats("data", clean.clone())?;

        let noise = sample_with_progress(
            &sampler,
            clean.clone(),
            &backward,
            &extra_args,
            "invert",
            args.no_progress,
        )?;
        print_stats("inverted", noise.clone())?;

        let restored = sample_with_progress(
            &sampler,
            noise,
            &forward,
            &extra_args,
            "denoise",
            args.no_progress,
        )?;
        print_stats("restored", restored.clone())?;

        let max_error: f32 = (restored - clean).abs().max().into_scalar();
        println!("roundtrip max abs error: {max_error:.6}");
    } else if args.invert {
        let clean = data();
        print_stats("data", clean.clone())?;

        let noise = sample_with_progress(
            &sampler,
            clean,
            &backward,
            &extra_args,
            "invert",
            args.no_progress,
        )?;
        print_stats("inverted", noise)?;
    } else {
        let noise = Tensor::<CliBackend, 2>::random(shape, Distribution::Normal(0.0, 1.0), &device)
            * args.sigma_max;
        print_stats("noise", noise.clone())?;

        let clean = sample_with_progress(
            &sampler,
            noise,
            &forward,
            &extra_args,
            "denoise",
            args.no_progress,
        )?;
        print_stats("denoised", clean)?;
        println!("target: mean={:.4} std={:.4}", args.mean, args.std);
    }

    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::List => list(),
        Commands::Run(args) => run(args),
    }
}
