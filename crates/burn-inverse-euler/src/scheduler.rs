//! Noise schedule helpers
//!
//! The sampler consumes any schedule; these produce the common ones and
//! prepare a schedule for inversion.

/// sigma_min of the SD 1.x linear beta schedule
pub const SD_SIGMA_MIN: f32 = 0.0292;
/// sigma_max of the SD 1.x linear beta schedule
pub const SD_SIGMA_MAX: f32 = 14.6146;
/// Karras et al. recommended rho
pub const KARRAS_RHO: f32 = 7.0;

/// Replacement for a leading zero when flipping a schedule
pub const FLIP_SIGMA_FLOOR: f32 = 1e-4;

/// Karras et al. (2022) noise schedule
///
/// Returns `steps + 1` values from `sigma_max` down to `sigma_min`, followed
/// by a final 0.0.
pub fn karras_sigmas(steps: usize, sigma_min: f32, sigma_max: f32, rho: f32) -> Vec<f32> {
    if steps == 0 {
        return vec![0.0];
    }

    let min_inv_rho = sigma_min.powf(1.0 / rho);
    let max_inv_rho = sigma_max.powf(1.0 / rho);

    let mut sigmas: Vec<f32> = (0..steps)
        .map(|i| {
            let ramp = i as f32 / (steps - 1).max(1) as f32;
            (max_inv_rho + ramp * (min_inv_rho - max_inv_rho)).powf(rho)
        })
        .collect();
    sigmas.push(0.0);
    sigmas
}

/// Reverse a schedule so sampling runs from low noise to high noise
///
/// A zero at the new start is lifted to [`FLIP_SIGMA_FLOOR`] so that the
/// first derivative stays finite.
pub fn flip_sigmas(sigmas: &[f32]) -> Vec<f32> {
    let mut flipped: Vec<f32> = sigmas.iter().rev().copied().collect();
    if let Some(first) = flipped.first_mut() {
        if *first == 0.0 {
            *first = FLIP_SIGMA_FLOOR;
        }
    }
    flipped
}

/// Indices whose sigma is zero and would be divided by during sampling
///
/// The outer step divides by `sigmas[0..n-1]`; refinement passes also
/// divide by `sigmas[1..n]`.
pub fn zero_divisors(sigmas: &[f32], refine: usize) -> Vec<usize> {
    if sigmas.len() < 2 {
        return Vec::new();
    }

    let last = sigmas.len() - 1;
    sigmas
        .iter()
        .enumerate()
        .filter(|&(i, _)| i < last || refine > 0)
        .filter(|&(_, sigma)| *sigma == 0.0)
        .map(|(i, _)| i)
        .collect()
}
