//! Karras ODE derivative
//!
//! For a denoiser `D(x, σ)` the probability flow ODE is
//! `dx/dσ = (x - D(x, σ)) / σ`. Samplers advance the state with
//! estimates of this derivative.

use burn::prelude::*;
use burn::tensor::Shape;

/// Build a per-batch noise level tensor of shape `[batch]`
pub fn batch_sigma<B: Backend>(sigma: f32, batch: usize, device: &B::Device) -> Tensor<B, 1> {
    Tensor::full([batch], sigma, device)
}

/// Converts a denoiser output to a Karras ODE derivative
///
/// Computes `(x - denoised) / sigma`, where `sigma` holds one noise level
/// per batch item and is broadcast over every trailing dimension of `x`.
///
/// A zero sigma produces non-finite values; callers must keep zeros out of
/// the positions used as divisors.
pub fn to_d<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    sigma: Tensor<B, 1>,
    denoised: Tensor<B, D>,
) -> Tensor<B, D> {
    let [batch] = sigma.dims();
    let mut dims = [1; D];
    dims[0] = batch;
    let sigma: Tensor<B, D> = sigma.reshape(Shape::new(dims));

    (x - denoised) / sigma
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_to_d_broadcasts_sigma_per_batch() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![2.0f32, 4.0, 6.0, 8.0, 3.0, 3.0, 3.0, 3.0], [2, 2, 2]),
            &device,
        );
        let denoised = Tensor::<TestBackend, 3>::zeros([2, 2, 2], &device);
        let sigma = Tensor::<TestBackend, 1>::from_data(
            TensorData::new(vec![2.0f32, 0.5], [2]),
            &device,
        );

        let d = to_d(x, sigma, denoised);
        assert_eq!(d.dims(), [2, 2, 2]);

        let values: Vec<f32> = d.into_data().to_vec().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 6.0, 6.0, 6.0, 6.0]);
    }

    #[test]
    fn test_to_d_rank_one_state() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_data(TensorData::new(vec![1.0f32], [1]), &device);
        let denoised = Tensor::<TestBackend, 1>::zeros([1], &device);
        let sigma = batch_sigma::<TestBackend>(2.0, 1, &device);

        let values: Vec<f32> = to_d(x, sigma, denoised).into_data().to_vec().unwrap();
        assert_eq!(values, vec![0.5]);
    }

    #[test]
    fn test_to_d_zero_sigma_is_not_finite() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::ones([1, 3], &device);
        let denoised = Tensor::<TestBackend, 2>::zeros([1, 3], &device);
        let sigma = batch_sigma::<TestBackend>(0.0, 1, &device);

        let values: Vec<f32> = to_d(x, sigma, denoised).into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| !v.is_finite()));
    }

    #[test]
    fn test_batch_sigma_shape() {
        let device = Default::default();
        let sigma = batch_sigma::<TestBackend>(1.5, 4, &device);
        assert_eq!(sigma.dims(), [4]);

        let values: Vec<f32> = sigma.into_data().to_vec().unwrap();
        assert_eq!(values, vec![1.5; 4]);
    }
}
