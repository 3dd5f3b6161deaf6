//! The resample operator: upsample → pad → FIR filter → downsample.
//!
//! # Backward Pass
//!
//! The gradient of the operator with respect to its input is the same
//! operator run on the output gradient with
//!
//! - up and down factors swapped,
//! - the kernel rotated by 180°,
//! - padding from [`ResampleParams::transpose`].
//!
//! No intermediate of the forward pass is kept.

use crate::activation::check_consistent;
use crate::error::{Error, Result};
use crate::kernel::FilterKernel;
use crate::ops::dispatch::Dispatcher;
use crate::shape::{ResampleParams, ResampleShape};
use crate::tensors::Tensor;

impl Dispatcher {
    /// Resample forward pass.
    ///
    /// The last two axes of `input` are `(H, W)`; every leading axis is
    /// batched over.
    ///
    /// # Errors
    /// - [`Error::InvalidShape`] for rank below 2, zero factors, or a non-positive
    ///   intermediate or output dimension
    /// - [`Error::UnsupportedDevice`] under a strict policy
    pub fn resample_forward(
        &self,
        input: &Tensor,
        kernel: &FilterKernel,
        params: &ResampleParams,
    ) -> Result<Tensor> {
        check_consistent(input)?;
        let (planes, geometry) = ResampleShape::for_tensor(&input.shape, kernel, params)?;
        let data = self.run(input.device, "upfirdn2d", |path| {
            path.upfirdn2d(&input.data, planes, &geometry, kernel, params)
        })?;
        Ok(Tensor {
            shape: geometry.output_shape(&input.shape),
            data,
            device: input.device,
        })
    }

    /// Resample backward pass: the gradient with respect to an input of
    /// `input_shape`, given the gradient of the forward output.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if `grad_output` is not shaped like the forward
    ///   output for `input_shape`
    /// - every error of [`Dispatcher::resample_forward`]
    pub fn resample_backward(
        &self,
        grad_output: &Tensor,
        input_shape: &[usize],
        kernel: &FilterKernel,
        params: &ResampleParams,
    ) -> Result<Tensor> {
        check_consistent(grad_output)?;
        let (planes, forward) = ResampleShape::for_tensor(input_shape, kernel, params)?;
        let expected = forward.output_shape(input_shape);
        if grad_output.shape != expected {
            return Err(Error::ShapeMismatch {
                expected,
                got: grad_output.shape.clone(),
            });
        }

        let (kh, kw) = kernel.dims();
        let transposed = params.transpose(kh, kw, &forward)?;
        let flipped = kernel.flipped();
        let geometry = ResampleShape::compute(forward.out_h, forward.out_w, &flipped, &transposed)?;
        debug_assert_eq!((geometry.out_h, geometry.out_w), (forward.in_h, forward.in_w));

        let data = self.run(grad_output.device, "upfirdn2d", |path| {
            path.upfirdn2d(&grad_output.data, planes, &geometry, &flipped, &transposed)
        })?;
        Ok(Tensor {
            shape: input_shape.to_vec(),
            data,
            device: grad_output.device,
        })
    }
}
