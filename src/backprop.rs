//! Differentiable operators and autograd utilities.
//!
//! # Autograd Pattern
//!
//! Each operator comes in two shapes:
//!
//! 1. **Free functions** (`*_forward` / `*_backward`) that take everything the
//!    backward pass needs as explicit arguments.
//! 2. **Closure form** ([`upfirdn2d`], [`fused_leaky_relu`]) that runs the
//!    forward pass and returns a closure mapping `dL/d(out)` to the input
//!    gradients. The closure captures only borrowed arguments and the input
//!    shape, and implements `Fn`, so it may be invoked more than once.
//!
//! All of them go through the default [`Dispatcher`]: tensors tagged
//! [`Backend::Wgpu`](crate::backend::Backend::Wgpu) try the accelerated path
//! and silently fall back to the CPU. Build a [`Dispatcher`] yourself to pick
//! a different [`FallbackPolicy`](crate::ops::dispatch::FallbackPolicy).
//!
//! ## Example
//! ```rust
//! use styleops::backprop;
//! use styleops::kernel::FilterKernel;
//! use styleops::shape::ResampleParams;
//! use styleops::tensors::Tensor;
//!
//! let x = Tensor::new(vec![1, 1, 4, 4], vec![1.0; 16]);
//! let k = FilterKernel::binomial(3).unwrap();
//! let p = ResampleParams::uniform(1, 2, 1);
//! let (y, back) = backprop::upfirdn2d(&x, &k, &p).unwrap();
//! assert_eq!(y.shape, vec![1, 1, 2, 2]);
//! let dx = back(&Tensor::new(y.shape.clone(), vec![1.0; 4])).unwrap();
//! assert_eq!(dx.shape, x.shape);
//! ```

use crate::activation::{ActivationGrads, ActivationParams, GradNeeds};
use crate::error::Result;
use crate::kernel::FilterKernel;
use crate::ops::dispatch::Dispatcher;
use crate::shape::ResampleParams;
use crate::tensors::Tensor;

/// Upsample, pad, filter and downsample `input`.
///
/// # Errors
/// See [`Dispatcher::resample_forward`].
pub fn resample_forward(
    input: &Tensor,
    kernel: &FilterKernel,
    params: &ResampleParams,
) -> Result<Tensor> {
    Dispatcher::default().resample_forward(input, kernel, params)
}

/// Gradient of [`resample_forward`] with respect to an input of `input_shape`.
///
/// # Errors
/// See [`Dispatcher::resample_backward`].
pub fn resample_backward(
    grad_output: &Tensor,
    input_shape: &[usize],
    kernel: &FilterKernel,
    params: &ResampleParams,
) -> Result<Tensor> {
    Dispatcher::default().resample_backward(grad_output, input_shape, kernel, params)
}

/// `leaky_rectify(input + bias) * scale` with the bias broadcast over axis 1.
///
/// # Errors
/// See [`Dispatcher::activation_forward`].
pub fn activation_forward(
    input: &Tensor,
    bias: Option<&Tensor>,
    params: &ActivationParams,
) -> Result<Tensor> {
    Dispatcher::default().activation_forward(input, bias, params)
}

/// Gradients of [`activation_forward`].
///
/// A gradient that was not requested comes back as `None`; the bias gradient
/// is also `None` when there is no bias.
///
/// # Errors
/// See [`Dispatcher::activation_backward`].
pub fn activation_backward(
    grad_output: &Tensor,
    input: &Tensor,
    bias: Option<&Tensor>,
    params: &ActivationParams,
    need_grad_input: bool,
    need_grad_bias: bool,
) -> Result<ActivationGrads> {
    let needs = GradNeeds {
        input: need_grad_input,
        bias: need_grad_bias,
    };
    Dispatcher::default().activation_backward(grad_output, input, bias, params, needs)
}

/// Resample forward pass plus its backward closure.
///
/// # Returns
/// - `out`: the resampled tensor
/// - `back`: closure mapping `dL/d(out)` to `dL/d(input)`
///
/// # Errors
/// Forward errors are returned immediately; the closure returns
/// [`Error::ShapeMismatch`](crate::error::Error::ShapeMismatch) for a gradient
/// not shaped like `out`.
pub fn upfirdn2d<'a>(
    input: &Tensor,
    kernel: &'a FilterKernel,
    params: &'a ResampleParams,
) -> Result<(Tensor, impl Fn(&Tensor) -> Result<Tensor> + use<'a>)> {
    let out = resample_forward(input, kernel, params)?;
    let input_shape = input.shape.clone();
    let back = move |grad: &Tensor| resample_backward(grad, &input_shape, kernel, params);
    Ok((out, back))
}

/// Fused activation forward pass plus its backward closure.
///
/// The closure recomputes the pre-activation from the borrowed `input` and
/// `bias`; nothing from the forward pass is stored.
///
/// # Errors
/// See [`Dispatcher::activation_forward`].
pub fn fused_leaky_relu<'a>(
    input: &'a Tensor,
    bias: Option<&'a Tensor>,
    params: ActivationParams,
) -> Result<(
    Tensor,
    impl Fn(&Tensor, GradNeeds) -> Result<ActivationGrads> + use<'a>,
)> {
    let out = activation_forward(input, bias, &params)?;
    let back = move |grad: &Tensor, needs: GradNeeds| {
        Dispatcher::default().activation_backward(grad, input, bias, &params, needs)
    };
    Ok((out, back))
}
