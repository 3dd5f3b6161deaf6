//! Network building blocks over the two operators.
//!
//! Each layer owns its [`FilterKernel`] (or bias) and fixed parameters, built
//! once at construction and lent to every call.

use crate::activation::{ActivationGrads, ActivationParams, GradNeeds};
use crate::error::{Error, Result};
use crate::kernel::FilterKernel;
use crate::ops::dispatch::Dispatcher;
use crate::shape::{Padding, ResampleParams};
use crate::tensors::Tensor;

/// Per-channel bias followed by the fused leaky rectifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedLeakyReLU {
    /// Learnable bias of shape `[C]`, zero-initialized; `None` disables it.
    pub bias: Option<Tensor>,
    /// Slope and gain, `0.2` and `sqrt(2)` by default.
    pub act: ActivationParams,
    dispatcher: Dispatcher,
}

impl FusedLeakyReLU {
    /// A layer over `channels` channels with default slope and gain.
    pub fn new(channels: usize, bias: bool) -> Self {
        Self {
            bias: bias.then(|| Tensor::zeros(vec![channels])),
            act: ActivationParams::default(),
            dispatcher: Dispatcher::default(),
        }
    }

    /// Replaces the slope and gain.
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] for non-positive or non-finite values.
    pub fn with_params(mut self, negative_slope: f32, scale: f32) -> Result<Self> {
        self.act = ActivationParams::new(negative_slope, scale)?;
        Ok(self)
    }

    /// Uses `dispatcher` for every call.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Forward pass.
    ///
    /// # Errors
    /// See [`Dispatcher::activation_forward`].
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.dispatcher
            .activation_forward(input, self.bias.as_ref(), &self.act)
    }

    /// Backward pass for the `input` given to [`FusedLeakyReLU::forward`].
    ///
    /// # Errors
    /// See [`Dispatcher::activation_backward`].
    pub fn backward(
        &self,
        grad_output: &Tensor,
        input: &Tensor,
        needs: GradNeeds,
    ) -> Result<ActivationGrads> {
        self.dispatcher
            .activation_backward(grad_output, input, self.bias.as_ref(), &self.act, needs)
    }
}

/// A fixed FIR kernel plus the resample parameters it is applied with.
#[derive(Debug, Clone, PartialEq)]
struct FilteredResample {
    kernel: FilterKernel,
    params: ResampleParams,
    dispatcher: Dispatcher,
}

impl FilteredResample {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.dispatcher
            .resample_forward(input, &self.kernel, &self.params)
    }

    fn backward(&self, grad_output: &Tensor, input_shape: &[usize]) -> Result<Tensor> {
        self.dispatcher
            .resample_backward(grad_output, input_shape, &self.kernel, &self.params)
    }
}

fn check_factor(factor: usize) -> Result<()> {
    if factor == 0 {
        return Err(Error::shape("resample factor must be positive"));
    }
    Ok(())
}

/// Centered `(p0, p1)` split of the slack between kernel and factor.
fn centered_pad(kernel_len: usize, factor: usize) -> (isize, isize) {
    let p = kernel_len as isize - factor as isize;
    ((p + 1).div_euclid(2), p.div_euclid(2))
}

macro_rules! resample_layer {
    ($name:ident) => {
        impl $name {
            /// Forward pass.
            ///
            /// # Errors
            /// See [`Dispatcher::resample_forward`].
            pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
                self.inner.forward(input)
            }

            /// Gradient with respect to an input of `input_shape`.
            ///
            /// # Errors
            /// See [`Dispatcher::resample_backward`].
            pub fn backward(&self, grad_output: &Tensor, input_shape: &[usize]) -> Result<Tensor> {
                self.inner.backward(grad_output, input_shape)
            }

            /// The kernel actually applied (after normalization and gain).
            pub fn kernel(&self) -> &FilterKernel {
                &self.inner.kernel
            }

            /// The resample parameters actually applied.
            pub fn params(&self) -> &ResampleParams {
                &self.inner.params
            }

            /// Uses `dispatcher` for every call.
            #[must_use]
            pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
                self.inner.dispatcher = dispatcher;
                self
            }
        }
    };
}

/// Anti-aliased upsampling by an integer factor.
///
/// The kernel is scaled by `factor²` to make up for the inserted zeros, so a
/// constant input stays constant away from the borders.
#[derive(Debug, Clone, PartialEq)]
pub struct Upsample {
    inner: FilteredResample,
}

impl Upsample {
    /// Builds the layer from 1-D taps (see [`FilterKernel::from_1d`]).
    ///
    /// # Errors
    /// [`Error::InvalidShape`] for a zero factor or unusable taps.
    pub fn new(taps: &[f32], factor: usize) -> Result<Self> {
        check_factor(factor)?;
        let gain = (factor * factor) as f32;
        let kernel = FilterKernel::from_1d(taps)?.scaled(gain);
        let (p0, p1) = centered_pad(kernel.height(), factor);
        let pad = (p0 + factor as isize - 1, p1);
        Ok(Self {
            inner: FilteredResample {
                kernel,
                params: ResampleParams::uniform(factor, 1, pad),
                dispatcher: Dispatcher::default(),
            },
        })
    }
}

resample_layer!(Upsample);

/// Anti-aliased downsampling by an integer factor.
#[derive(Debug, Clone, PartialEq)]
pub struct Downsample {
    inner: FilteredResample,
}

impl Downsample {
    /// Builds the layer from 1-D taps (see [`FilterKernel::from_1d`]).
    ///
    /// # Errors
    /// [`Error::InvalidShape`] for a zero factor or unusable taps.
    pub fn new(taps: &[f32], factor: usize) -> Result<Self> {
        check_factor(factor)?;
        let kernel = FilterKernel::from_1d(taps)?;
        let pad = centered_pad(kernel.height(), factor);
        Ok(Self {
            inner: FilteredResample {
                kernel,
                params: ResampleParams::uniform(1, factor, pad),
                dispatcher: Dispatcher::default(),
            },
        })
    }
}

resample_layer!(Downsample);

/// Plain FIR blur with explicit padding.
///
/// Used after a strided transposed convolution; `upsample_factor` compensates
/// the kernel for the zeros that convolution inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct Blur {
    inner: FilteredResample,
}

impl Blur {
    /// Builds the layer from 1-D taps (see [`FilterKernel::from_1d`]).
    ///
    /// # Errors
    /// [`Error::InvalidShape`] for a zero factor or unusable taps.
    pub fn new(taps: &[f32], pad: impl Into<Padding>, upsample_factor: usize) -> Result<Self> {
        check_factor(upsample_factor)?;
        let mut kernel = FilterKernel::from_1d(taps)?;
        if upsample_factor > 1 {
            kernel = kernel.scaled((upsample_factor * upsample_factor) as f32);
        }
        Ok(Self {
            inner: FilteredResample {
                kernel,
                params: ResampleParams::default().with_pad(pad),
                dispatcher: Dispatcher::default(),
            },
        })
    }
}

resample_layer!(Blur);
