//! Fused bias + leaky-rectify + scale.
//!
//! ```text
//! forward:  y  = leaky(x + b[c], slope) * scale
//! backward: dx = dy * scale * (1 if x + b[c] > 0 else slope)
//!           db = sum of dx over every axis except the channel axis
//! ```
//!
//! The channel axis is axis 1 of a tensor of rank >= 2. The backward pass
//! recomputes the pre-activation sign instead of keeping a mask from the
//! forward pass. A pre-activation of exactly zero takes the negative branch.

use core::f32::consts::SQRT_2;

use crate::error::{Error, Result};
use crate::ops::cpu;
use crate::ops::dispatch::Dispatcher;
use crate::tensors::Tensor;

/// Slope and output gain of the fused activation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationParams {
    /// Multiplier applied to negative pre-activations.
    pub negative_slope: f32,
    /// Gain applied after rectification.
    pub scale: f32,
}

impl Default for ActivationParams {
    /// Slope `0.2`, gain `sqrt(2)`.
    fn default() -> Self {
        Self {
            negative_slope: 0.2,
            scale: SQRT_2,
        }
    }
}

impl ActivationParams {
    /// Validated constructor.
    ///
    /// # Errors
    /// [`Error::InvalidParameter`] if either value is non-positive or not finite.
    pub fn new(negative_slope: f32, scale: f32) -> Result<Self> {
        let act = Self {
            negative_slope,
            scale,
        };
        act.validate()?;
        Ok(act)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (name, value) in [("negative_slope", self.negative_slope), ("scale", self.scale)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParameter { name, value });
            }
        }
        Ok(())
    }

    /// Derivative factor for a given pre-activation.
    #[inline]
    pub(crate) fn slope_at(&self, pre: f32) -> f32 {
        if pre > 0.0 {
            self.scale
        } else {
            self.negative_slope * self.scale
        }
    }

    /// Forward value for a given pre-activation.
    #[inline]
    pub(crate) fn apply(&self, pre: f32) -> f32 {
        let rectified = if pre > 0.0 {
            pre
        } else {
            pre * self.negative_slope
        };
        rectified * self.scale
    }
}

/// How the bias broadcasts over a flat buffer.
///
/// Element `i` belongs to channel `(i / inner) % channels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Size of axis 1.
    pub channels: usize,
    /// Product of the axes after the channel axis.
    pub inner: usize,
}

impl ChannelLayout {
    /// Layout of a channel-first shape.
    ///
    /// # Errors
    /// [`Error::InvalidShape`] for rank below 2.
    pub fn of(shape: &[usize]) -> Result<Self> {
        if shape.len() < 2 {
            return Err(Error::shape(format!(
                "fused activation needs a channel axis, got shape {shape:?}"
            )));
        }
        Ok(Self {
            channels: shape[1],
            inner: shape[2..].iter().product(),
        })
    }
}

/// Which gradients the caller wants from the backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradNeeds {
    /// Produce the input gradient.
    pub input: bool,
    /// Produce the bias gradient (ignored when there is no bias).
    pub bias: bool,
}

impl GradNeeds {
    /// Both gradients.
    pub const ALL: Self = Self {
        input: true,
        bias: true,
    };
}

impl Default for GradNeeds {
    fn default() -> Self {
        Self::ALL
    }
}

/// Result of the activation backward pass.
///
/// `None` means "not computed", which is distinct from a gradient that happens
/// to be all zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationGrads {
    /// Gradient with respect to the input, shaped like the input.
    pub input: Option<Tensor>,
    /// Gradient with respect to the bias, shape `[C]`.
    pub bias: Option<Tensor>,
}

impl Dispatcher {
    /// Fused activation forward pass.
    ///
    /// # Errors
    /// - [`Error::InvalidShape`] for rank below 2 or inconsistent tensors
    /// - [`Error::ShapeMismatch`] if the bias is not `[C]`
    /// - [`Error::InvalidParameter`] for bad activation parameters
    /// - [`Error::UnsupportedDevice`] under a strict policy
    pub fn activation_forward(
        &self,
        input: &Tensor,
        bias: Option<&Tensor>,
        act: &ActivationParams,
    ) -> Result<Tensor> {
        let layout = check_activation(input, bias, act)?;
        if input.numel() == 0 {
            return Ok(input.like(Vec::new()));
        }
        let bias = bias.map(|b| b.data.as_slice());
        let data = self.run(input.device, "bias_act", |path| {
            path.bias_act(&input.data, bias, layout, act)
        })?;
        Ok(input.like(data))
    }

    /// Fused activation backward pass.
    ///
    /// The input gradient is computed whenever either gradient is needed; it is
    /// only returned when `needs.input` is set.
    ///
    /// # Errors
    /// Same as [`Dispatcher::activation_forward`], plus [`Error::ShapeMismatch`]
    /// when `grad_output` is not shaped like `input`.
    pub fn activation_backward(
        &self,
        grad_output: &Tensor,
        input: &Tensor,
        bias: Option<&Tensor>,
        act: &ActivationParams,
        needs: GradNeeds,
    ) -> Result<ActivationGrads> {
        let layout = check_activation(input, bias, act)?;
        check_consistent(grad_output)?;
        if grad_output.shape != input.shape {
            return Err(Error::ShapeMismatch {
                expected: input.shape.clone(),
                got: grad_output.shape.clone(),
            });
        }

        let want_bias = needs.bias && bias.is_some();
        if !needs.input && !want_bias {
            return Ok(ActivationGrads {
                input: None,
                bias: None,
            });
        }

        let grad_input = if input.numel() == 0 {
            Vec::new()
        } else {
            let bias = bias.map(|b| b.data.as_slice());
            self.run(input.device, "bias_act_grad", |path| {
                path.bias_act_grad(&grad_output.data, &input.data, bias, layout, act)
            })?
        };

        let grad_bias = match bias {
            Some(b) if want_bias => Some(Tensor {
                shape: b.shape.clone(),
                data: cpu::channel_sum(&grad_input, layout),
                device: b.device,
            }),
            _ => None,
        };

        Ok(ActivationGrads {
            input: needs.input.then(|| input.like(grad_input)),
            bias: grad_bias,
        })
    }
}

fn check_activation(
    input: &Tensor,
    bias: Option<&Tensor>,
    act: &ActivationParams,
) -> Result<ChannelLayout> {
    act.validate()?;
    check_consistent(input)?;
    let layout = ChannelLayout::of(&input.shape)?;
    if let Some(b) = bias {
        check_consistent(b)?;
        if b.shape != [layout.channels] {
            return Err(Error::ShapeMismatch {
                expected: vec![layout.channels],
                got: b.shape.clone(),
            });
        }
    }
    Ok(layout)
}

pub(crate) fn check_consistent(t: &Tensor) -> Result<()> {
    let expected = t.shape.iter().product::<usize>();
    if expected != t.data.len() {
        return Err(Error::shape(format!(
            "tensor of shape {:?} holds {} elements, expected {expected}",
            t.shape,
            t.data.len()
        )));
    }
    Ok(())
}
