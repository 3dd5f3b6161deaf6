//! Resample parameters and shape arithmetic.
//!
//! Everything here is pure integer math shared by the forward and backward
//! passes of the resample operator and by both execution paths.
//!
//! For one spatial axis with input size `n`, upsample factor `up`, edge pads
//! `p0`/`p1`, kernel size `k` and downsample factor `down`:
//!
//! ```text
//! padded = n * up + p0 + p1
//! out    = floor((padded - k) / down) + 1
//! ```
//!
//! Negative pads crop. Both `padded` and `out` must be strictly positive.

use crate::error::{Error, Result};
use crate::kernel::FilterKernel;

/// Per-edge padding `(x0, x1, y0, y1)`. Negative values crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    /// Left edge.
    pub x0: isize,
    /// Right edge.
    pub x1: isize,
    /// Top edge.
    pub y0: isize,
    /// Bottom edge.
    pub y1: isize,
}

// `i32` forms let unsuffixed literals like `(2, 1)` infer without annotations.
macro_rules! padding_from {
    ($($t:ty),+) => {$(
        impl From<$t> for Padding {
            /// The same pad on all four edges.
            fn from(p: $t) -> Self {
                let p = p as isize;
                Self {
                    x0: p,
                    x1: p,
                    y0: p,
                    y1: p,
                }
            }
        }

        impl From<($t, $t)> for Padding {
            /// `(p0, p1)` applied to both axes.
            fn from((p0, p1): ($t, $t)) -> Self {
                let (p0, p1) = (p0 as isize, p1 as isize);
                Self {
                    x0: p0,
                    x1: p1,
                    y0: p0,
                    y1: p1,
                }
            }
        }

        impl From<($t, $t, $t, $t)> for Padding {
            /// `(x0, x1, y0, y1)`.
            fn from((x0, x1, y0, y1): ($t, $t, $t, $t)) -> Self {
                Self {
                    x0: x0 as isize,
                    x1: x1 as isize,
                    y0: y0 as isize,
                    y1: y1 as isize,
                }
            }
        }
    )+};
}

padding_from!(isize, i32);

/// Up/down factors and edge padding of one resample call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleParams {
    /// Horizontal zero-insertion factor.
    pub up_x: usize,
    /// Vertical zero-insertion factor.
    pub up_y: usize,
    /// Horizontal stride of the final subsampling.
    pub down_x: usize,
    /// Vertical stride of the final subsampling.
    pub down_y: usize,
    /// Edge padding applied after upsampling.
    pub pad: Padding,
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self {
            up_x: 1,
            up_y: 1,
            down_x: 1,
            down_y: 1,
            pad: Padding::default(),
        }
    }
}

impl ResampleParams {
    /// Same factor on both axes, padding in any of the [`Padding`] forms.
    ///
    /// ```
    /// use styleops::shape::ResampleParams;
    /// let p = ResampleParams::uniform(2, 1, (2, 1));
    /// assert_eq!((p.up_x, p.up_y, p.pad.x0, p.pad.y1), (2, 2, 2, 1));
    /// ```
    pub fn uniform(up: usize, down: usize, pad: impl Into<Padding>) -> Self {
        Self {
            up_x: up,
            up_y: up,
            down_x: down,
            down_y: down,
            pad: pad.into(),
        }
    }

    /// Replaces the upsample factors.
    #[must_use]
    pub fn with_up(mut self, up_x: usize, up_y: usize) -> Self {
        self.up_x = up_x;
        self.up_y = up_y;
        self
    }

    /// Replaces the downsample factors.
    #[must_use]
    pub fn with_down(mut self, down_x: usize, down_y: usize) -> Self {
        self.down_x = down_x;
        self.down_y = down_y;
        self
    }

    /// Replaces the padding.
    #[must_use]
    pub fn with_pad(mut self, pad: impl Into<Padding>) -> Self {
        self.pad = pad.into();
        self
    }

    /// Parameters of the operator whose forward pass is the gradient of `self`.
    ///
    /// Up and down factors swap, the leading pad becomes `k - p0 - 1`, and the
    /// trailing pad is the unique value that makes the transposed operator's
    /// output exactly `geometry.in_h × geometry.in_w`. The caller pairs these
    /// with [`FilterKernel::flipped`].
    ///
    /// # Errors
    /// [`Error::InvalidShape`] if an intermediate value overflows `isize`.
    pub fn transpose(&self, kernel_h: usize, kernel_w: usize, geometry: &ResampleShape) -> Result<Self> {
        let (x0, x1) = transpose_axis(
            self.pad.x0,
            kernel_w,
            geometry.in_w,
            geometry.out_w,
            self.up_x,
            self.down_x,
        )?;
        let (y0, y1) = transpose_axis(
            self.pad.y0,
            kernel_h,
            geometry.in_h,
            geometry.out_h,
            self.up_y,
            self.down_y,
        )?;
        Ok(Self {
            up_x: self.down_x,
            up_y: self.down_y,
            down_x: self.up_x,
            down_y: self.up_y,
            pad: Padding { x0, x1, y0, y1 },
        })
    }
}

/// Backward padding along one axis.
///
/// The transposed operator sees `out * down + p0' + p1'` padded samples; for its
/// output to be `n` with stride `up` the span after filtering must be
/// `(n - 1) * up`, which pins `p1'`.
fn transpose_axis(
    p0: isize,
    k: usize,
    n: usize,
    out: usize,
    up: usize,
    down: usize,
) -> Result<(isize, isize)> {
    let k = to_isize(k)?;
    let last = n
        .checked_sub(1)
        .ok_or_else(|| Error::shape("cannot transpose a resample with an empty input axis"))?;
    let span = to_isize(last)?
        .checked_mul(to_isize(up)?)
        .ok_or_else(overflow)?;
    let upsampled = to_isize(out)?
        .checked_mul(to_isize(down)?)
        .ok_or_else(overflow)?;
    let g0 = k - p0 - 1;
    let g1 = span + k - upsampled - g0;
    Ok((g0, g1))
}

/// Spatial geometry of one resample call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleShape {
    /// Input height.
    pub in_h: usize,
    /// Input width.
    pub in_w: usize,
    /// Height after upsampling and padding.
    pub padded_h: usize,
    /// Width after upsampling and padding.
    pub padded_w: usize,
    /// Output height.
    pub out_h: usize,
    /// Output width.
    pub out_w: usize,
}

impl ResampleShape {
    /// Computes the geometry for an `in_h × in_w` plane.
    ///
    /// # Errors
    /// [`Error::InvalidShape`] if a factor is zero, an input dimension is zero, or
    /// any computed intermediate or output dimension is not positive.
    pub fn compute(
        in_h: usize,
        in_w: usize,
        kernel: &FilterKernel,
        params: &ResampleParams,
    ) -> Result<Self> {
        if params.up_x == 0 || params.up_y == 0 || params.down_x == 0 || params.down_y == 0 {
            return Err(Error::shape(format!(
                "resample factors must be positive (up {}x{}, down {}x{})",
                params.up_x, params.up_y, params.down_x, params.down_y
            )));
        }
        if in_h == 0 || in_w == 0 {
            return Err(Error::shape(format!("empty input plane {in_h}x{in_w}")));
        }
        let (kh, kw) = kernel.dims();
        let (padded_h, out_h) = axis(
            "height",
            in_h,
            params.up_y,
            params.pad.y0,
            params.pad.y1,
            kh,
            params.down_y,
        )?;
        let (padded_w, out_w) = axis(
            "width",
            in_w,
            params.up_x,
            params.pad.x0,
            params.pad.x1,
            kw,
            params.down_x,
        )?;
        Ok(Self {
            in_h,
            in_w,
            padded_h,
            padded_w,
            out_h,
            out_w,
        })
    }

    /// Computes the geometry for a full tensor shape.
    ///
    /// The last two axes are `(H, W)`; leading axes are flattened into planes.
    /// Returns the plane count alongside the geometry.
    ///
    /// # Errors
    /// [`Error::InvalidShape`] for rank below 2 or any error of [`ResampleShape::compute`].
    pub fn for_tensor(
        shape: &[usize],
        kernel: &FilterKernel,
        params: &ResampleParams,
    ) -> Result<(usize, Self)> {
        let (planes, h, w) = split_planes(shape)?;
        Ok((planes, Self::compute(h, w, kernel, params)?))
    }

    /// The output tensor shape for an input of `input_shape`.
    pub fn output_shape(&self, input_shape: &[usize]) -> Vec<usize> {
        let mut shape = input_shape.to_vec();
        let rank = shape.len();
        shape[rank - 2] = self.out_h;
        shape[rank - 1] = self.out_w;
        shape
    }
}

/// Splits a shape into `(planes, H, W)`.
pub(crate) fn split_planes(shape: &[usize]) -> Result<(usize, usize, usize)> {
    if shape.len() < 2 {
        return Err(Error::shape(format!(
            "resample needs at least 2 dimensions, got {shape:?}"
        )));
    }
    let rank = shape.len();
    let planes = shape[..rank - 2].iter().product();
    if planes == 0 {
        return Err(Error::shape(format!("empty batch/channel axes in {shape:?}")));
    }
    Ok((planes, shape[rank - 2], shape[rank - 1]))
}

fn axis(
    name: &str,
    n: usize,
    up: usize,
    p0: isize,
    p1: isize,
    k: usize,
    down: usize,
) -> Result<(usize, usize)> {
    let padded = to_isize(n)?
        .checked_mul(to_isize(up)?)
        .and_then(|v| v.checked_add(p0))
        .and_then(|v| v.checked_add(p1))
        .ok_or_else(overflow)?;
    if padded <= 0 {
        return Err(Error::shape(format!(
            "{name} after upsample and padding is {padded}"
        )));
    }
    let out = (padded - to_isize(k)?).div_euclid(to_isize(down)?) + 1;
    if out <= 0 {
        return Err(Error::shape(format!(
            "{name} output is {out} (padded {padded}, kernel {k}, down {down})"
        )));
    }
    Ok((padded as usize, out as usize))
}

fn to_isize(v: usize) -> Result<isize> {
    isize::try_from(v).map_err(|_| overflow())
}

fn overflow() -> Error {
    Error::shape("dimension overflows isize")
}
