//! FIR filter kernels.
//!
//! A [`FilterKernel`] is an immutable `kh × kw` coefficient grid. Layers build one
//! once and lend it to every resample call; it is `Send + Sync` and never
//! mutated after construction, so concurrent calls can share it freely.
//!
//! The backward pass needs the kernel rotated by 180°. That variant is derived
//! on demand by [`FilterKernel::flipped`] and never stored alongside.

use crate::error::{Error, Result};

/// Immutable 2-D FIR coefficients in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterKernel {
    height: usize,
    width: usize,
    taps: Vec<f32>,
}

impl FilterKernel {
    /// Wraps raw coefficients without normalizing them.
    ///
    /// # Errors
    /// [`Error::InvalidShape`] if either dimension is zero, the tap count does not
    /// match `height * width`, or a tap is not finite.
    pub fn new(height: usize, width: usize, taps: Vec<f32>) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(Error::shape(format!(
                "kernel dimensions must be positive, got {height}x{width}"
            )));
        }
        if taps.len() != height * width {
            return Err(Error::shape(format!(
                "kernel {height}x{width} needs {} taps, got {}",
                height * width,
                taps.len()
            )));
        }
        if taps.iter().any(|t| !t.is_finite()) {
            return Err(Error::shape("kernel taps must be finite"));
        }
        Ok(Self {
            height,
            width,
            taps,
        })
    }

    /// Builds a separable kernel from 1-D taps: the outer product `k ⊗ k`,
    /// normalized so its coefficients sum to 1.
    ///
    /// ```
    /// use styleops::kernel::FilterKernel;
    /// let k = FilterKernel::from_1d(&[1.0, 3.0, 3.0, 1.0]).unwrap();
    /// assert_eq!(k.dims(), (4, 4));
    /// assert!((k.taps().iter().sum::<f32>() - 1.0).abs() < 1e-6);
    /// ```
    ///
    /// # Errors
    /// [`Error::InvalidShape`] for an empty tap list or taps summing to zero.
    pub fn from_1d(taps: &[f32]) -> Result<Self> {
        let n = taps.len();
        let mut grid = Vec::with_capacity(n * n);
        for &row in taps {
            for &col in taps {
                grid.push(row * col);
            }
        }
        Self::from_2d_normalized(n, n, grid)
    }

    /// Like [`FilterKernel::new`], then scales the coefficients to sum to 1.
    ///
    /// # Errors
    /// Same as [`FilterKernel::new`], plus taps summing to zero.
    pub fn from_2d_normalized(height: usize, width: usize, taps: Vec<f32>) -> Result<Self> {
        let kernel = Self::new(height, width, taps)?;
        let sum: f32 = kernel.taps.iter().sum();
        if sum == 0.0 || !sum.is_finite() {
            return Err(Error::shape("kernel taps sum to zero; cannot normalize"));
        }
        Ok(kernel.scaled(1.0 / sum))
    }

    /// Binomial low-pass of `n` taps per axis (`[1, 1]`, `[1, 2, 1]`, `[1, 3, 3, 1]`, ...).
    ///
    /// # Errors
    /// [`Error::InvalidShape`] when `n` is zero.
    pub fn binomial(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::shape("binomial kernel needs at least one tap"));
        }
        let mut row = vec![1.0f32];
        for _ in 1..n {
            let mut next = vec![1.0f32; row.len() + 1];
            for i in 1..row.len() {
                next[i] = row[i - 1] + row[i];
            }
            row = next;
        }
        Self::from_1d(&row)
    }

    /// The 1×1 kernel `[1.0]`.
    pub fn identity() -> Self {
        Self {
            height: 1,
            width: 1,
            taps: vec![1.0],
        }
    }

    /// The kernel rotated by 180° (both axes reversed).
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            height: self.height,
            width: self.width,
            taps: self.taps.iter().rev().copied().collect(),
        }
    }

    /// Every coefficient multiplied by `gain`.
    #[must_use]
    pub fn scaled(&self, gain: f32) -> Self {
        Self {
            height: self.height,
            width: self.width,
            taps: self.taps.iter().map(|t| t * gain).collect(),
        }
    }

    /// `(height, width)`.
    pub fn dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Row-major coefficients.
    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    /// Coefficient at row `i`, column `j`.
    ///
    /// # Panics
    /// Panics if the index is out of range.
    pub fn at(&self, i: usize, j: usize) -> f32 {
        assert!(i < self.height && j < self.width, "kernel index out of range");
        self.taps[i * self.width + j]
    }
}
