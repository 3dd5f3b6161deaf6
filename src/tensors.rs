//! Core tensor data structure.
//!
//! # Tensors
//!
//! A [`Tensor`] is a flat row-major `f32` buffer, an explicit shape and a device
//! tag. Operators treat tensors as values: inputs are borrowed and never
//! mutated, outputs are freshly allocated.
//!
//! ## Design Highlights
//! - Shape is stored as a `Vec<usize>` and enforced at construction
//! - The device tag ([`Backend`]) decides which execution path an operator tries
//! - The `tensor!` macro supports ergonomic tensor creation from nested arrays
//!
//! ## Example
//!
//! ```rust
//! use styleops::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! ```

use crate::backend::{Backend, get_backend};
use crate::error::{Error, Result};

/// An N-dimensional tensor with a shape, flat row-major data and a device tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T = f32> {
    /// Dimension sizes, outermost first.
    pub shape: Vec<usize>,
    /// Flattened content in row-major order.
    pub data: Vec<T>,
    /// Where the tensor lives.
    pub device: Backend,
}

impl<T> Tensor<T> {
    /// Creates a new tensor tagged with the current default backend.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self {
            shape,
            data,
            device: get_backend(),
        }
    }

    /// Fallible counterpart of [`Tensor::new`].
    ///
    /// # Errors
    /// [`Error::InvalidShape`] if the element count does not match the shape.
    pub fn try_new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(Error::shape(format!(
                "shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self {
            shape,
            data,
            device: get_backend(),
        })
    }

    /// Retags the tensor for another device.
    #[must_use]
    pub fn to_device(mut self, device: Backend) -> Self {
        self.device = device;
        self
    }

    /// Number of stored elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Builds a tensor with the same shape and device as `self`.
    pub(crate) fn like<U>(&self, data: Vec<U>) -> Tensor<U> {
        debug_assert_eq!(self.data.len(), data.len());
        Tensor {
            shape: self.shape.clone(),
            data,
            device: self.device,
        }
    }
}

impl<T: Clone + Default> Tensor<T> {
    /// A tensor of default values (zeros for floats).
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self::new(shape, vec![T::default(); len])
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use styleops::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::<f32>::new(Vec::<usize>::new(), vec![$lit])
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!($inner) ),+ ];
        let first_shape = &children[0].shape;
        assert!(children.iter().all(|c| c.shape == *first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::<f32>::new(shape, data)
    }};
}
