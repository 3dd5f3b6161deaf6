//! styleops: resampling and fused activation operators for style-based
//! generative image networks.
//!
//! Two differentiable operators, each with a parallel CPU path and an optional
//! `wgpu` compute path that agree up to floating-point tolerance:
//!
//! - **upfirdn2d**: zero-insertion upsample → asymmetric pad (negative pads crop)
//!   → FIR filter → stride downsample. Its backward pass is the same operator
//!   with transposed parameters and a flipped kernel.
//! - **fused leaky ReLU**: per-channel bias + leaky rectify + gain, with input and
//!   bias gradients that can be requested independently.
//!
//! # Modules
//!
//! - [`tensors`]: the flat `f32` tensor with a device tag
//! - [`kernel`]: immutable FIR kernels
//! - [`shape`]: resample parameters and shape arithmetic
//! - [`resample`] / [`activation`]: the operators, as [`Dispatcher`] methods
//! - [`backprop`]: free functions and closure-style autograd wrappers
//! - [`layers`]: `Upsample`, `Downsample`, `Blur`, `FusedLeakyReLU`
//! - [`ops`]: execution paths and the dispatcher
//! - [`backend`]: process-wide default device
//!
//! # Feature Flags
//!
//! - `wgpu`: accelerated path (WGSL compute shaders through `wgpu`)
//! - `simd`: AVX2 activation kernels on the CPU path
//!
//! # Logging
//!
//! Path decisions and accelerated-path failures are reported through
//! [`tracing`]; install a subscriber to see them.
//!
//! # Example
//!
//! ```rust
//! use styleops::{activation_forward, resample_forward, ActivationParams, FilterKernel, ResampleParams, Tensor};
//!
//! let x = Tensor::new(vec![1, 2, 4, 4], vec![0.5; 32]);
//! let k = FilterKernel::from_1d(&[1.0, 3.0, 3.0, 1.0]).unwrap();
//! let y = resample_forward(&x, &k, &ResampleParams::uniform(1, 2, (1, 1))).unwrap();
//! assert_eq!(y.shape, vec![1, 2, 2, 2]);
//! let z = activation_forward(&y, None, &ActivationParams::default()).unwrap();
//! assert_eq!(z.shape, y.shape);
//! ```

pub mod activation;
pub mod approx;
pub mod backend;
pub mod backprop;
pub mod error;
pub mod kernel;
pub mod layers;
pub mod ops;
pub mod resample;
pub mod shape;
pub mod tensors;

pub use activation::{ActivationGrads, ActivationParams, ChannelLayout, GradNeeds};
pub use backend::{Backend, get_backend, set_backend};
pub use backprop::{activation_backward, activation_forward, resample_backward, resample_forward};
pub use error::{Error, Result};
pub use kernel::FilterKernel;
pub use ops::dispatch::{Dispatcher, FallbackPolicy, accelerated_available};
pub use shape::{Padding, ResampleParams, ResampleShape};
pub use tensors::Tensor;
