//! # Execution Paths
//!
//! This module holds the two interchangeable implementations of the operator
//! primitives and the dispatcher that picks between them.
//!
//! ## Submodules
//!
//! - [`cpu`]: multi-threaded (+ optional AVX2) fallback path; defines the semantics
//! - [`wgpu`] *(opt-in)*: WGSL compute shaders dispatched through `wgpu`
//! - [`dispatch`]: the [`ExecutionPath`] interface and the [`Dispatcher`] strategy
//!
//! ## Backend Selection
//!
//! Callers never pick a path themselves. A tensor tagged [`Backend::Wgpu`] is
//! routed to the accelerated path when it is available; everything else (and
//! every accelerated failure under the default policy) runs on the CPU.
//!
//! ## Feature Flags
//!
//! - `simd`: enables AVX2 kernels in the CPU path
//! - `wgpu`: enables the `wgpu` (WebGPU) accelerated path
//!
//! [`ExecutionPath`]: dispatch::ExecutionPath
//! [`Dispatcher`]: dispatch::Dispatcher
//! [`Backend::Wgpu`]: crate::backend::Backend::Wgpu

pub mod cpu;
pub mod dispatch;
#[cfg(feature = "wgpu")]
pub mod wgpu;
