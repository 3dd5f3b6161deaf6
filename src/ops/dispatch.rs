//! Operation Dispatch Layer
//!
//! This module selects the execution path for each operator call.
//!
//! Both paths implement [`ExecutionPath`]. A path reports "could not run this
//! call" by returning `None`; the [`Dispatcher`] then decides, according to its
//! [`FallbackPolicy`], whether to rerun the call on the CPU path or surface
//! [`Error::UnsupportedDevice`].
//!
//! # Design Highlights
//! - **Pluggable**: the accelerated path is optional and modular
//! - **Single decision point**: no call site branches on the backend
//! - **Fallback logic**: safe and deterministic fallback to CPU

use tracing::debug;

use crate::activation::{ActivationParams, ChannelLayout};
use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::kernel::FilterKernel;
use crate::shape::{ResampleParams, ResampleShape};

/// The primitives every execution path provides.
///
/// Slices are flat row-major buffers; validation has already happened by the
/// time a path is called. Returning `None` means the path could not run the
/// call (device lost, buffer too large, launch failure).
pub trait ExecutionPath: Send + Sync {
    /// Which backend this path executes on.
    fn backend(&self) -> Backend;

    /// Upsample, pad, FIR-filter and downsample `planes` independent planes.
    fn upfirdn2d(
        &self,
        input: &[f32],
        planes: usize,
        geometry: &ResampleShape,
        kernel: &FilterKernel,
        params: &ResampleParams,
    ) -> Option<Vec<f32>>;

    /// `leaky_rectify(input + bias) * scale`, bias broadcast along `layout`.
    fn bias_act(
        &self,
        input: &[f32],
        bias: Option<&[f32]>,
        layout: ChannelLayout,
        act: &ActivationParams,
    ) -> Option<Vec<f32>>;

    /// Gradient of [`ExecutionPath::bias_act`] with respect to its input.
    fn bias_act_grad(
        &self,
        grad_output: &[f32],
        input: &[f32],
        bias: Option<&[f32]>,
        layout: ChannelLayout,
        act: &ActivationParams,
    ) -> Option<Vec<f32>>;
}

/// What to do when a `Wgpu`-tagged tensor cannot run on the accelerated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Rerun on the CPU path and log it.
    #[default]
    Silent,
    /// Return [`Error::UnsupportedDevice`].
    Strict,
}

/// Picks an [`ExecutionPath`] per call.
///
/// The dispatcher is a small `Copy` value; operators are exposed as methods on
/// it (see [`crate::resample`] and [`crate::activation`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dispatcher {
    policy: FallbackPolicy,
}

impl Dispatcher {
    /// A dispatcher with the given policy.
    pub const fn new(policy: FallbackPolicy) -> Self {
        Self { policy }
    }

    /// A dispatcher that refuses to fall back.
    pub const fn strict() -> Self {
        Self::new(FallbackPolicy::Strict)
    }

    /// The configured policy.
    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Runs `op` on the path chosen for `device`.
    pub(crate) fn run<T>(
        &self,
        device: Backend,
        op: &'static str,
        f: impl Fn(&dyn ExecutionPath) -> Option<T>,
    ) -> Result<T> {
        if device == Backend::Wgpu {
            match accelerated() {
                Some(path) => {
                    if let Some(out) = f(path) {
                        debug!(op, backend = %path.backend(), "dispatched");
                        return Ok(out);
                    }
                    if self.policy == FallbackPolicy::Strict {
                        return Err(Error::UnsupportedDevice(format!(
                            "{op} could not run on the accelerated path"
                        )));
                    }
                    debug!(op, "accelerated launch failed; rerunning on cpu");
                }
                None => {
                    if self.policy == FallbackPolicy::Strict {
                        return Err(Error::UnsupportedDevice(format!(
                            "{op} requested wgpu but no accelerated path is available"
                        )));
                    }
                    debug!(op, "accelerated path unavailable; running on cpu");
                }
            }
        }

        f(&super::cpu::CpuPath).ok_or_else(|| {
            Error::UnsupportedDevice(format!("{op} produced no result on the cpu path"))
        })
    }
}

/// True when the accelerated path initialized successfully.
///
/// The probe runs once per process; concurrent first callers all observe the
/// same outcome.
pub fn accelerated_available() -> bool {
    accelerated().is_some()
}

#[cfg(feature = "wgpu")]
fn accelerated() -> Option<&'static dyn ExecutionPath> {
    if super::wgpu::is_available() {
        Some(&super::wgpu::WgpuPath)
    } else {
        None
    }
}

#[cfg(not(feature = "wgpu"))]
fn accelerated() -> Option<&'static dyn ExecutionPath> {
    use std::sync::Once;
    use tracing::warn;

    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        warn!("built without the `wgpu` feature; wgpu-tagged tensors run on the cpu path");
    });
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_tagged_calls_never_touch_the_accelerated_path() {
        let d = Dispatcher::strict();
        let out = d.run(Backend::Cpu, "probe", |p| Some(p.backend()));
        assert_eq!(out, Ok(Backend::Cpu));
    }

    #[test]
    fn declined_accelerated_call_falls_back_or_errors() {
        let silent = Dispatcher::default().run(Backend::Wgpu, "probe", |p| match p.backend() {
            Backend::Wgpu => None,
            Backend::Cpu => Some(1),
        });
        assert_eq!(silent, Ok(1));

        let strict = Dispatcher::strict().run(Backend::Wgpu, "probe", |p| match p.backend() {
            Backend::Wgpu => None,
            Backend::Cpu => Some(1),
        });
        assert!(matches!(strict, Err(Error::UnsupportedDevice(_))));
    }
}
