//! Parallel CPU fallback path
//!
//! # CPU Backend
//!
//! This module is the reference implementation of every operator primitive.
//! The accelerated path is an optimization of it and is tested against it.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon), one task per output row
//!   (resample) or per `(batch, channel)` slab (activation)
//! - Optional AVX2 acceleration of the activation (enabled via `simd` feature flag)
//!
//! ## Design Goals
//!
//! - Deterministic results: every output element is accumulated in a fixed order
//! - Exact index arithmetic: padding and cropping never read outside the input

use rayon::prelude::*;

#[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
use core::arch::x86_64::*;

use super::dispatch::ExecutionPath;
use crate::activation::{ActivationParams, ChannelLayout};
use crate::backend::Backend;
use crate::kernel::FilterKernel;
use crate::shape::{ResampleParams, ResampleShape};

/// The portable fallback path. Never declines a call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuPath;

impl ExecutionPath for CpuPath {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn upfirdn2d(
        &self,
        input: &[f32],
        planes: usize,
        geometry: &ResampleShape,
        kernel: &FilterKernel,
        params: &ResampleParams,
    ) -> Option<Vec<f32>> {
        Some(upfirdn2d(input, planes, geometry, kernel, params))
    }

    fn bias_act(
        &self,
        input: &[f32],
        bias: Option<&[f32]>,
        layout: ChannelLayout,
        act: &ActivationParams,
    ) -> Option<Vec<f32>> {
        Some(bias_act(input, bias, layout, act))
    }

    fn bias_act_grad(
        &self,
        grad_output: &[f32],
        input: &[f32],
        bias: Option<&[f32]>,
        layout: ChannelLayout,
        act: &ActivationParams,
    ) -> Option<Vec<f32>> {
        Some(bias_act_grad(grad_output, input, bias, layout, act))
    }
}

/// Input samples and kernel indices feeding output position `o` along one axis.
///
/// Position `o` reads padded samples `o * down .. o * down + k`. Padded sample
/// `r` is upsampled sample `r - p0`, which is a real input sample only when it
/// lies inside the upsampled extent and on the `up` grid; everything else is an
/// inserted zero or padding. Taps are flipped so the sliding multiply-accumulate
/// is a true convolution.
fn axis_taps(o: usize, down: usize, p0: isize, up: usize, n: usize, k: usize) -> Vec<(usize, usize)> {
    let base = (o * down) as isize - p0;
    let extent = (n * up) as isize;
    (0..k)
        .filter_map(|i| {
            let u = base + i as isize;
            if u < 0 || u >= extent || u % up as isize != 0 {
                return None;
            }
            Some((u as usize / up, k - 1 - i))
        })
        .collect()
}

/// Upsample → pad → FIR → downsample over `planes` contiguous `in_h × in_w` planes.
///
/// # Formula
/// ```text
/// out[p, oy, ox] = Σ_i Σ_j x_up[p, oy*dy + i - py0, ox*dx + j - px0] * k[kh-1-i, kw-1-j]
/// ```
/// where `x_up` is the zero-inserted input and reads outside it are zero.
pub fn upfirdn2d(
    input: &[f32],
    planes: usize,
    geometry: &ResampleShape,
    kernel: &FilterKernel,
    params: &ResampleParams,
) -> Vec<f32> {
    let ResampleShape {
        in_h,
        in_w,
        out_h,
        out_w,
        ..
    } = *geometry;
    debug_assert_eq!(input.len(), planes * in_h * in_w);

    let (kh, kw) = kernel.dims();
    let taps = kernel.taps();

    // identical for every plane
    let rows: Vec<_> = (0..out_h)
        .map(|oy| axis_taps(oy, params.down_y, params.pad.y0, params.up_y, in_h, kh))
        .collect();
    let cols: Vec<_> = (0..out_w)
        .map(|ox| axis_taps(ox, params.down_x, params.pad.x0, params.up_x, in_w, kw))
        .collect();

    let mut out = vec![0.0f32; planes * out_h * out_w];
    out.par_chunks_mut(out_w)
        .enumerate()
        .for_each(|(row, dst)| {
            let plane = row / out_h;
            let oy = row % out_h;
            let src = &input[plane * in_h * in_w..(plane + 1) * in_h * in_w];
            for (ox, y) in dst.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for &(iy, ki) in &rows[oy] {
                    let line = &src[iy * in_w..(iy + 1) * in_w];
                    let krow = &taps[ki * kw..(ki + 1) * kw];
                    for &(ix, kj) in &cols[ox] {
                        acc += line[ix] * krow[kj];
                    }
                }
                *y = acc;
            }
        });
    out
}

/// Applies `leaky(x + b) * scale` with the bias broadcast per channel slab.
pub fn bias_act(
    input: &[f32],
    bias: Option<&[f32]>,
    layout: ChannelLayout,
    act: &ActivationParams,
) -> Vec<f32> {
    let mut out = vec![0.0f32; input.len()];
    if input.is_empty() {
        return out;
    }

    out.par_chunks_mut(layout.inner)
        .zip(input.par_chunks(layout.inner))
        .enumerate()
        .for_each(|(slab, (dst, src))| {
            let b = bias.map_or(0.0, |b| b[slab % layout.channels]);
            leaky_slab(dst, src, b, act);
        });
    out
}

#[cfg(not(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2")))]
fn leaky_slab(dst: &mut [f32], src: &[f32], b: f32, act: &ActivationParams) {
    for (y, &x) in dst.iter_mut().zip(src) {
        *y = act.apply(x + b);
    }
}

#[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
fn leaky_slab(dst: &mut [f32], src: &[f32], b: f32, act: &ActivationParams) {
    const LANES: usize = 8;

    let split = src.len() - src.len() % LANES;
    let (head_dst, tail_dst) = dst.split_at_mut(split);
    let (head_src, tail_src) = src.split_at(split);

    // SAFETY: avx2 is enabled at compile time and every load/store stays
    // inside an exact 8-lane chunk.
    unsafe {
        let bias = _mm256_set1_ps(b);
        let slope = _mm256_set1_ps(act.negative_slope);
        let scale = _mm256_set1_ps(act.scale);
        let zero = _mm256_setzero_ps();
        for (d, s) in head_dst
            .chunks_exact_mut(LANES)
            .zip(head_src.chunks_exact(LANES))
        {
            let x = _mm256_add_ps(_mm256_loadu_ps(s.as_ptr()), bias);
            let mask = _mm256_cmp_ps(x, zero, _CMP_GT_OQ);
            let y = _mm256_blendv_ps(_mm256_mul_ps(x, slope), x, mask);
            _mm256_storeu_ps(d.as_mut_ptr(), _mm256_mul_ps(y, scale));
        }
    }

    for (y, &x) in tail_dst.iter_mut().zip(tail_src) {
        *y = act.apply(x + b);
    }
}

/// `dy * scale * (1 if x + b > 0 else slope)`, recomputing the sign from `input`.
pub fn bias_act_grad(
    grad_output: &[f32],
    input: &[f32],
    bias: Option<&[f32]>,
    layout: ChannelLayout,
    act: &ActivationParams,
) -> Vec<f32> {
    let mut grad = vec![0.0f32; input.len()];
    if input.is_empty() {
        return grad;
    }

    grad.par_chunks_mut(layout.inner)
        .zip(input.par_chunks(layout.inner))
        .zip(grad_output.par_chunks(layout.inner))
        .enumerate()
        .for_each(|(slab, ((dst, x), dy))| {
            let b = bias.map_or(0.0, |b| b[slab % layout.channels]);
            for ((g, &x), &dy) in dst.iter_mut().zip(x).zip(dy) {
                *g = dy * act.slope_at(x + b);
            }
        });
    grad
}

/// Sums `grad` over every axis except the channel axis.
pub fn channel_sum(grad: &[f32], layout: ChannelLayout) -> Vec<f32> {
    let mut out = vec![0.0f64; layout.channels];
    if !grad.is_empty() {
        let slabs: Vec<f64> = grad
            .par_chunks(layout.inner)
            .map(|s| s.iter().map(|&v| f64::from(v)).sum())
            .collect();
        for (i, s) in slabs.into_iter().enumerate() {
            out[i % layout.channels] += s;
        }
    }
    out.into_iter().map(|v| v as f32).collect()
}
