//! GPU-accelerated operator primitives using WGPU.
//!
//! This module runs the resample and fused activation primitives as WGSL
//! compute shaders. It handles GPU context initialization, shader
//! precompilation (via `lazy_static`), and compute dispatch for:
//!
//! - `upfirdn2d`: one invocation per output sample
//! - `bias_act`: fused bias + leaky rectify + gain
//! - `bias_act_grad`: its input gradient
//!
//! The device is probed once per process. Every failure (no adapter, shader
//! rejected, buffer over the device limits, map error) is reported as a
//! [`GpuFailure`], logged, and turned into `None` so the dispatcher can fall
//! back to the CPU path.

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use tracing::{info, warn};
use wgpu::util::DeviceExt;

use super::dispatch::ExecutionPath;
use crate::activation::{ActivationParams, ChannelLayout};
use crate::backend::Backend;
use crate::kernel::FilterKernel;
use crate::shape::{ResampleParams, ResampleShape};

const UPFIRDN2D: &str = include_str!("shaders/upfirdn2d.wgsl");
const BIAS_ACT: &str = include_str!("shaders/bias_act.wgsl");
const BIAS_ACT_GRAD: &str = include_str!("shaders/bias_act_grad.wgsl");

const WORKGROUP_SIZE: u32 = 64;

/// Why an accelerated launch did not produce a result.
#[derive(Debug, thiserror::Error)]
pub(crate) enum GpuFailure {
    /// The probe failed earlier in this process.
    #[error("wgpu path not initialized")]
    Unavailable,
    /// No adapter matched the request.
    #[error("adapter error: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    /// The adapter refused to open a device.
    #[error("device error: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    /// Shader or pipeline validation failed.
    #[error("pipeline `{0}` rejected: {1}")]
    Compile(&'static str, String),
    /// The launch itself was rejected by validation.
    #[error("launch of `{0}` rejected: {1}")]
    Launch(&'static str, String),
    /// The problem does not fit the device limits.
    #[error("too large for the device: {0}")]
    TooLarge(String),
    /// Mapping the staging buffer failed.
    #[error("buffer map failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    /// Waiting for the queue failed.
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    /// The mapped bytes could not be read back.
    #[error("readback failed: {0}")]
    Readback(String),
}

/// Holds the WGPU device and queue used for executing compute pipelines.
///
/// Initialized once globally and reused for all operations via `lazy_static`.
pub(crate) struct GpuContext {
    /// The actual GPU device.
    pub(crate) device: wgpu::Device,
    /// The submission queue of `device`.
    pub(crate) queue: wgpu::Queue,
}

impl GpuContext {
    /// Selects the default adapter and creates a device + queue.
    ///
    /// Uses `pollster::block_on` to wait for the async WGPU calls.
    fn new() -> Result<Self, GpuFailure> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("styleops"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;
        info!(adapter = %adapter.get_info().name, "wgpu path initialized");
        Ok(Self { device, queue })
    }
}

/// One compiled shader with its bind group layout.
///
/// Binding 0 is a uniform block; bindings `1..=inputs` are read-only storage
/// buffers; the last binding is the read-write output.
struct Kernel {
    name: &'static str,
    inputs: u32,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl Kernel {
    fn compile(
        device: &wgpu::Device,
        name: &'static str,
        source: &str,
        inputs: u32,
    ) -> Result<Self, GpuFailure> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut entries = vec![buffer_entry(0, wgpu::BufferBindingType::Uniform)];
        for binding in 1..=inputs {
            entries.push(buffer_entry(
                binding,
                wgpu::BufferBindingType::Storage { read_only: true },
            ));
        }
        entries.push(buffer_entry(
            inputs + 1,
            wgpu::BufferBindingType::Storage { read_only: false },
        ));

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(name),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuFailure::Compile(name, err.to_string()));
        }

        Ok(Self {
            name,
            inputs,
            layout,
            pipeline,
        })
    }
}

/// The device plus every precompiled pipeline.
struct WgpuKernels {
    ctx: GpuContext,
    upfirdn2d: Kernel,
    bias_act: Kernel,
    bias_act_grad: Kernel,
}

impl WgpuKernels {
    fn init() -> Result<Self, GpuFailure> {
        let ctx = GpuContext::new()?;
        let device = &ctx.device;
        let upfirdn2d = Kernel::compile(device, "upfirdn2d", UPFIRDN2D, 2)?;
        let bias_act = Kernel::compile(device, "bias_act", BIAS_ACT, 2)?;
        let bias_act_grad = Kernel::compile(device, "bias_act_grad", BIAS_ACT_GRAD, 3)?;
        Ok(Self {
            ctx,
            upfirdn2d,
            bias_act,
            bias_act_grad,
        })
    }

    /// Runs `kernel` over `total` output elements and reads the output back.
    fn launch(
        &self,
        kernel: &Kernel,
        uniform: &[u8],
        inputs: &[&[f32]],
        total: usize,
    ) -> Result<Vec<f32>, GpuFailure> {
        debug_assert_eq!(inputs.len(), kernel.inputs as usize);
        let device = &self.ctx.device;
        let queue = &self.ctx.queue;
        let limits = device.limits();

        let out_bytes = (total * size_of::<f32>()) as u64;
        let largest = inputs
            .iter()
            .map(|s| (s.len() * size_of::<f32>()) as u64)
            .chain([out_bytes])
            .max()
            .unwrap_or(0);
        if largest > u64::from(limits.max_storage_buffer_binding_size) || largest > limits.max_buffer_size
        {
            return Err(GpuFailure::TooLarge(format!(
                "{largest} byte buffer for `{}`",
                kernel.name
            )));
        }
        let (gx, gy) = workgroups(total, limits.max_compute_workgroups_per_dimension)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let uniform_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: uniform,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let input_bufs: Vec<wgpu::Buffer> = inputs
            .iter()
            .map(|data| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(kernel.name),
                    contents: bytemuck::cast_slice(data),
                    usage: wgpu::BufferUsages::STORAGE,
                })
            })
            .collect();
        let output_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output"),
            size: out_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: out_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform_buf.as_entire_binding(),
        }];
        for (i, buf) in input_bufs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: buf.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: kernel.inputs + 1,
            resource: output_buf.as_entire_binding(),
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name),
            layout: &kernel.layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(kernel.name),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(gx, gy, 1);
        }
        encoder.copy_buffer_to_buffer(&output_buf, 0, &staging, 0, out_bytes);
        queue.submit(Some(encoder.finish()));

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuFailure::Launch(kernel.name, err.to_string()));
        }

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::PollType::Wait)?;
        rx.recv()
            .map_err(|_| GpuFailure::Readback("map callback never ran".into()))??;

        let out = {
            let data = slice.get_mapped_range();
            bytemuck::try_cast_slice::<u8, f32>(&data)
                .map_err(|e| GpuFailure::Readback(e.to_string()))?
                .to_vec()
        };
        staging.unmap();
        Ok(out)
    }
}

/// Splits `total` invocations into a `(x, y)` workgroup grid.
///
/// Falls back to a 2-D grid once one dimension would exceed the device limit;
/// shaders linearize with `gid.x + gid.y * groups.x * 64`.
fn workgroups(total: usize, max_per_dim: u32) -> Result<(u32, u32), GpuFailure> {
    let too_large = || GpuFailure::TooLarge(format!("{total} invocations"));
    let total = u32::try_from(total).map_err(|_| too_large())?;
    let groups = total.div_ceil(WORKGROUP_SIZE);
    if groups <= max_per_dim {
        return Ok((groups.max(1), 1));
    }
    let rows = groups.div_ceil(max_per_dim);
    if rows > max_per_dim {
        return Err(too_large());
    }
    Ok((max_per_dim, rows))
}

fn to_u32(v: usize, what: &str) -> Result<u32, GpuFailure> {
    u32::try_from(v).map_err(|_| GpuFailure::TooLarge(format!("{what} = {v}")))
}

fn to_i32(v: isize, what: &str) -> Result<i32, GpuFailure> {
    i32::try_from(v).map_err(|_| GpuFailure::TooLarge(format!("{what} = {v}")))
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct UpfirdnUniform {
    in_h: u32,
    in_w: u32,
    out_h: u32,
    out_w: u32,
    up_x: u32,
    up_y: u32,
    down_x: u32,
    down_y: u32,
    pad_x0: i32,
    pad_y0: i32,
    kernel_h: u32,
    kernel_w: u32,
    planes: u32,
    total: u32,
    _pad: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BiasActUniform {
    len: u32,
    channels: u32,
    inner: u32,
    has_bias: u32,
    negative_slope: f32,
    scale: f32,
    _pad: [u32; 2],
}

impl BiasActUniform {
    fn new(
        len: usize,
        layout: ChannelLayout,
        has_bias: bool,
        act: &ActivationParams,
    ) -> Result<Self, GpuFailure> {
        Ok(Self {
            len: to_u32(len, "len")?,
            channels: to_u32(layout.channels, "channels")?,
            inner: to_u32(layout.inner, "inner")?,
            has_bias: u32::from(has_bias),
            negative_slope: act.negative_slope,
            scale: act.scale,
            _pad: [0; 2],
        })
    }
}

lazy_static::lazy_static! {
    static ref KERNELS: Option<WgpuKernels> = match WgpuKernels::init() {
        Ok(k) => Some(k),
        Err(e) => {
            warn!(error = %e, "wgpu path unavailable; using the cpu path");
            None
        }
    };
}

/// True when a device was found and every shader compiled.
///
/// The first call performs the probe.
pub fn is_available() -> bool {
    KERNELS.is_some()
}

fn kernels() -> Result<&'static WgpuKernels, GpuFailure> {
    KERNELS.as_ref().ok_or(GpuFailure::Unavailable)
}

fn run_upfirdn2d(
    input: &[f32],
    planes: usize,
    geometry: &ResampleShape,
    kernel: &FilterKernel,
    params: &ResampleParams,
) -> Result<Vec<f32>, GpuFailure> {
    let k = kernels()?;
    let total = planes * geometry.out_h * geometry.out_w;
    let (kh, kw) = kernel.dims();
    let uniform = UpfirdnUniform {
        in_h: to_u32(geometry.in_h, "in_h")?,
        in_w: to_u32(geometry.in_w, "in_w")?,
        out_h: to_u32(geometry.out_h, "out_h")?,
        out_w: to_u32(geometry.out_w, "out_w")?,
        up_x: to_u32(params.up_x, "up_x")?,
        up_y: to_u32(params.up_y, "up_y")?,
        down_x: to_u32(params.down_x, "down_x")?,
        down_y: to_u32(params.down_y, "down_y")?,
        pad_x0: to_i32(params.pad.x0, "pad_x0")?,
        pad_y0: to_i32(params.pad.y0, "pad_y0")?,
        kernel_h: to_u32(kh, "kernel_h")?,
        kernel_w: to_u32(kw, "kernel_w")?,
        planes: to_u32(planes, "planes")?,
        total: to_u32(total, "total")?,
        _pad: [0; 2],
    };
    // the upsampled extent is also evaluated in i32 on the device
    to_i32((geometry.in_h * params.up_y) as isize, "upsampled height")?;
    to_i32((geometry.in_w * params.up_x) as isize, "upsampled width")?;

    k.launch(
        &k.upfirdn2d,
        bytemuck::bytes_of(&uniform),
        &[input, kernel.taps()],
        total,
    )
}

/// Storage bindings cannot be empty; a lone zero stands in for a missing bias.
const NO_BIAS: [f32; 1] = [0.0];

fn run_bias_act(
    input: &[f32],
    bias: Option<&[f32]>,
    layout: ChannelLayout,
    act: &ActivationParams,
) -> Result<Vec<f32>, GpuFailure> {
    let k = kernels()?;
    let uniform = BiasActUniform::new(input.len(), layout, bias.is_some(), act)?;
    k.launch(
        &k.bias_act,
        bytemuck::bytes_of(&uniform),
        &[input, bias.unwrap_or(&NO_BIAS)],
        input.len(),
    )
}

fn run_bias_act_grad(
    grad_output: &[f32],
    input: &[f32],
    bias: Option<&[f32]>,
    layout: ChannelLayout,
    act: &ActivationParams,
) -> Result<Vec<f32>, GpuFailure> {
    let k = kernels()?;
    let uniform = BiasActUniform::new(input.len(), layout, bias.is_some(), act)?;
    k.launch(
        &k.bias_act_grad,
        bytemuck::bytes_of(&uniform),
        &[grad_output, input, bias.unwrap_or(&NO_BIAS)],
        input.len(),
    )
}

/// The accelerated path. Declines (returns `None`) on any [`GpuFailure`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WgpuPath;

fn declined<T>(op: &'static str, result: Result<Vec<T>, GpuFailure>) -> Option<Vec<T>> {
    result
        .inspect_err(|e| warn!(op, error = %e, "wgpu launch failed"))
        .ok()
}

impl ExecutionPath for WgpuPath {
    fn backend(&self) -> Backend {
        Backend::Wgpu
    }

    fn upfirdn2d(
        &self,
        input: &[f32],
        planes: usize,
        geometry: &ResampleShape,
        kernel: &FilterKernel,
        params: &ResampleParams,
    ) -> Option<Vec<f32>> {
        if input.is_empty() {
            return None;
        }
        declined(
            "upfirdn2d",
            run_upfirdn2d(input, planes, geometry, kernel, params),
        )
    }

    fn bias_act(
        &self,
        input: &[f32],
        bias: Option<&[f32]>,
        layout: ChannelLayout,
        act: &ActivationParams,
    ) -> Option<Vec<f32>> {
        if input.is_empty() {
            return None;
        }
        declined("bias_act", run_bias_act(input, bias, layout, act))
    }

    fn bias_act_grad(
        &self,
        grad_output: &[f32],
        input: &[f32],
        bias: Option<&[f32]>,
        layout: ChannelLayout,
        act: &ActivationParams,
    ) -> Option<Vec<f32>> {
        if input.is_empty() {
            return None;
        }
        declined(
            "bias_act_grad",
            run_bias_act_grad(grad_output, input, bias, layout, act),
        )
    }
}
