// device/gpu.rs — wgpu-backed device memory.
//
// Responsibilities:
//   - Enumerate Vulkan adapters and prefer real hardware over llvmpipe.
//   - Request device limits from the configured `DeviceProfile`.
//   - Hold buffer bytes in a STORAGE buffer; upload with `write_buffer`,
//     download through a MAP_READ staging buffer.
//
// ADAPTER SELECTION:
// wgpu's `request_adapter` heuristics may pick a software renderer on WSL2.
// We enumerate explicitly: any hardware/virtual/other adapter first, then
// whatever exists (the chosen name is logged).
//
// DEVICE LIMITS:
// Under `RaspberryPi` we request *lower* limits than the hardware offers so
// that buffers too large for a VideoCore are rejected on the dev machine.
//
// ALIGNMENT:
// `write_buffer` and `copy_buffer_to_buffer` need sizes that are multiples
// of `wgpu::COPY_BUFFER_ALIGNMENT` (4). Buffers are padded up; the padding
// never reaches the caller.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::DeviceMemory;
use crate::config::DeviceProfile;
use crate::error::{Error, Result};

const COPY_ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// Cached adapter information for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

// ---------------------------------------------------------------------------
// WgpuContext
// ---------------------------------------------------------------------------

/// Adapter, device and queue shared by every buffer of one `Device`.
///
/// `_instance` is declared last so the Vulkan instance outlives `device` and
/// `queue` (dzn on WSL2 crashes otherwise).
pub struct WgpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    limits: wgpu::Limits,
    _instance: wgpu::Instance,
}

impl WgpuContext {
    pub fn new(profile: DeviceProfile) -> Result<Self> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self> {
        // dzn declares itself non-conformant; allow it so it can win over
        // llvmpipe. Storage buffers and copies work fine on it.
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            flags,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(wgpu::Backends::VULKAN);
        for a in &adapters {
            let info = a.get_info();
            debug!(name = %info.name, backend = ?info.backend, device_type = ?info.device_type, "vulkan adapter");
        }

        let preferred = adapters.iter().position(|a| {
            !matches!(a.get_info().device_type, wgpu::DeviceType::Cpu)
        });
        let adapter = match preferred {
            Some(i) => adapters.into_iter().nth(i),
            None => adapters.into_iter().next(),
        }
        .ok_or_else(|| {
            Error::Backend("no Vulkan adapter found; check that `vulkaninfo` lists a device".into())
        })?;

        let raw = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw.name.clone(),
            device_type: raw.device_type,
            backend: raw.backend,
        };

        // A V3D adapter always gets the RaspberryPi limits.
        let profile = match profile {
            DeviceProfile::Native if raw.name.to_ascii_lowercase().contains("v3d") => {
                info!("V3D adapter detected, using RaspberryPi profile");
                DeviceProfile::RaspberryPi
            }
            other => other,
        };
        let limits = limits_for_profile(profile);

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gpu-imgproc"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| Error::Backend(format!("device request failed: {e}")))?;

        info!(adapter = %adapter_info, profile = %profile, "wgpu device ready");

        Ok(WgpuContext {
            device,
            queue,
            profile,
            adapter_info,
            limits,
            _instance: instance,
        })
    }

    /// Largest buffer the requested limits allow.
    pub fn max_buffer_size(&self) -> u64 {
        self.limits
            .max_buffer_size
            .min(self.limits.max_storage_buffer_binding_size as u64)
    }
}

impl fmt::Display for WgpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WgpuContext {{ adapter: {}, profile: {} }}", self.adapter_info, self.profile)
    }
}

/// wgpu limits for the given profile.
fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),
        DeviceProfile::RaspberryPi => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_texture_dimension_2d: 4096,
            // 128 MiB out of the 4 GiB shared with the CPU.
            max_storage_buffer_binding_size: 128 << 20,
            max_buffer_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

// ---------------------------------------------------------------------------
// WgpuMemory
// ---------------------------------------------------------------------------

/// One device buffer's bytes in a GPU storage buffer.
pub(crate) struct WgpuMemory {
    ctx: Arc<WgpuContext>,
    buffer: wgpu::Buffer,
    len: usize,
}

impl WgpuMemory {
    pub(crate) fn new(ctx: Arc<WgpuContext>, len: usize) -> Result<Self> {
        let padded = padded_size(len);
        if padded > ctx.max_buffer_size() {
            return Err(Error::Allocation {
                requested: len,
                available: ctx.max_buffer_size() as usize,
            });
        }

        ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GpuMat::storage"),
            size: padded,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(creation_error(len, err));
        }

        Ok(WgpuMemory { ctx, buffer, len })
    }
}

/// Device exhaustion is an allocation failure; the driver does not report
/// what is left, so `available` is 0.
fn creation_error(requested: usize, err: wgpu::Error) -> Error {
    match err {
        wgpu::Error::OutOfMemory { .. } => Error::Allocation { requested, available: 0 },
        other => Error::Backend(format!("buffer creation failed: {other}")),
    }
}

impl DeviceMemory for WgpuMemory {
    fn len(&self) -> usize {
        self.len
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if bytes.len() % COPY_ALIGNMENT as usize == 0 {
            self.ctx.queue.write_buffer(&self.buffer, 0, bytes);
        } else {
            let mut padded = bytes.to_vec();
            padded.resize(padded_size(bytes.len()) as usize, 0);
            self.ctx.queue.write_buffer(&self.buffer, 0, &padded);
        }
        self.ctx.queue.submit(std::iter::empty());
        Ok(())
    }

    fn read(&self) -> Result<Vec<u8>> {
        if self.len == 0 {
            return Ok(Vec::new());
        }
        let size = padded_size(self.len);

        let readback = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GpuMat::readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuMat::download"),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &readback, 0, size);
        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = crossbeam::channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only disappears if read() already returned.
            let _ = sender.send(result);
        });
        self.ctx.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| Error::Backend("readback map callback never fired".into()))?
            .map_err(|e| Error::Backend(format!("readback map failed: {e}")))?;

        let mapped = slice.get_mapped_range();
        let out = mapped[..self.len].to_vec();
        drop(mapped);
        readback.unmap();
        Ok(out)
    }
}

/// Byte size rounded up to the copy alignment, at least one word.
fn padded_size(len: usize) -> u64 {
    align_to(len as u64, COPY_ALIGNMENT).max(COPY_ALIGNMENT)
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(5, 4)   = 8
///   align_to(8, 4)   = 8
///   align_to(0, 4)   = 0
#[inline]
pub(crate) fn align_to(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) / alignment * alignment
}
