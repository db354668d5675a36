// device/mod.rs — Device handle, memory budget and backend dispatch.
//
// A `Device` owns one backend and a byte budget. Every device buffer holds
// an `Allocation`: backend memory plus a `Reservation` that returns its bytes
// to the budget when dropped.
//
//   Device ──allocate(n)──▶ Allocation { Reservation(n), Box<dyn DeviceMemory> }
//                               │
//                               └─ drop ─▶ used -= n
//
// BACKENDS:
//   host — `Vec<u8>` memory; always available.
//   wgpu — storage buffers on a real adapter (feature `gpu`).
//
// The process-wide default device is created on first use from
// `DeviceConfig::from_env()`. A bad configuration falls back to defaults
// with a warning rather than failing every buffer constructor.

mod host;

#[cfg(feature = "gpu")]
pub mod gpu;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::config::{BackendKind, DeviceConfig};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// DeviceMemory
// ---------------------------------------------------------------------------

/// Backend storage for one buffer's bytes.
///
/// `write` replaces the whole contents; the byte count is fixed at
/// allocation time.
pub(crate) trait DeviceMemory: Send {
    fn len(&self) -> usize;

    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn read(&self) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// Reservation / Allocation
// ---------------------------------------------------------------------------

/// Bytes held against a device budget. Returned on drop.
struct Reservation {
    device: Arc<DeviceInner>,
    bytes: usize,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.device.used.fetch_sub(self.bytes, Ordering::AcqRel);
        debug!(device = self.device.id, bytes = self.bytes, "device memory released");
    }
}

/// Device memory together with its budget reservation.
pub(crate) struct Allocation {
    memory: Box<dyn DeviceMemory>,
    _reservation: Reservation,
}

impl Allocation {
    pub(crate) fn len(&self) -> usize {
        self.memory.len()
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.memory.len() {
            return Err(Error::shape("device write", self.memory.len(), bytes.len()));
        }
        self.memory.write(bytes)
    }

    pub(crate) fn read(&self) -> Result<Vec<u8>> {
        self.memory.read()
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

enum Backend {
    Host,
    #[cfg(feature = "gpu")]
    Wgpu(Arc<gpu::WgpuContext>),
}

struct DeviceInner {
    id: usize,
    config: DeviceConfig,
    used: AtomicUsize,
    backend: Backend,
}

/// A cloneable handle to one device.
///
/// Clones share the same memory budget and backend.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

static NEXT_DEVICE_ID: AtomicUsize = AtomicUsize::new(0);
static DEFAULT_DEVICE: OnceLock<Device> = OnceLock::new();

impl Device {
    /// Create a device from an explicit configuration.
    ///
    /// # Errors
    /// `Error::Backend` if the wgpu backend is requested but unavailable
    /// (no adapter, or the crate was built without the `gpu` feature).
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let backend = match config.backend {
            BackendKind::Host => Backend::Host,
            #[cfg(feature = "gpu")]
            BackendKind::Wgpu => Backend::Wgpu(Arc::new(gpu::WgpuContext::new(config.profile)?)),
            #[cfg(not(feature = "gpu"))]
            BackendKind::Wgpu => {
                return Err(Error::Backend(
                    "wgpu backend requested but the crate was built without the `gpu` feature".into(),
                ))
            }
        };
        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            device = id,
            backend = %config.backend,
            memory_limit = config.memory_limit,
            "device created"
        );
        Ok(Device {
            inner: Arc::new(DeviceInner {
                id,
                config,
                used: AtomicUsize::new(0),
                backend,
            }),
        })
    }

    /// Host-backed device with the given memory budget.
    pub fn host(memory_limit: usize) -> Self {
        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        Device {
            inner: Arc::new(DeviceInner {
                id,
                config: DeviceConfig::with_memory_limit(memory_limit),
                used: AtomicUsize::new(0),
                backend: Backend::Host,
            }),
        }
    }

    /// The process-wide default device.
    pub fn default_device() -> Device {
        DEFAULT_DEVICE
            .get_or_init(|| {
                let config = DeviceConfig::from_env().unwrap_or_else(|e| {
                    warn!(error = %e, "invalid device configuration, using defaults");
                    DeviceConfig::default()
                });
                Device::new(config).unwrap_or_else(|e| {
                    warn!(error = %e, "falling back to the host backend");
                    Device::host(DeviceConfig::default().memory_limit)
                })
            })
            .clone()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn memory_limit(&self) -> usize {
        self.inner.config.memory_limit
    }

    /// Bytes currently held by live buffers.
    pub fn memory_used(&self) -> usize {
        self.inner.used.load(Ordering::Acquire)
    }

    pub fn memory_available(&self) -> usize {
        self.memory_limit().saturating_sub(self.memory_used())
    }

    /// Whether two handles refer to the same device.
    pub fn same_device(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Reserve `bytes` and create backend memory of that size.
    pub(crate) fn allocate(&self, bytes: usize) -> Result<Allocation> {
        let reservation = self.reserve(bytes)?;
        let memory: Box<dyn DeviceMemory> = match &self.inner.backend {
            Backend::Host => Box::new(host::HostMemory::new(bytes)),
            #[cfg(feature = "gpu")]
            Backend::Wgpu(ctx) => Box::new(gpu::WgpuMemory::new(ctx.clone(), bytes)?),
        };
        debug!(device = self.inner.id, bytes, "device memory allocated");
        Ok(Allocation {
            memory,
            _reservation: reservation,
        })
    }

    fn reserve(&self, bytes: usize) -> Result<Reservation> {
        let limit = self.inner.config.memory_limit;
        let mut used = self.inner.used.load(Ordering::Acquire);
        loop {
            let available = limit.saturating_sub(used);
            if bytes > available {
                return Err(Error::Allocation {
                    requested: bytes,
                    available,
                });
            }
            match self.inner.used.compare_exchange_weak(
                used,
                used + bytes,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => used = actual,
            }
        }
        Ok(Reservation {
            device: self.inner.clone(),
            bytes,
        })
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("backend", &self.inner.config.backend)
            .field("memory_used", &self.memory_used())
            .field("memory_limit", &self.memory_limit())
            .finish()
    }
}
