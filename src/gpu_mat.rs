// gpu_mat.rs — Device-resident image buffer.
//
// A `GpuMat` is a handle to shared storage:
//
//   GpuMat { inner: Arc<Mutex<Storage>>, fixed }
//                         │
//                         └─ Storage { rows, cols, ty, Allocation, Device }
//
// Stream jobs capture a clone of the `Arc`, so memory referenced by
// in-flight work stays alive even if the `GpuMat` is released or dropped
// before the stream drains. `release()` detaches this handle from the
// storage; the storage itself is freed when the last reference goes.
//
// FIXED VS ADOPTIVE:
// `with_size` pins rows/cols/type: uploading anything else is a
// `ShapeMismatch`. `new()` buffers take the shape of what is uploaded.
// Operation outputs are always reshaped to the operation's output layout.
//
// LOCKING:
// A job reads each input into a host `Mat` (lock, copy, unlock) before it
// touches the output, so no job ever holds two storage locks at once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{Allocation, Device};
use crate::error::{Error, Result};
use crate::mat::{Mat, MatType};
use crate::stream::{launch, PendingDownload, Stream};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

struct Storage {
    rows: usize,
    cols: usize,
    ty: MatType,
    alloc: Option<Allocation>,
    device: Device,
}

impl Storage {
    fn empty(device: Device) -> Self {
        Storage {
            rows: 0,
            cols: 0,
            ty: MatType::U8C1,
            alloc: None,
            device,
        }
    }

    fn read_mat(&self) -> Result<Mat> {
        match &self.alloc {
            Some(alloc) if self.rows > 0 && self.cols > 0 => {
                Mat::from_bytes(self.rows, self.cols, self.ty, alloc.read()?)
            }
            _ => Ok(Mat::zeros(0, 0, self.ty)),
        }
    }

    /// Replace the contents with `mat`, reallocating if the byte size
    /// changes.
    fn write_mat(&mut self, mat: &Mat) -> Result<()> {
        let bytes = mat.as_bytes();
        if mat.is_empty() {
            self.alloc = None;
        } else if self.alloc.as_ref().map(Allocation::len) == Some(bytes.len()) {
            if let Some(alloc) = self.alloc.as_mut() {
                alloc.write(bytes)?;
            }
        } else {
            // Free the old memory first so a same-budget resize can succeed.
            self.alloc = None;
            self.rows = 0;
            self.cols = 0;
            let mut alloc = self.device.allocate(bytes.len())?;
            alloc.write(bytes)?;
            self.alloc = Some(alloc);
        }
        self.rows = mat.rows();
        self.cols = mat.cols();
        self.ty = mat.mat_type();
        Ok(())
    }
}

/// Shared reference to a buffer's storage, captured by stream jobs.
#[derive(Clone)]
pub(crate) struct BufferHandle(Arc<Mutex<Storage>>);

impl BufferHandle {
    pub(crate) fn read(&self) -> Result<Mat> {
        self.0.lock().read_mat()
    }

    pub(crate) fn write(&self, mat: &Mat) -> Result<()> {
        self.0.lock().write_mat(mat)
    }

    /// Read, transform and write back under one lock.
    pub(crate) fn update(&self, f: impl FnOnce(&mut Mat) -> Result<()>) -> Result<()> {
        let mut storage = self.0.lock();
        let mut mat = storage.read_mat()?;
        f(&mut mat)?;
        storage.write_mat(&mat)
    }
}

// ---------------------------------------------------------------------------
// GpuMat
// ---------------------------------------------------------------------------

/// A rows × cols image of one `MatType` held in device memory.
pub struct GpuMat {
    inner: Arc<Mutex<Storage>>,
    fixed: Option<(usize, usize, MatType)>,
}

impl GpuMat {
    /// An empty buffer on the default device.
    pub fn new() -> Self {
        Self::on(&Device::default_device())
    }

    /// An empty buffer on `device`.
    pub fn on(device: &Device) -> Self {
        GpuMat {
            inner: Arc::new(Mutex::new(Storage::empty(device.clone()))),
            fixed: None,
        }
    }

    /// A zero-filled buffer with fixed dimensions and type, on the default
    /// device.
    pub fn with_size(rows: usize, cols: usize, ty: MatType) -> Result<Self> {
        Self::with_size_on(&Device::default_device(), rows, cols, ty)
    }

    pub fn with_size_on(device: &Device, rows: usize, cols: usize, ty: MatType) -> Result<Self> {
        let mut buf = Self::on(device);
        buf.upload(&Mat::zeros(rows, cols, ty))?;
        buf.fixed = Some((rows, cols, ty));
        Ok(buf)
    }

    /// Upload `mat` into a new buffer on the default device.
    pub fn from_mat(mat: &Mat) -> Result<Self> {
        let mut buf = Self::new();
        buf.upload(mat)?;
        Ok(buf)
    }

    // --- Accessors ---

    pub fn rows(&self) -> usize {
        self.inner.lock().rows
    }

    pub fn cols(&self) -> usize {
        self.inner.lock().cols
    }

    pub fn mat_type(&self) -> MatType {
        self.inner.lock().ty
    }

    pub fn channels(&self) -> usize {
        self.mat_type().channels()
    }

    /// Bytes of device memory held.
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().alloc.as_ref().map_or(0, Allocation::len)
    }

    pub fn device(&self) -> Device {
        self.inner.lock().device.clone()
    }

    /// True when nothing is allocated or either dimension is zero.
    pub fn is_empty(&self) -> bool {
        let storage = self.inner.lock();
        storage.alloc.is_none() || storage.rows == 0 || storage.cols == 0
    }

    // --- Transfers ---

    /// Copy a host image into device memory.
    ///
    /// # Errors
    /// `ShapeMismatch` if the buffer has fixed dimensions that differ from
    /// `src`; `Allocation` if the device budget cannot hold it.
    pub fn upload(&mut self, src: &Mat) -> Result<()> {
        self.check_fixed(src)?;
        self.inner.lock().write_mat(src)
    }

    /// Enqueue an upload. `src` is copied at enqueue time, so the caller may
    /// reuse it immediately.
    pub fn upload_async(&mut self, src: &Mat, stream: &Stream) -> Result<()> {
        self.check_fixed(src)?;
        let staging = src.clone();
        let target = self.handle();
        launch(Some(stream), move || target.write(&staging))
    }

    /// Copy device memory into `dst`. An empty buffer yields an empty `Mat`.
    pub fn download(&self, dst: &mut Mat) -> Result<()> {
        *dst = self.inner.lock().read_mat()?;
        Ok(())
    }

    /// Convenience wrapper around [`GpuMat::download`].
    pub fn to_mat(&self) -> Result<Mat> {
        self.inner.lock().read_mat()
    }

    /// Enqueue a download. The host image is obtained from
    /// [`PendingDownload::wait`].
    pub fn download_async(&self, stream: &Stream) -> PendingDownload {
        let (slot, pending) = PendingDownload::channel();
        let source = self.handle();
        let enqueued = stream.enqueue(Box::new(move || {
            let result = source.read();
            let status = result.as_ref().map(|_| ()).map_err(Clone::clone);
            slot.complete(result);
            status
        }));
        match enqueued {
            Ok(()) => pending,
            Err(e) => PendingDownload::resolved(Err(e)),
        }
    }

    /// Detach from device memory. Idempotent.
    pub fn release(&mut self) {
        let device = self.device();
        self.inner = Arc::new(Mutex::new(Storage::empty(device)));
        self.fixed = None;
    }

    // --- Reshape ---

    /// A new buffer holding the same elements with a different channel
    /// count (`0` keeps it) and row count (`0` keeps it).
    pub fn reshape(&self, channels: usize, rows: usize) -> Result<GpuMat> {
        let reshaped = self.to_mat()?.reshape(channels, rows)?;
        let mut out = GpuMat::on(&self.device());
        out.upload(&reshaped)?;
        Ok(out)
    }

    /// Enqueued [`GpuMat::reshape`]. The returned buffer is valid after the
    /// stream drains.
    pub fn reshape_async(&self, channels: usize, rows: usize, stream: &Stream) -> Result<GpuMat> {
        let mut out = GpuMat::on(&self.device());
        let source = self.handle();
        let target = out.output_handle();
        launch(Some(stream), move || {
            let reshaped = source.read()?.reshape(channels, rows)?;
            target.write(&reshaped)
        })?;
        Ok(out)
    }

    // --- Crate internals ---

    pub(crate) fn handle(&self) -> BufferHandle {
        BufferHandle(self.inner.clone())
    }

    /// Handle for an operation output. Outputs are reshaped by the
    /// operation, so a fixed layout no longer applies.
    pub(crate) fn output_handle(&mut self) -> BufferHandle {
        self.fixed = None;
        self.handle()
    }

    /// Handle for an in-place operation. The layout is unchanged.
    pub(crate) fn in_place_handle(&mut self) -> BufferHandle {
        self.handle()
    }

    fn check_fixed(&self, src: &Mat) -> Result<()> {
        match self.fixed {
            Some((rows, cols, ty)) if (rows, cols, ty) != (src.rows(), src.cols(), src.mat_type()) => {
                Err(Error::shape(
                    "upload",
                    format!("{rows}x{cols} {ty}"),
                    src.layout(),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Default for GpuMat {
    fn default() -> Self {
        GpuMat::new()
    }
}

impl fmt::Debug for GpuMat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = self.inner.lock();
        f.debug_struct("GpuMat")
            .field("rows", &storage.rows)
            .field("cols", &storage.cols)
            .field("type", &storage.ty.to_string())
            .field("fixed", &self.fixed.is_some())
            .finish()
    }
}
