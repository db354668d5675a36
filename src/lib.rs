// gpu-imgproc: device buffers, execution streams and image-processing
// dispatchers with a synchronous / asynchronous execution contract.
//
//   Mat ──upload──▶ GpuMat ──dispatcher.detect(_async)──▶ GpuMat ──download──▶ Mat
//                      │                  │
//                      └──── Device ◀─────┴──── Stream (FIFO worker)
//
// Every operation has one kernel. Called without a stream it runs inline and
// returns its error directly; called with a stream it is queued and its error
// surfaces from `Stream::wait_for_completion`.

pub mod border;
pub mod config;
pub mod convolution;
pub mod device;
pub mod error;
pub mod gpu_mat;
pub mod gradient;
pub mod image;
pub mod imgproc;
pub mod mat;
pub mod stream;

pub use border::BorderMode;
pub use config::{BackendKind, DeviceConfig, DeviceProfile};
pub use device::Device;
pub use error::{Error, Result};
pub use gpu_mat::GpuMat;
pub use imgproc::{
    AlphaCompOp, BayerPattern, CannyEdgeDetector, DemosaicCode, DemosaicOutput, HoughLinesDetector,
    HoughSegmentDetector, TemplateMatching, TemplateMethod, TermCriteria,
};
pub use mat::{Depth, Mat, MatType, MinMaxLoc};
pub use stream::{PendingDownload, Stream};
