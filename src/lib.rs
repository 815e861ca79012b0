//! A kernel-fusion JIT compiler for GPU array computation.
//!
//! Tracing a host function once against [`shadow::Shadow`] placeholders
//! records element-wise and reduction operations into a
//! [`history::FusionHistory`], which compiles them into a single device
//! kernel. [`fusion::fuse`] wraps a [`fusion::Traced`] function with a
//! signature-keyed cache of those kernels, bypassing fusion entirely when
//! it's handed host-resident data or is itself called from inside an
//! already-active trace.

pub mod axis;
pub mod backend;
pub mod device;
pub mod dispatch;
pub mod dtype;
pub mod error;
pub mod fusion;
pub mod history;
pub mod ir;
pub mod reduction;
pub mod reference;
pub mod shadow;
pub mod submodule;
pub mod ufunc;

pub use self::backend::{ElementwiseKernel, ElementwiseKernelBackend, Kernel, ReductionKernel, ReductionKernelBackend, SourceOnlyBackend};
pub use self::device::{DeviceArray, DeviceResident, HostArray, Tensor};
pub use self::dtype::{Const, DType};
pub use self::error::{FusionError, NotImplementedError, RuntimeError, TypeError, ValueError};
pub use self::fusion::{fuse, FusedOperand, Fusion, Signature, Traced};
pub use self::history::{FusionHistory, FusionWarning, LaunchKwargs, TraceOutcome};
pub use self::shadow::Shadow;
