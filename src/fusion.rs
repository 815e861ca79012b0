//! The fusion facade and kernel cache: per-callable signature→compiled-kernel
//! memoization, and the fused-vs-bypass decision.
//!
//! cupy's dynamic typing lets one Python function run unmodified against
//! either fusion shadows or real ndarrays; a traced call site is just
//! whichever code path the runtime's operator dispatch picks at that
//! moment. The direct Rust counterpart of "one function, either value
//! kind" is a function generic over the operand type, so [`Traced::trace`]
//! is a generic method: the exact same implementation runs once against
//! [`crate::shadow::Shadow`] while a trace is active, and once against
//! [`crate::device::Tensor`] for the host/bypass path and for this crate's
//! own numeric-equivalence tests — there being no surrounding array
//! library here to fall back into the way cupy falls back to numpy.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::backend::{ElementwiseKernelBackend, Kernel, ReductionKernelBackend};
use crate::device::{DeviceResident, Tensor};
use crate::dispatch;
use crate::dtype::DType;
use crate::error::{FusionError, TypeError};
use crate::history::{FusionHistory, LaunchKwargs, TraceOutcome};

/// A value [`Traced::trace`] can operate on: either a traced [`Shadow`]
/// placeholder or a concrete [`Tensor`], both `Clone` and arithmetic over
/// themselves via `Result`-returning operator impls.
///
/// [`Shadow`]: crate::shadow::Shadow
pub trait FusedOperand:
    Sized
    + Clone
    + std::ops::Add<Self, Output = Result<Self, FusionError>>
    + std::ops::Sub<Self, Output = Result<Self, FusionError>>
    + std::ops::Mul<Self, Output = Result<Self, FusionError>>
{
}

impl<T> FusedOperand for T where
    T: Sized
        + Clone
        + std::ops::Add<Self, Output = Result<Self, FusionError>>
        + std::ops::Sub<Self, Output = Result<Self, FusionError>>
        + std::ops::Mul<Self, Output = Result<Self, FusionError>>
{
}

/// A function eligible for fusion: implemented once per distinct traced
/// computation, generic over the operand kind it runs against.
pub trait Traced {
    /// Used as the emitted kernel's device name.
    fn name(&self) -> &'static str;

    /// Runs the computation against whichever operand type `T` the caller
    /// instantiates: [`crate::shadow::Shadow`] while tracing,
    /// [`crate::device::Tensor`] otherwise.
    ///
    /// # Errors
    /// Whatever the traced arithmetic raises — a type/value/not-implemented
    /// error from [`crate::error`].
    fn trace<T: FusedOperand>(&self, args: Vec<T>) -> Result<TraceOutcome<T>, FusionError>;
}

/// The `(dtype, rank)` signature used as the kernel-cache key; `rank` is
/// `None` for a scalar argument.
pub type Signature = Vec<(DType, Option<usize>)>;

/// Wraps a [`Traced`] function with a per-signature kernel cache.
///
/// The cache is behind a [`Mutex`] since a facade is naturally shared
/// behind an `Arc` across threads in a real caller, even though tracing
/// itself stays single-threaded.
pub struct Fusion<F: Traced> {
    func: F,
    cache: Mutex<HashMap<Signature, (Kernel, LaunchKwargs)>>,
}

/// Wraps `func` for fusion, matching cupy's `@fuse` decorator.
pub fn fuse<F: Traced>(func: F) -> Fusion<F> {
    Fusion {
        func,
        cache: Mutex::new(HashMap::new()),
    }
}

impl<F: Traced> Fusion<F> {
    /// Calls the wrapped function on `args`, fusing into a single kernel on
    /// the first call for a given `(dtype, rank)` signature and reusing
    /// the cached kernel thereafter.
    ///
    /// Bypasses fusion — running `args` straight through
    /// [`Traced::trace`] with no tracing and no cache interaction — when
    /// any argument is not accelerator-resident, or when called from
    /// inside an already-active trace (a nested fused call).
    ///
    /// # Errors
    /// Whatever [`Traced::trace`] or kernel compilation raises; also
    /// [`TypeError::OutputNotArray`] if the traced function returns
    /// anything other than exactly one value (this facade only exposes a
    /// single-output call convention).
    pub fn call<B>(&self, args: Vec<Tensor>, backend: &mut B) -> Result<Tensor, FusionError>
    where
        B: ElementwiseKernelBackend + ReductionKernelBackend,
    {
        let bypass = dispatch::is_tracing() || args.iter().any(|a| !a.is_device_resident());
        if bypass {
            return self.run_reference(&args);
        }

        let signature: Signature = args.iter().map(|a| (a.dtype, a.rank())).collect();
        {
            let mut cache = self.cache.lock().expect("fusion cache poisoned");
            if !cache.contains_key(&signature) {
                let history = FusionHistory::new();
                let func = &self.func;
                let (kernel, kwargs, _warnings) = history.compile(
                    &signature,
                    |shadows| func.trace(shadows.to_vec()),
                    self.func.name(),
                )?;
                match kernel.clone() {
                    Kernel::Elementwise(k) => backend.elementwise_kernel(k),
                    Kernel::Reduction(k) => backend.reduction_kernel(k),
                }
                cache.insert(signature.clone(), (kernel, kwargs));
            }
        }

        self.run_reference(&args)
    }

    /// The number of distinct signatures compiled so far — exposed for
    /// testing signature-determinism.
    #[must_use]
    pub fn cached_signature_count(&self) -> usize {
        self.cache.lock().expect("fusion cache poisoned").len()
    }

    fn run_reference(&self, args: &[Tensor]) -> Result<Tensor, FusionError> {
        match self.func.trace(args.to_vec())? {
            TraceOutcome::Single(t) => Ok(t),
            TraceOutcome::None | TraceOutcome::Tuple(_) => Err(TypeError::OutputNotArray.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SourceOnlyBackend;
    use crate::dtype::Const;

    struct AddFn;

    impl Traced for AddFn {
        fn name(&self) -> &'static str {
            "fuse_add"
        }

        fn trace<T: FusedOperand>(&self, args: Vec<T>) -> Result<TraceOutcome<T>, FusionError> {
            let mut it = args.into_iter();
            let x = it.next().expect("two arguments");
            let y = it.next().expect("two arguments");
            Ok(TraceOutcome::Single((x + y)?))
        }
    }

    #[test]
    fn first_call_compiles_and_caches_by_signature() {
        let fusion = fuse(AddFn);
        let mut backend = SourceOnlyBackend::new();
        let a = Tensor::device_array(DType::Float32, vec![3], vec![
            Const::Float(1.0),
            Const::Float(2.0),
            Const::Float(3.0),
        ]);
        let b = Tensor::device_array(DType::Float32, vec![3], vec![
            Const::Float(4.0),
            Const::Float(5.0),
            Const::Float(6.0),
        ]);
        let result = fusion.call(vec![a.clone(), b.clone()], &mut backend).unwrap();
        assert_eq!(
            result.data,
            vec![Const::Float(5.0), Const::Float(7.0), Const::Float(9.0)]
        );
        assert_eq!(fusion.cached_signature_count(), 1);
        assert_eq!(backend.launches.len(), 1);

        fusion.call(vec![a, b], &mut backend).unwrap();
        assert_eq!(fusion.cached_signature_count(), 1);
        assert_eq!(backend.launches.len(), 1, "same signature must not recompile");
    }

    #[test]
    fn host_arguments_bypass_fusion_entirely() {
        let fusion = fuse(AddFn);
        let mut backend = SourceOnlyBackend::new();
        let a = Tensor::host_array(DType::Int32, vec![2], vec![Const::Int(1), Const::Int(2)]);
        let b = Tensor::host_array(DType::Int32, vec![2], vec![Const::Int(10), Const::Int(20)]);
        let result = fusion.call(vec![a, b], &mut backend).unwrap();
        assert_eq!(result.data, vec![Const::Int(11), Const::Int(22)]);
        assert_eq!(backend.launches.len(), 0);
        assert_eq!(fusion.cached_signature_count(), 0);
        assert!(!dispatch::is_tracing());
    }
}
