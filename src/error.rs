use std::{error, fmt};

use crate::dtype::DType;

/// Errors raised while tracing or emitting a fused kernel.
///
/// Every variant corresponds to one of the error kinds in the fusion
/// error-handling design: type errors, value errors, not-implemented
/// features, and ecosystem/runtime errors. All of them abort the current
/// trace; no partial kernel is ever emitted or cached.
#[derive(Debug, Clone)]
pub enum FusionError {
    Type(TypeError),
    Value(ValueError),
    NotImplemented(NotImplementedError),
    Runtime(RuntimeError),
}

#[derive(Debug, Clone)]
pub enum TypeError {
    /// An argument was of a category `call_ufunc`/`fuse` can't lift to a shadow.
    UnsupportedArgument(&'static str),
    /// A ufunc call received a kwarg other than `out`.
    UnexpectedKwarg(&'static str),
    /// An `out=` argument was not an array shadow.
    OutputNotArray,
    /// No overload in the ufunc's table could cast the given inputs.
    NoMatchingOverload {
        ufunc: &'static str,
        in_dtypes: Vec<DType>,
        out_dtypes: Vec<DType>,
    },
    /// `astype` requested a cast narrower than `same_kind`.
    UnsafeOutputCast { from: DType, to: DType },
    /// A `Shadow` was used where a `bool` was required.
    BoolCoercion,
    /// A reduction overload table had no entry whose input type the
    /// argument's dtype could cast to.
    NoMatchingReduction { reduction: &'static str, dtype: DType },
}

#[derive(Debug, Clone)]
pub enum ValueError {
    /// A ufunc call's user-supplied output had lower rank than required.
    NonBroadcastableOutput,
    /// Assignment through an index shape other than `..`/`[:]`.
    UnsupportedIndexForm,
    /// A reduction `axis` argument named an axis outside `[-ndim, ndim)`.
    AxisOutOfBounds { axis: isize, ndim: usize },
    /// A reduction `axis` argument named the same axis twice.
    RepeatedAxis(isize),
}

#[derive(Debug, Clone)]
pub enum NotImplementedError {
    /// Fusing an already-compiled elementwise kernel object as a leaf.
    ElementwiseKernelLeaf,
    /// A second reduction was invoked within one trace.
    MultipleReductions,
}

#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// A dtype value didn't correspond to any known `DType`.
    UnknownDType,
    /// Mixing a pre-map shadow with a post-map shadow in one operation.
    ShapeMismatch,
}

impl fmt::Display for FusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(e) => e.fmt(f),
            Self::Value(e) => e.fmt(f),
            Self::NotImplemented(e) => e.fmt(f),
            Self::Runtime(e) => e.fmt(f),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedArgument(ty) => write!(f, "unsupported argument type `{ty}`"),
            Self::UnexpectedKwarg(name) => write!(f, "unexpected keyword argument `{name}`"),
            Self::OutputNotArray => write!(f, "return arrays must be of array type"),
            Self::NoMatchingOverload {
                ufunc,
                in_dtypes,
                out_dtypes,
            } => write!(
                f,
                "invalid type cast in `{ufunc}`: {in_dtypes:?} -> {out_dtypes:?}"
            ),
            Self::UnsafeOutputCast { from, to } => write!(
                f,
                "output (dtype {from:?}) could not be coerced to provided output \
                 parameter (dtype {to:?}) according to the casting rule `same_kind`"
            ),
            Self::BoolCoercion => write!(f, "can't cast a traced value to bool"),
            Self::NoMatchingReduction { reduction, dtype } => {
                write!(f, "type is mismatched: {reduction}(...), {dtype:?}")
            }
        }
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonBroadcastableOutput => write!(f, "non-broadcastable output operand"),
            Self::UnsupportedIndexForm => {
                write!(f, "fusion only supports `[...]` or `[:]` assignment")
            }
            Self::AxisOutOfBounds { axis, ndim } => write!(
                f,
                "axis {axis} is out of bounds for array of dimension {ndim}"
            ),
            Self::RepeatedAxis(axis) => write!(f, "duplicate axis {axis}"),
        }
    }
}

impl fmt::Display for NotImplementedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementwiseKernelLeaf => {
                write!(f, "fusion of an elementwise-kernel leaf is not implemented")
            }
            Self::MultipleReductions => {
                write!(f, "multiple reduction is not implemented")
            }
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDType => write!(f, "unknown dtype"),
            Self::ShapeMismatch => write!(f, "shape mismatch"),
        }
    }
}

impl error::Error for FusionError {}

impl From<TypeError> for FusionError {
    fn from(e: TypeError) -> Self {
        Self::Type(e)
    }
}

impl From<ValueError> for FusionError {
    fn from(e: ValueError) -> Self {
        Self::Value(e)
    }
}

impl From<NotImplementedError> for FusionError {
    fn from(e: NotImplementedError) -> Self {
        Self::NotImplemented(e)
    }
}

impl From<RuntimeError> for FusionError {
    fn from(e: RuntimeError) -> Self {
        Self::Runtime(e)
    }
}
