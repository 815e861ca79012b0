use crate::dtype::{Const, DType};

/// Marks whether a value lives on the accelerator or the host.
///
/// Fusion only traces accelerator-resident arrays: an argument reporting
/// `false` here makes `fuse()` bypass tracing entirely and call the
/// wrapped function directly, mirroring cupy's fallback when a fused
/// function is handed plain numpy/host arrays.
pub trait DeviceResident {
    fn is_device_resident(&self) -> bool;
}

/// A host-resident buffer: always bypasses fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray<T> {
    pub data: Vec<T>,
}

impl<T> HostArray<T> {
    #[must_use]
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T> DeviceResident for HostArray<T> {
    fn is_device_resident(&self) -> bool {
        false
    }
}

/// An accelerator-resident buffer: eligible for tracing.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceArray<T> {
    pub data: Vec<T>,
    pub shape: Vec<usize>,
}

impl<T> DeviceArray<T> {
    #[must_use]
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> Self {
        Self { data, shape }
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
}

impl<T> DeviceResident for DeviceArray<T> {
    fn is_device_resident(&self) -> bool {
        true
    }
}

/// A concrete numeric value this crate can actually run arithmetic on
/// without tracing: a dtype, a shape (empty means scalar), and its raw
/// [`Const`] data.
///
/// This is the un-fused side of [`crate::fusion::Traced::trace`]'s
/// genericity: the same traced function runs once against `Shadow` (inside
/// a trace) and once against `Tensor` (bypass / host execution or a
/// reference oracle for tests), since both implement
/// [`crate::fusion::FusedOperand`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub data: Vec<Const>,
    resident: bool,
}

impl Tensor {
    #[must_use]
    pub fn host_scalar(value: Const) -> Self {
        Self {
            dtype: dtype_of(value),
            shape: Vec::new(),
            data: vec![value],
            resident: false,
        }
    }

    #[must_use]
    pub fn device_scalar(value: Const) -> Self {
        Self {
            resident: true,
            ..Self::host_scalar(value)
        }
    }

    #[must_use]
    pub fn host_array(dtype: DType, shape: Vec<usize>, data: Vec<Const>) -> Self {
        Self {
            dtype,
            shape,
            data,
            resident: false,
        }
    }

    #[must_use]
    pub fn device_array(dtype: DType, shape: Vec<usize>, data: Vec<Const>) -> Self {
        Self {
            resident: true,
            ..Self::host_array(dtype, shape, data)
        }
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    #[must_use]
    pub fn rank(&self) -> Option<usize> {
        (!self.shape.is_empty()).then_some(self.shape.len())
    }
}

impl DeviceResident for Tensor {
    fn is_device_resident(&self) -> bool {
        self.resident
    }
}

fn dtype_of(value: Const) -> DType {
    match value {
        Const::Bool(_) => DType::Bool,
        Const::Int(_) => DType::Int64,
        Const::Float(_) => DType::Float64,
        Const::Complex(_, _) => DType::Complex128,
    }
}

fn broadcast_binary(
    a: &Tensor,
    b: &Tensor,
    ufunc_name: &str,
) -> Result<Tensor, crate::error::FusionError> {
    let out_shape = if a.is_scalar() {
        b.shape.clone()
    } else if b.is_scalar() {
        a.shape.clone()
    } else if a.shape == b.shape {
        a.shape.clone()
    } else {
        return Err(crate::error::RuntimeError::ShapeMismatch.into());
    };
    let len = out_shape.iter().product::<usize>().max(1);
    let mut data = Vec::with_capacity(len);
    for i in 0..len {
        let av = if a.is_scalar() { a.data[0] } else { a.data[i] };
        let bv = if b.is_scalar() { b.data[0] } else { b.data[i] };
        data.push(crate::reference::eval_binary(ufunc_name, av, bv)?);
    }
    let dtype = if a.is_scalar() { b.dtype } else { a.dtype };
    Ok(Tensor {
        dtype,
        shape: out_shape,
        data,
        resident: a.resident && b.resident,
    })
}

macro_rules! impl_tensor_binary_op {
    ($trait:ident, $method:ident, $ufunc:literal) => {
        impl std::ops::$trait for Tensor {
            type Output = Result<Tensor, crate::error::FusionError>;

            fn $method(self, rhs: Tensor) -> Self::Output {
                broadcast_binary(&self, &rhs, $ufunc)
            }
        }
    };
}

impl_tensor_binary_op!(Add, add, "add");
impl_tensor_binary_op!(Sub, sub, "subtract");
impl_tensor_binary_op!(Mul, mul, "multiply");
