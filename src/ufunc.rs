use crate::dtype::{ALL_DTYPES, DType};

/// One typed overload of a [`Ufunc`]: an `(in_dtypes, out_dtypes, body)`
/// triple.
#[derive(Debug, Clone)]
pub struct Overload {
    pub in_dtypes: Vec<DType>,
    pub out_dtypes: Vec<DType>,
    pub body: &'static str,
}

/// A typed family of element-wise operations.
///
/// `overloads` is tried in declared order during resolution: the first
/// overload whose `in_dtypes` the call's actual arguments can cast into,
/// under the selected casting rule, wins.
#[derive(Debug, Clone)]
pub struct Ufunc {
    pub name: &'static str,
    pub preamble: &'static str,
    pub overloads: Vec<Overload>,
}

impl Ufunc {
    #[must_use]
    pub fn nin(&self) -> usize {
        self.overloads
            .first()
            .map_or(0, |o| o.in_dtypes.len())
    }

    #[must_use]
    pub fn nout(&self) -> usize {
        self.overloads
            .first()
            .map_or(0, |o| o.out_dtypes.len())
    }
}

const ARITH_DTYPES: [DType; 13] = [
    DType::Int8,
    DType::Int16,
    DType::Int32,
    DType::Int64,
    DType::UInt8,
    DType::UInt16,
    DType::UInt32,
    DType::UInt64,
    DType::Float16,
    DType::Float32,
    DType::Float64,
    DType::Complex64,
    DType::Complex128,
];

const BITWISE_DTYPES: [DType; 9] = [
    DType::Bool,
    DType::Int8,
    DType::Int16,
    DType::Int32,
    DType::Int64,
    DType::UInt8,
    DType::UInt16,
    DType::UInt32,
    DType::UInt64,
];

const FLOORDIV_DTYPES: [DType; 11] = [
    DType::Int8,
    DType::Int16,
    DType::Int32,
    DType::Int64,
    DType::UInt8,
    DType::UInt16,
    DType::UInt32,
    DType::UInt64,
    DType::Float16,
    DType::Float32,
    DType::Float64,
];

const DIV_RESULT_DTYPES: [DType; 5] = [
    DType::Float16,
    DType::Float32,
    DType::Float64,
    DType::Complex64,
    DType::Complex128,
];

fn homogeneous_binary(name: &'static str, dtypes: &[DType], body: &'static str) -> Ufunc {
    Ufunc {
        name,
        preamble: "",
        overloads: dtypes
            .iter()
            .map(|&d| Overload {
                in_dtypes: vec![d, d],
                out_dtypes: vec![d],
                body,
            })
            .collect(),
    }
}

fn homogeneous_unary(name: &'static str, dtypes: &[DType], body: &'static str) -> Ufunc {
    Ufunc {
        name,
        preamble: "",
        overloads: dtypes
            .iter()
            .map(|&d| Overload {
                in_dtypes: vec![d],
                out_dtypes: vec![d],
                body,
            })
            .collect(),
    }
}

fn comparison(name: &'static str, body: &'static str) -> Ufunc {
    Ufunc {
        name,
        preamble: "",
        overloads: ALL_DTYPES
            .iter()
            .map(|&d| Overload {
                in_dtypes: vec![d, d],
                out_dtypes: vec![DType::Bool],
                body,
            })
            .collect(),
    }
}

pub fn add() -> Ufunc {
    homogeneous_binary("add", &ARITH_DTYPES, "out0 = in0 + in1")
}

pub fn subtract() -> Ufunc {
    homogeneous_binary("subtract", &ARITH_DTYPES, "out0 = in0 - in1")
}

pub fn multiply() -> Ufunc {
    homogeneous_binary("multiply", &ARITH_DTYPES, "out0 = in0 * in1")
}

pub fn true_divide() -> Ufunc {
    homogeneous_binary("true_divide", &DIV_RESULT_DTYPES, "out0 = in0 / in1")
}

pub fn floor_divide() -> Ufunc {
    homogeneous_binary(
        "floor_divide",
        &FLOORDIV_DTYPES,
        "out0 = floor(in0 / in1)",
    )
}

pub fn remainder() -> Ufunc {
    homogeneous_binary("remainder", &FLOORDIV_DTYPES, "out0 = in0 % in1")
}

pub fn power() -> Ufunc {
    homogeneous_binary("power", &ARITH_DTYPES, "out0 = pow(in0, in1)")
}

pub fn left_shift() -> Ufunc {
    homogeneous_binary("left_shift", &BITWISE_DTYPES, "out0 = in0 << in1")
}

pub fn right_shift() -> Ufunc {
    homogeneous_binary("right_shift", &BITWISE_DTYPES, "out0 = in0 >> in1")
}

pub fn bitwise_and() -> Ufunc {
    homogeneous_binary("bitwise_and", &BITWISE_DTYPES, "out0 = in0 & in1")
}

pub fn bitwise_or() -> Ufunc {
    homogeneous_binary("bitwise_or", &BITWISE_DTYPES, "out0 = in0 | in1")
}

pub fn bitwise_xor() -> Ufunc {
    homogeneous_binary("bitwise_xor", &BITWISE_DTYPES, "out0 = in0 ^ in1")
}

pub fn negative() -> Ufunc {
    homogeneous_unary("negative", &ARITH_DTYPES, "out0 = -in0")
}

pub fn invert() -> Ufunc {
    homogeneous_unary("invert", &BITWISE_DTYPES, "out0 = ~in0")
}

pub fn less() -> Ufunc {
    comparison("less", "out0 = in0 < in1")
}

pub fn less_equal() -> Ufunc {
    comparison("less_equal", "out0 = in0 <= in1")
}

pub fn equal() -> Ufunc {
    comparison("equal", "out0 = in0 == in1")
}

pub fn not_equal() -> Ufunc {
    comparison("not_equal", "out0 = in0 != in1")
}

pub fn greater() -> Ufunc {
    comparison("greater", "out0 = in0 > in1")
}

pub fn greater_equal() -> Ufunc {
    comparison("greater_equal", "out0 = in0 >= in1")
}

pub fn copy() -> Ufunc {
    homogeneous_unary("copy", &ALL_DTYPES, "out0 = in0")
}

/// Builds the generated unary cast ufunc for `astype(dtype)`, matching
/// `_create_astype_ufunc` in `fusion.py`: one overload per source dtype in
/// [`ALL_DTYPES`] order, all casting into `dtype`.
#[must_use]
pub fn astype_ufunc(dtype: DType) -> Ufunc {
    Ufunc {
        name: astype_name(dtype),
        preamble: "",
        overloads: ALL_DTYPES
            .iter()
            .map(|&src| Overload {
                in_dtypes: vec![src],
                out_dtypes: vec![dtype],
                body: "out0 = in0",
            })
            .collect(),
    }
}

/// Interned name for the astype ufunc of `dtype`, since [`Ufunc::name`] is
/// `&'static str`.
#[must_use]
pub fn astype_name(dtype: DType) -> &'static str {
    match dtype {
        DType::Bool => "astype_bool",
        DType::Int8 => "astype_int8",
        DType::Int16 => "astype_int16",
        DType::Int32 => "astype_int32",
        DType::Int64 => "astype_int64",
        DType::UInt8 => "astype_uint8",
        DType::UInt16 => "astype_uint16",
        DType::UInt32 => "astype_uint32",
        DType::UInt64 => "astype_uint64",
        DType::Float16 => "astype_float16",
        DType::Float32 => "astype_float32",
        DType::Float64 => "astype_float64",
        DType::Complex64 => "astype_complex64",
        DType::Complex128 => "astype_complex128",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_has_one_overload_per_arith_dtype() {
        let u = add();
        assert_eq!(u.overloads.len(), ARITH_DTYPES.len());
        assert_eq!(u.nin(), 2);
        assert_eq!(u.nout(), 1);
    }

    #[test]
    fn astype_ufunc_covers_every_source_dtype() {
        let u = astype_ufunc(DType::Float64);
        assert_eq!(u.overloads.len(), ALL_DTYPES.len());
        assert!(u
            .overloads
            .iter()
            .all(|o| o.out_dtypes == vec![DType::Float64]));
    }
}
