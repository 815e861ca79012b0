use crate::dtype::DType;

/// One typed overload of a [`Reduction`]: input dtype, output dtype, the
/// per-element combine expression, and an optional override ctype for the
/// running accumulator (falls back to the output dtype's ctype when absent).
#[derive(Debug, Clone)]
pub struct ReductionOverload {
    pub in_dtype: DType,
    pub out_dtype: DType,
    pub combine: &'static str,
    pub accum_ctype: Option<&'static str>,
}

/// A reduction descriptor: identity element, optional preamble, and a typed
/// overload table, matching the `raw._ops` shape referenced from
/// `fusion.py`'s reduction path.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub name: &'static str,
    pub identity: &'static str,
    pub preamble: &'static str,
    pub overloads: Vec<ReductionOverload>,
}

impl Reduction {
    /// First overload whose `in_dtype` equals `dtype`, if any.
    #[must_use]
    pub fn exact_overload(&self, dtype: DType) -> Option<&ReductionOverload> {
        self.overloads.iter().find(|o| o.in_dtype == dtype)
    }
}

const SUM_DTYPES: [DType; 12] = [
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
];

/// `sum`: pairwise accumulation via `+=`, identity `0`.
#[must_use]
pub fn sum() -> Reduction {
    Reduction {
        name: "sum",
        identity: "0",
        preamble: "",
        overloads: SUM_DTYPES
            .iter()
            .map(|&d| ReductionOverload {
                in_dtype: d,
                out_dtype: d,
                combine: "a + b",
                accum_ctype: None,
            })
            .collect(),
    }
}

/// `prod`: pairwise accumulation via `*=`, identity `1`.
#[must_use]
pub fn prod() -> Reduction {
    Reduction {
        name: "prod",
        identity: "1",
        preamble: "",
        overloads: SUM_DTYPES
            .iter()
            .map(|&d| ReductionOverload {
                in_dtype: d,
                out_dtype: d,
                combine: "a * b",
                accum_ctype: None,
            })
            .collect(),
    }
}

/// `amax`: no identity element; a zero-size reduction is the caller's error
/// to avoid, matching cupy's `ReductionKernel` without `identity`.
#[must_use]
pub fn amax() -> Reduction {
    Reduction {
        name: "amax",
        identity: "",
        preamble: "",
        overloads: SUM_DTYPES
            .iter()
            .filter(|d| !matches!(d, DType::Complex64))
            .map(|&d| ReductionOverload {
                in_dtype: d,
                out_dtype: d,
                combine: "a > b ? a : b",
                accum_ctype: None,
            })
            .collect(),
    }
}

/// `amin`: counterpart of [`amax`].
#[must_use]
pub fn amin() -> Reduction {
    Reduction {
        name: "amin",
        identity: "",
        preamble: "",
        overloads: SUM_DTYPES
            .iter()
            .filter(|d| !matches!(d, DType::Complex64))
            .map(|&d| ReductionOverload {
                in_dtype: d,
                out_dtype: d,
                combine: "a < b ? a : b",
                accum_ctype: None,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_has_an_overload_per_numeric_dtype() {
        let r = sum();
        assert_eq!(r.overloads.len(), SUM_DTYPES.len());
        assert_eq!(r.exact_overload(DType::Int32).unwrap().combine, "a + b");
        assert!(r.exact_overload(DType::Bool).is_none());
    }

    #[test]
    fn amax_has_no_identity() {
        assert_eq!(amax().identity, "");
    }
}
