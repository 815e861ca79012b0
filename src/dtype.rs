use num_enum::TryFromPrimitive;

use crate::error::RuntimeError;

/// Numeric dtype set the fusion core understands.
///
/// Ordering matches cupy's `_dtype_list` (`'?bhilqBHILQefdFD'`), which
/// doubles as the overload-priority order for the generated `astype`
/// cast ufuncs (see [`ALL_DTYPES`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum DType {
    Bool = 0,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

/// All dtypes in promotion/astype-overload priority order.
pub const ALL_DTYPES: [DType; 14] = [
    DType::Bool,
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

/// A literal value a traced variable may carry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Const {
    Bool(bool),
    Int(i128),
    Float(f64),
    Complex(f64, f64),
}

/// Casting rule selected for overload resolution.
///
/// `Safe` mirrors `numpy.can_cast(..., casting='safe')`; `SameKind` mirrors
/// `casting='same_kind'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastRule {
    Safe,
    SameKind,
}

impl DType {
    /// C/device type string, taken verbatim from cupy's `_dtype_to_ctype`.
    #[must_use]
    pub fn ctype(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "signed char",
            Self::Int16 => "short",
            Self::Int32 => "int",
            Self::Int64 => "long long",
            Self::UInt8 => "unsigned char",
            Self::UInt16 => "unsigned short",
            Self::UInt32 => "unsigned int",
            Self::UInt64 => "unsigned long long",
            Self::Float16 => "float16",
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::Complex64 => "complex<float>",
            Self::Complex128 => "complex<double>",
        }
    }

    /// Kind score used by promotion: bool=0, (u)int=1, float/complex=2.
    ///
    /// Signed and unsigned integers share a kind score, same as cupy's
    /// `_kind_score`; this is the documented unsafe spot at
    /// signed/unsigned boundaries (see [`can_cast_scalar`]).
    #[must_use]
    pub fn kind_score(self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::Int8
            | Self::Int16
            | Self::Int32
            | Self::Int64
            | Self::UInt8
            | Self::UInt16
            | Self::UInt32
            | Self::UInt64 => 1,
            Self::Float16 | Self::Float32 | Self::Float64 | Self::Complex64 | Self::Complex128 => {
                2
            }
        }
    }

    fn is_signed_int(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }

    fn is_float(self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    fn bit_width(self) -> u32 {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 8,
            Self::Int16 | Self::UInt16 | Self::Float16 => 16,
            Self::Int32 | Self::UInt32 | Self::Float32 => 32,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Complex64 => 64,
            Self::Complex128 => 128,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, RuntimeError> {
        Self::try_from(value).map_err(|_| RuntimeError::UnknownDType)
    }
}

/// Can a value of dtype `src` be cast to dtype `dst` under `rule`?
#[must_use]
pub fn can_cast(src: DType, dst: DType, rule: CastRule) -> bool {
    if src == dst {
        return true;
    }
    match rule {
        CastRule::Safe => can_cast_safe(src, dst),
        CastRule::SameKind => can_cast_safe(src, dst) || src.kind_score() <= dst.kind_score(),
    }
}

fn can_cast_safe(src: DType, dst: DType) -> bool {
    if src == DType::Bool {
        return true;
    }
    if src.kind_score() > dst.kind_score() {
        return false;
    }
    if src.kind_score() < dst.kind_score() {
        return true;
    }
    // Same kind: only a non-narrowing cast within the kind is "safe".
    if src.is_signed_int() && dst.is_signed_int() {
        return src.bit_width() <= dst.bit_width();
    }
    if src.is_unsigned_int() && dst.is_unsigned_int() {
        return src.bit_width() <= dst.bit_width();
    }
    if src.is_unsigned_int() && dst.is_signed_int() {
        return src.bit_width() < dst.bit_width();
    }
    if src.is_signed_int() && dst.is_unsigned_int() {
        return false;
    }
    if src.is_float() && dst.is_float() {
        return src.bit_width() <= dst.bit_width();
    }
    if src.is_complex() && dst.is_complex() {
        return src.bit_width() <= dst.bit_width();
    }
    false
}

fn int_range(dtype: DType) -> Option<(i128, i128)> {
    match dtype {
        DType::Int8 => Some((i8::MIN as i128, i8::MAX as i128)),
        DType::Int16 => Some((i16::MIN as i128, i16::MAX as i128)),
        DType::Int32 => Some((i32::MIN as i128, i32::MAX as i128)),
        DType::Int64 => Some((i64::MIN as i128, i64::MAX as i128)),
        DType::UInt8 => Some((0, u8::MAX as i128)),
        DType::UInt16 => Some((0, u16::MAX as i128)),
        DType::UInt32 => Some((0, u32::MAX as i128)),
        DType::UInt64 => Some((0, u64::MAX as i128)),
        _ => None,
    }
}

/// The min-scalar `can_cast1` probe from `fusion.py`: when a scalar's
/// constant value is statically known, test whether *that concrete value*
/// fits in `dst`; otherwise fall back to probing with a zero of the
/// scalar's own dtype.
///
/// cupy's own comment on this path says the fallback "is not safe" — a
/// typed zero satisfies `numpy.can_cast` against essentially any
/// destination dtype, so an unknown-valued scalar never actually
/// constrains overload resolution. That permissiveness is preserved
/// here: this follows the permissive reading rather than failing closed.
#[must_use]
pub fn can_cast_scalar(_dtype: DType, const_value: Option<Const>, dst: DType) -> bool {
    let Some(value) = const_value else {
        return true;
    };
    match value {
        Const::Bool(_) => true,
        Const::Int(i) => {
            if dst == DType::Bool {
                i == 0 || i == 1
            } else if let Some((lo, hi)) = int_range(dst) {
                (lo..=hi).contains(&i)
            } else {
                dst.is_float() || dst.is_complex()
            }
        }
        Const::Float(_) => dst.is_float() || dst.is_complex(),
        Const::Complex(_, _) => dst.is_complex(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctype_matches_source_table() {
        assert_eq!(DType::Int32.ctype(), "int");
        assert_eq!(DType::Float64.ctype(), "double");
        assert_eq!(DType::Complex64.ctype(), "complex<float>");
        assert_eq!(DType::Float16.ctype(), "float16");
    }

    #[test]
    fn kind_scores() {
        assert_eq!(DType::Bool.kind_score(), 0);
        assert_eq!(DType::Int32.kind_score(), 1);
        assert_eq!(DType::UInt32.kind_score(), 1);
        assert_eq!(DType::Float32.kind_score(), 2);
        assert_eq!(DType::Complex64.kind_score(), 2);
    }

    #[test]
    fn safe_cast_widens_within_kind() {
        assert!(can_cast(DType::Int8, DType::Int32, CastRule::Safe));
        assert!(!can_cast(DType::Int32, DType::Int8, CastRule::Safe));
        assert!(can_cast(DType::Int32, DType::Float64, CastRule::Safe));
        assert!(!can_cast(DType::Float64, DType::Int32, CastRule::Safe));
        assert!(can_cast(DType::Bool, DType::Int8, CastRule::Safe));
    }

    #[test]
    fn same_kind_allows_narrowing_within_kind() {
        assert!(!can_cast(DType::Int32, DType::Int8, CastRule::Safe));
        assert!(can_cast(DType::Int32, DType::Int8, CastRule::SameKind));
        assert!(can_cast(DType::Float64, DType::Float32, CastRule::SameKind));
    }

    #[test]
    fn min_scalar_int_keeps_narrow_dtype() {
        // int32-array + 1 stays int32: the scalar `1`'s concrete value
        // fits the int32 overload, so that overload matches first.
        assert!(can_cast_scalar(
            DType::Int64,
            Some(Const::Int(1)),
            DType::Int32
        ));
    }

    #[test]
    fn min_scalar_float_rejects_int_overload() {
        // int32-array + 1.5 cannot resolve to an int32 overload.
        assert!(!can_cast_scalar(
            DType::Float64,
            Some(Const::Float(1.5)),
            DType::Int32
        ));
        assert!(can_cast_scalar(
            DType::Float64,
            Some(Const::Float(1.5)),
            DType::Float64
        ));
    }

    #[test]
    fn min_scalar_unknown_value_is_permissive() {
        assert!(can_cast_scalar(DType::Int64, None, DType::Bool));
        assert!(can_cast_scalar(DType::Int64, None, DType::UInt8));
    }

    #[test]
    fn from_u8_round_trips() {
        assert_eq!(DType::from_u8(DType::Float32 as u8).unwrap(), DType::Float32);
        assert!(DType::from_u8(255).is_err());
    }
}
