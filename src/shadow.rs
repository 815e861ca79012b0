//! Trace-time placeholder values.
//!
//! A [`Shadow`] stands in for a future array or scalar while a function is
//! being traced: arithmetic on it never computes anything, it only records
//! an operation into whichever [`crate::history::FusionHistory`] is active
//! on the current thread (see [`crate::dispatch`]). This is the Rust
//! rendering of `_FusionVarScalar`/`_FusionVarArray`'s dunder methods in
//! the source this crate's tracer design is drawn from — operator
//! overloading plays the same role here as there, the difference is that
//! every operator returns a `Result` instead of raising, and there is no
//! `__bool__`: a `Shadow` has no conversion to `bool` at all, so branching
//! on one is a compile error rather than a trace-time exception.

use std::ops::{
    Add, AddAssign, BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Div,
    DivAssign, Mul, MulAssign, Neg, Not, Rem, RemAssign, Shl, ShlAssign, Shr, ShrAssign, Sub,
    SubAssign,
};

use crate::axis::AxisSpec;
use crate::dispatch::{self, Arg};
use crate::dtype::DType;
use crate::error::{FusionError, ValueError};
use crate::ir::Var;
use crate::reduction;
use crate::ufunc;

/// A traced scalar (`ndim` absent) or array (`ndim` present) value.
#[derive(Debug, Clone)]
pub struct Shadow {
    pub(crate) var: Var,
    ndim: isize,
    pub(crate) is_postmap: bool,
}

impl Shadow {
    pub(crate) fn scalar(var: Var, is_postmap: bool) -> Self {
        Self {
            var,
            ndim: -1,
            is_postmap,
        }
    }

    pub(crate) fn array(var: Var, ndim: usize, is_postmap: bool) -> Self {
        Self {
            var,
            ndim: ndim as isize,
            is_postmap,
        }
    }

    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.ndim < 0
    }

    #[must_use]
    pub fn ndim(&self) -> Option<usize> {
        (self.ndim >= 0).then_some(self.ndim as usize)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.var.dtype
    }

    #[must_use]
    pub fn var(&self) -> &Var {
        &self.var
    }

    /// Inserts a generated unary cast ufunc, memoized per destination dtype
    /// by the builtin ufunc table.
    ///
    /// # Errors
    /// Whatever [`crate::history::FusionHistory::call_ufunc`] returns —
    /// chiefly [`crate::error::TypeError::UnsafeOutputCast`] when an
    /// explicit `out=` narrower than `same_kind` is involved elsewhere in
    /// the same trace.
    pub fn astype(&self, dtype: DType) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc(ufunc::astype_name(dtype), vec![Arg::Shadow(self.clone())], None)
    }

    /// Traces a copy of this value through the `copy` ufunc.
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn copy(&self) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc("copy", vec![Arg::Shadow(self.clone())], None)
    }

    /// `**`: Rust has no power operator, so this is a named method.
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn pow<R: Into<Arg>>(&self, rhs: R) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc("power", vec![Arg::Shadow(self.clone()), rhs.into()], None)
    }

    /// `//`: Rust's `/` is reserved for `true_divide`, so floor division is
    /// a named method.
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn floor_div<R: Into<Arg>>(&self, rhs: R) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc(
            "floor_divide",
            vec![Arg::Shadow(self.clone()), rhs.into()],
            None,
        )
    }

    /// Comparisons return a new `Shadow` (a traced boolean array/scalar),
    /// never a plain `bool` — see the module docs on why `Shadow` has no
    /// `bool` conversion at all.
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn eq<R: Into<Arg>>(&self, rhs: R) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc("equal", vec![Arg::Shadow(self.clone()), rhs.into()], None)
    }

    /// See [`Shadow::eq`].
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn ne<R: Into<Arg>>(&self, rhs: R) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc("not_equal", vec![Arg::Shadow(self.clone()), rhs.into()], None)
    }

    /// See [`Shadow::eq`].
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn lt<R: Into<Arg>>(&self, rhs: R) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc("less", vec![Arg::Shadow(self.clone()), rhs.into()], None)
    }

    /// See [`Shadow::eq`].
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn le<R: Into<Arg>>(&self, rhs: R) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc("less_equal", vec![Arg::Shadow(self.clone()), rhs.into()], None)
    }

    /// See [`Shadow::eq`].
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn gt<R: Into<Arg>>(&self, rhs: R) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc("greater", vec![Arg::Shadow(self.clone()), rhs.into()], None)
    }

    /// See [`Shadow::eq`].
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn ge<R: Into<Arg>>(&self, rhs: R) -> Result<Shadow, FusionError> {
        dispatch::call_ufunc(
            "greater_equal",
            vec![Arg::Shadow(self.clone()), rhs.into()],
            None,
        )
    }

    /// `x[…] = value` / `x[:] = value`: the only index shape fusion
    /// accepts for assignment. Traces a `copy` ufunc with `self` as the
    /// `out=` argument.
    ///
    /// # Errors
    /// See [`Shadow::astype`].
    pub fn assign_full(&self, value: &Shadow) -> Result<(), FusionError> {
        dispatch::call_ufunc(
            "copy",
            vec![Arg::Shadow(value.clone())],
            Some(self.clone()),
        )?;
        Ok(())
    }

    /// Any index shape other than full-range assignment: always rejected.
    /// Rust's indexing traits can't dispatch on a runtime index *shape* the
    /// way a Python `__setitem__` can, so this is a plain method rather
    /// than `IndexMut`.
    ///
    /// # Errors
    /// Always [`ValueError::UnsupportedIndexForm`].
    pub fn assign_index<Idx>(&self, _index: Idx, _value: &Shadow) -> Result<(), FusionError> {
        Err(ValueError::UnsupportedIndexForm.into())
    }

    /// Reduces over `axis` (`None` reduces every axis to a scalar) by
    /// summation. At most one reduction may be traced per kernel.
    ///
    /// # Errors
    /// [`crate::error::NotImplementedError::MultipleReductions`] if a
    /// reduction was already traced; [`crate::error::TypeError::NoMatchingReduction`]
    /// if no overload accepts this dtype; axis-validation errors otherwise.
    pub fn sum(&self, axis: Option<AxisSpec>) -> Result<Shadow, FusionError> {
        dispatch::call_reduction(&reduction::sum(), self.clone(), axis)
    }

    /// See [`Shadow::sum`]; reduces by product instead.
    ///
    /// # Errors
    /// See [`Shadow::sum`].
    pub fn prod(&self, axis: Option<AxisSpec>) -> Result<Shadow, FusionError> {
        dispatch::call_reduction(&reduction::prod(), self.clone(), axis)
    }

    /// See [`Shadow::sum`]; reduces by maximum instead.
    ///
    /// # Errors
    /// See [`Shadow::sum`].
    pub fn max(&self, axis: Option<AxisSpec>) -> Result<Shadow, FusionError> {
        dispatch::call_reduction(&reduction::amax(), self.clone(), axis)
    }

    /// See [`Shadow::sum`]; reduces by minimum instead.
    ///
    /// # Errors
    /// See [`Shadow::sum`].
    pub fn min(&self, axis: Option<AxisSpec>) -> Result<Shadow, FusionError> {
        dispatch::call_reduction(&reduction::amin(), self.clone(), axis)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $ufunc:literal) => {
        impl<R: Into<Arg>> $trait<R> for Shadow {
            type Output = Result<Shadow, FusionError>;

            fn $method(self, rhs: R) -> Self::Output {
                dispatch::call_ufunc($ufunc, vec![Arg::Shadow(self), rhs.into()], None)
            }
        }
    };
}

impl_binary_op!(Add, add, "add");
impl_binary_op!(Sub, sub, "subtract");
impl_binary_op!(Mul, mul, "multiply");
impl_binary_op!(Div, div, "true_divide");
impl_binary_op!(Rem, rem, "remainder");
impl_binary_op!(BitAnd, bitand, "bitwise_and");
impl_binary_op!(BitOr, bitor, "bitwise_or");
impl_binary_op!(BitXor, bitxor, "bitwise_xor");
impl_binary_op!(Shl, shl, "left_shift");
impl_binary_op!(Shr, shr, "right_shift");

macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $ufunc:literal) => {
        /// In-place form, array-only: dispatches the named ufunc with
        /// `self` passed back in as `out=`, the same op the non-assigning
        /// form records plus a materialized write into `self`'s own
        /// variable rather than a fresh one.
        ///
        /// # Panics
        /// If no trace is active, the dtypes don't resolve to an overload,
        /// or `self` is a scalar (`out=` must be an array).
        impl<R: Into<Arg>> $trait<R> for Shadow {
            fn $method(&mut self, rhs: R) {
                *self = dispatch::call_ufunc(
                    $ufunc,
                    vec![Arg::Shadow(self.clone()), rhs.into()],
                    Some(self.clone()),
                )
                .expect("in-place ufunc call failed");
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, "add");
impl_assign_op!(SubAssign, sub_assign, "subtract");
impl_assign_op!(MulAssign, mul_assign, "multiply");
impl_assign_op!(DivAssign, div_assign, "true_divide");
impl_assign_op!(RemAssign, rem_assign, "remainder");
impl_assign_op!(BitAndAssign, bitand_assign, "bitwise_and");
impl_assign_op!(BitOrAssign, bitor_assign, "bitwise_or");
impl_assign_op!(BitXorAssign, bitxor_assign, "bitwise_xor");
impl_assign_op!(ShlAssign, shl_assign, "left_shift");
impl_assign_op!(ShrAssign, shr_assign, "right_shift");

impl Neg for Shadow {
    type Output = Result<Shadow, FusionError>;

    fn neg(self) -> Self::Output {
        dispatch::call_ufunc("negative", vec![Arg::Shadow(self)], None)
    }
}

impl Not for Shadow {
    type Output = Result<Shadow, FusionError>;

    fn not(self) -> Self::Output {
        dispatch::call_ufunc("invert", vec![Arg::Shadow(self)], None)
    }
}
