//! Interception layer: routes a ufunc/reduction call into the active trace,
//! or rejects it if none is active.
//!
//! cupy flips a `threading.local()` flag and monkeypatches each ufunc's
//! call site; this crate keeps the same "one active trace per OS thread"
//! model but renders it as a `thread_local!` slot guarded by scoped
//! acquisition (`TraceGuard`), so the slot is always cleared on the way out
//! of a trace, including early failure.

use std::cell::RefCell;

use crate::axis::AxisSpec;
use crate::dtype::Const;
use crate::error::{FusionError, TypeError};
use crate::history::FusionHistory;
use crate::reduction::Reduction;
use crate::shadow::Shadow;
use crate::ufunc::{self, Ufunc};

thread_local! {
    static ACTIVE: RefCell<Option<FusionHistory>> = const { RefCell::new(None) };
}

/// An argument to a traced ufunc call: either an already-shadowed value, or
/// a raw scalar constant to be lifted into a fresh constant local the first
/// time it's used.
#[derive(Debug, Clone)]
pub enum Arg {
    Shadow(Shadow),
    Scalar(Const),
}

impl From<Shadow> for Arg {
    fn from(s: Shadow) -> Self {
        Arg::Shadow(s)
    }
}

impl From<Const> for Arg {
    fn from(c: Const) -> Self {
        Arg::Scalar(c)
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Scalar(Const::Bool(b))
    }
}

impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Scalar(Const::Int(i128::from(i)))
    }
}

impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Arg::Scalar(Const::Float(f))
    }
}

/// RAII handle for the active-trace slot: installs `history` on
/// construction, and guarantees the slot is empty again by the time the
/// guard is dropped, on every exit path.
pub(crate) struct TraceGuard;

impl TraceGuard {
    pub(crate) fn acquire(history: FusionHistory) -> Self {
        ACTIVE.with(|cell| {
            let mut slot = cell.borrow_mut();
            assert!(slot.is_none(), "fusion trace already active on this thread");
            *slot = Some(history);
        });
        TraceGuard
    }

    pub(crate) fn finish(self) -> FusionHistory {
        let history = ACTIVE.with(|cell| cell.borrow_mut().take());
        std::mem::forget(self);
        history.expect("trace guard finished without an active history")
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        ACTIVE.with(|cell| {
            cell.borrow_mut().take();
        });
    }
}

/// Is a trace active on the current thread?
#[must_use]
pub fn is_tracing() -> bool {
    ACTIVE.with(|cell| cell.borrow().is_some())
}

fn with_active_history<R>(f: impl FnOnce(&mut FusionHistory) -> R) -> Option<R> {
    ACTIVE.with(|cell| cell.borrow_mut().as_mut().map(f))
}

/// Looks up `name` in the builtin ufunc table and routes the call into the
/// active trace's [`FusionHistory::call_ufunc`].
///
/// # Errors
/// [`TypeError::UnsupportedArgument`] if `name` names no builtin ufunc, or
/// if no trace is active (a `Shadow` only exists inside one). Otherwise
/// whatever [`FusionHistory::call_ufunc`] returns.
pub(crate) fn call_ufunc(
    name: &'static str,
    args: Vec<Arg>,
    out: Option<Shadow>,
) -> Result<Shadow, FusionError> {
    let descriptor = lookup_ufunc(name)
        .ok_or(TypeError::UnsupportedArgument("unknown ufunc"))?;
    with_active_history(|history| history.call_ufunc(&descriptor, args, out))
        .ok_or(TypeError::UnsupportedArgument("shadow used outside an active trace"))?
}

/// Routes a reduction call into the active trace's
/// [`FusionHistory::set_reduce_op`].
///
/// # Errors
/// Same conditions as [`call_ufunc`], plus whatever
/// [`FusionHistory::set_reduce_op`] returns.
pub(crate) fn call_reduction(
    reduction: &Reduction,
    arg: Shadow,
    axis: Option<AxisSpec>,
) -> Result<Shadow, FusionError> {
    with_active_history(|history| history.set_reduce_op(reduction, arg, axis))
        .ok_or(TypeError::UnsupportedArgument("shadow used outside an active trace"))?
}

fn lookup_ufunc(name: &str) -> Option<Ufunc> {
    match name {
        "add" => Some(ufunc::add()),
        "subtract" => Some(ufunc::subtract()),
        "multiply" => Some(ufunc::multiply()),
        "true_divide" => Some(ufunc::true_divide()),
        "floor_divide" => Some(ufunc::floor_divide()),
        "remainder" => Some(ufunc::remainder()),
        "power" => Some(ufunc::power()),
        "left_shift" => Some(ufunc::left_shift()),
        "right_shift" => Some(ufunc::right_shift()),
        "bitwise_and" => Some(ufunc::bitwise_and()),
        "bitwise_or" => Some(ufunc::bitwise_or()),
        "bitwise_xor" => Some(ufunc::bitwise_xor()),
        "negative" => Some(ufunc::negative()),
        "invert" => Some(ufunc::invert()),
        "less" => Some(ufunc::less()),
        "less_equal" => Some(ufunc::less_equal()),
        "equal" => Some(ufunc::equal()),
        "not_equal" => Some(ufunc::not_equal()),
        "greater" => Some(ufunc::greater()),
        "greater_equal" => Some(ufunc::greater_equal()),
        "copy" => Some(ufunc::copy()),
        _ => {
            let dtype = crate::dtype::ALL_DTYPES
                .iter()
                .find(|&&d| ufunc::astype_name(d) == name)?;
            Some(ufunc::astype_ufunc(*dtype))
        }
    }
}

pub(crate) fn acquire_trace(history: FusionHistory) -> TraceGuard {
    TraceGuard::acquire(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_trace_is_active_by_default() {
        assert!(!is_tracing());
    }

    #[test]
    fn lookup_finds_arithmetic_and_astype_ufuncs() {
        assert!(lookup_ufunc("add").is_some());
        assert!(lookup_ufunc("astype_float64").is_some());
        assert!(lookup_ufunc("bogus").is_none());
    }
}
