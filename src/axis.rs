use crate::error::{FusionError, ValueError};

/// The `axis=` argument to a reduction call: either a single axis or a
/// tuple of axes, mirroring numpy's accepted forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSpec {
    One(isize),
    Many(Vec<isize>),
}

/// Resolves an `axis=` argument against an array of rank `ndim`.
///
/// Returns the sorted, deduplication-checked list of non-negative axis
/// indices to reduce over, plus the rank of the result. `axis: None` means
/// "reduce over every axis" (result rank `0`), matching cupy's
/// `_ureduce`/`statistics/utils.py` handling of missing axis arguments.
///
/// # Errors
/// [`ValueError::AxisOutOfBounds`] if an axis falls outside
/// `[-ndim, ndim)`; [`ValueError::RepeatedAxis`] if the same axis (after
/// wraparound) appears more than once.
pub fn normalize_reduction_axis(
    ndim: usize,
    axis: Option<AxisSpec>,
) -> Result<(Vec<usize>, usize), FusionError> {
    let raw: Vec<isize> = match axis {
        None => return Ok(((0..ndim).collect(), 0)),
        Some(AxisSpec::One(a)) => vec![a],
        Some(AxisSpec::Many(axes)) => axes,
    };

    let mut resolved = Vec::with_capacity(raw.len());
    for a in raw {
        let wrapped = if a < 0 { a + ndim as isize } else { a };
        if wrapped < 0 || wrapped as usize >= ndim {
            return Err(ValueError::AxisOutOfBounds { axis: a, ndim }.into());
        }
        let wrapped = wrapped as usize;
        if resolved.contains(&wrapped) {
            return Err(ValueError::RepeatedAxis(a).into());
        }
        resolved.push(wrapped);
    }
    resolved.sort_unstable();
    let out_ndim = ndim - resolved.len();
    Ok((resolved, out_ndim))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_reduces_every_axis() {
        let (axes, out_ndim) = normalize_reduction_axis(3, None).unwrap();
        assert_eq!(axes, vec![0, 1, 2]);
        assert_eq!(out_ndim, 0);
    }

    #[test]
    fn negative_axis_wraps() {
        let (axes, out_ndim) = normalize_reduction_axis(3, Some(AxisSpec::One(-1))).unwrap();
        assert_eq!(axes, vec![2]);
        assert_eq!(out_ndim, 2);
    }

    #[test]
    fn many_axes_sorted() {
        let (axes, out_ndim) =
            normalize_reduction_axis(4, Some(AxisSpec::Many(vec![2, 0]))).unwrap();
        assert_eq!(axes, vec![0, 2]);
        assert_eq!(out_ndim, 2);
    }

    #[test]
    fn out_of_bounds_axis_errors() {
        let err = normalize_reduction_axis(2, Some(AxisSpec::One(2))).unwrap_err();
        assert!(matches!(
            err,
            FusionError::Value(ValueError::AxisOutOfBounds { axis: 2, ndim: 2 })
        ));
    }

    #[test]
    fn repeated_axis_errors() {
        let err = normalize_reduction_axis(3, Some(AxisSpec::Many(vec![0, -3]))).unwrap_err();
        assert!(matches!(
            err,
            FusionError::Value(ValueError::RepeatedAxis(-3))
        ));
    }
}
