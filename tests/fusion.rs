use kernel_fusion::{
    axis::AxisSpec,
    backend::{Kernel, SourceOnlyBackend},
    dtype::{Const, DType},
    error::{FusionError, NotImplementedError, ValueError},
    fusion::{fuse, FusedOperand, Traced},
    history::{FusionHistory, TraceOutcome},
    reference,
};

fn elementwise(kernel: Kernel) -> kernel_fusion::backend::ElementwiseKernel {
    match kernel {
        Kernel::Elementwise(k) => k,
        Kernel::Reduction(_) => panic!("expected an elementwise kernel"),
    }
}

fn reduction(kernel: Kernel) -> kernel_fusion::backend::ReductionKernel {
    match kernel {
        Kernel::Reduction(k) => k,
        Kernel::Elementwise(_) => panic!("expected a reduction kernel"),
    }
}

/// `@fuse def f(x, y): return x + y` on two float32 rank-1 arrays.
#[test]
fn add_two_float32_arrays_emits_one_submodule() {
    let history = FusionHistory::new();
    let (kernel, kwargs, warnings) = history
        .compile(
            &[(DType::Float32, Some(1)), (DType::Float32, Some(1))],
            |args| Ok(TraceOutcome::Single((args[0].clone() + args[1].clone())?)),
            "f",
        )
        .unwrap();
    assert!(warnings.is_empty());
    assert_eq!(kwargs.axis, None);
    let k = elementwise(kernel);
    assert_eq!(k.operation.matches("__device__ void add(").count(), 1);

    let x = [Const::Float(1.0), Const::Float(2.0), Const::Float(3.0)];
    let y = [Const::Float(4.0), Const::Float(5.0), Const::Float(6.0)];
    let result: Vec<Const> = x
        .iter()
        .zip(y.iter())
        .map(|(&a, &b)| reference::eval_binary("add", a, b).unwrap())
        .collect();
    assert_eq!(
        result,
        vec![Const::Float(5.0), Const::Float(7.0), Const::Float(9.0)]
    );
}

/// `@fuse def g(x): return (x * 2).astype('float64')` on an int32 rank-2
/// array: multiply submodule plus astype submodule, min-scalar keeps the
/// multiply in int32, final output float64.
#[test]
fn multiply_then_astype_keeps_intermediate_dtype() {
    let history = FusionHistory::new();
    let (kernel, _kwargs, _warnings) = history
        .compile(
            &[(DType::Int32, Some(2))],
            |args| {
                let doubled = (args[0].clone() * Const::Int(2))?;
                assert_eq!(doubled.dtype(), DType::Int32, "min-scalar keeps int32");
                let cast = doubled.astype(DType::Float64)?;
                Ok(TraceOutcome::Single(cast))
            },
            "g",
        )
        .unwrap();
    let k = elementwise(kernel);
    assert!(k.operation.contains("__device__ void multiply("));
    assert!(k.operation.contains("__device__ void astype_float64("));
    assert!(k.out_params.contains("double"));
}

/// `@fuse def h(x): return cupy.sum(x, axis=0)` on a float32 3x4 array.
#[test]
fn sum_over_an_axis_emits_reduction_kernel() {
    let history = FusionHistory::new();
    let (kernel, kwargs, _warnings) = history
        .compile(
            &[(DType::Float32, Some(2))],
            |args| Ok(TraceOutcome::Single(args[0].sum(Some(AxisSpec::One(0)))?)),
            "h",
        )
        .unwrap();
    assert_eq!(kwargs.axis, Some(AxisSpec::One(0)));
    let k = reduction(kernel);
    assert!(k.preamble.contains("_pre_map"));
    assert!(k.preamble.contains("_post_map"));
    assert_eq!(k.identity, "0");
}

/// `@fuse def k(x, y): return cupy.sum(x * y)` on two int32 rank-1 arrays:
/// multiply fuses into pre-map, single reduction kernel, scalar output.
#[test]
fn fused_multiply_then_sum_reduces_to_scalar() {
    let history = FusionHistory::new();
    let (kernel, kwargs, _warnings) = history
        .compile(
            &[(DType::Int32, Some(1)), (DType::Int32, Some(1))],
            |args| {
                let product = (args[0].clone() * args[1].clone())?;
                Ok(TraceOutcome::Single(product.sum(None)?))
            },
            "k",
        )
        .unwrap();
    assert_eq!(kwargs.axis, None);
    let k = reduction(kernel);
    assert!(k.preamble.contains("__device__ void multiply("));
    assert!(k.preamble.contains("multiply(v0_0, v0_1, v0_2);"));
}

/// `@fuse def m(x, y): x += y; return x` on float32 arrays: the `x`
/// parameter must drop its `const` qualifier once it's written to, via the
/// real `+=` operator rather than a `copy`-based simulation of it.
#[test]
fn in_place_add_marks_the_target_mutable() {
    let history = FusionHistory::new();
    let (kernel, _kwargs, _warnings) = history
        .compile(
            &[(DType::Float32, Some(1)), (DType::Float32, Some(1))],
            |args| {
                let mut x = args[0].clone();
                let y = args[1].clone();
                x += y;
                Ok(TraceOutcome::Single(x))
            },
            "m",
        )
        .unwrap();
    let k = elementwise(kernel);
    assert!(
        k.in_params.contains("_non_const float v0"),
        "in-place target must lose its const qualifier: {}",
        k.in_params
    );
    assert_eq!(k.operation.matches("__device__ void add(").count(), 1);
}

/// `@fuse def bad(x): return x[0]` raises a `ValueError` at trace time.
#[test]
fn unsupported_index_assignment_errors() {
    let history = FusionHistory::new();
    let err = history
        .compile(
            &[(DType::Float32, Some(1)), (DType::Float32, Some(1))],
            |args| {
                args[0].assign_index(0usize, &args[1])?;
                Ok(TraceOutcome::Single(args[0].clone()))
            },
            "bad",
        )
        .unwrap_err();
    assert!(matches!(err, FusionError::Value(ValueError::UnsupportedIndexForm)));
}

/// A second reduction within one trace raises Not-implemented.
#[test]
fn second_reduction_in_one_trace_is_rejected() {
    let history = FusionHistory::new();
    let err = history
        .compile(
            &[(DType::Float32, Some(2))],
            |args| {
                let first = args[0].sum(None)?;
                let _second = first.sum(None)?;
                unreachable!()
            },
            "double_reduce",
        )
        .unwrap_err();
    assert!(matches!(
        err,
        FusionError::NotImplemented(NotImplementedError::MultipleReductions)
    ));
}

/// Constant-aware promotion: `int32-array + 1` stays int32, `int32-array +
/// 1.5` promotes to float64.
#[test]
fn min_scalar_promotion_matches_the_literal_kind() {
    let keeps_int32 = FusionHistory::new()
        .compile(
            &[(DType::Int32, Some(1))],
            |args| Ok(TraceOutcome::Single((args[0].clone() + Const::Int(1))?)),
            "p1",
        )
        .unwrap();
    assert!(elementwise(keeps_int32.0).out_params.starts_with("int v"));

    let promotes_float64 = FusionHistory::new()
        .compile(
            &[(DType::Int32, Some(1))],
            |args| Ok(TraceOutcome::Single((args[0].clone() + Const::Float(1.5))?)),
            "p2",
        )
        .unwrap();
    assert!(elementwise(promotes_float64.0).out_params.starts_with("double v"));
}

/// Submodules and preambles are deduplicated by `(name, dtypes)` even when
/// the same ufunc is traced multiple times.
#[test]
fn repeated_ufunc_calls_dedup_submodules() {
    let (kernel, _kwargs, _warnings) = FusionHistory::new()
        .compile(
            &[(DType::Float32, Some(1))],
            |args| {
                let a = (args[0].clone() + Const::Float(1.0))?;
                let b = (a + Const::Float(1.0))?;
                Ok(TraceOutcome::Single(b))
            },
            "repeat",
        )
        .unwrap();
    let k = elementwise(kernel);
    assert_eq!(k.operation.matches("__device__ void add(").count(), 1);
    assert_eq!(k.operation.matches("add(v0_0, v0_1, v0_2);").count(), 1);
    assert_eq!(k.operation.matches("add(v1_0, v1_1, v1_2);").count(), 1);
}

struct AddOne;

impl Traced for AddOne {
    fn name(&self) -> &'static str {
        "add_one"
    }

    fn trace<T: FusedOperand>(&self, args: Vec<T>) -> Result<TraceOutcome<T>, FusionError> {
        let mut it = args.into_iter();
        let x = it.next().expect("one argument");
        Ok(TraceOutcome::Single((x.clone() + x)?))
    }
}

/// Calling a fused function on host arrays bypasses fusion and returns the
/// same result as running it directly, with no trace state left installed.
#[test]
fn bypass_on_host_arrays_matches_direct_execution() {
    use kernel_fusion::{device::Tensor, dispatch};

    let fusion = fuse(AddOne);
    let mut backend = SourceOnlyBackend::new();
    let host = Tensor::host_array(DType::Int32, vec![2], vec![Const::Int(3), Const::Int(4)]);
    let fused_result = fusion.call(vec![host.clone()], &mut backend).unwrap();

    let direct = match AddOne.trace(vec![host]).unwrap() {
        TraceOutcome::Single(t) => t,
        _ => panic!("expected a single tensor"),
    };
    assert_eq!(fused_result.data, direct.data);
    assert_eq!(backend.launches.len(), 0);
    assert!(!dispatch::is_tracing());
}
