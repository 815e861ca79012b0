//! The tracer: owns the op list, local/param lists, reduction state, and
//! submodule set for one trace, and knows how to emit device source from
//! them. One `FusionHistory` exists per trace and is discarded once its
//! kernel has been compiled and cached — ported method-by-method from the
//! `_FusionHistory` class this crate's design is grounded on.

use std::collections::{HashMap, HashSet};

use crate::axis::{normalize_reduction_axis, AxisSpec};
use crate::backend::{ElementwiseKernel, Kernel, ReductionKernel};
use crate::dispatch::Arg;
use crate::dtype::{can_cast, can_cast_scalar, CastRule, Const, DType};
use crate::error::{FusionError, NotImplementedError, TypeError, ValueError};
use crate::ir::{Op, Var};
use crate::reduction::Reduction;
use crate::shadow::Shadow;
use crate::submodule::Submodule;
use crate::ufunc::{self, Ufunc};

/// A non-fatal diagnostic accumulated during a trace, surfaced to the
/// caller from [`FusionHistory::compile`] rather than printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FusionWarning {
    ShapeMismatch { expected_ndim: usize, got_ndim: usize },
}

/// What a traced function returned: nothing, one value, or a tuple that
/// may contain dropped (`None`) slots.
#[derive(Debug)]
pub enum TraceOutcome<T> {
    None,
    Single(T),
    Tuple(Vec<Option<T>>),
}

/// `axis`/`out` carried from a reduction call through to the launch site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchKwargs {
    pub axis: Option<AxisSpec>,
}

#[derive(Debug, Clone)]
struct ReduceState {
    combine: &'static str,
    identity: &'static str,
    postmap_cast: &'static str,
    reduce_ctype: Option<&'static str>,
    out_dtype: DType,
    axis: Option<AxisSpec>,
    out_rank: usize,
}

type SubmoduleKey = (&'static str, Vec<DType>);

pub struct FusionHistory {
    count: usize,
    preambles: HashSet<&'static str>,
    preamble_order: Vec<&'static str>,
    submodules: HashMap<SubmoduleKey, Submodule>,
    submodule_order: Vec<SubmoduleKey>,
    op_list: Vec<Op>,
    postmap_op_list: Vec<Op>,
    param_list: Vec<Var>,
    out_param_list: Vec<Var>,
    local_list: Vec<Var>,
    postmap_local_list: Vec<Var>,
    reduce: Option<ReduceState>,
    premap_ret: Option<Var>,
    postmap_param: Option<Var>,
    ndim: usize,
    warnings: Vec<FusionWarning>,
}

impl FusionHistory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: 0,
            preambles: HashSet::new(),
            preamble_order: Vec::new(),
            submodules: HashMap::new(),
            submodule_order: Vec::new(),
            op_list: Vec::new(),
            postmap_op_list: Vec::new(),
            param_list: Vec::new(),
            out_param_list: Vec::new(),
            local_list: Vec::new(),
            postmap_local_list: Vec::new(),
            reduce: None,
            premap_ret: None,
            postmap_param: None,
            ndim: 0,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn op_count(&self) -> usize {
        self.op_list.len() + self.postmap_op_list.len()
    }

    #[must_use]
    pub fn var_count(&self) -> usize {
        self.count
    }

    fn fresh_index(&mut self) -> usize {
        let i = self.count;
        self.count += 1;
        i
    }

    pub(crate) fn fresh_premap_param(&mut self, dtype: DType) -> Var {
        let idx = self.fresh_index();
        let var = Var::new(idx, dtype, None);
        self.param_list.push(var.clone());
        var
    }

    fn fresh_local(&mut self, dtype: DType, const_value: Option<Const>) -> Var {
        let idx = self.fresh_index();
        let var = Var::new(idx, dtype, const_value);
        if self.reduce.is_some() {
            self.postmap_local_list.push(var.clone());
        } else {
            self.local_list.push(var.clone());
        }
        var
    }

    fn is_postmap(&self) -> bool {
        self.reduce.is_some()
    }

    fn append_preamble(&mut self, preamble: &'static str) {
        if !preamble.is_empty() && self.preambles.insert(preamble) {
            self.preamble_order.push(preamble);
        }
    }

    /// When a caller writes into an existing input param via `out=`, the
    /// mutation has to reach the declaration actually emitted for that
    /// param, not just the cloned [`Var`] returned from this call.
    fn sync_param_mutation(&mut self, var: &Var) {
        if let Some(p) = self.param_list.iter_mut().find(|p| p.index == var.index) {
            p.mutate();
        }
    }

    fn insert_submodule(&mut self, submodule: Submodule) -> Submodule {
        let key = submodule.key();
        if !self.submodules.contains_key(&key) {
            self.submodule_order.push(key.clone());
            self.submodules.insert(key.clone(), submodule);
        }
        self.submodules[&key].clone()
    }

    /// Traces one ufunc call: lifts arguments, checks
    /// rank and phase consistency, resolves an overload under the min-
    /// scalar or uniform casting rule, materializes the output, and
    /// appends an operation to the current phase.
    ///
    /// # Errors
    /// [`TypeError::OutputNotArray`], [`ValueError::NonBroadcastableOutput`],
    /// [`TypeError::NoMatchingOverload`], [`TypeError::UnsafeOutputCast`],
    /// or [`crate::error::RuntimeError::ShapeMismatch`] when a pre-map
    /// shadow is mixed into post-map scope or vice versa.
    pub(crate) fn call_ufunc(
        &mut self,
        ufunc: &Ufunc,
        args: Vec<Arg>,
        out: Option<Shadow>,
    ) -> Result<Shadow, FusionError> {
        let is_postmap = self.is_postmap();

        let mut shadows = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Shadow(s) => {
                    if s.is_postmap != is_postmap {
                        return Err(crate::error::RuntimeError::ShapeMismatch.into());
                    }
                    shadows.push(s);
                }
                Arg::Scalar(c) => {
                    let dtype = dtype_of_const(c);
                    let var = self.fresh_local(dtype, Some(c));
                    shadows.push(Shadow::scalar(var, is_postmap));
                }
            }
        }

        if let Some(o) = &out {
            if o.is_scalar() {
                return Err(TypeError::OutputNotArray.into());
            }
        }

        let ndim = shadows.iter().filter_map(Shadow::ndim).max().unwrap_or(0);
        if let Some(o) = &out {
            if o.ndim().unwrap_or(0) < ndim {
                return Err(ValueError::NonBroadcastableOutput.into());
            }
        }
        if shadows.iter().any(|s| !s.is_scalar()) && ndim < self.ndim {
            self.warnings.push(FusionWarning::ShapeMismatch {
                expected_ndim: self.ndim,
                got_ndim: ndim,
            });
        }
        self.ndim = self.ndim.max(ndim);

        let any_scalar = shadows.iter().any(Shadow::is_scalar);
        let max_array_kind = shadows
            .iter()
            .filter(|s| !s.is_scalar())
            .map(|s| s.dtype().kind_score())
            .max();
        let max_scalar_kind = shadows
            .iter()
            .filter(|s| s.is_scalar())
            .map(|s| s.dtype().kind_score())
            .max();
        let use_min_scalar = any_scalar
            && max_array_kind
                .zip(max_scalar_kind)
                .is_some_and(|(array_kind, scalar_kind)| array_kind >= scalar_kind);

        let overload = ufunc
            .overloads
            .iter()
            .find(|ov| {
                ov.in_dtypes.len() == shadows.len()
                    && ov.in_dtypes.iter().zip(&shadows).all(|(&dst, s)| {
                        if use_min_scalar && s.is_scalar() {
                            can_cast_scalar(s.dtype(), s.var().const_value, dst)
                        } else {
                            can_cast(s.dtype(), dst, CastRule::Safe)
                        }
                    })
            })
            .ok_or_else(|| TypeError::NoMatchingOverload {
                ufunc: ufunc.name,
                in_dtypes: shadows.iter().map(Shadow::dtype).collect(),
                out_dtypes: Vec::new(),
            })?;

        let out_dtype = overload.out_dtypes[0];
        let mut out_var = match &out {
            Some(o) => {
                if !can_cast(out_dtype, o.dtype(), CastRule::SameKind) {
                    return Err(TypeError::UnsafeOutputCast {
                        from: out_dtype,
                        to: o.dtype(),
                    }
                    .into());
                }
                o.var().clone()
            }
            None => self.fresh_local(out_dtype, None),
        };
        out_var.mutate();
        self.sync_param_mutation(&out_var);

        let in_params: Vec<(DType, String)> = shadows
            .iter()
            .enumerate()
            .map(|(i, s)| (s.dtype(), format!("in{i}")))
            .collect();
        let out_params = vec![(out_dtype, "out0".to_string())];
        let submodule = Submodule::new(ufunc, in_params, out_params, overload.body);
        let submodule = self.insert_submodule(submodule);
        self.append_preamble(ufunc.preamble);

        let mut op_args: Vec<Var> = shadows.iter().map(|s| s.var().clone()).collect();
        op_args.push(out_var.clone());
        let op_index = if is_postmap {
            self.postmap_op_list.len()
        } else {
            self.op_list.len()
        };
        let op = Op::new(op_index, submodule, op_args);
        if is_postmap {
            self.postmap_op_list.push(op);
        } else {
            self.op_list.push(op);
        }

        Ok(if shadows.iter().all(Shadow::is_scalar) {
            Shadow::scalar(out_var, is_postmap)
        } else {
            Shadow::array(out_var, ndim, is_postmap)
        })
    }

    /// Traces a reduction. May be called at most once per trace.
    ///
    /// # Errors
    /// [`NotImplementedError::MultipleReductions`] on a second call;
    /// [`TypeError::NoMatchingReduction`] if no overload's input dtype the
    /// argument can safely cast to; axis validation errors from
    /// [`normalize_reduction_axis`].
    pub(crate) fn set_reduce_op(
        &mut self,
        reduction: &Reduction,
        arg: Shadow,
        axis: Option<AxisSpec>,
    ) -> Result<Shadow, FusionError> {
        if self.reduce.is_some() {
            return Err(NotImplementedError::MultipleReductions.into());
        }

        let overload = reduction
            .overloads
            .iter()
            .find(|ov| can_cast(arg.dtype(), ov.in_dtype, CastRule::Safe))
            .ok_or_else(|| TypeError::NoMatchingReduction {
                reduction: reduction.name,
                dtype: arg.dtype(),
            })?;

        let current_ndim = arg.ndim().unwrap_or(0).max(1);
        let (_, out_rank) = normalize_reduction_axis(current_ndim, axis.clone())?;

        self.append_preamble(reduction.preamble);
        self.premap_ret = Some(arg.var().clone());

        let out_var = self.fresh_local(overload.out_dtype, None);
        self.postmap_param = Some(out_var.clone());

        self.reduce = Some(ReduceState {
            combine: overload.combine,
            identity: reduction.identity,
            postmap_cast: "out0 = a",
            reduce_ctype: overload.accum_ctype,
            out_dtype: overload.out_dtype,
            axis,
            out_rank,
        });

        Ok(if out_rank == 0 {
            Shadow::scalar(out_var, true)
        } else {
            Shadow::array(out_var, out_rank, true)
        })
    }

    fn emit_submodules(&self) -> String {
        self.submodule_order
            .iter()
            .map(|key| self.submodules[key].code())
            .collect()
    }

    fn all_preambles(&self) -> String {
        self.preamble_order.join("\n")
    }

    /// Builds one placeholder shadow per declared input, runs `trace`, and
    /// emits either an element-wise or a reduction kernel depending on
    /// whether a reduction was set during the run.
    ///
    /// # Errors
    /// Whatever `trace` returns, plus [`TypeError::OutputNotArray`] if a
    /// returned value isn't what the caller's declared output expects.
    pub fn compile(
        mut self,
        inputs: &[(DType, Option<usize>)],
        trace: impl FnOnce(&[Shadow]) -> Result<TraceOutcome<Shadow>, FusionError>,
        name: &str,
    ) -> Result<(Kernel, LaunchKwargs, Vec<FusionWarning>), FusionError> {
        let shadows: Vec<Shadow> = inputs
            .iter()
            .map(|&(dtype, rank)| {
                let var = self.fresh_premap_param(dtype);
                match rank {
                    None => Shadow::scalar(var, false),
                    Some(r) => Shadow::array(var, r, false),
                }
            })
            .collect();

        // `trace` dispatches through `crate::dispatch`'s thread-local slot
        // (Shadow's operators and `call_reduction` both go through it), so
        // this history must be installed as the active trace while it runs.
        let guard = crate::dispatch::acquire_trace(self);
        let outcome = trace(&shadows);
        self = guard.finish();
        let outcome = outcome?;

        let returns: Vec<Shadow> = match outcome {
            TraceOutcome::None => Vec::new(),
            TraceOutcome::Single(s) => vec![s],
            TraceOutcome::Tuple(items) => items.into_iter().flatten().collect(),
        };

        for r in &returns {
            let mut out_param = self.fresh_premap_param(r.dtype());
            out_param.mutate();
            self.out_param_list.push(out_param.clone());

            let copy_ufunc = ufunc::copy();
            let submodule = Submodule::new(
                &copy_ufunc,
                vec![(r.dtype(), "in0".to_string())],
                vec![(r.dtype(), "out0".to_string())],
                "out0 = in0",
            );
            let submodule = self.insert_submodule(submodule);

            let op_index = if self.is_postmap() {
                self.postmap_op_list.len()
            } else {
                self.op_list.len()
            };
            let op = Op::new(op_index, submodule, vec![r.var().clone(), out_param]);
            if self.is_postmap() {
                self.postmap_op_list.push(op);
            } else {
                self.op_list.push(op);
            }
        }

        let warnings = std::mem::take(&mut self.warnings);

        if self.reduce.is_none() {
            let kernel = ElementwiseKernel {
                name: name.to_string(),
                in_params: declare_params(&self.param_list, Var::declaration_in_param),
                out_params: declare_params(&self.out_param_list, Var::declaration_out_param),
                operation: format!(
                    "{}{}{}",
                    self.emit_submodules(),
                    emit_local_decls(&self.local_list),
                    emit_ops(&self.op_list),
                ),
                preamble: self.all_preambles(),
            };
            Ok((Kernel::Elementwise(kernel), LaunchKwargs::default(), warnings))
        } else {
            let state = self.reduce.clone().expect("reduce state checked above");
            let premap_ret = self.premap_ret.clone().expect("set alongside reduce state");
            let postmap_param = self
                .postmap_param
                .clone()
                .expect("set alongside reduce state");

            let pre_map = format!(
                "__device__ {} _pre_map({}) {{\n{}{}return {};\n}}\n",
                premap_ret.dtype.ctype(),
                declare_params(&self.param_list, Var::declaration_in_param),
                emit_local_decls(&self.local_list),
                emit_ops(&self.op_list),
                premap_ret.name(),
            );

            let (reduce_ctype, raw_typedefs) = match state.reduce_ctype {
                Some(ctype) => (ctype.to_string(), String::new()),
                None => {
                    let out_ctype = state.out_dtype.ctype();
                    (
                        "type_in0_raw".to_string(),
                        format!(
                            "typedef {out} type_in0_raw;\ntypedef {out} type_out0_raw;\n",
                            out = out_ctype
                        ),
                    )
                }
            };
            let postmap_cast = format!(
                "__device__ {} _postmap_cast({} a) {{\n{} out0;\n{};\nreturn out0;\n}}\n",
                state.out_dtype.ctype(),
                reduce_ctype,
                state.out_dtype.ctype(),
                state.postmap_cast,
            );

            let post_map = format!(
                "__device__ void _post_map({} in, {}) {{\n{} = in;\n{}{}}}\n",
                postmap_param.dtype.ctype(),
                declare_params(&self.out_param_list, Var::declaration_out_param),
                postmap_param.name(),
                emit_local_decls(&self.postmap_local_list),
                emit_ops(&self.postmap_op_list),
            );

            let out_names: Vec<String> = self.out_param_list.iter().map(Var::name).collect();
            let in_names: Vec<String> = self.param_list.iter().map(Var::name).collect();

            let kernel = ReductionKernel {
                name: name.to_string(),
                in_params: declare_params(&self.param_list, Var::declaration_in_param),
                out_params: declare_params(&self.out_param_list, Var::declaration_out_param),
                map_expr: format!("_pre_map({})", in_names.join(", ")),
                reduce_expr: state.combine.to_string(),
                post_map_expr: format!("_post_map(_postmap_cast(a), {})", out_names.join(", ")),
                identity: state.identity.to_string(),
                preamble: format!(
                    "{}{}{}{}{}{}",
                    self.emit_submodules(),
                    self.all_preambles(),
                    pre_map,
                    raw_typedefs,
                    postmap_cast,
                    post_map,
                ),
            };
            Ok((Kernel::Reduction(kernel), LaunchKwargs { axis: state.axis }, warnings))
        }
    }
}

impl Default for FusionHistory {
    fn default() -> Self {
        Self::new()
    }
}

fn declare_params(vars: &[Var], render: impl Fn(&Var) -> String) -> String {
    vars.iter().map(render).collect::<Vec<_>>().join(", ")
}

fn emit_local_decls(locals: &[Var]) -> String {
    locals.iter().map(Var::declaration).collect()
}

fn emit_ops(ops: &[Op]) -> String {
    ops.iter()
        .map(|op| format!("{}{}", op.declaration_args(), op.code()))
        .collect()
}

fn dtype_of_const(c: Const) -> DType {
    match c {
        Const::Bool(_) => DType::Bool,
        Const::Int(_) => DType::Int64,
        Const::Float(_) => DType::Float64,
        Const::Complex(_, _) => DType::Complex128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Arg;

    #[test]
    fn call_ufunc_allocates_a_dense_variable_range() {
        let mut history = FusionHistory::new();
        let x = history.fresh_premap_param(DType::Int32);
        let y = history.fresh_premap_param(DType::Int32);
        let shadow = history
            .call_ufunc(
                &ufunc::add(),
                vec![
                    Arg::Shadow(Shadow::array(x, 1, false)),
                    Arg::Shadow(Shadow::array(y, 1, false)),
                ],
                None,
            )
            .unwrap();
        assert_eq!(shadow.dtype(), DType::Int32);
        assert_eq!(history.var_count(), 3);
        assert_eq!(history.op_count(), 1);
    }

    #[test]
    fn min_scalar_keeps_narrow_overload() {
        let mut history = FusionHistory::new();
        let x = history.fresh_premap_param(DType::Int32);
        let shadow = history
            .call_ufunc(
                &ufunc::add(),
                vec![
                    Arg::Shadow(Shadow::array(x, 1, false)),
                    Arg::Scalar(Const::Int(1)),
                ],
                None,
            )
            .unwrap();
        assert_eq!(shadow.dtype(), DType::Int32);
    }

    #[test]
    fn second_reduction_is_not_implemented() {
        let mut history = FusionHistory::new();
        let x = history.fresh_premap_param(DType::Float32);
        let shadow = Shadow::array(x, 1, false);
        let first = history
            .set_reduce_op(&crate::reduction::sum(), shadow.clone(), None)
            .unwrap();
        let err = history
            .set_reduce_op(&crate::reduction::sum(), first, None)
            .unwrap_err();
        assert!(matches!(
            err,
            FusionError::NotImplemented(NotImplementedError::MultipleReductions)
        ));
    }

    #[test]
    fn compile_elementwise_kernel_has_no_launch_axis() {
        let history = FusionHistory::new();
        let (kernel, kwargs, warnings) = history
            .compile(
                &[(DType::Float32, Some(1)), (DType::Float32, Some(1))],
                |args| {
                    let sum = (args[0].clone() + args[1].clone())?;
                    Ok(TraceOutcome::Single(sum))
                },
                "fuse_add",
            )
            .unwrap();
        assert!(matches!(kernel, Kernel::Elementwise(_)));
        assert_eq!(kwargs.axis, None);
        assert!(warnings.is_empty());
    }

    #[test]
    fn compile_reduction_kernel_emits_pre_and_post_map() {
        let history = FusionHistory::new();
        let (kernel, _kwargs, _warnings) = history
            .compile(
                &[(DType::Int32, Some(1))],
                |args| {
                    let reduced =
                        crate::dispatch::call_reduction(&crate::reduction::sum(), args[0].clone(), None)?;
                    Ok(TraceOutcome::Single(reduced))
                },
                "fuse_sum",
            )
            .unwrap();
        match kernel {
            Kernel::Reduction(r) => {
                assert!(r.preamble.contains("_pre_map"));
                assert!(r.preamble.contains("_post_map"));
            }
            Kernel::Elementwise(_) => panic!("expected a reduction kernel"),
        }
    }

    #[test]
    fn null_reduce_ctype_typedefs_to_the_output_ctype() {
        let history = FusionHistory::new();
        let (kernel, _kwargs, _warnings) = history
            .compile(
                &[(DType::Int32, Some(1))],
                |args| {
                    let reduced =
                        crate::dispatch::call_reduction(&crate::reduction::sum(), args[0].clone(), None)?;
                    Ok(TraceOutcome::Single(reduced))
                },
                "fuse_sum",
            )
            .unwrap();
        match kernel {
            Kernel::Reduction(r) => {
                assert!(r.preamble.contains("typedef int type_in0_raw;"));
                assert!(r.preamble.contains("typedef int type_out0_raw;"));
                assert!(r.preamble.contains("_postmap_cast(type_in0_raw a)"));
            }
            Kernel::Elementwise(_) => panic!("expected a reduction kernel"),
        }
    }
}
