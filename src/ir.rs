use bitflags::bitflags;

use crate::dtype::{Const, DType};
use crate::submodule::Submodule;

bitflags! {
    /// Flags tracked per [`Var`].
    ///
    /// `MUTABLE` flips on the first time a ufunc writes to the variable as
    /// an output; a constant variable with `MUTABLE` set is declared
    /// without the `const` qualifier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VarFlags: u8 {
        const MUTABLE = 0b01;
    }
}

/// A numbered SSA-style CUDA variable, possibly constant.
#[derive(Debug, Clone)]
pub struct Var {
    pub index: usize,
    pub dtype: DType,
    pub const_value: Option<Const>,
    flags: VarFlags,
}

impl Var {
    pub(crate) fn new(index: usize, dtype: DType, const_value: Option<Const>) -> Self {
        Self {
            index,
            dtype,
            const_value,
            flags: VarFlags::empty(),
        }
    }

    pub fn name(&self) -> String {
        format!("v{}", self.index)
    }

    pub fn mutate(&mut self) {
        self.flags.insert(VarFlags::MUTABLE);
    }

    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.flags.contains(VarFlags::MUTABLE)
    }

    /// Render this variable's declaration statement.
    ///
    /// One of `T v{i};`, `T v{i} = literal;`, or `const T v{i} = literal;`,
    /// chosen by `(const_value, mutable)` per invariant 6.
    #[must_use]
    pub fn declaration(&self) -> String {
        let ctype = self.dtype.ctype();
        let name = self.name();
        let Some(value) = self.const_value else {
            return format!("{ctype} {name};\n");
        };
        let init = match value {
            Const::Bool(b) => format!("= {}", if b { "true" } else { "false" }),
            Const::Complex(re, im) => format!("({re}, {im})"),
            Const::Int(i) => format!("= {i}"),
            Const::Float(f) => format!("= {f}"),
        };
        if self.is_mutable() {
            format!("{ctype} {name} {init};\n")
        } else {
            format!("const {ctype} {name} {init};\n")
        }
    }

    /// Parameter declaration for this variable as a kernel input.
    #[must_use]
    pub fn declaration_in_param(&self) -> String {
        let prefix = if self.is_mutable() { "_non_const " } else { "" };
        format!("{prefix}{} {}", self.dtype.ctype(), self.name())
    }

    /// Parameter declaration for this variable as a kernel output.
    #[must_use]
    pub fn declaration_out_param(&self) -> String {
        format!("{} {}", self.dtype.ctype(), self.name())
    }
}

/// An operation node binding a [`Submodule`] to argument variable indices.
///
/// `args` lists inputs first, then outputs, matching the submodule's
/// `in_params`/`out_params` arity and order.
#[derive(Debug, Clone)]
pub struct Op {
    pub index: usize,
    pub submodule: Submodule,
    pub args: Vec<Var>,
}

impl Op {
    pub(crate) fn new(index: usize, submodule: Submodule, args: Vec<Var>) -> Self {
        debug_assert_eq!(args.len(), submodule.in_params.len() + submodule.out_params.len());
        Self {
            index,
            submodule,
            args,
        }
    }

    /// Declares this operation's per-call temporaries (`v{i}_{j}`).
    #[must_use]
    pub fn declaration_args(&self) -> String {
        let mut out = String::new();
        for (j, dtype) in self.submodule.dtypes().enumerate() {
            out.push_str(&format!("{} v{}_{};", dtype.ctype(), self.index, j));
        }
        out.push('\n');
        out
    }

    /// Emits the banner comment, inbound casts, submodule call, and
    /// outbound casts for this operation, in that order.
    #[must_use]
    pub fn code(&self) -> String {
        let temp_names: Vec<String> = (0..self.args.len())
            .map(|i| format!("v{}_{}", self.index, i))
            .collect();
        let dtypes: Vec<DType> = self.submodule.dtypes().collect();

        let mut code = format!("// op # {}\n", self.index);
        for ((var, temp), dtype) in self.args.iter().zip(&temp_names).zip(&dtypes) {
            code.push_str(&format!(
                "{temp} = static_cast< {} >({});\n",
                dtype.ctype(),
                var.name()
            ));
        }
        code.push_str(&self.submodule.fcall(&temp_names));
        let n_in = self.submodule.in_params.len();
        for ((var, temp), _dtype) in self
            .args
            .iter()
            .zip(&temp_names)
            .zip(&dtypes)
            .skip(n_in)
        {
            code.push_str(&format!(
                "{} = static_cast< {} >({});\n",
                var.name(),
                var.dtype.ctype(),
                temp
            ));
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ufunc::{Overload, Ufunc};

    #[test]
    fn declaration_forms() {
        let v = Var::new(0, DType::Int32, None);
        assert_eq!(v.declaration(), "int v0;\n");

        let mut v = Var::new(1, DType::Int32, Some(Const::Int(5)));
        assert_eq!(v.declaration(), "const int v1 = 5;\n");
        v.mutate();
        assert_eq!(v.declaration(), "int v1 = 5;\n");

        let v = Var::new(2, DType::Bool, Some(Const::Bool(true)));
        assert_eq!(v.declaration(), "const bool v2 = true;\n");

        let v = Var::new(3, DType::Complex64, Some(Const::Complex(1.0, 2.0)));
        assert_eq!(v.declaration(), "const complex<float> v3 (1, 2);\n");
    }

    #[test]
    fn op_code_sequences_casts_around_call() {
        let ufunc = Ufunc {
            name: "add",
            preamble: "",
            overloads: vec![Overload {
                in_dtypes: vec![DType::Int32, DType::Int32],
                out_dtypes: vec![DType::Int32],
                body: "out0 = in0 + in1",
            }],
        };
        let subm = Submodule::new(
            &ufunc,
            vec![(DType::Int32, "in0".into()), (DType::Int32, "in1".into())],
            vec![(DType::Int32, "out0".into())],
            "out0 = in0 + in1",
        );
        let args = vec![
            Var::new(0, DType::Int32, None),
            Var::new(1, DType::Int32, None),
            Var::new(2, DType::Int32, None),
        ];
        let op = Op::new(0, subm, args);
        let code = op.code();
        assert!(code.starts_with("// op # 0\n"));
        assert!(code.contains("v0_0 = static_cast< int >(v0);"));
        assert!(code.contains("add(v0_0, v0_1, v0_2);"));
        assert!(code.contains("v2 = static_cast< int >(v0_2);"));
    }
}
