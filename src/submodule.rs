use crate::dtype::DType;
use crate::ufunc::Ufunc;

/// A concrete, type-specialized instantiation of a ufunc or reduction,
/// emitted as a single device function.
///
/// Two submodules with equal [`key`](Submodule::key) always render
/// byte-identical [`code`](Submodule::code); the tracer deduplicates by
/// key so each distinct `(name, dtypes)` pair is emitted exactly once.
#[derive(Debug, Clone)]
pub struct Submodule {
    pub name: &'static str,
    pub in_params: Vec<(DType, String)>,
    pub out_params: Vec<(DType, String)>,
    pub op: &'static str,
    pub preamble: &'static str,
}

impl Submodule {
    #[must_use]
    pub fn new(
        ufunc: &Ufunc,
        in_params: Vec<(DType, String)>,
        out_params: Vec<(DType, String)>,
        op: &'static str,
    ) -> Self {
        Self {
            name: ufunc.name,
            in_params,
            out_params,
            op,
            preamble: ufunc.preamble,
        }
    }

    /// `(ufunc-name, tuple of dtypes)` — the dedup key.
    #[must_use]
    pub fn key(&self) -> (&'static str, Vec<DType>) {
        (self.name, self.dtypes().collect())
    }

    /// All parameter dtypes, inputs then outputs.
    pub fn dtypes(&self) -> impl Iterator<Item = DType> + '_ {
        self.in_params
            .iter()
            .chain(self.out_params.iter())
            .map(|(t, _)| *t)
    }

    /// Renders the call site `NAME(a1, …, an);\n`.
    #[must_use]
    pub fn fcall(&self, args: &[String]) -> String {
        format!("{}({});\n", self.name, args.join(", "))
    }

    /// Renders the device function:
    /// `__device__ void NAME(T1& v1, …) { typedef …; OP; }`.
    #[must_use]
    pub fn code(&self) -> String {
        let params: Vec<String> = self
            .in_params
            .iter()
            .chain(self.out_params.iter())
            .map(|(t, name)| format!("{} &{name}", t.ctype()))
            .collect();
        let typedefs: String = self
            .in_params
            .iter()
            .chain(self.out_params.iter())
            .map(|(t, name)| format!("typedef {} {name}_type;\n", t.ctype()))
            .collect();
        format!(
            "__device__ void {}({}) {{\n{}{};\n}}\n",
            self.name,
            params.join(", "),
            typedefs,
            self.op
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ufunc::{Overload, Ufunc};

    #[test]
    fn key_dedups_on_name_and_dtypes() {
        let ufunc = Ufunc {
            name: "add",
            preamble: "",
            overloads: vec![Overload {
                in_dtypes: vec![DType::Int32, DType::Int32],
                out_dtypes: vec![DType::Int32],
                body: "out0 = in0 + in1",
            }],
        };
        let a = Submodule::new(
            &ufunc,
            vec![(DType::Int32, "in0".into()), (DType::Int32, "in1".into())],
            vec![(DType::Int32, "out0".into())],
            "out0 = in0 + in1",
        );
        let b = a.clone();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.code(), b.code());
    }

    #[test]
    fn code_contains_typedefs_and_body() {
        let ufunc = Ufunc {
            name: "add",
            preamble: "",
            overloads: vec![],
        };
        let subm = Submodule::new(
            &ufunc,
            vec![(DType::Float32, "in0".into())],
            vec![(DType::Float32, "out0".into())],
            "out0 = in0",
        );
        let code = subm.code();
        assert!(code.starts_with("__device__ void add("));
        assert!(code.contains("typedef float in0_type;\n"));
        assert!(code.contains("out0 = in0;\n"));
    }
}
