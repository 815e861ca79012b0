//! Narrow callback interfaces a launch backend implements to receive
//! compiled kernel source: the fusion core never launches anything itself,
//! it only hands finished source and parameters to whatever implements
//! these traits.

/// Receives a compiled element-wise kernel.
pub trait ElementwiseKernelBackend {
    fn elementwise_kernel(&mut self, kernel: ElementwiseKernel);
}

/// Receives a compiled reduction kernel.
pub trait ReductionKernelBackend {
    fn reduction_kernel(&mut self, kernel: ReductionKernel);
}

/// Source and metadata for a compiled, non-reducing fused kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementwiseKernel {
    pub name: String,
    pub in_params: String,
    pub out_params: String,
    pub operation: String,
    pub preamble: String,
}

/// Source and metadata for a compiled fused kernel containing one
/// reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionKernel {
    pub name: String,
    pub in_params: String,
    pub out_params: String,
    pub map_expr: String,
    pub reduce_expr: String,
    pub post_map_expr: String,
    pub identity: String,
    pub preamble: String,
}

/// A backend's record of one launch request, whichever kind it was.
#[derive(Debug, Clone, PartialEq)]
pub enum Kernel {
    Elementwise(ElementwiseKernel),
    Reduction(ReductionKernel),
}

/// A backend that only records what it was asked to compile, without
/// launching anything — the backend used by this crate's own tests, and a
/// template for a real accelerator-launching implementation.
#[derive(Debug, Default)]
pub struct SourceOnlyBackend {
    pub launches: Vec<Kernel>,
}

impl SourceOnlyBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ElementwiseKernelBackend for SourceOnlyBackend {
    fn elementwise_kernel(&mut self, kernel: ElementwiseKernel) {
        self.launches.push(Kernel::Elementwise(kernel));
    }
}

impl ReductionKernelBackend for SourceOnlyBackend {
    fn reduction_kernel(&mut self, kernel: ReductionKernel) {
        self.launches.push(Kernel::Reduction(kernel));
    }
}
