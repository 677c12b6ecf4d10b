//! The graph model: nodes, sections, and the kernel graph.

mod perf;
mod types;

pub use perf::PerfStats;
pub use types::{Binding, KernelGraph, KernelNode, Section};
