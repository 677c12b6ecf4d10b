//! # visiongraph: a kernel-graph scheduler for heterogeneous vision pipelines
//!
//! `visiongraph` schedules a graph of vision-processing kernels across a
//! set of heterogeneous execution resources (CPU, remote DSP, a dedicated
//! imaging coprocessor, GPU), enforcing a load-based admission budget per
//! resource and executing independent groups of work concurrently while
//! respecting a declared partial order:
//!
//! - **Manager registry**: discovers execution resources through a
//!   registered-provider table, ranks them by priority, and exposes one
//!   capability trait ([`KernelManager`]) over all of them.
//! - **Load table**: a shareable admission ledger with all-or-nothing
//!   commit semantics per section.
//! - **Graph model**: a [`KernelGraph`] owns its [`Section`]s by stable
//!   index; each section is a contiguous run of [`KernelNode`]s sharing
//!   an order value.
//! - **Configurator**: resolves each node to a manager, affinity first,
//!   then by priority fallback.
//! - **Section executor**: admits a section's projected load, dispatches
//!   contiguous same-manager runs, and reconfigures and retries on
//!   admission failure (see [`AdmissionPolicy`]).
//! - **Graph processor**: walks order levels, running single-section
//!   levels inline and multi-section levels on a bounded worker pool,
//!   guarded by a teardown-safe reference-counted gate.
//!
//! Pixel memory, RPC transports, and the kernels themselves live outside
//! this crate and are reached only through the [`KernelManager`] trait.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use visiongraph::{
//!     CoreId, KernelGraph, KernelId, KernelNode, Scheduler, StubManager,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let cpu = Arc::new(
//!         StubManager::new("cpu", CoreId::Cpu, 100).with_kernel(KernelId::Sobel3x3, 5),
//!     );
//!     let scheduler = Scheduler::builder().manager(cpu).build().await.unwrap();
//!
//!     let mut graph = KernelGraph::new(1);
//!     graph
//!         .init_section(0, vec![KernelNode::new(KernelId::Sobel3x3)])
//!         .unwrap();
//!     let graph = Arc::new(graph);
//!
//!     let sections_run = scheduler.process(&graph, None).await;
//!     println!("ran {sections_run} sections");
//!     scheduler.shutdown().await;
//! }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod load;
pub mod manager;
pub mod scheduler;

pub use crate::config::{AdmissionPolicy, SchedulerConfig};
pub use crate::error::{KernelStatus, SchedulerError};
pub use crate::graph::{Binding, KernelGraph, KernelNode, PerfStats, Section};
pub use crate::kernel::{priority, CoreId, CoreLoad, KernelEntry, KernelId, CORE_COUNT};
pub use crate::load::{LoadEntry, LoadTable};
pub use crate::manager::{
    CoreInfo, ExecMode, KernelManager, ManagerProvider, ManagerRegistry, ManagerSlot, StubManager,
    StubProvider,
};
pub use crate::scheduler::{Scheduler, SchedulerBuilder, SectionComplete, CAPACITY_RANGE};
