//! The graph processor: verification, the ordered execution loop, and
//! scheduler lifecycle.
//!
//! [`Scheduler`] (constructed via [`Scheduler::builder`]) owns everything
//! the execution path touches: the manager registry, the admission load
//! table, the worker pool, and the teardown gate. Nothing lives in shared
//! statics; per-call batches travel through the pool's queue.

mod configurator;
mod executor;
mod gate;
mod pool;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{AdmissionPolicy, SchedulerConfig};
use crate::error::SchedulerError;
use crate::graph::KernelGraph;
use crate::kernel::{CoreId, KernelId};
use crate::load::LoadTable;
use crate::manager::{
    CoreInfo, ExecMode, InstanceProvider, KernelManager, ManagerProvider, ManagerRegistry,
};

use configurator::configure_section;
use executor::run_section;
use gate::GraphGate;
use pool::{WorkItem, WorkerPool};

/// Upper bound of the capacity percentage scale.
pub const CAPACITY_RANGE: u32 = 100;

/// Completion callback invoked once per executed section with the section
/// index and the number of nodes its managers processed.
pub type SectionComplete = Arc<dyn Fn(usize, u32) + Send + Sync>;

/// State shared between the scheduler front end and the pool workers.
pub(crate) struct ExecContext {
    pub(crate) registry: ManagerRegistry,
    pub(crate) load: Arc<LoadTable>,
    pub(crate) admission: AdmissionPolicy,
}

/// Builder for [`Scheduler`]. Collects manager providers and configuration
/// before discovery runs.
#[derive(Default)]
pub struct SchedulerBuilder {
    providers: Vec<Box<dyn ManagerProvider>>,
    config: SchedulerConfig,
    load: Option<Arc<LoadTable>>,
}

impl SchedulerBuilder {
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a manager factory. Providers are initialized in name
    /// order, so registration order does not affect discovery.
    pub fn provider(mut self, provider: impl ManagerProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Register an already-constructed manager.
    pub fn manager(mut self, manager: Arc<dyn KernelManager>) -> Self {
        self.providers.push(Box::new(InstanceProvider::new(manager)));
        self
    }

    /// Admit against an existing load table instead of a fresh one, so
    /// several scheduler instances share one admission budget.
    pub fn load_table(mut self, table: Arc<LoadTable>) -> Self {
        self.load = Some(table);
        self
    }

    /// Run discovery and start the worker pool.
    pub async fn build(self) -> Result<Scheduler, SchedulerError> {
        self.config.validate()?;
        let load = self.load.unwrap_or_else(|| Arc::new(LoadTable::new()));
        let registry =
            ManagerRegistry::discover(&self.providers, &self.config.core_priorities, &load).await?;
        let ctx = Arc::new(ExecContext {
            registry,
            load,
            admission: self.config.admission.clone(),
        });
        let pool = WorkerPool::spawn(
            self.config.max_parallel_sections,
            self.config.queue_depth,
            ctx.clone(),
        );
        Ok(Scheduler {
            ctx,
            pool,
            gate: GraphGate::new(),
            config: self.config,
        })
    }
}

/// The kernel-graph scheduler.
pub struct Scheduler {
    ctx: Arc<ExecContext>,
    pool: WorkerPool,
    gate: GraphGate,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    /// Resolve every node of every section and memoize the result on the
    /// graph. Idempotent: a verified graph returns `true` without any
    /// further resolution. Returns `false` if some node cannot resolve or
    /// if teardown has begun.
    pub async fn verify(&self, graph: &KernelGraph) -> bool {
        if !self.gate.enter() {
            return false;
        }
        let ok = self.verify_admitted(graph).await;
        self.gate.exit();
        ok
    }

    async fn verify_admitted(&self, graph: &KernelGraph) -> bool {
        if graph.verified() {
            return true;
        }
        let mut total_nodes = 0usize;
        let mut configured_nodes = 0usize;
        for index in 0..graph.num_sections() {
            let mut section = graph.section_cell(index).lock().await;
            total_nodes += section.nodes().len();
            configure_section(&self.ctx.registry, &mut section, false);
            let configured = section.nodes().iter().filter(|n| n.is_configured()).count();
            debug!(section = index, configured, "nodes pass verification");
            configured_nodes += configured;
        }
        if total_nodes == configured_nodes {
            info!(nodes = total_nodes, "graph verified");
            graph.set_verified();
            true
        } else {
            warn!(
                configured = configured_nodes,
                total = total_nodes,
                "graph failed verification"
            );
            false
        }
    }

    /// Execute the graph: walk order levels from zero upward, running each
    /// level's non-skipped sections before any section of the next level
    /// starts. A level with one section runs inline on the calling task;
    /// a level with several goes to the worker pool as one batch.
    ///
    /// Returns the number of sections run. Zero means the call failed
    /// outright: the graph failed verification, one level held more than
    /// `max_parallel_sections` sections, or teardown had already begun.
    /// Per-node outcomes are on the nodes themselves; inspect them through
    /// [`KernelGraph::section`] after the call.
    pub async fn process(
        &self,
        graph: &Arc<KernelGraph>,
        on_complete: Option<SectionComplete>,
    ) -> u32 {
        if !self.gate.enter() {
            warn!("scheduler is tearing down, rejecting graph");
            return 0;
        }
        let sections_run = self.process_admitted(graph, on_complete).await;
        self.gate.exit();
        sections_run
    }

    async fn process_admitted(
        &self,
        graph: &Arc<KernelGraph>,
        on_complete: Option<SectionComplete>,
    ) -> u32 {
        if !graph.verified() {
            debug!("graph has not been verified, verifying now");
            if !self.verify_admitted(graph).await {
                error!("graph failed verification, nothing will run");
                return 0;
            }
        }

        let started = Instant::now();
        let cap = self.config.max_parallel_sections;
        let mut sections_run = 0u32;

        'orders: for order in 0u32.. {
            let mut batch = Vec::new();
            for index in 0..graph.num_sections() {
                if graph.order_of(index) != order {
                    continue;
                }
                if graph.section_cell(index).lock().await.skip {
                    debug!(section = index, "skipping section");
                    continue;
                }
                if batch.len() == cap {
                    error!(
                        max = cap,
                        order, "too many sections at one order, aborting graph"
                    );
                    break 'orders;
                }
                batch.push(index);
            }

            debug!(order, sections = batch.len(), "gathered order level");
            match batch.len() {
                0 => break 'orders,
                1 => {
                    // Single-section fast path: no handoff to the pool, no
                    // context switch, deterministic for the common case.
                    let index = batch[0];
                    let processed = {
                        let mut section = graph.section_cell(index).lock().await;
                        run_section(
                            &self.ctx.registry,
                            &self.ctx.load,
                            &self.ctx.admission,
                            &mut section,
                            ExecMode::Sync,
                        )
                        .await
                    };
                    if let Some(callback) = &on_complete {
                        callback(index, processed);
                    }
                    sections_run += 1;
                }
                n => {
                    let (done_tx, mut done_rx) = mpsc::channel(n);
                    for &index in &batch {
                        self.pool
                            .submit(WorkItem {
                                graph: graph.clone(),
                                section_index: index,
                                on_complete: on_complete.clone(),
                                done: done_tx.clone(),
                            })
                            .await;
                    }
                    drop(done_tx);
                    // Order barrier: every section of this level completes
                    // (callback included) before the next level starts.
                    while done_rx.recv().await.is_some() {}
                    debug!(order, sections = n, "order level complete");
                    sections_run += n as u32;
                }
            }
        }

        graph.record_total(started.elapsed());
        debug!(sections_run, "graph processing finished");
        sections_run
    }

    /// Cap a resource's admissible load as a percentage (0..=100) of the
    /// hardware capacity its manager reports. No-op for resources without
    /// an enabled manager.
    pub fn set_core_capacity(&self, core: CoreId, percent: u32) {
        let Some(hw_capacity) = self.ctx.registry.hw_capacity(core) else {
            warn!(?core, "no enabled manager for core, capacity unchanged");
            return;
        };
        let percent = percent.min(CAPACITY_RANGE);
        let max_load = percent * hw_capacity / CAPACITY_RANGE;
        self.ctx.load.set_max_load(core, max_load);
        debug!(?core, percent, max_load, "core capacity updated");
    }

    /// Current admissible-load cap for a resource, as a percentage of its
    /// hardware capacity. Zero for resources without an enabled manager.
    pub fn core_capacity(&self, core: CoreId) -> u32 {
        match self.ctx.registry.hw_capacity(core) {
            Some(hw_capacity) if hw_capacity != 0 => {
                self.ctx.load.max_load(core) * CAPACITY_RANGE / hw_capacity
            }
            _ => 0,
        }
    }

    /// Describe one resource: enablement and the kernels available there.
    pub fn query_core(&self, core: CoreId) -> CoreInfo {
        self.ctx.registry.query_core(core)
    }

    /// Describe every resource.
    pub fn query_system(&self) -> Vec<CoreInfo> {
        CoreId::ALL
            .iter()
            .map(|&core| self.ctx.registry.query_core(core))
            .collect()
    }

    /// Every resource on which the kernel can run.
    pub fn query_kernel(&self, kernel: KernelId) -> Vec<CoreId> {
        self.ctx.registry.query_kernel(kernel)
    }

    /// Tell the managers driving `core` that their backing core restarted.
    pub fn notify_restart(&self, core: CoreId) {
        self.ctx.registry.notify_restart(core);
    }

    /// The admission table this scheduler commits against.
    pub fn load_table(&self) -> Arc<LoadTable> {
        self.ctx.load.clone()
    }

    /// Tear down: reject new graph calls, wait for in-flight ones to
    /// drain, stop the worker pool, and detach every manager. Call once;
    /// later graph calls are rejected with a zero return.
    pub async fn shutdown(&self) {
        info!("shutting down, waiting for in-flight graphs to complete");
        self.gate.close().await;
        self.pool.shutdown().await;
        self.ctx.registry.shutdown().await;
        info!("scheduler shut down");
    }
}
