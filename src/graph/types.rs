use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{KernelStatus, SchedulerError};
use crate::kernel::{CoreId, CoreLoad, KernelId};

use super::PerfStats;

/// A node's resolved execution target: the registry slot of the manager
/// that will run it, the position of the kernel in that manager's table,
/// and the resource the load was accumulated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub manager: usize,
    pub func: usize,
    pub core: CoreId,
}

/// One scheduled kernel invocation.
#[derive(Debug, Clone)]
pub struct KernelNode {
    /// The kernel to execute.
    pub kernel: KernelId,
    /// Optional explicit resource request. Supersedes priority routing,
    /// but is permanently cleared if the requested resource cannot run
    /// the kernel.
    pub affinity: Option<CoreId>,
    /// Completion code, written by the executing manager.
    pub status: KernelStatus,
    /// Per-node performance samples, written by the executing manager.
    pub perf: PerfStats,
    pub(crate) configured: bool,
    pub(crate) binding: Option<Binding>,
}

impl KernelNode {
    pub fn new(kernel: KernelId) -> Self {
        Self {
            kernel,
            affinity: None,
            status: KernelStatus::default(),
            perf: PerfStats::new(),
            configured: false,
            binding: None,
        }
    }

    pub fn with_affinity(mut self, core: CoreId) -> Self {
        self.affinity = Some(core);
        self
    }

    /// Whether the configurator has resolved this node to a manager.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// The node's resolution, if configured.
    pub fn binding(&self) -> Option<Binding> {
        self.binding
    }
}

/// A contiguous group of nodes admitted and dispatched as a unit. All
/// nodes in a section share the section's order.
pub struct Section {
    pub(crate) nodes: Vec<KernelNode>,
    pub(crate) core_load: CoreLoad,
    /// Elapsed-time samples for whole-section executions.
    pub perf: PerfStats,
    /// Skipped sections are ignored by the processor.
    pub skip: bool,
}

impl Section {
    fn new(nodes: Vec<KernelNode>) -> Self {
        Self {
            nodes,
            core_load: CoreLoad::new(),
            perf: PerfStats::new(),
            skip: false,
        }
    }

    pub fn nodes(&self) -> &[KernelNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [KernelNode] {
        &mut self.nodes
    }

    /// Projected load accumulated by the configurator.
    pub fn core_load(&self) -> &CoreLoad {
        &self.core_load
    }

    /// Clear every node's perf samples.
    pub fn clear_perf(&mut self) {
        self.perf.clear();
        for node in &mut self.nodes {
            node.perf.clear();
        }
    }
}

/// An ordered collection of sections.
///
/// Sections live at stable integer indices; the parallel `order` array
/// assigns each one a wave number. Sections sharing an order may run
/// concurrently, and no section at order N+1 starts before every section
/// at orders <= N has completed. Construction uses `&mut self`; once the
/// graph is wrapped in an `Arc` and handed to the scheduler, sections are
/// reached through their per-section locks.
pub struct KernelGraph {
    sections: Vec<Mutex<Section>>,
    order: Vec<u32>,
    total_perf: parking_lot::Mutex<PerfStats>,
    verified: AtomicBool,
}

impl KernelGraph {
    /// Create a graph with `num_sections` empty sections, all at order 0.
    pub fn new(num_sections: usize) -> Self {
        Self {
            sections: (0..num_sections)
                .map(|_| Mutex::new(Section::new(Vec::new())))
                .collect(),
            order: vec![0; num_sections],
            total_perf: parking_lot::Mutex::new(PerfStats::new()),
            verified: AtomicBool::new(false),
        }
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    /// Hand a section its nodes. Invalidates any previous verification.
    pub fn init_section(
        &mut self,
        index: usize,
        nodes: Vec<KernelNode>,
    ) -> Result<(), SchedulerError> {
        let section = self
            .sections
            .get_mut(index)
            .ok_or(SchedulerError::InvalidSection(index))?;
        *section.get_mut() = Section::new(nodes);
        self.verified.store(false, Ordering::Release);
        Ok(())
    }

    pub fn set_order(&mut self, index: usize, order: u32) -> Result<(), SchedulerError> {
        match self.order.get_mut(index) {
            Some(slot) => {
                *slot = order;
                Ok(())
            }
            None => Err(SchedulerError::InvalidSection(index)),
        }
    }

    pub fn set_skip(&mut self, index: usize, skip: bool) -> Result<(), SchedulerError> {
        let section = self
            .sections
            .get_mut(index)
            .ok_or(SchedulerError::InvalidSection(index))?;
        section.get_mut().skip = skip;
        Ok(())
    }

    /// Lock a section for inspection, typically after a `process` call.
    pub async fn section(&self, index: usize) -> Option<MutexGuard<'_, Section>> {
        match self.sections.get(index) {
            Some(cell) => Some(cell.lock().await),
            None => None,
        }
    }

    pub(crate) fn section_cell(&self, index: usize) -> &Mutex<Section> {
        &self.sections[index]
    }

    pub(crate) fn order_of(&self, index: usize) -> u32 {
        self.order[index]
    }

    pub fn verified(&self) -> bool {
        self.verified.load(Ordering::Acquire)
    }

    pub(crate) fn set_verified(&self) {
        self.verified.store(true, Ordering::Release);
    }

    /// Wall-time statistics over whole `process` calls.
    pub fn total_perf(&self) -> PerfStats {
        *self.total_perf.lock()
    }

    pub(crate) fn record_total(&self, elapsed: Duration) {
        self.total_perf.lock().record(elapsed);
    }
}
