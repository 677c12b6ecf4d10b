//! Manager discovery and priority ranking.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::kernel::{priority, CoreId, KernelEntry, KernelId};
use crate::load::LoadTable;

use super::{KernelManager, ManagerProvider};

/// Static resource-to-priority table. The imaging coprocessor outranks the
/// DSP, the GPU is reachable only through affinity, and the CPU is the
/// catch-all at the bottom.
fn default_priority(core: CoreId) -> u32 {
    match core {
        CoreId::Imgcop => priority::HIGHEST,
        CoreId::Dsp => priority::HIGHEST + 1,
        CoreId::Gpu => priority::NONE,
        CoreId::Cpu => priority::LOWEST,
    }
}

/// One discovered manager and the state the registry keeps about it.
pub struct ManagerSlot {
    pub manager: Arc<dyn KernelManager>,
    pub name: String,
    pub core: CoreId,
    pub enabled: bool,
    pub priority: u32,
    /// Kernel table fetched from the manager at discovery.
    pub kernels: Vec<KernelEntry>,
}

/// Introspection result for one resource.
#[derive(Debug, Clone)]
pub struct CoreInfo {
    pub core: CoreId,
    pub enabled: bool,
    pub kernels: Vec<KernelEntry>,
}

/// The set of discovered managers, ranked by priority.
///
/// Slots keep their provider registration order (providers are sorted by
/// name first, so discovery is deterministic); a manager that fails to
/// attach stays in the table as a disabled slot.
pub struct ManagerRegistry {
    slots: Vec<ManagerSlot>,
}

impl ManagerRegistry {
    /// Build every provider's manager, attach it, and rank it.
    ///
    /// Fails only when no usable manager remains after discovery.
    pub(crate) async fn discover(
        providers: &[Box<dyn ManagerProvider>],
        overrides: &HashMap<CoreId, u32>,
        load: &LoadTable,
    ) -> Result<Self, SchedulerError> {
        let mut order: Vec<usize> = (0..providers.len()).collect();
        order.sort_by(|&a, &b| providers[a].name().cmp(providers[b].name()));

        let mut slots = Vec::with_capacity(providers.len());
        for idx in order {
            let provider = &providers[idx];
            debug!(provider = provider.name(), "possible manager");
            let manager = provider.build();
            let core = manager.core();
            let name = manager.name().to_string();

            if !manager.attach().await {
                warn!(manager = %name, "manager failed to attach, disabling");
                slots.push(ManagerSlot {
                    manager,
                    name,
                    core,
                    enabled: false,
                    priority: priority::NONE,
                    kernels: Vec::new(),
                });
                continue;
            }

            let kernels = manager.kernels();
            let rank = overrides
                .get(&core)
                .copied()
                .unwrap_or_else(|| default_priority(core));
            load.set_max_load(core, manager.capacity());
            info!(
                manager = %name,
                ?core,
                rank,
                kernels = kernels.len(),
                "manager attached"
            );
            slots.push(ManagerSlot {
                manager,
                name,
                core,
                enabled: true,
                priority: rank,
                kernels,
            });
        }

        if slots.iter().any(|s| s.enabled) {
            Ok(Self { slots })
        } else {
            Err(SchedulerError::NoUsableManager)
        }
    }

    pub(crate) fn slots(&self) -> &[ManagerSlot] {
        &self.slots
    }

    pub(crate) fn slot(&self, index: usize) -> &ManagerSlot {
        &self.slots[index]
    }

    /// Next enabled manager ranked strictly below `rank` (numerically above
    /// it). Ties are broken by registration scan order. Returns the slot
    /// index and its rank.
    pub(crate) fn next_enabled_below(&self, rank: u32) -> Option<(usize, u32)> {
        let mut best: Option<(usize, u32)> = None;
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.enabled || slot.priority == priority::NONE || slot.priority <= rank {
                continue;
            }
            match best {
                Some((_, p)) if slot.priority >= p => {}
                _ => best = Some((i, slot.priority)),
            }
        }
        best
    }

    /// Position of `kernel` in the slot's kernel table, with its entry.
    pub(crate) fn kernel_entry(
        &self,
        slot: usize,
        kernel: KernelId,
    ) -> Option<(usize, &KernelEntry)> {
        let slot = &self.slots[slot];
        if !slot.enabled {
            return None;
        }
        slot.kernels
            .iter()
            .enumerate()
            .find(|(_, e)| e.kernel == kernel)
    }

    /// Hardware capacity reported by the enabled manager for `core`.
    pub(crate) fn hw_capacity(&self, core: CoreId) -> Option<u32> {
        self.slots
            .iter()
            .find(|s| s.enabled && s.core == core)
            .map(|s| s.manager.capacity())
    }

    /// Describe one resource: whether any manager drives it and the union
    /// of kernels enabled there.
    pub fn query_core(&self, core: CoreId) -> CoreInfo {
        let mut info = CoreInfo {
            core,
            enabled: false,
            kernels: Vec::new(),
        };
        for slot in self.slots.iter().filter(|s| s.enabled && s.core == core) {
            info.enabled = true;
            info.kernels.extend(slot.kernels.iter().cloned());
        }
        info
    }

    /// Every resource on which some enabled manager supports `kernel`.
    pub fn query_kernel(&self, kernel: KernelId) -> Vec<CoreId> {
        CoreId::ALL
            .iter()
            .copied()
            .filter(|&core| {
                self.slots
                    .iter()
                    .any(|s| s.enabled && s.core == core && s.kernels.iter().any(|e| e.kernel == kernel))
            })
            .collect()
    }

    /// Fan a restart notification out to the managers driving `core`.
    pub fn notify_restart(&self, core: CoreId) {
        for slot in self.slots.iter().filter(|s| s.enabled && s.core == core) {
            warn!(manager = %slot.name, ?core, "notifying manager of core restart");
            slot.manager.restart();
        }
    }

    pub(crate) async fn shutdown(&self) {
        for slot in self.slots.iter().filter(|s| s.enabled) {
            debug!(manager = %slot.name, "shutting down manager");
            slot.manager.detach().await;
        }
    }
}
