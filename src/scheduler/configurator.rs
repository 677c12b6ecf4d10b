//! The configurator: per-node resource resolution.
//!
//! Resolution is affinity-first, then a priority walk over the enabled
//! managers. A node's resolution is stable once made; only a forced pass
//! (after an admission failure) re-resolves from scratch, and that is only
//! meaningful if manager enablement changed, since routing is otherwise
//! deterministic.

use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::graph::{Binding, Section};
use crate::manager::ManagerRegistry;

/// Resolve every unconfigured node in the section, accumulating each bound
/// kernel's cost into the section's projected load. Returns the number of
/// resolution faults (nodes no enabled manager can run); on the first
/// fault, resolution of the remaining nodes stops, but nodes already
/// resolved keep their resolution.
pub(crate) fn configure_section(
    registry: &ManagerRegistry,
    section: &mut Section,
    force: bool,
) -> u32 {
    let started = Instant::now();
    if force {
        // Re-resolution from scratch: drop every binding and the load that
        // was accumulated for it.
        section.core_load.clear();
        for node in section.nodes.iter_mut() {
            node.configured = false;
            node.binding = None;
        }
    }

    let Section {
        nodes, core_load, ..
    } = section;

    let mut faults = 0u32;
    'nodes: for (n, node) in nodes.iter_mut().enumerate() {
        if node.configured {
            continue;
        }
        trace!(node = n, kernel = ?node.kernel, affinity = ?node.affinity, "resolving node");

        if let Some(core) = node.affinity {
            let mut bound = false;
            for (m, slot) in registry.slots().iter().enumerate() {
                if !slot.enabled || slot.core != core {
                    continue;
                }
                if let Some((f, entry)) = registry.kernel_entry(m, node.kernel) {
                    node.binding = Some(Binding {
                        manager: m,
                        func: f,
                        core,
                    });
                    core_load.add(core, entry.cost);
                    node.configured = true;
                    debug!(
                        node = n,
                        manager = %slot.name,
                        kernel = entry.name,
                        "node bound by affinity"
                    );
                    bound = true;
                    break;
                }
            }
            if bound {
                continue;
            }
            // The requested resource cannot run this kernel. The affinity
            // is dropped for good; from here on the node routes by
            // priority like any other.
            warn!(node = n, ?core, kernel = ?node.kernel, "affinity target cannot run kernel, ignoring affinity");
            node.affinity = None;
        }

        let mut rank = 0u32;
        loop {
            let Some((m, next_rank)) = registry.next_enabled_below(rank) else {
                warn!(node = n, kernel = ?node.kernel, "no enabled manager supports kernel");
                faults += 1;
                break 'nodes;
            };
            rank = next_rank;
            if let Some((f, entry)) = registry.kernel_entry(m, node.kernel) {
                let slot = registry.slot(m);
                node.binding = Some(Binding {
                    manager: m,
                    func: f,
                    core: slot.core,
                });
                core_load.add(slot.core, entry.cost);
                node.configured = true;
                debug!(
                    node = n,
                    manager = %slot.name,
                    kernel = entry.name,
                    cost = entry.cost,
                    "node bound by priority"
                );
                break;
            }
        }
    }

    debug!(
        faults,
        elapsed_us = started.elapsed().as_micros() as u64,
        "section configuration pass finished"
    );
    faults
}
