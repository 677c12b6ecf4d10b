//! The section executor: admission, sub-batch dispatch, and retry.

use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::config::AdmissionPolicy;
use crate::graph::Section;
use crate::load::LoadTable;
use crate::manager::{ExecMode, ManagerRegistry};

use super::configurator::configure_section;

/// Where the executor stands in the admit/reconfigure/retry cycle. The
/// transition after an admission failure is explicit state, not a side
/// effect of a flag: `Admitting` -> `AdmissionFailed` -> `Reconfiguring`
/// -> `Admitting`.
#[derive(Debug, Clone, Copy)]
enum Phase {
    Admitting { attempt: u32 },
    AdmissionFailed { attempt: u32 },
    Reconfiguring { attempt: u32 },
}

/// Run one section: configure it, admit its projected load, and dispatch
/// maximal contiguous same-manager runs of nodes to their managers.
///
/// Returns the number of nodes the managers report as processed, which may
/// be less than the section size; a manager that under-delivers says so
/// through per-node status fields, and dispatch still advances past the
/// whole requested run rather than aborting later runs.
pub(crate) async fn run_section(
    registry: &ManagerRegistry,
    load: &LoadTable,
    policy: &AdmissionPolicy,
    section: &mut Section,
    mode: ExecMode,
) -> u32 {
    let started = Instant::now();
    debug!(nodes = section.nodes().len(), ?mode, "executing section");

    let mut faults = configure_section(registry, section, false);
    let mut phase = if faults == 0 {
        Phase::Admitting { attempt: 0 }
    } else {
        // One forced pass may still rescue the section if enablement
        // changed since the nodes were first resolved.
        Phase::Reconfiguring { attempt: 0 }
    };

    let mut processed = 0u32;
    loop {
        match phase {
            Phase::Admitting { attempt } => {
                if load.commit(&section.core_load) {
                    processed = dispatch(registry, section, mode).await;
                    load.decommit(&section.core_load);
                    break;
                }
                warn!("section could not be admitted due to a shortage of resources");
                phase = Phase::AdmissionFailed { attempt };
            }
            Phase::AdmissionFailed { attempt } => match policy {
                AdmissionPolicy::Spin => {
                    // The spin must still yield, or a single-threaded
                    // runtime could never reach the decommit that frees
                    // the resources this section is waiting for.
                    tokio::task::yield_now().await;
                    phase = Phase::Reconfiguring { attempt };
                }
                AdmissionPolicy::Bounded {
                    max_retries,
                    backoff_ms,
                } => {
                    if attempt >= *max_retries {
                        warn!(
                            attempts = attempt,
                            "admission retries exhausted, abandoning section"
                        );
                        break;
                    }
                    if *backoff_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(*backoff_ms)).await;
                    }
                    phase = Phase::Reconfiguring { attempt };
                }
            },
            Phase::Reconfiguring { attempt } => {
                faults = configure_section(registry, section, true);
                if faults > 0 {
                    break;
                }
                phase = Phase::Admitting {
                    attempt: attempt + 1,
                };
            }
        }
    }

    if faults > 0 {
        error!(faults, "section has unresolvable nodes, processing cannot continue");
    }

    section.perf.record(started.elapsed());
    debug!(processed, "section finished");
    processed
}

/// Walk the nodes left to right, grouping maximal contiguous runs bound to
/// the same manager, and hand each run to its manager in one call.
async fn dispatch(registry: &ManagerRegistry, section: &mut Section, mode: ExecMode) -> u32 {
    let nodes = section.nodes_mut();
    let total = nodes.len();
    let mut processed = 0u32;
    let mut n = 0usize;
    while n < total {
        let Some(binding) = nodes[n].binding else {
            // Unreachable once configuration is fault-free; bail rather
            // than dispatch an unresolved node.
            break;
        };
        let mut run = 1usize;
        while n + run < total
            && nodes[n + run].binding.map(|b| b.manager) == Some(binding.manager)
        {
            run += 1;
        }
        let slot = registry.slot(binding.manager);
        debug!(start = n, count = run, manager = %slot.name, "executing contiguous run");
        let done = slot.manager.execute(nodes, n, run, mode).await;
        processed += done;
        if done != run as u32 {
            debug!(
                requested = run,
                done, "manager under-delivered, continuing with remaining runs"
            );
        }
        // Advance by the requested run length, not the processed count.
        n += run;
    }
    processed
}
