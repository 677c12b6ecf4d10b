//! The manager capability interface.
//!
//! A [`KernelManager`] is the scheduler's view of one execution resource:
//! it owns whatever device handle or RPC channel reaches the hardware
//! (opaque here), advertises the kernels it can run with their load costs,
//! and executes contiguous runs of nodes on request. Managers are created
//! by [`ManagerProvider`] factories registered on the scheduler builder;
//! the registry never scans the filesystem or loads modules at runtime.

mod registry;
mod stub;

pub use registry::{CoreInfo, ManagerRegistry, ManagerSlot};
pub use stub::{StubManager, StubProvider};

use std::sync::Arc;

use async_trait::async_trait;

use crate::graph::KernelNode;
use crate::kernel::{CoreId, KernelEntry};

/// How a run of nodes should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Execute on the calling task; used for the single-section fast path.
    Sync,
    /// The call came from a pool worker; a manager backed by a remote core
    /// may queue the run on its channel instead of blocking on it.
    Queued,
}

/// Capability interface to one execution resource.
#[async_trait]
pub trait KernelManager: Send + Sync {
    /// Short name, used in logs and for deterministic discovery ordering.
    fn name(&self) -> &str;

    /// The resource this manager drives.
    fn core(&self) -> CoreId;

    /// Hardware load capacity of the resource; seeds the load table's
    /// maximum at discovery.
    fn capacity(&self) -> u32;

    /// Supported-kernel table with per-kernel load costs. Fetched once at
    /// discovery and cached in the registry slot.
    fn kernels(&self) -> Vec<KernelEntry>;

    /// Connect to the device or RPC channel. Returning `false` disables
    /// the manager but does not abort discovery of the others.
    async fn attach(&self) -> bool;

    /// Release the device or channel at scheduler shutdown.
    async fn detach(&self);

    /// Execute `count` nodes starting at `start`.
    ///
    /// Returns the number of nodes actually processed and records each
    /// node's [`KernelStatus`](crate::KernelStatus) and perf sample as a
    /// side effect. A manager that under-delivers reports it through those
    /// per-node fields; the executor still advances past the whole
    /// requested run.
    async fn execute(
        &self,
        nodes: &mut [KernelNode],
        start: usize,
        count: usize,
        mode: ExecMode,
    ) -> u32;

    /// Invoked when the backing core restarts unexpectedly. Default no-op.
    fn restart(&self) {}
}

/// Factory for one manager, registered on the scheduler builder.
///
/// The provider table replaces the original design's directory scan for
/// loadable modules; ordering stays deterministic because the registry
/// sorts providers by name before initializing them.
pub trait ManagerProvider: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self) -> Arc<dyn KernelManager>;
}

/// Wrap an already-constructed manager as its own provider. Convenient for
/// user-supplied managers and for tests that keep a handle to the instance.
pub(crate) struct InstanceProvider {
    name: String,
    manager: Arc<dyn KernelManager>,
}

impl InstanceProvider {
    pub(crate) fn new(manager: Arc<dyn KernelManager>) -> Self {
        Self {
            name: manager.name().to_string(),
            manager,
        }
    }
}

impl ManagerProvider for InstanceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self) -> Arc<dyn KernelManager> {
        self.manager.clone()
    }
}
