//! In-process manager used by the demo and the test suites.
//!
//! Kernel implementations proper live outside this crate; the stub stands
//! in for them by recording a status and a perf sample per node, with
//! knobs for the failure modes the scheduler has to survive.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::KernelStatus;
use crate::graph::KernelNode;
use crate::kernel::{CoreId, KernelEntry, KernelId};

use super::{ExecMode, KernelManager, ManagerProvider};

/// A configurable fake execution resource.
pub struct StubManager {
    name: String,
    core: CoreId,
    capacity: u32,
    kernels: Vec<KernelEntry>,
    attach_ok: bool,
    delay: Option<Duration>,
    failing: HashSet<KernelId>,
    /// When set, each run processes at most this many nodes.
    deliver_limit: Option<u32>,
    executed: AtomicU32,
    runs: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    restarts: AtomicU32,
}

impl StubManager {
    pub fn new(name: impl Into<String>, core: CoreId, capacity: u32) -> Self {
        Self {
            name: name.into(),
            core,
            capacity,
            kernels: Vec::new(),
            attach_ok: true,
            delay: None,
            failing: HashSet::new(),
            deliver_limit: None,
            executed: AtomicU32::new(0),
            runs: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            restarts: AtomicU32::new(0),
        }
    }

    pub fn with_kernel(mut self, kernel: KernelId, cost: u32) -> Self {
        let name = match kernel {
            KernelId::Copy => "copy",
            KernelId::LumaExtract => "luma_extract",
            KernelId::Nv12ToRgb => "nv12_to_rgb",
            KernelId::UyvyToYuv444 => "uyvy_to_yuv444",
            KernelId::Sobel3x3 => "sobel_3x3",
            KernelId::Gaussian3x3 => "gaussian_3x3",
            KernelId::Gaussian7x7 => "gaussian_7x7",
            KernelId::Median3x3 => "median_3x3",
            KernelId::Erode3x3 => "erode_3x3",
            KernelId::Dilate3x3 => "dilate_3x3",
            KernelId::Threshold => "threshold",
            KernelId::IntegralImage => "integral_image",
            KernelId::Histogram => "histogram",
            KernelId::CannyGradient => "canny_gradient",
            KernelId::CannyNonMaxSuppress => "canny_nonmax",
            KernelId::CannyHysteresis => "canny_hysteresis",
            KernelId::HarrisScore => "harris_score",
        };
        self.kernels.push(KernelEntry::new(kernel, name, cost));
        self
    }

    /// Make `attach` fail, leaving the manager disabled in the registry.
    pub fn attach_fails(mut self) -> Self {
        self.attach_ok = false;
        self
    }

    /// Sleep this long per run, to widen race windows in concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report `Failure` for nodes carrying this kernel.
    pub fn failing(mut self, kernel: KernelId) -> Self {
        self.failing.insert(kernel);
        self
    }

    /// Under-deliver: process at most `limit` nodes of each requested run.
    pub fn deliver_at_most(mut self, limit: u32) -> Self {
        self.deliver_limit = Some(limit);
        self
    }

    /// Total nodes processed across all runs.
    pub fn executed(&self) -> u32 {
        self.executed.load(Ordering::SeqCst)
    }

    /// Number of `execute` calls, one per contiguous run dispatched here.
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// High-water mark of concurrent `execute` calls.
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KernelManager for StubManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn core(&self) -> CoreId {
        self.core
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn kernels(&self) -> Vec<KernelEntry> {
        self.kernels.clone()
    }

    async fn attach(&self) -> bool {
        self.attach_ok
    }

    async fn detach(&self) {}

    async fn execute(
        &self,
        nodes: &mut [KernelNode],
        start: usize,
        count: usize,
        _mode: ExecMode,
    ) -> u32 {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let entered = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(entered, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let take = match self.deliver_limit {
            Some(limit) => count.min(limit as usize),
            None => count,
        };
        for node in nodes.iter_mut().skip(start).take(take) {
            let run = Instant::now();
            node.status = if self.failing.contains(&node.kernel) {
                KernelStatus::Failure
            } else {
                KernelStatus::Success
            };
            node.perf.record(run.elapsed());
        }

        self.executed.fetch_add(take as u32, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        take as u32
    }

    fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider handing out a shared stub instance, so tests keep a handle to
/// the counters after the scheduler takes ownership.
pub struct StubProvider {
    manager: Arc<StubManager>,
}

impl StubProvider {
    pub fn new(manager: Arc<StubManager>) -> Self {
        Self { manager }
    }
}

impl ManagerProvider for StubProvider {
    fn name(&self) -> &str {
        self.manager.name()
    }

    fn build(&self) -> Arc<dyn KernelManager> {
        self.manager.clone()
    }
}
