//! Kernel opcodes, execution resources, and per-resource load accounting.

use serde::{Deserialize, Serialize};

/// One execution resource in the system.
///
/// Every manager drives exactly one of these. The load table is indexed by
/// this enum, so the set is closed; user-supplied managers still name one of
/// the predefined resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreId {
    /// Remote DSP core, reached over an RPC channel.
    Dsp,
    /// Dedicated imaging coprocessor.
    Imgcop,
    /// GPU, only used when a node explicitly asks for it.
    Gpu,
    /// Host CPU.
    Cpu,
}

/// Number of distinct execution resources.
pub const CORE_COUNT: usize = 4;

impl CoreId {
    /// All resources, in load-table index order.
    pub const ALL: [CoreId; CORE_COUNT] = [CoreId::Dsp, CoreId::Imgcop, CoreId::Gpu, CoreId::Cpu];

    /// Load-table index of this resource.
    pub fn index(self) -> usize {
        match self {
            CoreId::Dsp => 0,
            CoreId::Imgcop => 1,
            CoreId::Gpu => 2,
            CoreId::Cpu => 3,
        }
    }
}

/// Manager priority tiers. Numerically ascending rank: 1 is the highest
/// priority, larger values rank lower. `NONE` removes a manager from the
/// priority fallback entirely (it can still be reached via node affinity).
pub mod priority {
    /// Never selected by the priority fallback.
    pub const NONE: u32 = 0;
    /// Top of the ranking.
    pub const HIGHEST: u32 = 1;
    /// Base tier for user-supplied managers that carry no static ranking.
    pub const USER_BASE: u32 = 1000;
    /// Bottom tier; the catch-all resource (CPU) sits here.
    pub const LOWEST: u32 = u32::MAX - 1;
}

/// The global vision-kernel opcode set.
///
/// Each manager supports a subset of these and reports a per-kernel load
/// cost through its [`KernelEntry`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelId {
    Copy,
    LumaExtract,
    Nv12ToRgb,
    UyvyToYuv444,
    Sobel3x3,
    Gaussian3x3,
    Gaussian7x7,
    Median3x3,
    Erode3x3,
    Dilate3x3,
    Threshold,
    IntegralImage,
    Histogram,
    CannyGradient,
    CannyNonMaxSuppress,
    CannyHysteresis,
    HarrisScore,
}

/// One row of a manager's supported-kernel table: the opcode, a debug name,
/// and the load cost of running that kernel on the manager's resource.
#[derive(Debug, Clone)]
pub struct KernelEntry {
    pub kernel: KernelId,
    pub name: &'static str,
    /// Load units consumed on the owning resource while a node with this
    /// kernel is committed.
    pub cost: u32,
}

impl KernelEntry {
    pub fn new(kernel: KernelId, name: &'static str, cost: u32) -> Self {
        Self { kernel, name, cost }
    }
}

/// Projected load per resource, accumulated by the configurator while it
/// resolves a section and consumed whole by the load table at admission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreLoad([u32; CORE_COUNT]);

impl CoreLoad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, core: CoreId) -> u32 {
        self.0[core.index()]
    }

    pub fn add(&mut self, core: CoreId, cost: u32) {
        self.0[core.index()] = self.0[core.index()].saturating_add(cost);
    }

    pub fn clear(&mut self) {
        self.0 = [0; CORE_COUNT];
    }

    /// Iterate resources carrying a nonzero projected load.
    pub fn nonzero(&self) -> impl Iterator<Item = (CoreId, u32)> + '_ {
        CoreId::ALL
            .iter()
            .filter_map(|&c| match self.get(c) {
                0 => None,
                v => Some((c, v)),
            })
    }
}
