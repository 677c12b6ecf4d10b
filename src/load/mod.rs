//! The load table: admission control for section dispatch.
//!
//! A fixed array of per-resource entries behind one lock. Sections are
//! small and the critical sections are O(number of resources), so a single
//! table-wide mutex is enough; nothing here is ever held across an await.
//!
//! The table is designed to be shared: several scheduler instances can
//! admit against one `Arc<LoadTable>`, and the entry layout is `#[repr(C)]`
//! and `Pod` so a shared-memory backend can map the same bytes. The first
//! creator zeroes the table; when the last holder drops its `Arc` the
//! state goes with it, which is the attach/detach protocol of the original
//! cross-process segment expressed through ownership.

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::kernel::{CoreId, CoreLoad, CORE_COUNT};

/// One resource's admission state. The byte layout is part of the external
/// contract and must stay stable.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct LoadEntry {
    pub current_load: u32,
    pub maximum_load: u32,
}

/// Process-wide admission ledger, indexed by [`CoreId`].
#[derive(Default)]
pub struct LoadTable {
    entries: Mutex<[LoadEntry; CORE_COUNT]>,
}

impl LoadTable {
    /// Create a zeroed table. Every maximum starts at zero and is seeded
    /// by manager discovery or [`set_max_load`](Self::set_max_load).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_load(&self, core: CoreId, load: u32) {
        let mut entries = self.entries.lock();
        entries[core.index()].maximum_load = load;
        debug!(?core, load, "maximum load updated");
    }

    pub fn max_load(&self, core: CoreId) -> u32 {
        self.entries.lock()[core.index()].maximum_load
    }

    pub fn current_load(&self, core: CoreId) -> u32 {
        self.entries.lock()[core.index()].current_load
    }

    /// Reserve a section's projected load, all or nothing.
    ///
    /// Every resource with a nonzero projected load is checked and applied
    /// under the one lock; if any resource would exceed its maximum, no
    /// increment is kept and the call fails.
    pub fn commit(&self, load: &CoreLoad) -> bool {
        let mut entries = self.entries.lock();
        for (core, add) in load.nonzero() {
            let entry = &entries[core.index()];
            if entry.current_load.saturating_add(add) > entry.maximum_load {
                error!(
                    ?core,
                    add,
                    current = entry.current_load,
                    maximum = entry.maximum_load,
                    "could not commit load, exceeds maximum"
                );
                return false;
            }
        }
        for (core, add) in load.nonzero() {
            entries[core.index()].current_load += add;
            debug!(?core, add, "committed load");
        }
        true
    }

    /// Release a previously committed reservation. Cannot fail.
    pub fn decommit(&self, load: &CoreLoad) {
        let mut entries = self.entries.lock();
        for (core, sub) in load.nonzero() {
            let entry = &mut entries[core.index()];
            entry.current_load = entry.current_load.saturating_sub(sub);
        }
    }
}
