//! The graph gate: a reference-counted guard between graph execution and
//! scheduler teardown.

use parking_lot::Mutex;
use tokio::sync::Notify;

struct GateState {
    enabled: bool,
    in_flight: u32,
}

/// Counts in-flight graph calls and lets teardown wait for them to drain.
///
/// Once [`close`](GraphGate::close) has begun, new entries are rejected
/// immediately rather than queued; calls admitted earlier run to
/// completion and the closer blocks until the count reaches zero.
pub(crate) struct GraphGate {
    state: Mutex<GateState>,
    drained: Notify,
}

impl GraphGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                enabled: true,
                in_flight: 0,
            }),
            drained: Notify::new(),
        }
    }

    /// Try to enter the gate. `false` means teardown has already begun.
    pub(crate) fn enter(&self) -> bool {
        let mut state = self.state.lock();
        if state.enabled {
            state.in_flight += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn exit(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0, "gate exit without matching enter");
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            // notify_one stores a permit when the closer has not started
            // polling yet, so the drain signal cannot be missed.
            self.drained.notify_one();
        }
    }

    /// Disable the gate, then wait for in-flight calls to drain.
    pub(crate) async fn close(&self) {
        loop {
            {
                let mut state = self.state.lock();
                state.enabled = false;
                if state.in_flight == 0 {
                    return;
                }
            }
            self.drained.notified().await;
        }
    }
}
