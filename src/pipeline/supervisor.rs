//! Adaptive buffer sizing
//!
//! Samples ring utilisation on the consumer thread, never on the
//! producer's critical path, and delegates the grow/shrink decision to
//! the ring's own policy (which enforces the resize cooldown and
//! capacity bounds). A check interval keeps the `Instant` reads off the
//! per-window hot path.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::buffer::resizable::ResizableRing;

pub(crate) struct ResizeSupervisor {
    enabled: bool,
    check_interval: Duration,
    last_check: Instant,
}

impl ResizeSupervisor {
    pub(crate) fn new(enabled: bool, check_interval: Duration) -> Self {
        Self {
            enabled,
            check_interval,
            last_check: Instant::now(),
        }
    }

    /// Sample utilisation and apply the resize policy when due. Returns
    /// whether a resize happened.
    pub(crate) fn maybe_resize(&mut self, ring: &ResizableRing) -> bool {
        if !self.enabled {
            return false;
        }
        if self.last_check.elapsed() < self.check_interval {
            return false;
        }
        self.last_check = Instant::now();

        let utilization = ring.utilization();
        let resized = ring.resize_based_on_utilization(utilization);
        if resized {
            debug!(
                utilization,
                new_capacity = ring.capacity(),
                "supervisor resized ring"
            );
        }
        resized
    }
}
