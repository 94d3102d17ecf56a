//! Per-tier upgrade budget for one invocation.

use std::time::Duration;

/// Number of applications one tier may start upgrading in one run.
///
/// `max(1, floor(interval_secs * upgrades_per_minute / 60))`. The floor of
/// one means a rate of zero still upgrades one application per run.
pub fn budget(interval: Duration, upgrades_per_minute: f64) -> usize {
    let n = (interval.as_secs() as f64 * (upgrades_per_minute / 60.0)) as usize;
    n.max(1)
}
