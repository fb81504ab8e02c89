//! Process-local counters (§10.4): ambient bookkeeping only. The expanded spec's Non-goal
//! around an outward-facing metrics exporter excludes shipping these anywhere, not
//! counting them in the first place — see DESIGN.md.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Counters {
    pub vertex_checks: AtomicU64,
    pub check_apply_ok: AtomicU64,
    pub check_apply_err: AtomicU64,
    pub retries: AtomicU64,
    pub commits: AtomicU64,
    pub aborts: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub vertex_checks: u64,
    pub check_apply_ok: u64,
    pub check_apply_err: u64,
    pub retries: u64,
    pub commits: u64,
    pub aborts: u64,
}

impl Counters {
    pub fn new() -> Self {
        Counters::default()
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            vertex_checks: self.vertex_checks.load(Ordering::Relaxed),
            check_apply_ok: self.check_apply_ok.load(Ordering::Relaxed),
            check_apply_err: self.check_apply_err.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let counters = Counters::new();
        counters.commits.fetch_add(1, Ordering::Relaxed);
        counters.check_apply_ok.fetch_add(3, Ordering::Relaxed);
        let snap = counters.snapshot();
        assert_eq!(snap.commits, 1);
        assert_eq!(snap.check_apply_ok, 3);
        assert_eq!(snap.retries, 0);
    }
}
