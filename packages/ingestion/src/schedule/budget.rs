//! AI spend budgets.
//!
//! Two nested ceilings: a global per-tick counter shared by every run the
//! tick dispatched, and a per-run counter. An exhausted budget turns AI
//! calls into no-ops that leave fields missing. Bypass requires the
//! explicit admin flag.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::config::AiBudgetConfig;

/// Tick-wide ceiling shared across all concurrent runs.
#[derive(Debug)]
pub struct TickBudget {
    remaining: AtomicI64,
}

impl TickBudget {
    pub fn new(per_tick: u32) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicI64::new(per_tick as i64),
        })
    }

    fn try_take(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::SeqCst) > 0
    }

    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::SeqCst).max(0)
    }
}

/// Budget handed to one source run.
#[derive(Debug)]
pub struct RunBudget {
    tick: Arc<TickBudget>,
    run_remaining: AtomicI64,
    bypass: bool,
}

impl RunBudget {
    pub fn new(tick: Arc<TickBudget>, cfg: &AiBudgetConfig) -> Self {
        Self {
            tick,
            run_remaining: AtomicI64::new(cfg.per_run as i64),
            bypass: false,
        }
    }

    /// Unlimited budget for admin-triggered runs that set the bypass flag.
    pub fn unlimited() -> Self {
        Self {
            tick: TickBudget::new(u32::MAX),
            run_remaining: AtomicI64::new(i64::MAX),
            bypass: true,
        }
    }

    /// Zero budget: every AI call no-ops.
    pub fn exhausted() -> Self {
        Self {
            tick: TickBudget::new(0),
            run_remaining: AtomicI64::new(0),
            bypass: false,
        }
    }

    /// Reserve one AI call. Returns false when either ceiling is spent.
    pub fn try_spend(&self) -> bool {
        if self.bypass {
            return true;
        }
        if self.run_remaining.fetch_sub(1, Ordering::SeqCst) <= 0 {
            return false;
        }
        if !self.tick.try_take() {
            // Refund the run slot; the tick ceiling is the binding one.
            self.run_remaining.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(per_tick: u32, per_run: u32) -> AiBudgetConfig {
        AiBudgetConfig {
            per_tick,
            per_run,
            cache_size: 16,
        }
    }

    #[test]
    fn per_run_ceiling_binds() {
        let tick = TickBudget::new(100);
        let budget = RunBudget::new(tick, &cfg(100, 2));
        assert!(budget.try_spend());
        assert!(budget.try_spend());
        assert!(!budget.try_spend());
    }

    #[test]
    fn tick_ceiling_binds_across_runs() {
        let tick = TickBudget::new(3);
        let a = RunBudget::new(Arc::clone(&tick), &cfg(3, 10));
        let b = RunBudget::new(Arc::clone(&tick), &cfg(3, 10));

        assert!(a.try_spend());
        assert!(b.try_spend());
        assert!(a.try_spend());
        assert!(!b.try_spend());
        assert!(!a.try_spend());
        assert_eq!(tick.remaining(), 0);
    }

    #[test]
    fn bypass_ignores_ceilings() {
        let budget = RunBudget::unlimited();
        for _ in 0..1000 {
            assert!(budget.try_spend());
        }
    }
}
