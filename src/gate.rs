//! Coordination between depositors and a drain
//!
//! Release registers as a depositor before it checks the draining flag, and a
//! drain raises the flag before it waits for depositors to leave. With both
//! sides using `SeqCst`, either the depositor sees the flag and routes its
//! object to the destructor, or the drain waits until the deposit has landed
//! and then collects it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
pub(crate) struct DrainGate {
    draining: AtomicBool,
    depositors: AtomicUsize,
}

/// Held by a release while it deposits into pool storage.
pub(crate) struct DepositGuard<'a> {
    gate: &'a DrainGate,
}

/// Held by the single drain in progress; lowers the flag on drop.
pub(crate) struct DrainGuard<'a> {
    gate: &'a DrainGate,
}

impl DrainGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// `None` while a drain is in progress.
    pub fn enter(&self) -> Option<DepositGuard<'_>> {
        self.depositors.fetch_add(1, Ordering::SeqCst);
        if self.draining.load(Ordering::SeqCst) {
            self.depositors.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(DepositGuard { gate: self })
    }

    /// Raise the draining flag and wait out in-flight deposits. `None` if
    /// another drain already holds the gate.
    pub fn begin_drain(&self) -> Option<DrainGuard<'_>> {
        self.draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        while self.depositors.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
        Some(DrainGuard { gate: self })
    }
}

impl Drop for DepositGuard<'_> {
    fn drop(&mut self) {
        self.gate.depositors.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.gate.draining.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_refused_while_draining() {
        let gate = DrainGate::new();
        let drain = gate.begin_drain().unwrap();
        assert!(gate.is_draining());
        assert!(gate.enter().is_none());
        drop(drain);
        assert!(!gate.is_draining());
        assert!(gate.enter().is_some());
    }

    #[test]
    fn test_single_drain() {
        let gate = DrainGate::new();
        let first = gate.begin_drain();
        assert!(first.is_some());
        assert!(gate.begin_drain().is_none());
    }

    #[test]
    fn test_drain_waits_for_depositor() {
        use std::sync::Arc;
        use std::time::Duration;

        let gate = Arc::new(DrainGate::new());
        let deposit = gate.enter().unwrap();
        let drainer = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || {
                let _guard = gate.begin_drain().unwrap();
                gate.depositors.load(Ordering::SeqCst)
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(!drainer.is_finished());
        drop(deposit);
        assert_eq!(drainer.join().unwrap(), 0);
    }
}
