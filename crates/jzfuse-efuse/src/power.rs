//! VDDQ power sequencing
//!
//! The 2.5 V programming supply must only be up for the duration of a
//! program cycle. [`Sequencer::raise`] arms a watchdog that forces the
//! supply off if [`Sequencer::lower`] is not called in time, so a wedged
//! controller or a stalled caller cannot leave VDDQ on.
//!
//! The watchdog runs on its own thread and takes the register lock before
//! touching the supply, the same lock the program path holds while it
//! raises and lowers.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use jzfuse_core::hal::{RegisterBus, VddqLine};
use jzfuse_core::{Error, Result};

use crate::{lock, Hardware};

/// The enable line and the "supply asserted" flag
pub(crate) struct Supply<L> {
    line: L,
    asserted: bool,
    /// Watchdog arming that belongs to the current raise
    generation: u64,
    trips: usize,
}

impl<L: VddqLine> Supply<L> {
    pub(crate) fn new(line: L) -> Self {
        Self {
            line,
            asserted: false,
            generation: 0,
            trips: 0,
        }
    }

    pub(crate) fn is_asserted(&self) -> bool {
        self.asserted
    }

    pub(crate) fn trips(&self) -> usize {
        self.trips
    }

    /// Drive the line to match the flag
    pub(crate) fn drive(&mut self) -> Result<()> {
        log::debug!("VDDQ {}", if self.asserted { "on" } else { "off" });
        self.line.set_enabled(self.asserted).map_err(|e| {
            log::error!("failed to drive VDDQ enable line: {}", e);
            Error::PowerControl
        })
    }

    /// Watchdog expiry: force the supply off if it is still up
    ///
    /// An expiry left over from an earlier raise is ignored.
    fn fail_safe(&mut self, generation: u64) {
        if !self.asserted || generation != self.generation {
            return;
        }

        log::warn!("VDDQ protect timer expired, forcing supply off");
        self.asserted = false;
        self.trips += 1;
        if let Err(e) = self.drive() {
            log::error!("watchdog could not lower VDDQ: {}", e);
        }
    }
}

/// Raises and lowers the supply under the watchdog
pub(crate) struct Sequencer {
    watchdog: Watchdog,
    timeout: Duration,
}

impl Sequencer {
    /// Start the watchdog thread for the supply held in `hw`
    pub(crate) fn spawn<B, L>(hw: Arc<Mutex<Hardware<B, L>>>, timeout: Duration) -> Result<Self>
    where
        B: RegisterBus + Send + 'static,
        L: VddqLine + Send + 'static,
    {
        let watchdog = Watchdog::spawn(move |generation| lock(&hw).supply.fail_safe(generation))?;
        Ok(Self { watchdog, timeout })
    }

    /// Arm the watchdog, set the flag, switch the supply on
    ///
    /// Refused once the watchdog has been shut down.
    pub(crate) fn raise<L: VddqLine>(&self, supply: &mut Supply<L>) -> Result<()> {
        supply.generation = self.watchdog.arm(self.timeout)?;
        supply.asserted = true;
        supply.drive()
    }

    /// Clear the flag, disarm the watchdog, switch the supply off
    pub(crate) fn lower<L: VddqLine>(&self, supply: &mut Supply<L>) -> Result<()> {
        supply.asserted = false;
        self.watchdog.disarm();
        supply.drive()
    }

    /// Stop the watchdog thread. Returns false if it was already stopped.
    pub(crate) fn shutdown(&mut self) -> bool {
        self.watchdog.shutdown()
    }
}

#[derive(Default)]
struct Schedule {
    deadline: Option<Instant>,
    /// Bumped on every arm
    generation: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    schedule: Mutex<Schedule>,
    changed: Condvar,
}

/// One-shot timer on a dedicated thread that can be re-armed and disarmed
struct Watchdog {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn spawn(on_expire: impl Fn(u64) + Send + 'static) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);

        let thread = thread::Builder::new()
            .name("jzfuse-vddq".into())
            .spawn(move || watchdog_loop(&worker, on_expire))
            .map_err(|e| {
                log::error!("failed to start VDDQ watchdog: {}", e);
                Error::PowerControl
            })?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Arm (or re-arm) the timer, returning the generation of this arming
    fn arm(&self, timeout: Duration) -> Result<u64> {
        if self.thread.is_none() {
            log::error!("VDDQ watchdog is not running, refusing to raise the supply");
            return Err(Error::PowerControl);
        }

        let generation = {
            let mut schedule = lock(&self.shared.schedule);
            schedule.generation += 1;
            schedule.deadline = Some(Instant::now() + timeout);
            schedule.generation
        };
        self.shared.changed.notify_one();
        Ok(generation)
    }

    fn disarm(&self) {
        lock(&self.shared.schedule).deadline = None;
        self.shared.changed.notify_one();
    }

    fn shutdown(&mut self) -> bool {
        let Some(thread) = self.thread.take() else {
            return false;
        };

        {
            let mut schedule = lock(&self.shared.schedule);
            schedule.deadline = None;
            schedule.shutdown = true;
        }
        self.shared.changed.notify_one();

        if thread.join().is_err() {
            log::error!("VDDQ watchdog thread panicked");
        }
        true
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watchdog_loop(shared: &Shared, on_expire: impl Fn(u64)) {
    let mut schedule = lock(&shared.schedule);

    loop {
        if schedule.shutdown {
            return;
        }

        match schedule.deadline {
            None => {
                schedule = shared
                    .changed
                    .wait(schedule)
                    .unwrap_or_else(|e| e.into_inner());
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    schedule.deadline = None;
                    let generation = schedule.generation;
                    // The callback takes the register lock; never hold both
                    drop(schedule);
                    on_expire(generation);
                    schedule = lock(&shared.schedule);
                } else {
                    schedule = shared
                        .changed
                        .wait_timeout(schedule, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|e| e.into_inner().0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_watchdog() -> (Watchdog, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let watchdog = Watchdog::spawn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (watchdog, fired)
    }

    #[test]
    fn test_watchdog_fires_once() {
        let (mut watchdog, fired) = counting_watchdog();
        watchdog.arm(Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(watchdog.shutdown());
    }

    #[test]
    fn test_watchdog_disarm() {
        let (mut watchdog, fired) = counting_watchdog();
        watchdog.arm(Duration::from_millis(100)).unwrap();
        watchdog.disarm();
        thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(watchdog.shutdown());
        assert!(!watchdog.shutdown());
    }

    #[test]
    fn test_watchdog_rearm_extends() {
        let (mut watchdog, fired) = counting_watchdog();
        watchdog.arm(Duration::from_secs(60)).unwrap();
        watchdog.arm(Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        watchdog.shutdown();
    }

    #[test]
    fn test_generation_per_arm() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut watchdog = Watchdog::spawn(move |generation| lock(&log).push(generation)).unwrap();

        assert_eq!(watchdog.arm(Duration::from_secs(60)), Ok(1));
        assert_eq!(watchdog.arm(Duration::from_millis(10)), Ok(2));
        thread::sleep(Duration::from_millis(200));
        assert_eq!(*lock(&seen), vec![2]);
        watchdog.shutdown();
    }

    #[test]
    fn test_stale_expiry_ignored() {
        struct Line;
        impl VddqLine for Line {
            fn set_enabled(&mut self, _enabled: bool) -> Result<()> {
                Ok(())
            }
        }

        let mut supply = Supply::new(Line);
        supply.asserted = true;
        supply.generation = 3;

        supply.fail_safe(2);
        assert!(supply.is_asserted());
        supply.fail_safe(3);
        assert!(!supply.is_asserted());
        assert_eq!(supply.trips(), 1);
    }

    #[test]
    fn test_shutdown_while_armed() {
        let (mut watchdog, fired) = counting_watchdog();
        watchdog.arm(Duration::from_secs(60)).unwrap();
        assert!(watchdog.shutdown());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_arm_after_shutdown() {
        let (mut watchdog, fired) = counting_watchdog();
        assert!(watchdog.shutdown());
        assert_eq!(watchdog.arm(Duration::from_millis(1)), Err(Error::PowerControl));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
