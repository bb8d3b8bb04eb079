//! System locks and the guard that keeps them held.
//!
//! Publishing must survive the host dimming its display or idling the
//! network interface. The guard acquires one wake lock and one network
//! lock for the lifetime of a session; locks that the platform grants
//! only for a limited time are renewed by a keeper thread before they
//! expire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{LockError, LockResult, KEEPER_POLL_INTERVAL};

/// A platform lock that keeps some resource from idling.
pub trait SystemLock: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Acquires the lock, or re-acquires it to extend the hold.
    fn acquire(&mut self) -> LockResult<()>;

    /// Releases the lock. Must be safe to call when not held.
    fn release(&mut self);

    /// How long a single acquire holds, if the platform limits it.
    fn hold_limit(&self) -> Option<Duration> {
        None
    }
}

/// A lock for platforms that provide none of the given kind.
pub struct UnsupportedLock {
    name: &'static str,
}

impl UnsupportedLock {
    /// Creates a lock that always reports itself unsupported.
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl SystemLock for UnsupportedLock {
    fn name(&self) -> &'static str {
        self.name
    }

    fn acquire(&mut self) -> LockResult<()> {
        Err(LockError::Unsupported(self.name.to_string()))
    }

    fn release(&mut self) {}
}

struct LockSlot {
    inner: Box<dyn SystemLock>,
    held: bool,
    acquired_at: Instant,
}

impl LockSlot {
    fn new(inner: Box<dyn SystemLock>) -> Self {
        Self {
            inner,
            held: false,
            acquired_at: Instant::now(),
        }
    }
}

/// Holds the wake and network locks for the life of a session.
///
/// Lock failures degrade rather than abort: a denied lock is logged
/// and the session runs without it. Acquire and release are both
/// idempotent, and dropping the guard releases whatever is held.
pub struct ResourceGuard {
    wake: Arc<Mutex<LockSlot>>,
    network: Arc<Mutex<LockSlot>>,
    keeper: Option<JoinHandle<()>>,
    keeper_stop: Arc<AtomicBool>,
}

impl ResourceGuard {
    /// Creates a guard over a wake lock and a network lock.
    pub fn new(wake: Box<dyn SystemLock>, network: Box<dyn SystemLock>) -> Self {
        Self {
            wake: Arc::new(Mutex::new(LockSlot::new(wake))),
            network: Arc::new(Mutex::new(LockSlot::new(network))),
            keeper: None,
            keeper_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Acquires both locks, skipping any already held.
    pub fn acquire(&mut self) {
        acquire_slot(&self.wake);
        acquire_slot(&self.network);

        if self.keeper.is_none() && self.needs_keeper() {
            self.spawn_keeper();
        }
    }

    /// Releases both locks and stops the keeper thread.
    pub fn release(&mut self) {
        self.stop_keeper();
        release_slot(&self.wake);
        release_slot(&self.network);
    }

    /// Returns true while at least one lock is held.
    pub fn is_held(&self) -> bool {
        self.wake.lock().held || self.network.lock().held
    }

    fn needs_keeper(&self) -> bool {
        let limited = |slot: &Arc<Mutex<LockSlot>>| {
            let slot = slot.lock();
            slot.held && slot.inner.hold_limit().is_some()
        };
        limited(&self.wake) || limited(&self.network)
    }

    fn spawn_keeper(&mut self) {
        self.keeper_stop.store(false, Ordering::SeqCst);
        let slots = vec![Arc::clone(&self.wake), Arc::clone(&self.network)];
        let stop = Arc::clone(&self.keeper_stop);
        self.keeper = Some(thread::spawn(move || keeper_loop(slots, stop)));
    }

    fn stop_keeper(&mut self) {
        self.keeper_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.keeper.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

fn acquire_slot(slot: &Arc<Mutex<LockSlot>>) {
    let mut slot = slot.lock();
    if slot.held {
        return;
    }

    match slot.inner.acquire() {
        Ok(()) => {
            slot.held = true;
            slot.acquired_at = Instant::now();
            debug!(lock = slot.inner.name(), "Lock acquired");
        }
        Err(e) => {
            warn!(lock = slot.inner.name(), "Continuing without lock: {}", e);
        }
    }
}

fn release_slot(slot: &Arc<Mutex<LockSlot>>) {
    let mut slot = slot.lock();
    if !slot.held {
        return;
    }

    slot.inner.release();
    slot.held = false;
    debug!(lock = slot.inner.name(), "Lock released");
}

fn keeper_loop(slots: Vec<Arc<Mutex<LockSlot>>>, stop: Arc<AtomicBool>) {
    debug!("Lock keeper thread started");

    while !stop.load(Ordering::SeqCst) {
        thread::sleep(KEEPER_POLL_INTERVAL);

        for slot in &slots {
            renew_if_due(slot);
        }
    }

    debug!("Lock keeper thread exiting");
}

fn renew_if_due(slot: &Arc<Mutex<LockSlot>>) {
    let mut slot = slot.lock();
    if !slot.held {
        return;
    }

    let limit = match slot.inner.hold_limit() {
        Some(limit) => limit,
        None => return,
    };
    // Renew at half the hold limit so a missed poll still lands
    // inside the window.
    if slot.acquired_at.elapsed() < limit / 2 {
        return;
    }

    match slot.inner.acquire() {
        Ok(()) => {
            slot.acquired_at = Instant::now();
            debug!(lock = slot.inner.name(), "Lock renewed");
        }
        Err(e) => {
            slot.held = false;
            warn!(lock = slot.inner.name(), "Lock renewal failed, continuing without it: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    struct FakeLock {
        name: &'static str,
        acquires: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
        deny: bool,
        deny_after_first: bool,
        limit: Option<Duration>,
    }

    impl FakeLock {
        fn new(name: &'static str) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let acquires = Arc::new(AtomicUsize::new(0));
            let releases = Arc::new(AtomicUsize::new(0));
            let lock = Self {
                name,
                acquires: Arc::clone(&acquires),
                releases: Arc::clone(&releases),
                deny: false,
                deny_after_first: false,
                limit: None,
            };
            (lock, acquires, releases)
        }
    }

    impl SystemLock for FakeLock {
        fn name(&self) -> &'static str {
            self.name
        }

        fn acquire(&mut self) -> LockResult<()> {
            let n = self.acquires.fetch_add(1, Ordering::SeqCst);
            if self.deny || (self.deny_after_first && n > 0) {
                return Err(LockError::Denied(self.name.to_string()));
            }
            Ok(())
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn hold_limit(&self) -> Option<Duration> {
            self.limit
        }
    }

    #[test]
    fn test_acquire_then_release_cycles_both_locks() {
        let (wake, wake_acquires, wake_releases) = FakeLock::new("wake");
        let (net, net_acquires, net_releases) = FakeLock::new("network");

        let mut guard = ResourceGuard::new(Box::new(wake), Box::new(net));
        assert!(!guard.is_held());

        guard.acquire();
        assert!(guard.is_held());
        assert_eq!(wake_acquires.load(Ordering::SeqCst), 1);
        assert_eq!(net_acquires.load(Ordering::SeqCst), 1);

        guard.release();
        assert!(!guard.is_held());
        assert_eq!(wake_releases.load(Ordering::SeqCst), 1);
        assert_eq!(net_releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let (wake, wake_acquires, _) = FakeLock::new("wake");
        let (net, _, _) = FakeLock::new("network");

        let mut guard = ResourceGuard::new(Box::new(wake), Box::new(net));
        guard.acquire();
        guard.acquire();

        assert_eq!(wake_acquires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (wake, _, wake_releases) = FakeLock::new("wake");
        let (net, _, _) = FakeLock::new("network");

        let mut guard = ResourceGuard::new(Box::new(wake), Box::new(net));
        guard.acquire();
        guard.release();
        guard.release();

        assert_eq!(wake_releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_denied_lock_degrades_without_failing() {
        let (mut wake, _, wake_releases) = FakeLock::new("wake");
        wake.deny = true;
        let (net, _, net_releases) = FakeLock::new("network");

        let mut guard = ResourceGuard::new(Box::new(wake), Box::new(net));
        guard.acquire();

        // Network lock still held even though the wake lock was denied.
        assert!(guard.is_held());

        guard.release();
        assert_eq!(wake_releases.load(Ordering::SeqCst), 0);
        assert_eq!(net_releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsupported_locks_never_hold() {
        let mut guard = ResourceGuard::new(
            Box::new(UnsupportedLock::new("wake")),
            Box::new(UnsupportedLock::new("network")),
        );

        guard.acquire();
        assert!(!guard.is_held());
        guard.release();
    }

    #[test]
    fn test_keeper_renews_time_limited_lock() {
        let (mut wake, wake_acquires, _) = FakeLock::new("wake");
        wake.limit = Some(Duration::from_millis(100));
        let (net, net_acquires, _) = FakeLock::new("network");

        let mut guard = ResourceGuard::new(Box::new(wake), Box::new(net));
        guard.acquire();
        assert_eq!(wake_acquires.load(Ordering::SeqCst), 1);

        thread::sleep(Duration::from_millis(500));

        assert!(wake_acquires.load(Ordering::SeqCst) >= 2);
        assert_eq!(net_acquires.load(Ordering::SeqCst), 1);

        guard.release();
    }

    #[test]
    fn test_failed_renewal_drops_the_lock() {
        let (mut wake, _, wake_releases) = FakeLock::new("wake");
        wake.limit = Some(Duration::from_millis(100));
        wake.deny_after_first = true;
        let (net, _, net_releases) = FakeLock::new("network");

        let mut guard = ResourceGuard::new(Box::new(wake), Box::new(net));
        guard.acquire();
        assert!(guard.is_held());

        thread::sleep(Duration::from_millis(500));

        guard.release();
        // The wake lock was dropped by the failed renewal, so release
        // never touches it; the network lock releases normally.
        assert_eq!(wake_releases.load(Ordering::SeqCst), 0);
        assert_eq!(net_releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_held_locks() {
        let (wake, _, wake_releases) = FakeLock::new("wake");
        let (net, _, _) = FakeLock::new("network");

        {
            let mut guard = ResourceGuard::new(Box::new(wake), Box::new(net));
            guard.acquire();
        }

        assert_eq!(wake_releases.load(Ordering::SeqCst), 1);
    }
}
