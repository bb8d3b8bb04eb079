//! Foreground execution indication.
//!
//! While a publish is active the operator must be able to see it,
//! even when no interactive surface is attached. The presenter drives
//! an indicator through a backend trait and carries the host's
//! shutdown signal for the moment the session ends for good.

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

/// Indicator title shown while a publish is active.
pub const INDICATOR_TITLE: &str = "Live stream active";

/// Indicator body shown while a publish is active.
pub const INDICATOR_BODY: &str = "Publishing continues in the background.";

/// Where the execution indicator is rendered.
pub trait IndicatorBackend: Send {
    /// Shows or refreshes the indicator.
    fn show(&mut self, title: &str, body: &str);

    /// Removes the indicator.
    fn clear(&mut self);
}

/// Backend that renders the indicator into the log.
#[derive(Default)]
pub struct LogIndicator;

impl LogIndicator {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

impl IndicatorBackend for LogIndicator {
    fn show(&mut self, title: &str, body: &str) {
        info!(title = title, body = body, "Execution indicator shown");
    }

    fn clear(&mut self) {
        info!("Execution indicator cleared");
    }
}

/// Surfaces the session's publish state to the operator.
///
/// Activation is repeatable; every call refreshes the indicator.
/// Deactivating with `remove_indicator` also fires the registered
/// shutdown signal, exactly once over the presenter's lifetime.
pub struct ExecutionModePresenter {
    backend: Box<dyn IndicatorBackend>,
    shutdown_tx: Option<Sender<()>>,
    active: bool,
    shutdown_sent: bool,
}

impl ExecutionModePresenter {
    /// Creates a presenter over the given backend.
    pub fn new(backend: Box<dyn IndicatorBackend>) -> Self {
        Self {
            backend,
            shutdown_tx: None,
            active: false,
            shutdown_sent: false,
        }
    }

    /// Registers the channel signalled when the session ends for good.
    pub fn set_shutdown_signal(&mut self, tx: Sender<()>) {
        self.shutdown_tx = Some(tx);
    }

    /// Shows or refreshes the indicator.
    pub fn activate(&mut self) {
        self.backend.show(INDICATOR_TITLE, INDICATOR_BODY);
        if !self.active {
            debug!("Execution indicator activated");
            self.active = true;
        }
    }

    /// Clears the indicator if shown; with `remove_indicator` also
    /// fires the shutdown signal.
    pub fn deactivate(&mut self, remove_indicator: bool) {
        if self.active {
            self.backend.clear();
            self.active = false;
            debug!("Execution indicator deactivated");
        }

        if remove_indicator && !self.shutdown_sent {
            self.shutdown_sent = true;
            if let Some(tx) = &self.shutdown_tx {
                if let Err(e) = tx.try_send(()) {
                    warn!("Failed to deliver shutdown signal: {}", e);
                }
            }
        }
    }

    /// Returns true while the indicator is shown.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crossbeam_channel::bounded;

    struct Probe {
        shows: Arc<AtomicUsize>,
        clears: Arc<AtomicUsize>,
    }

    fn probe() -> (Probe, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let shows = Arc::new(AtomicUsize::new(0));
        let clears = Arc::new(AtomicUsize::new(0));
        let backend = Probe {
            shows: Arc::clone(&shows),
            clears: Arc::clone(&clears),
        };
        (backend, shows, clears)
    }

    impl IndicatorBackend for Probe {
        fn show(&mut self, _title: &str, _body: &str) {
            self.shows.fetch_add(1, Ordering::SeqCst);
        }

        fn clear(&mut self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_activate_refreshes_on_every_call() {
        let (backend, shows, _) = probe();
        let mut presenter = ExecutionModePresenter::new(Box::new(backend));

        presenter.activate();
        presenter.activate();
        presenter.activate();

        assert!(presenter.is_active());
        assert_eq!(shows.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_deactivate_clears_only_when_shown() {
        let (backend, _, clears) = probe();
        let mut presenter = ExecutionModePresenter::new(Box::new(backend));

        presenter.deactivate(false);
        assert_eq!(clears.load(Ordering::SeqCst), 0);

        presenter.activate();
        presenter.deactivate(false);
        presenter.deactivate(false);
        assert_eq!(clears.load(Ordering::SeqCst), 1);
        assert!(!presenter.is_active());
    }

    #[test]
    fn test_shutdown_signal_fires_exactly_once() {
        let (backend, _, _) = probe();
        let mut presenter = ExecutionModePresenter::new(Box::new(backend));
        let (tx, rx) = bounded(1);
        presenter.set_shutdown_signal(tx);

        presenter.activate();
        presenter.deactivate(true);
        presenter.deactivate(true);
        presenter.deactivate(true);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_soft_deactivate_does_not_signal() {
        let (backend, _, _) = probe();
        let mut presenter = ExecutionModePresenter::new(Box::new(backend));
        let (tx, rx) = bounded(1);
        presenter.set_shutdown_signal(tx);

        presenter.activate();
        presenter.deactivate(false);
        assert!(rx.try_recv().is_err());

        presenter.deactivate(true);
        assert!(rx.try_recv().is_ok());
    }
}
