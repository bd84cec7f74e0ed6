//! Cooperative cancellation for long-running passes

use tokio::sync::watch;

/// Sender side of a [`CancelSignal`]
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by a pass before it starts each unit of work
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Fire when the channel holds `true`, e.g. a shutdown channel
    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Create a connected handle and signal
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal::from_receiver(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_is_not_cancelled() {
        assert!(!CancelSignal::never().is_cancelled());
    }

    #[test]
    fn test_cancel_visible_to_clones() {
        let (handle, signal) = cancel_pair();
        let clone = signal.clone();
        assert!(!signal.is_cancelled());

        handle.cancel();
        assert!(signal.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_signal_outlives_handle() {
        let (handle, signal) = cancel_pair();
        handle.cancel();
        drop(handle);
        assert!(signal.is_cancelled());
    }
}
