//! Broadcast, level-triggered signal.
//!
//! One `SignalSource` pulses; any number of cloned `Signal`s observe it.
//! A pulse is permanent. Used as the per-query interruptor and as a
//! namespace's initial-ready signal.

use tokio::sync::watch;

use crate::error::{MetaError, MetaResult};

/// The firing side of a signal.
#[derive(Debug)]
pub struct SignalSource {
    tx: watch::Sender<bool>,
}

impl SignalSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Hand out an observer.
    pub fn signal(&self) -> Signal {
        Signal {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the signal. Pulsing twice is a no-op.
    pub fn pulse(&self) {
        self.tx.send_if_modified(|pulsed| !std::mem::replace(pulsed, true));
    }

    pub fn is_pulsed(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for SignalSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side of a signal. Cheap to clone; every clone sees the
/// same pulse.
#[derive(Clone, Debug)]
pub struct Signal {
    rx: watch::Receiver<bool>,
}

impl Signal {
    /// A signal that can never fire.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// A signal that has already fired.
    pub fn pulsed() -> Self {
        let (_tx, rx) = watch::channel(true);
        Self { rx }
    }

    pub fn is_pulsed(&self) -> bool {
        *self.rx.borrow()
    }

    /// `Err(Interrupted)` once the signal has fired.
    pub fn check(&self) -> MetaResult<()> {
        if self.is_pulsed() {
            Err(MetaError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Resolve once the signal fires. Never resolves if the source was
    /// dropped without pulsing.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|pulsed| *pulsed).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
