//! Process-wide cancellation signal for storage backends.
//!
//! A [`ShutdownTrigger`] is held by whoever owns the process lifecycle (the
//! binary's [`stop_signals`] watcher, a test). Every backend receives a
//! [`Shutdown`] clone: it races each operation against the signal and closes
//! its handle once the signal fires.

use std::future::Future;

use log::debug;
use tokio::sync::watch;

use crate::error_handling::types::StorageError;

/// Fires the shutdown signal. Dropping the trigger without firing does not
/// cancel anything.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving side of the shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// OS signal that asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

/// Installs the SIGINT and SIGTERM handlers right away and returns a future
/// resolving with whichever arrives first.
#[cfg(unix)]
pub fn stop_signals() -> std::io::Result<impl Future<Output = StopSignal>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => StopSignal::Interrupt,
            _ = terminate.recv() => StopSignal::Terminate,
        }
    })
}

/// Only Ctrl-C exists here.
#[cfg(not(unix))]
pub fn stop_signals() -> std::io::Result<impl Future<Output = StopSignal>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        StopSignal::Interrupt
    })
}

/// Creates a connected trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Shutdown { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Pends forever if the trigger was
    /// dropped without firing.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Runs `op` unless the signal has fired.
    ///
    /// Fails with `BackendUnavailable` when the signal fired before the call
    /// and with `Cancelled` when it fires while `op` is in flight.
    pub async fn guard<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        if self.is_triggered() {
            return Err(StorageError::BackendUnavailable(
                "storage is shut down".into(),
            ));
        }
        tokio::select! {
            biased;
            _ = self.triggered() => {
                debug!("storage operation cancelled by shutdown");
                Err(StorageError::Cancelled)
            }
            res = op => res,
        }
    }

    /// Spawns a task that runs `on_close` exactly once when the signal fires.
    ///
    /// Returns `false` without spawning anything when the signal can no longer
    /// fire. A hook armed on a trigger that is later dropped unfired ends
    /// without running `on_close`.
    pub fn on_trigger<F, Fut>(&self, on_close: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.rx.clone();
        if !self.is_triggered() && rx.has_changed().is_err() {
            return false;
        }
        tokio::spawn(async move {
            if rx.wait_for(|fired| *fired).await.is_ok() {
                on_close().await;
            }
        });
        true
    }
}
