use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::rules::{Decision, IngestRule};
use crate::storage::lifecycle::Shutdown;
use crate::storage::storage_trait::Storer;
use crate::storage::types::Message;

/// Result of dispatching one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Stored,
    Ignored,
    Rejected,
    Failed,
}

/// Per-outcome counters returned by [`Dispatcher::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub stored: usize,
    pub ignored: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl Tally {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Stored => self.stored += 1,
            Outcome::Ignored => self.ignored += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

/// Routes bus messages to the store. Failures are logged, never propagated.
#[derive(Clone)]
pub struct Dispatcher {
    storage: Arc<dyn Storer>,
    rules: Arc<Vec<IngestRule>>,
}

impl Dispatcher {
    pub fn new(storage: Arc<dyn Storer>, rules: Vec<IngestRule>) -> Self {
        Self {
            storage,
            rules: Arc::new(rules),
        }
    }

    /// The first rule whose prefix matches decides; no match means `Ignored`.
    pub async fn dispatch(&self, msg: Message) -> Outcome {
        let decision = self
            .rules
            .iter()
            .map(|rule| rule.decide(&msg))
            .find(|d| *d != Decision::NoMatch)
            .unwrap_or(Decision::NoMatch);

        match decision {
            Decision::NoMatch | Decision::Skip => {
                debug!("[{}] ignored {}", msg.id, msg.topic);
                Outcome::Ignored
            }
            Decision::Reject(reason) => {
                warn!("[{}] rejected {} {:?}: {}", msg.id, msg.topic, msg.message, reason);
                Outcome::Rejected
            }
            Decision::Store(data) => match self.storage.write(data).await {
                Ok(()) => {
                    debug!("[{}] stored {} = {}", msg.id, msg.topic, msg.message);
                    Outcome::Stored
                }
                Err(e) => {
                    error!("[{}] unable to store {}: {}", msg.id, msg.topic, e);
                    Outcome::Failed
                }
            },
        }
    }

    /// Consumes `rx` until it closes or `shutdown` fires, one writer task per
    /// message. In-flight writes are awaited before returning.
    pub async fn run(&self, mut rx: mpsc::Receiver<Message>, shutdown: Shutdown) -> Tally {
        let mut set = JoinSet::new();
        let mut tally = Tally::default();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    info!("dispatcher stopping");
                    break;
                }
                received = rx.recv() => match received {
                    Some(msg) => {
                        let this = self.clone();
                        set.spawn(async move { this.dispatch(msg).await });
                    }
                    None => {
                        debug!("message channel closed");
                        break;
                    }
                },
                Some(done) = set.join_next(), if !set.is_empty() => match done {
                    Ok(outcome) => tally.record(outcome),
                    Err(e) => {
                        error!("writer task aborted: {}", e);
                        tally.record(Outcome::Failed);
                    }
                },
            }
        }

        while let Some(done) = set.join_next().await {
            tally.record(done.unwrap_or(Outcome::Failed));
        }
        info!(
            "dispatcher done: {} stored, {} ignored, {} rejected, {} failed",
            tally.stored, tally.ignored, tally.rejected, tally.failed
        );
        tally
    }
}
