//! Error queue
//!
//! Lifecycle runs hand their errors to an [`ErrorReporter`]; a single
//! [`ErrorConsumer`] task logs them. Reporting never blocks: when the queue is
//! full the newest error is logged on the spot and dropped.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, warn};

use crate::service::LifecycleError;

/// Default queue capacity
pub const ERROR_QUEUE_CAPACITY: usize = 64;

/// Creates a bounded error queue
pub fn error_queue(capacity: usize) -> (ErrorReporter, ErrorConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (ErrorReporter { tx }, ErrorConsumer { rx })
}

/// Sending half, cloned into every lifecycle task
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<LifecycleError>,
}

impl ErrorReporter {
    /// Queues an error without waiting
    ///
    /// Returns whether the error was queued.
    pub fn report(&self, error: LifecycleError) -> bool {
        match self.tx.try_send(error) {
            Ok(()) => true,
            Err(TrySendError::Full(error)) => {
                warn!("Error queue full, dropping error");
                log_error(&error);
                false
            }
            Err(TrySendError::Closed(error)) => {
                log_error(&error);
                false
            }
        }
    }
}

/// Receiving half
pub struct ErrorConsumer {
    rx: mpsc::Receiver<LifecycleError>,
}

impl ErrorConsumer {
    /// Logs errors until every reporter is dropped
    ///
    /// Returns the number of errors received.
    pub async fn run(mut self) -> usize {
        let mut received = 0;
        while let Some(error) = self.rx.recv().await {
            log_error(&error);
            received += 1;
        }
        received
    }
}

fn log_error(e: &LifecycleError) {
    if e.is_terminal_report() {
        error!(terminal = true, "Job state not reported, it may be stuck running: {}", e);
    } else if e.is_forbidden() {
        error!("Runner rejected by the server, check its token: {}", e);
    } else {
        error!("{}", e);
    }
}
