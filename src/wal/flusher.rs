//! Background Flusher
//!
//! Periodically moves buffered frames into the active log file so unforced
//! appends do not sit in memory indefinitely.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{LogError, Result};

use super::log::LogWriter;

/// Handle on the flusher thread; stops and joins it on drop
pub(crate) struct Flusher {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Spawn a thread flushing `writer` every `interval`
    pub(crate) fn spawn(writer: Arc<Mutex<LogWriter>>, interval: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("dirwal-flusher".to_string())
            .spawn(move || {
                let ticker = channel::tick(interval);
                debug!(?interval, "Log flusher started");

                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => {
                            match writer.lock().flush(false) {
                                Ok(()) => {}
                                Err(LogError::Closed) => break,
                                Err(e) => error!(error = %e, "Background log flush failed"),
                            }
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }

                debug!("Log flusher stopped");
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit
    pub(crate) fn stop(&mut self) {
        // Dropping the sender wakes the thread even if the signal is lost
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Log flusher thread panicked");
            }
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.stop();
    }
}
