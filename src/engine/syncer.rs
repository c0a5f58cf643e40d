//! Periodic sync thread
//!
//! Backs `SyncPolicy::Periodic`: fsyncs the active file on a fixed tick
//! until told to stop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use crossbeam::select;
use parking_lot::RwLock;

use crate::data::DataFile;
use crate::error::Result;

pub(crate) struct Syncer {
    /// Dropping this ends the loop
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Syncer {
    pub(crate) fn spawn(
        active_file: Arc<RwLock<Option<DataFile>>>,
        interval: Duration,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let ticker = channel::tick(interval);

        let handle = thread::Builder::new()
            .name("caskdb-syncer".to_string())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        let active_guard = active_file.read();
                        if let Some(active) = active_guard.as_ref() {
                            if let Err(e) = active.sync() {
                                tracing::warn!(
                                    file_id = active.file_id(),
                                    "periodic sync failed: {}",
                                    e
                                );
                            }
                        }
                    }
                    recv(shutdown_rx) -> _ => return,
                }
            })?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "periodic syncer started");

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("periodic syncer panicked");
            }
        }
    }
}

impl Drop for Syncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
