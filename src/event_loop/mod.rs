use std::net::SocketAddr;
use std::ops::ControlFlow;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adapter::AnalyticsAdapter;
use crate::config::Config;
use crate::ingest_listener::{self, IngestedEvent};
use crate::transport::Transport;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind ingest listener: {0}")]
    Bind(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExitError {
    #[error("ingest listener died unexpectedly")]
    ListenerDied,
}

/// Owns the adapter and the ingest listener, and feeds one into the other.
///
/// Every `track` call, and therefore every queue push and forced flush,
/// happens on this loop.
pub struct EventLoop<T: Transport> {
    adapter: AnalyticsAdapter<T>,
    events_rx: mpsc::Receiver<IngestedEvent>,
    cancel: CancellationToken,
    ingest_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl<T: Transport> EventLoop<T> {
    /// Bind the ingest listener and spawn its server task.
    pub async fn new(
        adapter: AnalyticsAdapter<T>,
        config: &Config,
        cancel: CancellationToken,
    ) -> Result<Self, StartupError> {
        let (events_tx, events_rx) = mpsc::channel::<IngestedEvent>(EVENT_CHANNEL_CAPACITY);

        let listener = TcpListener::bind(("127.0.0.1", config.listener_port)).await?;
        let local_addr = listener.local_addr()?;
        let ingest_task = tokio::spawn(ingest_listener::serve(
            listener,
            events_tx,
            cancel.clone(),
        ));
        info!(%local_addr, active = adapter.is_active(), "listening for auction events");

        Ok(Self {
            adapter,
            events_rx,
            cancel,
            ingest_task,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run until the cancellation token fires.
    ///
    /// Returns `Ok(())` on clean shutdown, or `Err(ExitError)` if the ingest
    /// listener died while the loop was still meant to be running.
    pub async fn run(&mut self) -> Result<(), ExitError> {
        loop {
            match self.tick().await {
                ControlFlow::Break(result) => return result,
                ControlFlow::Continue(()) => {}
            }
        }
    }

    /// Handle one event, or shut down if cancelled. Cancellation is checked
    /// first so shutdown is not starved by a busy channel; events still queued
    /// at that point are drained before the final flush.
    async fn tick(&mut self) -> ControlFlow<Result<(), ExitError>> {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                self.shutdown().await;
                return ControlFlow::Break(Ok(()));
            }
            event = self.events_rx.recv() => {
                match event {
                    Some(IngestedEvent { event_type, args }) => {
                        debug!(event_type, "received auction event");
                        self.adapter.track(&event_type, args);
                    }
                    None => {
                        return ControlFlow::Break(Err(ExitError::ListenerDied));
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }

    async fn shutdown(&mut self) {
        debug!("shutting down event loop");
        let _ = (&mut self.ingest_task).await;

        // Connections still being served now get 502 instead of queueing.
        self.events_rx.close();
        while let Ok(IngestedEvent { event_type, args }) = self.events_rx.try_recv() {
            self.adapter.track(&event_type, args);
        }

        // Best-effort final delivery of whatever is still queued.
        self.adapter.flush();
    }
}
