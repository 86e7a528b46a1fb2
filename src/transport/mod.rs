use std::time::Duration;

use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::records::Delivery;

const CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// One-way hand-off of a delivery to the network. Nothing about the outcome
/// is reported back to the caller.
pub trait Transport: Send + Sync + 'static {
    fn transmit(&self, delivery: Delivery);
}

/// Fire-and-forget HTTP PUT. Each delivery runs in its own tracked task so
/// shutdown can wait for in-flight requests.
pub struct HttpTransport {
    client: reqwest::Client,
    tracker: TaskTracker,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            tracker: TaskTracker::new(),
        })
    }

    /// Stop accepting new sends and wait up to `grace` for in-flight ones.
    /// Returns `false` if some were still running when the grace ran out.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight > 0 {
            debug!(in_flight, "waiting for in-flight deliveries");
        }
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }
}

impl Transport for HttpTransport {
    fn transmit(&self, delivery: Delivery) {
        let body = match delivery.to_json() {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to encode delivery");
                return;
            }
        };

        let records = delivery.records().len();
        let request = self
            .client
            .put(delivery.url)
            .header("content-type", CONTENT_TYPE)
            .body(body);

        self.tracker.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(records, status = %resp.status(), "delivery sent");
                }
                Ok(resp) => {
                    warn!(records, status = %resp.status(), "collector rejected delivery");
                }
                Err(e) => {
                    warn!(records, error = %e, "delivery failed");
                }
            }
        });
    }
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn transmit(&self, delivery: Delivery) {
        (**self).transmit(delivery);
    }
}
