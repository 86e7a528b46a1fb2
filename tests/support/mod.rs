// Each integration test compiles this module independently via `mod support;`,
// so items used by one test appear unused in others.
#![allow(unused)]

pub mod collector;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hb_analytics_relay::adapter::AnalyticsAdapter;
use hb_analytics_relay::config::{AdapterOptions, Config, PageVersion};
use hb_analytics_relay::event_loop::{EventLoop, ExitError};
use hb_analytics_relay::transport::HttpTransport;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use collector::{CollectedDelivery, CollectorStore};

/// A relay running in-process against a local collector.
pub struct Relay {
    pub addr: SocketAddr,
    pub store: CollectorStore,
    cancel: CancellationToken,
    transport: Arc<HttpTransport>,
    task: JoinHandle<Result<(), ExitError>>,
}

pub struct RelayBuilder {
    queue_ttl: Duration,
    pv: Option<String>,
}

impl RelayBuilder {
    pub fn new() -> Self {
        Self {
            queue_ttl: Duration::from_millis(4000),
            pv: Some("pv-test".into()),
        }
    }

    pub fn queue_ttl(mut self, ttl: Duration) -> Self {
        self.queue_ttl = ttl;
        self
    }

    pub fn without_pv(mut self) -> Self {
        self.pv = None;
        self
    }

    pub async fn start(self) -> Relay {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let (base, store) = collector::start().await;
        let config = Config {
            listener_port: 0,
            queue_ttl: self.queue_ttl,
            shutdown_grace: Duration::from_secs(5),
            options: AdapterOptions {
                ajax_url: Some(base),
                pv: self.pv.map(PageVersion::Text),
            },
        };

        let transport = Arc::new(HttpTransport::new().expect("failed to build transport"));
        let mut adapter = AnalyticsAdapter::new(Arc::clone(&transport));
        let _ = adapter.enable(&config.options, config.queue_ttl);

        let cancel = CancellationToken::new();
        let mut event_loop = EventLoop::new(adapter, &config, cancel.clone())
            .await
            .expect("failed to start event loop");
        let addr = event_loop.local_addr();
        let task = tokio::spawn(async move { event_loop.run().await });

        Relay {
            addr,
            store,
            cancel,
            transport,
            task,
        }
    }
}

impl Relay {
    pub async fn post(&self, body: &Value) -> u16 {
        reqwest::Client::new()
            .post(format!("http://{}/events", self.addr))
            .body(body.to_string())
            .send()
            .await
            .expect("failed to post events")
            .status()
            .as_u16()
    }

    /// Poll the collector until it holds `count` deliveries or `within` elapses.
    pub async fn wait_for_deliveries(&self, count: usize, within: Duration) -> Vec<CollectedDelivery> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let deliveries = self.store.lock().unwrap().clone();
            if deliveries.len() >= count || tokio::time::Instant::now() >= deadline {
                return deliveries;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Cancel the loop, wait for it, then wait for in-flight sends.
    pub async fn shutdown(self) -> Vec<CollectedDelivery> {
        self.cancel.cancel();
        self.task
            .await
            .expect("event loop panicked")
            .expect("event loop exited with error");
        assert!(self.transport.drain(Duration::from_secs(5)).await);
        self.store.lock().unwrap().clone()
    }
}
