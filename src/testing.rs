use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::records::Delivery;
use crate::transport::Transport;

/// Transport that hands every delivery to a channel instead of the network.
pub struct RecordingTransport {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl RecordingTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for RecordingTransport {
    fn transmit(&self, delivery: Delivery) {
        let _ = self.tx.send(delivery);
    }
}

/// One request as seen by the mock collector.
#[derive(Debug, Clone)]
pub struct CollectedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Value,
}

pub type CollectorStore = Arc<Mutex<Vec<CollectedRequest>>>;

/// Minimal collector on an ephemeral port. Records each request, answers
/// with `status`, and returns the base URL to use as `ajaxUrl`.
pub async fn start_collector(status: StatusCode) -> (String, CollectorStore) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let store: CollectorStore = Arc::new(Mutex::new(Vec::new()));
    let store_clone = Arc::clone(&store);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let store = Arc::clone(&store_clone);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let store = Arc::clone(&store);
                    collect(req, store, status)
                });
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (base, store)
}

async fn collect<B>(
    req: Request<B>,
    store: CollectorStore,
    status: StatusCode,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = match req.collect().await {
        Ok(c) => serde_json::from_slice(&c.to_bytes()).unwrap_or(Value::Null),
        Err(_) => Value::Null,
    };

    store.lock().unwrap().push(CollectedRequest {
        method,
        path,
        content_type,
        body,
    });

    Ok(Response::builder()
        .status(status)
        .body(Full::default())
        .unwrap())
}

/// Bind to port 0 and return the OS-assigned port.
/// The listener is dropped, freeing the port for the caller to rebind.
pub async fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
