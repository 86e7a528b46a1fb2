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

/// A request received by the collector.
#[derive(Debug, Clone)]
pub struct CollectedDelivery {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: Value,
}

pub type CollectorStore = Arc<Mutex<Vec<CollectedDelivery>>>;

/// Start a collector on an ephemeral port and return its base URL.
pub async fn start() -> (String, CollectorStore) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind collector listener");
    let base = format!("http://{}", listener.local_addr().unwrap());
    let store: CollectorStore = Arc::new(Mutex::new(Vec::new()));
    let store_clone = store.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener
                .accept()
                .await
                .expect("failed to accept connection");
            let store = store_clone.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let store = store.clone();
                    handle(req, store)
                });
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (base, store)
}

async fn handle<B>(
    req: Request<B>,
    store: CollectorStore,
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
        .map(|s| s.to_owned());

    let body = match req.collect().await {
        Ok(collected) => serde_json::from_slice(&collected.to_bytes()).unwrap_or(Value::Null),
        Err(_) => Value::Null,
    };

    store.lock().unwrap().push(CollectedDelivery {
        method,
        path,
        content_type,
        body,
    });

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Full::default())
        .unwrap())
}
