use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// One `(eventType, args)` pair from the auction engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedEvent {
    pub event_type: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Batch(Vec<IngestedEvent>),
    Single(IngestedEvent),
}

fn response(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::default())
        .unwrap()
}

/// Validate the incoming request: route, method, and body.
async fn validate<B>(req: Request<B>) -> Result<Vec<IngestedEvent>, (StatusCode, String)>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    let path = req.uri().path().to_owned();
    let method = req.method().clone();

    if path != "/events" {
        return Err((StatusCode::NOT_FOUND, format!("unknown path: {path}")));
    }
    if method != Method::POST {
        return Err((StatusCode::METHOD_NOT_ALLOWED, format!("{method} {path}")));
    }

    let body = req.collect().await.map(|c| c.to_bytes()).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            format!("POST {path}: failed to read body"),
        )
    })?;

    match serde_json::from_slice(&body) {
        Ok(Envelope::Batch(events)) => Ok(events),
        Ok(Envelope::Single(event)) => Ok(vec![event]),
        Err(e) => Err((StatusCode::BAD_REQUEST, format!("invalid event envelope: {e}"))),
    }
}

/// Accept a single event or an ordered batch. A batch is forwarded all or
/// nothing so the engine can safely resend it after a 503.
async fn handle<B>(
    req: Request<B>,
    tx: mpsc::Sender<IngestedEvent>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    let events = match validate(req).await {
        Ok(events) => events,
        Err((status, reason)) => {
            tracing::warn!(reason, "ingest request rejected");
            return Ok(response(status));
        }
    };

    if events.is_empty() {
        return Ok(response(StatusCode::ACCEPTED));
    }

    match tx.try_reserve_many(events.len()) {
        Ok(permits) => {
            for (permit, event) in permits.zip(events) {
                permit.send(event);
            }
            Ok(response(StatusCode::ACCEPTED))
        }
        Err(TrySendError::Full(())) => Ok(Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .header("Retry-After", "1")
            .body(Full::default())
            .unwrap()),
        // The event loop is gone (shutdown); retrying won't help.
        Err(TrySendError::Closed(())) => Ok(response(StatusCode::BAD_GATEWAY)),
    }
}

/// Ingest listener. The auction engine POSTs lifecycle events to `/events`.
pub async fn serve(
    listener: TcpListener,
    tx: mpsc::Sender<IngestedEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                let stream = match result {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let tx = tx.clone();
                        handle(req, tx)
                    });
                    let _ = Builder::new(hyper_util::rt::TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
            _ = cancel.cancelled() => {
                break;
            }
        }
    }
}
