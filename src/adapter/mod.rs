pub mod events;
mod sessions;
mod translate;

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, trace};
use url::Url;

use crate::config::{AdapterOptions, ConfigError, PageVersion};
use crate::queue::EventQueue;
use crate::records::{Delivery, TelemetryRecord};
use crate::transport::Transport;
use events::AuctionEvent;
use sessions::AuctionSessions;

/// State owned by one successful activation: where to deliver, the request
/// template, the queue, and auction timings.
pub struct AdapterContext<T: Transport> {
    endpoint: Url,
    pv: PageVersion,
    queue: EventQueue<TelemetryRecord>,
    sessions: Mutex<AuctionSessions>,
    transport: Arc<T>,
}

impl<T: Transport> AdapterContext<T> {
    fn dispatch(&self, event: AuctionEvent) {
        let now = Instant::now();
        let force_flush = matches!(event, AuctionEvent::AuctionEnd(_));

        let records = match event {
            AuctionEvent::AuctionInit(args) => {
                self.queue.init();
                self.sessions
                    .lock()
                    .unwrap()
                    .start(args.auction_id.as_deref(), now);
                translate::auction_init(&args)
            }
            AuctionEvent::BidRequested(args) => translate::bid_requested(&args),
            AuctionEvent::BidResponse(args) => translate::bid_response(&args),
            AuctionEvent::BidTimeout(bids) => {
                let sessions = self.sessions.lock().unwrap();
                translate::bid_timeout(&bids, |auction_id| sessions.elapsed_ms(auction_id, now))
            }
            AuctionEvent::AuctionEnd(args) => {
                let mut sessions = self.sessions.lock().unwrap();
                let auction_id = args.auction_id.as_deref();
                let duration = sessions.elapsed_ms(auction_id, now);
                sessions.end(auction_id);
                translate::auction_end(&args, duration)
            }
        };

        self.queue.push_all(records);

        if force_flush {
            self.send_all();
        }
    }

    /// Drain the queue into one delivery. Nothing is sent for an empty queue.
    fn send_all(&self) {
        let records = self.queue.pop_all();
        if records.is_empty() {
            return;
        }
        debug!(records = records.len(), "sending telemetry");
        self.transport
            .transmit(Delivery::new(self.endpoint.clone(), self.pv.clone(), records));
    }
}

enum AdapterState<T: Transport> {
    Inactive,
    Active(Arc<AdapterContext<T>>),
}

/// Translates auction lifecycle events into telemetry records and batches
/// them for delivery.
///
/// Starts inactive and drops every event until `enable` succeeds.
pub struct AnalyticsAdapter<T: Transport> {
    transport: Arc<T>,
    state: AdapterState<T>,
}

impl<T: Transport> AnalyticsAdapter<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            state: AdapterState::Inactive,
        }
    }

    /// Validate `options` and activate with a fresh queue. On error the
    /// adapter is left exactly as it was.
    ///
    /// Must be called from within a tokio runtime: the queue's first idle
    /// window starts immediately.
    pub fn enable(&mut self, options: &AdapterOptions, ttl: Duration) -> Result<(), ConfigError> {
        let valid = options.validate()?;
        let transport = Arc::clone(&self.transport);

        let context = Arc::new_cyclic(|weak: &Weak<AdapterContext<T>>| {
            let weak = weak.clone();
            AdapterContext {
                endpoint: valid.endpoint,
                pv: valid.pv,
                queue: EventQueue::new(ttl, move || {
                    if let Some(context) = weak.upgrade() {
                        trace!("idle flush");
                        context.send_all();
                    }
                }),
                sessions: Mutex::new(AuctionSessions::default()),
                transport,
            }
        });
        context.queue.init();

        info!(endpoint = %context.endpoint, ttl_ms = ttl.as_millis() as u64, "analytics enabled");
        self.state = AdapterState::Active(context);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, AdapterState::Active(_))
    }

    /// Handle one engine event. Inactive adapters, unknown event types and
    /// malformed payloads are all silently ignored.
    pub fn track(&self, event_type: &str, args: Value) {
        let AdapterState::Active(context) = &self.state else {
            return;
        };

        match AuctionEvent::parse(event_type, args) {
            Some(Ok(event)) => context.dispatch(event),
            Some(Err(e)) => debug!(event_type, error = %e, "ignoring malformed event payload"),
            None => trace!(event_type, "ignoring untracked event"),
        }
    }

    /// Deliver everything queued right now, regardless of the idle timer.
    pub fn flush(&self) {
        if let AdapterState::Active(context) = &self.state {
            context.send_all();
        }
    }

    /// Current queue contents, for diagnostics.
    pub fn peek_all(&self) -> Vec<TelemetryRecord> {
        match &self.state {
            AdapterState::Active(context) => context.queue.peek_all(),
            AdapterState::Inactive => Vec::new(),
        }
    }
}
