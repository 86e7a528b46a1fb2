use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::PageVersion;

/// Record kind, serialized as the `ev` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Init,
    Request,
    Response,
    Timeout,
    End,
}

/// One observation sent to the collector.
///
/// The wire form is sparse: absent fields are omitted, never written as
/// `null`. The `with_*` builders treat falsy values (`""`, `0`, JSON
/// `null`/`false`) as absent, so a record only ever carries meaningful data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(rename = "ev")]
    pub event: EventKind,
    #[serde(rename = "n", skip_serializing_if = "Option::is_none")]
    pub bidder: Option<String>,
    #[serde(rename = "sid", skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<String>,
    #[serde(rename = "aid", skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<String>,
    #[serde(rename = "ttr", skip_serializing_if = "Option::is_none")]
    pub time_to_respond: Option<u64>,
    #[serde(rename = "args", skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl TelemetryRecord {
    pub fn new(event: EventKind) -> Self {
        Self {
            event,
            bidder: None,
            slot_id: None,
            auction_id: None,
            time_to_respond: None,
            extra: None,
        }
    }

    pub fn with_bidder(mut self, bidder: Option<&str>) -> Self {
        self.bidder = non_empty(bidder);
        self
    }

    pub fn with_slot_id(mut self, slot_id: Option<&str>) -> Self {
        self.slot_id = non_empty(slot_id);
        self
    }

    pub fn with_auction_id(mut self, auction_id: Option<&str>) -> Self {
        self.auction_id = non_empty(auction_id);
        self
    }

    pub fn with_time_to_respond(mut self, millis: Option<u64>) -> Self {
        self.time_to_respond = millis.filter(|ms| *ms > 0);
        self
    }

    pub fn with_extra(mut self, extra: Option<Value>) -> Self {
        self.extra = extra.filter(is_truthy);
        self
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_owned)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Body of one outbound request: the request template merged with the batch.
#[derive(Debug, Clone, Serialize)]
pub struct HbPayload {
    pub pv: PageVersion,
    pub hb_ev: Vec<TelemetryRecord>,
}

/// A single flush, addressed and ready for a transport.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub url: Url,
    pub payload: HbPayload,
}

impl Delivery {
    pub fn new(url: Url, pv: PageVersion, records: Vec<TelemetryRecord>) -> Self {
        Self {
            url,
            payload: HbPayload { pv, hb_ev: records },
        }
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.payload.hb_ev
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.payload)
    }
}
