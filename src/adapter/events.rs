use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Prebid-style event names, as delivered by the auction engine.
pub const AUCTION_INIT: &str = "auctionInit";
pub const BID_REQUESTED: &str = "bidRequested";
pub const BID_RESPONSE: &str = "bidResponse";
pub const BID_TIMEOUT: &str = "bidTimeout";
pub const AUCTION_END: &str = "auctionEnd";

// Payloads carry many more fields than these; unknown ones are ignored.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionInitArgs {
    pub auction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRequestedArgs {
    pub bidder_code: Option<String>,
    #[serde(default)]
    pub bids: Vec<RequestedBid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedBid {
    pub ad_unit_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidResponseArgs {
    pub bidder_code: Option<String>,
    pub ad_unit_code: Option<String>,
    #[serde(default, deserialize_with = "millis")]
    pub time_to_respond: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedOutBid {
    pub bidder: Option<String>,
    pub ad_unit_code: Option<String>,
    pub auction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionEndArgs {
    pub auction_id: Option<String>,
}

/// One of the five auction lifecycle events the adapter listens to.
#[derive(Debug)]
pub enum AuctionEvent {
    AuctionInit(AuctionInitArgs),
    BidRequested(BidRequestedArgs),
    BidResponse(BidResponseArgs),
    BidTimeout(Vec<TimedOutBid>),
    AuctionEnd(AuctionEndArgs),
}

impl AuctionEvent {
    /// Returns `None` for event types the adapter does not track, and
    /// `Some(Err(..))` when a tracked event carries an unusable payload.
    pub fn parse(event_type: &str, args: Value) -> Option<Result<Self, serde_json::Error>> {
        let event = match event_type {
            AUCTION_INIT => serde_json::from_value(args).map(AuctionEvent::AuctionInit),
            BID_REQUESTED => serde_json::from_value(args).map(AuctionEvent::BidRequested),
            BID_RESPONSE => serde_json::from_value(args).map(AuctionEvent::BidResponse),
            BID_TIMEOUT => serde_json::from_value(args).map(AuctionEvent::BidTimeout),
            AUCTION_END => serde_json::from_value(args).map(AuctionEvent::AuctionEnd),
            _ => return None,
        };
        Some(event)
    }
}

/// Latencies arrive as JSON numbers, sometimes fractional. Negative or
/// non-numeric values are treated as absent.
fn millis<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        _ => None,
    }))
}
