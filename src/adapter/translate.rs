//! Pure event → record translations. Timing is passed in so these stay
//! independent of the session clock.

use super::events::{
    AuctionEndArgs, AuctionInitArgs, BidRequestedArgs, BidResponseArgs, TimedOutBid,
};
use crate::records::{EventKind, TelemetryRecord};

pub fn auction_init(args: &AuctionInitArgs) -> Vec<TelemetryRecord> {
    vec![TelemetryRecord::new(EventKind::Init).with_auction_id(args.auction_id.as_deref())]
}

/// One record per requested bid line item.
pub fn bid_requested(args: &BidRequestedArgs) -> Vec<TelemetryRecord> {
    args.bids
        .iter()
        .map(|bid| {
            TelemetryRecord::new(EventKind::Request)
                .with_bidder(args.bidder_code.as_deref())
                .with_slot_id(bid.ad_unit_code.as_deref())
        })
        .collect()
}

pub fn bid_response(args: &BidResponseArgs) -> Vec<TelemetryRecord> {
    vec![
        TelemetryRecord::new(EventKind::Response)
            .with_bidder(args.bidder_code.as_deref())
            .with_slot_id(args.ad_unit_code.as_deref())
            .with_time_to_respond(args.time_to_respond),
    ]
}

/// `elapsed` maps a bid's auction id to milliseconds since that auction started.
pub fn bid_timeout<F>(bids: &[TimedOutBid], elapsed: F) -> Vec<TelemetryRecord>
where
    F: Fn(Option<&str>) -> Option<u64>,
{
    bids.iter()
        .map(|bid| {
            TelemetryRecord::new(EventKind::Timeout)
                .with_bidder(bid.bidder.as_deref())
                .with_slot_id(bid.ad_unit_code.as_deref())
                .with_time_to_respond(elapsed(bid.auction_id.as_deref()))
        })
        .collect()
}

pub fn auction_end(args: &AuctionEndArgs, duration: Option<u64>) -> Vec<TelemetryRecord> {
    vec![
        TelemetryRecord::new(EventKind::End)
            .with_auction_id(args.auction_id.as_deref())
            .with_time_to_respond(duration),
    ]
}
