use std::collections::HashMap;

use tokio::time::Instant;

/// Auctions that never report an end are evicted oldest-first past this.
const MAX_TRACKED_AUCTIONS: usize = 256;

/// Start times of in-flight auctions.
///
/// Keyed by auction id so overlapping auctions each measure their own
/// duration. The most recent start is kept separately and used for events
/// that carry no auction id, or one that was never initialised.
#[derive(Debug, Default)]
pub struct AuctionSessions {
    latest: Option<Instant>,
    started: HashMap<String, Instant>,
}

impl AuctionSessions {
    pub fn start(&mut self, auction_id: Option<&str>, at: Instant) {
        self.latest = Some(at);
        let Some(id) = auction_id else {
            return;
        };
        if self.started.len() >= MAX_TRACKED_AUCTIONS && !self.started.contains_key(id) {
            self.evict_oldest();
        }
        self.started.insert(id.to_owned(), at);
    }

    pub fn started_at(&self, auction_id: Option<&str>) -> Option<Instant> {
        auction_id
            .and_then(|id| self.started.get(id).copied())
            .or(self.latest)
    }

    /// Milliseconds between the auction's start and `now`.
    pub fn elapsed_ms(&self, auction_id: Option<&str>, now: Instant) -> Option<u64> {
        self.started_at(auction_id)
            .map(|start| now.saturating_duration_since(start).as_millis() as u64)
    }

    /// Forget a finished auction. The latest-start fallback is kept.
    pub fn end(&mut self, auction_id: Option<&str>) {
        if let Some(id) = auction_id {
            self.started.remove(id);
        }
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.started.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .started
            .iter()
            .min_by_key(|(_, at)| **at)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.started.remove(&id);
        }
    }
}
