pub mod adapter;
pub mod config;
pub mod event_loop;
pub mod ingest_listener;
pub mod queue;
pub mod records;
pub mod transport;

#[cfg(test)]
mod testing;
