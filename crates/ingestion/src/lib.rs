//! Data ingestion boundary and stream synchronization for the spread-arb system.
//!
//! This crate handles:
//! - Routing cleaned quote rows into per-venue tick streams
//! - Causal merge of the two venue streams
//! - Snapshot synchronization with last-value carry-forward

pub mod stream;
pub mod synchronizer;

pub use stream::{merge_streams, route_quotes, QuoteRecord, RoutingStats, TickStream};
pub use synchronizer::{synchronize, StreamSynchronizer, SyncOutcome, SyncStats};
