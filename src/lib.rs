//! # Simulated Market-Data Feed
//!
//! This crate implements a simulated equities market-data feed: a
//! **single-threaded broadcast server** that synthesizes trade and
//! quote ticks and fans them out as a framed binary protocol over TCP,
//! and a **client-side stack** that reassembles, validates, and
//! materializes the stream into a lock-free snapshot cache readable
//! from any number of threads.
//!
//! ## Features
//!
//! - Geometric-Brownian-motion price synthesis with Box-Muller normals
//!   and strictly monotonic sequence numbers.
//! - Fixed-layout little-endian wire records with an XOR checksum.
//! - Edge-triggered readiness loop with non-blocking sockets and a
//!   lossy slow-consumer policy: a full send buffer drops the record,
//!   not the connection.
//! - Incremental, resynchronizing stream parser with per-kind callback
//!   sinks and gap/corruption counters.
//! - Sequence-locked per-symbol cache: one writer, many readers, no
//!   blocking in either direction.
//! - Lock-free bucket-histogram latency tracking.
//!
//! ## Architecture Overview
//!
//! The crate is organized into several modules:
//!
//! - [`protocol`](crate::protocol) — Wire schema, checksum, encode/decode.
//! - [`tick_generator`](crate::tick_generator) — Stochastic per-symbol tick source.
//! - [`parser`](crate::parser) — Stream reassembly, validation, dispatch.
//! - [`cache`](crate::cache) — Seqlock-protected snapshot store.
//! - [`latency`](crate::latency) — Concurrent latency histogram.
//! - [`feed_server`](crate::feed_server) — Listener, readiness loop, fan-out, tick pacer.
//! - [`feed_client`](crate::feed_client) — Socket-to-cache receive stack.
//! - [`defs`](crate::defs) — Shared constants and tuning parameters.
//! - [`errors`](crate::errors) — Error types used across modules.
//!
//! ## Wire Protocol
//!
//! Every record is `header || payload || checksum`, packed
//! little-endian. The 16-byte header carries the message type, a
//! feed-global sequence number starting at 1, a nanosecond timestamp,
//! and the symbol index. Trades are 32 bytes, quotes 48, heartbeats 20;
//! the trailing u32 is the XOR of all preceding bytes. A subscription
//! opcode (0xFF) is reserved but unused: the server pushes every record
//! to every consumer.
//!
//! ## Delivery Model
//!
//! The feed is lossy and unidirectional. Sequence numbers let a
//! consumer count what it missed, but there is no retransmission
//! channel; parsers count gaps and keep going. Server-side, a slow
//! consumer misses records rather than stalling the loop.
//!
//! ## Example: Running the Server
//!
//! ```no_run
//! use tick_feed::feed_server::FeedServer;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = FeedServer::new(9876, 100, 100_000)?;
//!     server.start()?;
//!     server.run()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Example: Consuming the Feed
//!
//! ```no_run
//! use tick_feed::feed_client::FeedClient;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = FeedClient::connect("127.0.0.1:9876", 100)?;
//!     let cache = client.cache();
//!     loop {
//!         client.poll()?;
//!         let top = cache.get_snapshot(0);
//!         println!("symbol 0: bid={} ask={}", top.best_bid, top.best_ask);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![deny(unreachable_pub)]

pub mod cache;
pub mod defs;
pub mod errors;
pub mod feed_client;
pub mod feed_server;
pub mod latency;
pub mod parser;
pub mod protocol;
pub mod tick_generator;
