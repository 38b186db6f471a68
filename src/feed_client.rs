use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::SymbolCache;
use crate::defs::CLIENT_READ_TIMEOUT_MS;
use crate::errors::FeedClientError;
use crate::latency::LatencyTracker;
use crate::parser::{MessageParser, ParserStats};
use crate::protocol;

/// Client-side receive stack: socket, parser, cache, latency sink.
///
/// One `FeedClient` owns the feed connection and is the single writer
/// of its [`SymbolCache`]: parsed trades land via `update_trade`,
/// parsed quotes via the atomic two-sided `update_quote`, and each
/// record's wire-to-parse latency is recorded into the shared
/// [`LatencyTracker`]. Any number of other threads may hold the
/// [`cache`](Self::cache) and [`latency`](Self::latency) handles and
/// read them concurrently.
pub struct FeedClient {
    stream: TcpStream,
    parser: MessageParser,
    cache: Arc<SymbolCache>,
    latency: Arc<LatencyTracker>,
    read_buf: Box<[u8]>,
}

impl FeedClient {
    /// Connects to a feed server and wires the parser sinks to a fresh
    /// cache of `num_symbols` slots.
    pub fn connect(addr: &str, num_symbols: usize) -> Result<Self, FeedClientError> {
        log::info!("Connecting to feed server at {}", addr);
        let stream = TcpStream::connect(addr)
            .map_err(|e| FeedClientError::ConnectError(e.to_string()))?;
        stream
            .set_read_timeout(Some(Duration::from_millis(CLIENT_READ_TIMEOUT_MS)))
            .map_err(|e| FeedClientError::ConnectError(e.to_string()))?;
        log::info!("Connected to feed server at {}", addr);

        let cache = Arc::new(SymbolCache::new(num_symbols));
        let latency = Arc::new(LatencyTracker::default());

        let mut parser = MessageParser::new();
        {
            let cache = Arc::clone(&cache);
            let latency = Arc::clone(&latency);
            parser.set_trade_callback(move |msg| {
                cache.update_trade(msg.header.symbol_id, msg.payload.price, msg.payload.quantity);
                latency.record(protocol::timestamp_ns().saturating_sub(msg.header.timestamp_ns));
            });
        }
        {
            let cache = Arc::clone(&cache);
            let latency = Arc::clone(&latency);
            parser.set_quote_callback(move |msg| {
                cache.update_quote(
                    msg.header.symbol_id,
                    msg.payload.bid_price,
                    msg.payload.bid_quantity,
                    msg.payload.ask_price,
                    msg.payload.ask_quantity,
                );
                latency.record(protocol::timestamp_ns().saturating_sub(msg.header.timestamp_ns));
            });
        }

        Ok(FeedClient {
            stream,
            parser,
            cache,
            latency,
            read_buf: vec![0u8; 4096].into_boxed_slice(),
        })
    }

    /// Shared handle to the snapshot cache this client writes.
    pub fn cache(&self) -> Arc<SymbolCache> {
        Arc::clone(&self.cache)
    }

    /// Shared handle to the latency sink this client records into.
    pub fn latency(&self) -> Arc<LatencyTracker> {
        Arc::clone(&self.latency)
    }

    /// Current parser counters.
    pub fn parser_stats(&self) -> ParserStats {
        self.parser.stats()
    }

    /// One receive step: read whatever the socket has and feed it to
    /// the parser. Returns the number of bytes read; `0` means the read
    /// timed out with the connection still healthy.
    pub fn poll(&mut self) -> Result<usize, FeedClientError> {
        match self.stream.read(&mut self.read_buf) {
            Ok(0) => Err(FeedClientError::Disconnected),
            Ok(n) => {
                let mut offset = 0;
                while offset < n {
                    let consumed = self.parser.parse(&self.read_buf[offset..n]);
                    if consumed == 0 {
                        // Saturation reset; the retry starts from an
                        // empty reassembly buffer.
                        continue;
                    }
                    offset += consumed;
                }
                Ok(n)
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(0)
            }
            Err(e) => Err(FeedClientError::IoError(e.to_string())),
        }
    }
}
