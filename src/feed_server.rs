use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};

use crate::defs::{EVENT_CAPACITY, LISTEN_BACKLOG, MAX_SYMBOLS, POLL_TIMEOUT_MS};
use crate::errors::FeedServerError;
use crate::protocol::{self, MessageHeader, QuoteMessage, QuotePayload, TradeMessage, TradePayload};
use crate::tick_generator::TickGenerator;

const LISTENER: Token = Token(0);

/// One connected feed consumer.
///
/// Client sockets are never registered with the readiness poll; the
/// server only pushes, and dead or misbehaving peers are discovered
/// through write errors.
#[derive(Debug)]
struct ClientConnection {
    stream: TcpStream,
    addr: SocketAddr,
    messages_sent: u64,
    bytes_sent: u64,
    last_send_time_ns: u64,
}

impl ClientConnection {
    fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        ClientConnection {
            stream,
            addr,
            messages_sent: 0,
            bytes_sent: 0,
            last_send_time_ns: 0,
        }
    }
}

/// Single-threaded market-data broadcast server.
///
/// One readiness-multiplexed loop owns the listener, the tick
/// generator, the connection table, and all socket writes; no
/// synchronization exists because nothing is shared. Each loop
/// iteration polls for listener events with a short timeout, drains
/// pending accepts, and fires at most one tick once the configured
/// interval has elapsed, so the achieved rate is capped by both the
/// tick rate and the poll granularity.
///
/// Delivery is lossy by design: a consumer whose send buffer is full
/// simply misses that record and stays connected, while any harder
/// write failure disconnects it. The feed favors liveness over
/// completeness; there is no retransmission.
pub struct FeedServer {
    port: u16,
    num_symbols: usize,
    tick_interval_ns: u64,
    last_tick: Instant,
    next_symbol_index: usize,

    generator: TickGenerator,

    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    clients: Vec<ClientConnection>,
    running: bool,

    total_messages_sent: u64,
    total_bytes_sent: u64,
}

impl FeedServer {
    /// Creates a server for `num_symbols` symbols ticking at
    /// `tick_rate` ticks per second. Fails fast on an out-of-range
    /// configuration; no socket is opened until [`start`](Self::start).
    ///
    /// `port` 0 binds an ephemeral port, reported by
    /// [`local_addr`](Self::local_addr) once started.
    pub fn new(port: u16, num_symbols: usize, tick_rate: u32) -> Result<Self, FeedServerError> {
        if num_symbols == 0 || num_symbols > MAX_SYMBOLS {
            return Err(FeedServerError::InvalidConfig(format!(
                "symbol count must be in 1..={}, got {}",
                MAX_SYMBOLS, num_symbols
            )));
        }
        if tick_rate == 0 {
            return Err(FeedServerError::InvalidConfig(
                "tick rate must be positive".to_string(),
            ));
        }

        let poll =
            Poll::new().map_err(|e| FeedServerError::PollError(e.to_string()))?;

        log::info!(
            "Feed server configured: port={}, symbols={}, tick_rate={}/s",
            port,
            num_symbols,
            tick_rate
        );

        Ok(FeedServer {
            port,
            num_symbols,
            tick_interval_ns: 1_000_000_000 / u64::from(tick_rate),
            last_tick: Instant::now(),
            next_symbol_index: 0,
            generator: TickGenerator::new(num_symbols),
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            listener: None,
            clients: Vec::new(),
            running: false,
            total_messages_sent: 0,
            total_bytes_sent: 0,
        })
    }

    /// Binds the listener on all interfaces, registers it with the
    /// readiness poll, and marks the loop runnable.
    pub fn start(&mut self) -> Result<(), FeedServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(SockProtocol::TCP))
            .map_err(|e| FeedServerError::BindError(e.to_string()))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| FeedServerError::BindError(e.to_string()))?;
        socket
            .bind(&addr.into())
            .map_err(|e| FeedServerError::BindError(e.to_string()))?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| FeedServerError::BindError(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| FeedServerError::BindError(e.to_string()))?;

        let mut listener = TcpListener::from_std(socket.into());
        self.poll
            .registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(|e| FeedServerError::PollError(e.to_string()))?;

        log::info!(
            "Feed server listening on {}",
            listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string())
        );

        self.listener = Some(listener);
        self.running = true;
        self.last_tick = Instant::now();
        Ok(())
    }

    /// One loop iteration: poll for readiness, drain accepts, fire at
    /// most one tick if the pacing interval has elapsed.
    pub fn run_once(&mut self) -> Result<(), FeedServerError> {
        if !self.running {
            return Err(FeedServerError::NotRunning);
        }

        match self
            .poll
            .poll(&mut self.events, Some(Duration::from_millis(POLL_TIMEOUT_MS)))
        {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(FeedServerError::PollError(e.to_string())),
        }

        let mut accept_ready = false;
        let mut listener_failed = false;
        for event in self.events.iter() {
            if event.token() == LISTENER {
                if event.is_error() {
                    listener_failed = true;
                }
                if event.is_readable() {
                    accept_ready = true;
                }
            }
        }

        if listener_failed {
            log::error!("Error on listener socket, terminating loop");
            self.running = false;
            return Ok(());
        }
        if accept_ready {
            self.accept_connections();
        }

        let now = Instant::now();
        if now.duration_since(self.last_tick).as_nanos() as u64 >= self.tick_interval_ns {
            self.generate_and_broadcast_tick();
            self.last_tick = now;
        }

        Ok(())
    }

    /// Drives [`run_once`](Self::run_once) until the loop is stopped or
    /// an iteration fails.
    pub fn run(&mut self) -> Result<(), FeedServerError> {
        while self.running {
            self.run_once()?;
        }
        Ok(())
    }

    /// Closes every client and the listener. The server is unusable
    /// afterwards.
    pub fn stop(&mut self) {
        if !self.running && self.listener.is_none() {
            return;
        }
        log::info!("Stopping feed server");
        self.running = false;

        for client in self.clients.drain(..) {
            log::debug!(
                "Closing client {} (sent {} messages, {} bytes)",
                client.addr,
                client.messages_sent,
                client.bytes_sent
            );
        }

        if let Some(mut listener) = self.listener.take() {
            let _ = self.poll.registry().deregister(&mut listener);
        }

        log::info!(
            "Feed server stopped. Total messages sent: {}, total bytes sent: {}",
            self.total_messages_sent,
            self.total_bytes_sent
        );
    }

    /// Whether the loop is currently runnable.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Number of currently connected consumers.
    pub fn connected_clients(&self) -> usize {
        self.clients.len()
    }

    /// Records broadcast so far. Incremented once per broadcast with at
    /// least one connected consumer, regardless of how many consumers
    /// the write actually reached.
    pub fn total_messages_sent(&self) -> u64 {
        self.total_messages_sent
    }

    /// Bytes counterpart of
    /// [`total_messages_sent`](Self::total_messages_sent).
    pub fn total_bytes_sent(&self) -> u64 {
        self.total_bytes_sent
    }

    /// Accepts every pending connection; the listener registration is
    /// edge-triggered, so draining until `WouldBlock` is mandatory.
    fn accept_connections(&mut self) {
        let listener = match self.listener.as_ref() {
            Some(listener) => listener,
            None => return,
        };

        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        log::warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                    }
                    self.clients.push(ClientConnection::new(stream, addr));
                    log::info!(
                        "New client connected: {} (total clients: {})",
                        addr,
                        self.clients.len()
                    );
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("accept() failed: {}", e);
                    break;
                }
            }
        }
    }

    /// One tick cycle: round-robin symbol selection, synthesis, on-stack
    /// framing, fan-out.
    fn generate_and_broadcast_tick(&mut self) {
        let symbol_id = self.next_symbol_index as u16;
        self.next_symbol_index = (self.next_symbol_index + 1) % self.num_symbols;

        let mut header = MessageHeader::default();
        let is_trade = self.generator.generate_tick(symbol_id, &mut header);

        let mut buf = [0u8; QuoteMessage::SIZE];
        let len = if is_trade {
            let mut payload = TradePayload::default();
            self.generator.fill_trade_payload(symbol_id, &mut payload);
            let msg = TradeMessage {
                header,
                payload,
                checksum: 0,
            };
            msg.encode(&mut buf[..TradeMessage::SIZE]);
            TradeMessage::SIZE
        } else {
            let mut payload = QuotePayload::default();
            self.generator.fill_quote_payload(symbol_id, &mut payload);
            let msg = QuoteMessage {
                header,
                payload,
                checksum: 0,
            };
            msg.encode(&mut buf[..QuoteMessage::SIZE]);
            QuoteMessage::SIZE
        };

        self.broadcast(&buf[..len]);
    }

    /// Pushes one record to every consumer with a single non-blocking
    /// write each. `WouldBlock` drops the record for that consumer and
    /// keeps the connection; any other error or a short write removes
    /// it. Removal swaps the last entry into the vacated index, so the
    /// index is not advanced on removal.
    fn broadcast(&mut self, data: &[u8]) {
        if self.clients.is_empty() {
            return;
        }

        let mut i = 0;
        while i < self.clients.len() {
            match self.clients[i].stream.write(data) {
                Ok(n) if n == data.len() => {
                    let client = &mut self.clients[i];
                    client.messages_sent += 1;
                    client.bytes_sent += n as u64;
                    client.last_send_time_ns = protocol::timestamp_ns();
                    i += 1;
                }
                Ok(n) => {
                    log::warn!(
                        "Short write ({}/{} bytes) to {}, disconnecting",
                        n,
                        data.len(),
                        self.clients[i].addr
                    );
                    self.remove_client(i);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Slow consumer: this record is lost for them.
                    i += 1;
                }
                Err(e) => {
                    log::warn!("Write to {} failed: {}", self.clients[i].addr, e);
                    self.remove_client(i);
                }
            }
        }

        self.total_messages_sent += 1;
        self.total_bytes_sent += data.len() as u64;
    }

    fn remove_client(&mut self, index: usize) {
        let client = self.clients.swap_remove(index);
        log::info!(
            "Client disconnected: {} (sent {} messages, {} bytes, {} remaining)",
            client.addr,
            client.messages_sent,
            client.bytes_sent,
            self.clients.len()
        );
    }
}

impl Drop for FeedServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::MessageParser;
    use std::io::Read;
    use std::net::TcpStream as StdTcpStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_default_config_is_valid() {
        use crate::defs::{DEFAULT_NUM_SYMBOLS, DEFAULT_PORT, DEFAULT_TICK_RATE};
        // Construct only; binding the well-known port is left to start().
        assert!(FeedServer::new(DEFAULT_PORT, DEFAULT_NUM_SYMBOLS, DEFAULT_TICK_RATE).is_ok());
    }

    #[test]
    fn test_rejects_zero_symbols() {
        match FeedServer::new(0, 0, 1000) {
            Err(FeedServerError::InvalidConfig(_)) => {}
            other => panic!("expected InvalidConfig, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_rejects_zero_tick_rate() {
        match FeedServer::new(0, 10, 0) {
            Err(FeedServerError::InvalidConfig(_)) => {}
            other => panic!("expected InvalidConfig, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_rejects_oversized_symbol_count() {
        assert!(FeedServer::new(0, MAX_SYMBOLS + 1, 1000).is_err());
        assert!(FeedServer::new(0, MAX_SYMBOLS, 1000).is_ok());
    }

    #[test]
    fn test_run_once_requires_start() {
        let mut server = FeedServer::new(0, 4, 1000).unwrap();
        assert!(matches!(server.run_once(), Err(FeedServerError::NotRunning)));
    }

    #[test]
    fn test_start_and_stop() {
        let mut server = FeedServer::new(0, 4, 1000).unwrap();
        server.start().unwrap();
        assert!(server.is_running());
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        server.stop();
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
    }

    #[test]
    fn test_end_to_end_broadcast_parses_cleanly() {
        let mut server = FeedServer::new(0, 8, 200_000).unwrap();
        server.start().unwrap();
        let addr = server.local_addr().unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let done_reader = Arc::clone(&done);

        let reader = thread::spawn(move || {
            let mut stream = StdTcpStream::connect(addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_millis(500)))
                .unwrap();

            let mut parser = MessageParser::new();
            let mut buf = [0u8; 4096];
            let deadline = Instant::now() + Duration::from_secs(10);

            while parser.stats().messages_parsed < 50 && Instant::now() < deadline {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        parser.parse(&buf[..n]);
                    }
                    Err(ref e)
                        if e.kind() == io::ErrorKind::WouldBlock
                            || e.kind() == io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(_) => break,
                }
            }

            done_reader.store(true, Ordering::Release);
            parser.stats()
        });

        let deadline = Instant::now() + Duration::from_secs(15);
        while !done.load(Ordering::Acquire) && Instant::now() < deadline {
            server.run_once().unwrap();
        }

        let stats = reader.join().unwrap();
        assert!(stats.messages_parsed >= 50, "parsed {}", stats.messages_parsed);
        assert_eq!(stats.checksum_errors, 0);
        assert_eq!(stats.sequence_gaps, 0);
        assert_eq!(stats.malformed_messages, 0);
        assert_eq!(
            stats.messages_parsed,
            stats.trades_parsed + stats.quotes_parsed + stats.heartbeats_parsed
        );

        assert_eq!(server.connected_clients(), 1);
        assert!(server.total_messages_sent() > 0);
        assert!(server.total_bytes_sent() >= server.total_messages_sent() * 20);

        server.stop();
    }

    #[test]
    fn test_dead_client_is_removed() {
        let mut server = FeedServer::new(0, 4, 100_000).unwrap();
        server.start().unwrap();
        let addr = server.local_addr().unwrap();

        let stream = StdTcpStream::connect(addr).unwrap();

        // Let the loop accept the connection.
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.connected_clients() == 0 && Instant::now() < deadline {
            server.run_once().unwrap();
        }
        assert_eq!(server.connected_clients(), 1);

        // A closed peer eventually surfaces as a write error.
        drop(stream);
        let deadline = Instant::now() + Duration::from_secs(10);
        while server.connected_clients() > 0 && Instant::now() < deadline {
            server.run_once().unwrap();
        }
        assert_eq!(server.connected_clients(), 0);

        server.stop();
    }
}
