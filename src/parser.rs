use crate::defs::PARSER_BUFFER_SIZE;
use crate::protocol::{
    self, HeartbeatMessage, MessageHeader, QuoteMessage, TradeMessage, HEADER_SIZE,
};

/// Counters accumulated by a [`MessageParser`].
///
/// Corrupt or unexpected input never surfaces as an error; it lands in
/// one of these counters and the stream keeps flowing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Valid records dispatched to a callback.
    pub messages_parsed: u64,
    /// Valid trade records.
    pub trades_parsed: u64,
    /// Valid quote records.
    pub quotes_parsed: u64,
    /// Valid heartbeat records.
    pub heartbeats_parsed: u64,
    /// Sequence discontinuities observed (one per gap, regardless of
    /// the gap's width). Gapped records are still delivered.
    pub sequence_gaps: u64,
    /// Records discarded because the trailing checksum did not match.
    pub checksum_errors: u64,
    /// Headers carrying an unknown message type.
    pub malformed_messages: u64,
}

/// Sink invoked for each parsed trade record.
pub type TradeCallback = Box<dyn FnMut(&TradeMessage) + Send>;
/// Sink invoked for each parsed quote record.
pub type QuoteCallback = Box<dyn FnMut(&QuoteMessage) + Send>;
/// Sink invoked for each parsed heartbeat record.
pub type HeartbeatCallback = Box<dyn FnMut(&HeartbeatMessage) + Send>;

/// Incremental, resynchronizing parser over a stream transport.
///
/// Bytes are appended with [`parse`](Self::parse) in whatever slices the
/// transport delivers; whole validated records are dispatched at most
/// once, in arrival order, to the registered per-kind sinks. Sinks must
/// be cheap and non-blocking; anything long-running belongs downstream.
///
/// Unknown types resync forward by one header length, checksum failures
/// drop exactly one record, and sequence gaps are counted but accepted.
/// A saturated reassembly buffer resets the parser and drops whatever
/// was buffered.
pub struct MessageParser {
    buffer: Box<[u8]>,
    used: usize,

    trade_callback: Option<TradeCallback>,
    quote_callback: Option<QuoteCallback>,
    heartbeat_callback: Option<HeartbeatCallback>,

    last_sequence_number: u32,
    first_message: bool,

    validate_checksum: bool,
    validate_sequence: bool,

    stats: ParserStats,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageParser {
    /// Creates a parser with both validations enabled and no sinks.
    pub fn new() -> Self {
        MessageParser {
            buffer: vec![0u8; PARSER_BUFFER_SIZE].into_boxed_slice(),
            used: 0,
            trade_callback: None,
            quote_callback: None,
            heartbeat_callback: None,
            last_sequence_number: 0,
            first_message: true,
            validate_checksum: true,
            validate_sequence: true,
            stats: ParserStats::default(),
        }
    }

    /// Registers the trade sink. Later registrations replace earlier ones.
    pub fn set_trade_callback(&mut self, callback: impl FnMut(&TradeMessage) + Send + 'static) {
        self.trade_callback = Some(Box::new(callback));
    }

    /// Registers the quote sink. Later registrations replace earlier ones.
    pub fn set_quote_callback(&mut self, callback: impl FnMut(&QuoteMessage) + Send + 'static) {
        self.quote_callback = Some(Box::new(callback));
    }

    /// Registers the heartbeat sink. Later registrations replace earlier
    /// ones.
    pub fn set_heartbeat_callback(
        &mut self,
        callback: impl FnMut(&HeartbeatMessage) + Send + 'static,
    ) {
        self.heartbeat_callback = Some(Box::new(callback));
    }

    /// Enables or disables checksum validation.
    pub fn set_validate_checksum(&mut self, validate: bool) {
        self.validate_checksum = validate;
    }

    /// Enables or disables sequence-gap accounting.
    pub fn set_validate_sequence(&mut self, validate: bool) {
        self.validate_sequence = validate;
    }

    /// Current counter snapshot.
    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Ingests a slice of stream bytes and dispatches every complete
    /// record it can extract. Returns the number of bytes consumed from
    /// `data`.
    ///
    /// If the reassembly buffer cannot take a single further byte the
    /// parser resets, dropping the buffered bytes, and consumes nothing.
    pub fn parse(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let n = data.len().min(self.buffer.len() - self.used);
        if n == 0 {
            log::warn!("Parser buffer saturated, resetting stream state");
            self.reset();
            return 0;
        }

        self.buffer[self.used..self.used + n].copy_from_slice(&data[..n]);
        self.used += n;

        while self.extract_message() {}

        n
    }

    /// Restores the freshly-constructed stream state: empty buffer, no
    /// sequence history. Counters and sinks are kept.
    pub fn reset(&mut self) {
        self.used = 0;
        self.last_sequence_number = 0;
        self.first_message = true;
    }

    /// Attempts to extract one record from the front of the buffer.
    /// Returns `false` when extraction stalls on insufficient bytes.
    fn extract_message(&mut self) -> bool {
        if self.used < HEADER_SIZE {
            return false;
        }

        let msg_type = u16::from_le_bytes([self.buffer[0], self.buffer[1]]);
        let size = match protocol::message_size(msg_type) {
            Some(size) => size,
            None => {
                // Forward resync by one header length.
                log::warn!("Unknown message type 0x{:04X}, resyncing", msg_type);
                self.stats.malformed_messages += 1;
                self.consume(HEADER_SIZE);
                return true;
            }
        };

        if self.used < size {
            return false;
        }

        if self.validate_checksum && !protocol::verify_checksum(&self.buffer[..size]) {
            let header = MessageHeader::decode(&self.buffer);
            log::warn!(
                "Checksum mismatch for seq={}, dropping record",
                header.sequence_number
            );
            self.stats.checksum_errors += 1;
            self.consume(size);
            return true;
        }

        let header = MessageHeader::decode(&self.buffer);
        if self.validate_sequence
            && !self.first_message
            && header.sequence_number != self.last_sequence_number.wrapping_add(1)
        {
            log::debug!(
                "Sequence gap: expected {}, got {}",
                self.last_sequence_number.wrapping_add(1),
                header.sequence_number
            );
            self.stats.sequence_gaps += 1;
        }
        self.last_sequence_number = header.sequence_number;
        self.first_message = false;

        self.dispatch(msg_type, size);
        self.consume(size);
        true
    }

    fn dispatch(&mut self, msg_type: u16, size: usize) {
        self.stats.messages_parsed += 1;

        match msg_type {
            0x01 => {
                self.stats.trades_parsed += 1;
                let msg = TradeMessage::decode(&self.buffer[..size]);
                if let Some(callback) = self.trade_callback.as_mut() {
                    callback(&msg);
                }
            }
            0x02 => {
                self.stats.quotes_parsed += 1;
                let msg = QuoteMessage::decode(&self.buffer[..size]);
                if let Some(callback) = self.quote_callback.as_mut() {
                    callback(&msg);
                }
            }
            0x03 => {
                self.stats.heartbeats_parsed += 1;
                let msg = HeartbeatMessage::decode(&self.buffer[..size]);
                if let Some(callback) = self.heartbeat_callback.as_mut() {
                    callback(&msg);
                }
            }
            _ => unreachable!("dispatch only sees known types"),
        }
    }

    /// Drops `len` bytes from the front, shifting the remainder down.
    fn consume(&mut self, len: usize) {
        self.buffer.copy_within(len..self.used, 0);
        self.used -= len;
    }
}
