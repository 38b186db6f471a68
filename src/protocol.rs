use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian};

/// Number of bytes in a [`MessageHeader`].
pub const HEADER_SIZE: usize = 16;

/// Number of bytes in the trailing checksum of every record.
pub const CHECKSUM_SIZE: usize = 4;

/// Wire message types.
///
/// Values are the `u16` codes carried in [`MessageHeader::msg_type`].
/// [`MessageType::Subscribe`] is reserved for a client-to-server
/// subscription command; the server broadcasts to every connection and
/// never consumes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    /// A trade tick.
    Trade = 0x01,
    /// A two-sided top-of-book quote tick.
    Quote = 0x02,
    /// A keep-alive record carrying no payload.
    Heartbeat = 0x03,
    /// Reserved subscription opcode, never emitted by the server.
    Subscribe = 0xFF,
}

impl MessageType {
    /// Decodes a wire code, returning `None` for unknown values.
    pub fn from_u16(code: u16) -> Option<MessageType> {
        match code {
            0x01 => Some(MessageType::Trade),
            0x02 => Some(MessageType::Quote),
            0x03 => Some(MessageType::Heartbeat),
            0xFF => Some(MessageType::Subscribe),
            _ => None,
        }
    }
}

/// Total on-the-wire size of a record of the given type, or `None` for
/// types the downstream feed never carries.
///
/// The subscribe opcode is intentionally absent: it is reserved in the
/// schema but has no server-to-client framing.
pub fn message_size(code: u16) -> Option<usize> {
    match code {
        0x01 => Some(TradeMessage::SIZE),
        0x02 => Some(QuoteMessage::SIZE),
        0x03 => Some(HeartbeatMessage::SIZE),
        _ => None,
    }
}

/// Fixed 16-byte record header, little-endian on the wire.
///
/// Layout: `msg_type:u16 | sequence_number:u32 | timestamp_ns:u64 |
/// symbol_id:u16`, no padding.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MessageHeader {
    /// Wire code of the record kind, see [`MessageType`].
    pub msg_type: u16,
    /// Feed-global sequence number, strictly increasing from 1.
    pub sequence_number: u32,
    /// Send-side wall clock in nanoseconds since the UNIX epoch.
    pub timestamp_ns: u64,
    /// Dense symbol index.
    pub symbol_id: u16,
}

impl MessageHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = HEADER_SIZE;

    /// Writes the header into the first [`HEADER_SIZE`] bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u16(&mut buf[0..2], self.msg_type);
        LittleEndian::write_u32(&mut buf[2..6], self.sequence_number);
        LittleEndian::write_u64(&mut buf[6..14], self.timestamp_ns);
        LittleEndian::write_u16(&mut buf[14..16], self.symbol_id);
    }

    /// Reads a header from the first [`HEADER_SIZE`] bytes of `buf`.
    pub fn decode(buf: &[u8]) -> MessageHeader {
        MessageHeader {
            msg_type: LittleEndian::read_u16(&buf[0..2]),
            sequence_number: LittleEndian::read_u32(&buf[2..6]),
            timestamp_ns: LittleEndian::read_u64(&buf[6..14]),
            symbol_id: LittleEndian::read_u16(&buf[14..16]),
        }
    }
}

/// Trade payload: `price:f64 | quantity:u32`, 12 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TradePayload {
    /// Execution price.
    pub price: f64,
    /// Executed quantity.
    pub quantity: u32,
}

impl TradePayload {
    /// Encoded size in bytes.
    pub const SIZE: usize = 12;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_f64(&mut buf[0..8], self.price);
        LittleEndian::write_u32(&mut buf[8..12], self.quantity);
    }

    fn decode(buf: &[u8]) -> TradePayload {
        TradePayload {
            price: LittleEndian::read_f64(&buf[0..8]),
            quantity: LittleEndian::read_u32(&buf[8..12]),
        }
    }
}

/// Quote payload: `bid_price:f64 | bid_quantity:u32 | ask_price:f64 |
/// ask_quantity:u32`, 28 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QuotePayload {
    /// Best bid price.
    pub bid_price: f64,
    /// Quantity at the best bid.
    pub bid_quantity: u32,
    /// Best ask price.
    pub ask_price: f64,
    /// Quantity at the best ask.
    pub ask_quantity: u32,
}

impl QuotePayload {
    /// Encoded size in bytes.
    pub const SIZE: usize = 28;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_f64(&mut buf[0..8], self.bid_price);
        LittleEndian::write_u32(&mut buf[8..12], self.bid_quantity);
        LittleEndian::write_f64(&mut buf[12..20], self.ask_price);
        LittleEndian::write_u32(&mut buf[20..24], self.ask_quantity);
    }

    fn decode(buf: &[u8]) -> QuotePayload {
        QuotePayload {
            bid_price: LittleEndian::read_f64(&buf[0..8]),
            bid_quantity: LittleEndian::read_u32(&buf[8..12]),
            ask_price: LittleEndian::read_f64(&buf[12..20]),
            ask_quantity: LittleEndian::read_u32(&buf[20..24]),
        }
    }
}

/// Complete trade record: header, payload, checksum. 32 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TradeMessage {
    /// Record header with `msg_type == 0x01`.
    pub header: MessageHeader,
    /// Trade payload.
    pub payload: TradePayload,
    /// XOR checksum over header and payload bytes.
    pub checksum: u32,
}

impl TradeMessage {
    /// Total on-the-wire size in bytes.
    pub const SIZE: usize = HEADER_SIZE + TradePayload::SIZE + CHECKSUM_SIZE;

    /// Encodes the record into `buf[..Self::SIZE]`, computing and
    /// appending the checksum over the preceding bytes.
    pub fn encode(&self, buf: &mut [u8]) {
        self.header.encode(&mut buf[0..HEADER_SIZE]);
        self.payload.encode(&mut buf[HEADER_SIZE..HEADER_SIZE + TradePayload::SIZE]);
        let sum = checksum(&buf[..Self::SIZE - CHECKSUM_SIZE]);
        LittleEndian::write_u32(&mut buf[Self::SIZE - CHECKSUM_SIZE..Self::SIZE], sum);
    }

    /// Decodes a record from `buf[..Self::SIZE]`. The checksum field is
    /// taken as received; validation happens in the parser.
    pub fn decode(buf: &[u8]) -> TradeMessage {
        TradeMessage {
            header: MessageHeader::decode(buf),
            payload: TradePayload::decode(&buf[HEADER_SIZE..]),
            checksum: LittleEndian::read_u32(&buf[Self::SIZE - CHECKSUM_SIZE..Self::SIZE]),
        }
    }
}

/// Complete quote record: header, payload, checksum. 48 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QuoteMessage {
    /// Record header with `msg_type == 0x02`.
    pub header: MessageHeader,
    /// Quote payload.
    pub payload: QuotePayload,
    /// XOR checksum over header and payload bytes.
    pub checksum: u32,
}

impl QuoteMessage {
    /// Total on-the-wire size in bytes.
    pub const SIZE: usize = HEADER_SIZE + QuotePayload::SIZE + CHECKSUM_SIZE;

    /// Encodes the record into `buf[..Self::SIZE]`, computing and
    /// appending the checksum over the preceding bytes.
    pub fn encode(&self, buf: &mut [u8]) {
        self.header.encode(&mut buf[0..HEADER_SIZE]);
        self.payload.encode(&mut buf[HEADER_SIZE..HEADER_SIZE + QuotePayload::SIZE]);
        let sum = checksum(&buf[..Self::SIZE - CHECKSUM_SIZE]);
        LittleEndian::write_u32(&mut buf[Self::SIZE - CHECKSUM_SIZE..Self::SIZE], sum);
    }

    /// Decodes a record from `buf[..Self::SIZE]`. The checksum field is
    /// taken as received; validation happens in the parser.
    pub fn decode(buf: &[u8]) -> QuoteMessage {
        QuoteMessage {
            header: MessageHeader::decode(buf),
            payload: QuotePayload::decode(&buf[HEADER_SIZE..]),
            checksum: LittleEndian::read_u32(&buf[Self::SIZE - CHECKSUM_SIZE..Self::SIZE]),
        }
    }
}

/// Complete heartbeat record: header and checksum only. 20 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeartbeatMessage {
    /// Record header with `msg_type == 0x03`.
    pub header: MessageHeader,
    /// XOR checksum over the header bytes.
    pub checksum: u32,
}

impl HeartbeatMessage {
    /// Total on-the-wire size in bytes.
    pub const SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

    /// Encodes the record into `buf[..Self::SIZE]`, computing and
    /// appending the checksum over the header bytes.
    pub fn encode(&self, buf: &mut [u8]) {
        self.header.encode(&mut buf[0..HEADER_SIZE]);
        let sum = checksum(&buf[..Self::SIZE - CHECKSUM_SIZE]);
        LittleEndian::write_u32(&mut buf[Self::SIZE - CHECKSUM_SIZE..Self::SIZE], sum);
    }

    /// Decodes a record from `buf[..Self::SIZE]`.
    pub fn decode(buf: &[u8]) -> HeartbeatMessage {
        HeartbeatMessage {
            header: MessageHeader::decode(buf),
            checksum: LittleEndian::read_u32(&buf[Self::SIZE - CHECKSUM_SIZE..Self::SIZE]),
        }
    }
}

/// XOR of every byte in `data`, widened to `u32`.
///
/// The upper 24 bits of a well-formed checksum are always zero;
/// receivers still compare the full 32-bit value.
pub fn checksum(data: &[u8]) -> u32 {
    let mut sum = 0u8;
    for b in data {
        sum ^= b;
    }
    u32::from(sum)
}

/// Recomputes the checksum of a complete record and compares it with the
/// trailing u32. Records shorter than the checksum itself fail.
pub fn verify_checksum(record: &[u8]) -> bool {
    if record.len() < CHECKSUM_SIZE {
        return false;
    }
    let body = &record[..record.len() - CHECKSUM_SIZE];
    let received = LittleEndian::read_u32(&record[record.len() - CHECKSUM_SIZE..]);
    checksum(body) == received
}

/// Current wall clock in nanoseconds since the UNIX epoch.
pub fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
