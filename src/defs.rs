/// Default TCP port the feed server listens on.
pub const DEFAULT_PORT: u16 = 9876;

/// Default number of simulated symbols.
///
/// Symbols are identified by their dense `u16` index, so the design
/// allows up to [`MAX_SYMBOLS`]; 100 keeps the default feed readable.
pub const DEFAULT_NUM_SYMBOLS: usize = 100;

/// Default tick rate in ticks per second.
///
/// The server emits at most one tick per poll iteration, so the achieved
/// rate is additionally bounded by the poll granularity.
pub const DEFAULT_TICK_RATE: u32 = 100_000;

/// Upper bound on the configurable symbol count (symbol ids are `u16`).
pub const MAX_SYMBOLS: usize = 65_536;

/// Readiness-poll timeout in milliseconds.
///
/// Short enough that the tick pacer keeps firing while the feed is idle,
/// long enough to avoid a pure busy loop.
pub const POLL_TIMEOUT_MS: u64 = 1;

/// Capacity of the readiness event buffer drained per poll iteration.
pub const EVENT_CAPACITY: usize = 64;

/// Listener backlog passed to `listen(2)`.
pub const LISTEN_BACKLOG: i32 = 1024;

/// Size of the parser's stream-reassembly buffer in bytes.
///
/// Large enough to hold many maximum-size records; if it ever saturates
/// the parser resets and drops the buffered bytes.
pub const PARSER_BUFFER_SIZE: usize = 8192;

/// Probability that a generated tick is a trade; the remainder are quotes.
pub const TRADE_PROBABILITY: f64 = 0.3;

/// Initial per-symbol price range, drawn uniformly at construction.
pub const INITIAL_PRICE_MIN: f64 = 100.0;
/// See [`INITIAL_PRICE_MIN`].
pub const INITIAL_PRICE_MAX: f64 = 5000.0;

/// Per-symbol volatility (sigma) range for the price process.
pub const VOLATILITY_MIN: f64 = 0.01;
/// See [`VOLATILITY_MIN`].
pub const VOLATILITY_MAX: f64 = 0.06;

/// Time step used by each GBM price update.
pub const GBM_DT: f64 = 0.001;

/// Bid-ask spread range as a fraction of the mid price.
pub const SPREAD_PCT_MIN: f64 = 0.0005;
/// See [`SPREAD_PCT_MIN`].
pub const SPREAD_PCT_MAX: f64 = 0.002;

/// Per-symbol base trading volume range.
pub const BASE_VOLUME_MIN: u32 = 1_000;
/// See [`BASE_VOLUME_MIN`].
pub const BASE_VOLUME_MAX: u32 = 10_000;

/// Floor applied to every generated volume.
pub const MIN_VOLUME: u32 = 100;

/// Absolute price floor; the price process never drops below this.
pub const MIN_PRICE: f64 = 1.0;

/// Default width of one latency histogram bucket, in nanoseconds.
pub const LATENCY_BUCKET_SIZE_NS: u64 = 100;

/// Default largest latency tracked with full resolution, in nanoseconds.
///
/// Samples above this land in the final overflow bucket.
pub const LATENCY_MAX_NS: u64 = 1_000_000;

/// How often the server binary logs throughput statistics, in seconds.
pub const STATS_PERIOD_SEC: u64 = 5;

/// How often the client dashboard repaints, in milliseconds.
pub const DASHBOARD_REFRESH_MS: u64 = 500;

/// Read timeout on the client's feed socket, in milliseconds.
///
/// Bounds how long a quiet feed can block the receive loop before it
/// gets a chance to notice shutdown.
pub const CLIENT_READ_TIMEOUT_MS: u64 = 200;
