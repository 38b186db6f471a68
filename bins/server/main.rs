//! # Feed Server
//!
//! TCP market-data feed server. Synthesizes trade and quote ticks for a
//! configurable set of symbols and broadcasts them as framed binary
//! records to every connected client.
//!
//! ## Features
//! - Geometric-Brownian-motion price simulation per symbol.
//! - Rate-paced tick generation (round-robin across symbols).
//! - Non-blocking fan-out: slow clients lose records, dead clients are
//!   dropped.
//! - Periodic throughput statistics via the log output.
//!
//! ## Command-line Options
//! - `--port` / `-p`: TCP listen port (default `9876`).
//! - `--symbols` / `-s`: Number of simulated symbols (default `100`).
//! - `--rate` / `-r`: Tick rate in ticks/sec (default `100000`).
//! - `--log-level` / `-l`: Log level (`error`, `warn`, `info`, `debug`, `trace`).

use std::time::Instant;

use structopt::StructOpt;
use tick_feed::defs::STATS_PERIOD_SEC;
use tick_feed::errors::CliError;
use tick_feed::feed_server::FeedServer;

/// Command-line options for the feed server
#[derive(Debug, StructOpt)]
#[structopt(name = "feed_server", about = "Simulated market-data feed server")]
struct Opt {
    /// TCP port to listen on
    #[structopt(short, long, default_value = "9876")]
    port: u16,

    /// Number of simulated symbols
    #[structopt(short, long, default_value = "100")]
    symbols: usize,

    /// Tick rate in ticks per second
    #[structopt(short, long, default_value = "100000")]
    rate: u32,

    /// Log level: error, warn, info, debug, trace
    #[structopt(short, long, default_value = "info")]
    log_level: String,
}

/// Initializes the logger using env_logger with the given level
fn init_logger(level: &str) {
    let mut builder = env_logger::Builder::new();

    let log_level = match level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    builder.filter_level(log_level);
    builder.format_timestamp_micros();
    builder.format_module_path(false);
    builder.format_target(false);
    builder.init();
}

fn main() -> Result<(), CliError> {
    let opt = Opt::from_args();

    init_logger(&opt.log_level);

    log::info!("Starting feed server");
    log::debug!("Command line options: {:?}", opt);

    let mut server = FeedServer::new(opt.port, opt.symbols, opt.rate)?;
    server.start()?;

    log::info!(
        "Feed server running on port {} ({} symbols at {} ticks/s)",
        opt.port,
        opt.symbols,
        opt.rate
    );

    // Drive the loop ourselves so throughput can be reported between
    // iterations.
    let start_time = Instant::now();
    let mut last_stat_time = start_time;
    let mut last_messages = 0u64;

    while server.is_running() {
        server.run_once()?;

        let now = Instant::now();
        let elapsed = now.duration_since(last_stat_time).as_secs();
        if elapsed >= STATS_PERIOD_SEC {
            let messages = server.total_messages_sent();
            let rate = (messages - last_messages) / elapsed;
            log::info!(
                "[{}s] Clients: {} | Messages: {} | Rate: {} msg/s | Bytes: {}",
                now.duration_since(start_time).as_secs(),
                server.connected_clients(),
                messages,
                rate,
                server.total_bytes_sent()
            );
            last_messages = messages;
            last_stat_time = now;
        }
    }

    server.stop();
    log::info!("Feed server shutdown complete");
    Ok(())
}
