//! # Feed Client
//!
//! TCP client for the simulated market-data feed. Receives the binary
//! stream, materializes per-symbol snapshots into the lock-free cache,
//! and repaints a plain-terminal dashboard of the most active symbols
//! together with parser and latency statistics.
//!
//! ## Features
//! - Stream reassembly with checksum and sequence-gap accounting.
//! - Lock-free snapshot reads from the dashboard thread while the
//!   receive thread keeps writing.
//! - End-to-end latency percentiles (send timestamp to parse time).
//!
//! ## Command-line Options
//! - `--server-addr` / `-s`: Feed server address (default `127.0.0.1:9876`).
//! - `--symbols` / `-n`: Symbol count, must match the server (default `100`).
//! - `--top` / `-t`: Number of symbols shown on the dashboard (default `10`).
//! - `--log-level` / `-l`: Log level (`error`, `warn`, `info`, `debug`, `trace`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use structopt::StructOpt;
use tick_feed::cache::SymbolCache;
use tick_feed::defs::DASHBOARD_REFRESH_MS;
use tick_feed::errors::{CliError, FeedClientError};
use tick_feed::feed_client::FeedClient;
use tick_feed::latency::LatencyTracker;
use tick_feed::parser::ParserStats;

/// Command-line options for the feed client
#[derive(Debug, StructOpt)]
#[structopt(name = "feed_client", about = "Client for the simulated market-data feed")]
struct Opt {
    /// Feed server address, e.g., 127.0.0.1:9876
    #[structopt(short, long, default_value = "127.0.0.1:9876")]
    server_addr: String,

    /// Number of symbols carried by the feed
    #[structopt(short = "n", long, default_value = "100")]
    symbols: usize,

    /// Number of most-active symbols to display
    #[structopt(short, long, default_value = "10")]
    top: usize,

    /// Log level: error, warn, info, debug, trace
    #[structopt(short, long, default_value = "info")]
    log_level: String,
}

/// Initialize the logger with a given log level
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

/// Repaints the dashboard: the `top` most-updated symbols plus parser
/// and latency statistics.
fn draw_dashboard(
    cache: &SymbolCache,
    latency: &LatencyTracker,
    stats: &ParserStats,
    top: usize,
) {
    let all_ids: Vec<u16> = (0..cache.num_symbols() as u16).collect();
    let mut rows: Vec<(u16, _)> = all_ids
        .iter()
        .zip(cache.get_snapshots(&all_ids))
        .map(|(&id, snap)| (id, snap))
        .collect();
    rows.sort_by(|a, b| b.1.update_count.cmp(&a.1.update_count));
    rows.truncate(top);

    // Clear screen and home the cursor.
    print!("\x1b[2J\x1b[H");
    println!("=== MARKET DATA FEED ===");
    println!(
        "{:>6} {:>12} {:>12} {:>12} {:>8} {:>10}",
        "SYMBOL", "BID", "ASK", "LAST", "QTY", "UPDATES"
    );
    for (id, snap) in &rows {
        println!(
            "{:>6} {:>12.2} {:>12.2} {:>12.2} {:>8} {:>10}",
            id,
            snap.best_bid,
            snap.best_ask,
            snap.last_traded_price,
            snap.last_traded_quantity,
            snap.update_count
        );
    }

    println!();
    println!(
        "parsed: {} (trades {}, quotes {}, heartbeats {}) | gaps: {} | checksum errors: {} | malformed: {}",
        stats.messages_parsed,
        stats.trades_parsed,
        stats.quotes_parsed,
        stats.heartbeats_parsed,
        stats.sequence_gaps,
        stats.checksum_errors,
        stats.malformed_messages
    );

    let lat = latency.stats();
    if lat.sample_count > 0 {
        println!(
            "latency ns: min {} | mean {} | p50 {} | p95 {} | p99 {} | p99.9 {} | max {} ({} samples)",
            lat.min_ns,
            lat.mean_ns,
            lat.p50_ns,
            lat.p95_ns,
            lat.p99_ns,
            lat.p999_ns,
            lat.max_ns,
            lat.sample_count
        );
    }
}

fn main() -> Result<(), CliError> {
    let opt = Opt::from_args();

    init_logger(&opt.log_level);

    log::info!("Starting feed client");
    log::debug!("Command line options: {:?}", opt);

    let mut client = FeedClient::connect(&opt.server_addr, opt.symbols)?;
    let cache = client.cache();
    let latency = client.latency();

    let running = Arc::new(AtomicBool::new(true));
    let stats = Arc::new(std::sync::Mutex::new(ParserStats::default()));

    // Dashboard thread: reads snapshots while the main thread keeps
    // writing them.
    {
        let cache = Arc::clone(&cache);
        let latency = Arc::clone(&latency);
        let running = Arc::clone(&running);
        let stats = Arc::clone(&stats);
        let top = opt.top;

        thread::spawn(move || {
            log::debug!("Dashboard thread started");
            while running.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(DASHBOARD_REFRESH_MS));
                let current = *stats.lock().unwrap();
                draw_dashboard(&cache, &latency, &current, top);
            }
            log::debug!("Dashboard thread stopped");
        });
    }

    // Receive loop on the main thread; it is the cache's only writer.
    log::info!("Entering receive loop");
    let result = loop {
        match client.poll() {
            Ok(_) => {
                *stats.lock().unwrap() = client.parser_stats();
            }
            Err(e) => break e,
        }
    };

    running.store(false, Ordering::Release);

    let final_stats = client.parser_stats();
    log::info!(
        "Final stats: {} messages parsed, {} gaps, {} checksum errors",
        final_stats.messages_parsed,
        final_stats.sequence_gaps,
        final_stats.checksum_errors
    );

    match result {
        FeedClientError::Disconnected => {
            log::info!("Feed server closed the stream, shutting down");
            Ok(())
        }
        err => {
            log::error!("Feed connection failed: {}", err);
            Err(CliError::from(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opt = Opt::from_iter(vec!["feed_client"]);
        assert_eq!(opt.server_addr, "127.0.0.1:9876");
        assert_eq!(opt.symbols, 100);
        assert_eq!(opt.top, 10);
        assert_eq!(opt.log_level, "info");
    }

    #[test]
    fn test_connect_to_dead_server_fails() {
        let result = FeedClient::connect("127.0.0.1:1", 4);
        assert!(result.is_err());
    }
}
