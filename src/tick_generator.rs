use crate::defs::{
    BASE_VOLUME_MAX, BASE_VOLUME_MIN, GBM_DT, INITIAL_PRICE_MAX, INITIAL_PRICE_MIN, MIN_PRICE,
    MIN_VOLUME, SPREAD_PCT_MAX, SPREAD_PCT_MIN, TRADE_PROBABILITY, VOLATILITY_MAX, VOLATILITY_MIN,
};
use crate::protocol::{self, MessageHeader, MessageType, QuotePayload, TradePayload};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Uniform};

/// Price-process parameters and state for one symbol.
///
/// Owned exclusively by the generator; never shared across threads.
#[derive(Clone, Debug)]
pub struct SymbolState {
    /// Dense index identifying the symbol.
    pub symbol_id: u16,
    /// Latest mid price. Always positive and at least [`MIN_PRICE`].
    pub current_price: f64,
    /// Volatility (sigma) of the price process.
    pub volatility: f64,
    /// Drift (mu) of the price process; neutral by default.
    pub drift: f64,
    /// Time step applied per update.
    pub dt: f64,
    /// Bid-ask spread as a fraction of the mid price.
    pub spread_pct: f64,
    /// Base trading volume the quantity generator scales.
    pub base_volume: u32,
}

impl SymbolState {
    fn new(symbol_id: u16, rng: &mut StdRng) -> Self {
        SymbolState {
            symbol_id,
            current_price: rng.gen_range(INITIAL_PRICE_MIN..INITIAL_PRICE_MAX),
            volatility: rng.gen_range(VOLATILITY_MIN..VOLATILITY_MAX),
            drift: 0.0,
            dt: GBM_DT,
            spread_pct: rng.gen_range(SPREAD_PCT_MIN..SPREAD_PCT_MAX),
            base_volume: rng.gen_range(BASE_VOLUME_MIN..BASE_VOLUME_MAX),
        }
    }
}

/// Stochastic tick source for a fixed set of symbols.
///
/// Prices evolve by geometric Brownian motion; each emitted tick is a
/// trade with probability [`TRADE_PROBABILITY`], otherwise a quote.
/// A single `u32` sequence counter is incremented before being stamped
/// into every header, so the first emitted record carries sequence 1 and
/// sequence numbers are strictly monotonic in emission order.
///
/// The generator never fails: out-of-range symbol ids make every
/// operation a silent no-op.
#[derive(Debug)]
pub struct TickGenerator {
    symbols: Vec<SymbolState>,
    rng: StdRng,
    uniform: Uniform<f64>,
    spare_normal: Option<f64>,
    sequence_number: u32,
}

impl TickGenerator {
    /// Creates a generator with `num_symbols` randomly parameterized
    /// symbols.
    pub fn new(num_symbols: usize) -> Self {
        let mut rng = StdRng::from_entropy();
        let symbols: Vec<SymbolState> = (0..num_symbols)
            .map(|i| SymbolState::new(i as u16, &mut rng))
            .collect();

        log::info!("Initialized {} symbols with GBM parameters", symbols.len());
        for sym in symbols.iter().take(3) {
            log::debug!(
                "Symbol {}: price={:.2}, vol={:.4}, spread={:.4}%",
                sym.symbol_id,
                sym.current_price,
                sym.volatility,
                sym.spread_pct * 100.0
            );
        }

        TickGenerator {
            symbols,
            rng,
            uniform: Uniform::new(0.0, 1.0),
            spare_normal: None,
            sequence_number: 0,
        }
    }

    /// Number of symbols this generator drives.
    pub fn num_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// Advances the symbol's price and fills `header` for the next tick.
    ///
    /// Returns `true` when the tick is a trade and `false` for a quote;
    /// the caller then requests the matching payload. Out-of-range ids
    /// leave the header untouched and report a quote.
    pub fn generate_tick(&mut self, symbol_id: u16, header: &mut MessageHeader) -> bool {
        if usize::from(symbol_id) >= self.symbols.len() {
            return false;
        }

        self.update_price_gbm(symbol_id);

        let is_trade = self.uniform.sample(&mut self.rng) < TRADE_PROBABILITY;

        self.sequence_number += 1;
        header.msg_type = if is_trade {
            MessageType::Trade as u16
        } else {
            MessageType::Quote as u16
        };
        header.sequence_number = self.sequence_number;
        header.timestamp_ns = protocol::timestamp_ns();
        header.symbol_id = symbol_id;

        is_trade
    }

    /// Fills a trade payload at the symbol's current mid price.
    pub fn fill_trade_payload(&mut self, symbol_id: u16, payload: &mut TradePayload) {
        if usize::from(symbol_id) >= self.symbols.len() {
            return;
        }
        payload.price = self.symbols[usize::from(symbol_id)].current_price;
        payload.quantity = self.generate_volume(symbol_id);
    }

    /// Fills a quote payload around the symbol's current mid price.
    pub fn fill_quote_payload(&mut self, symbol_id: u16, payload: &mut QuotePayload) {
        if usize::from(symbol_id) >= self.symbols.len() {
            return;
        }
        let (bid, ask) = self.calculate_bid_ask(symbol_id);
        payload.bid_price = bid;
        payload.bid_quantity = self.generate_volume(symbol_id);
        payload.ask_price = ask;
        payload.ask_quantity = self.generate_volume(symbol_id);
    }

    /// Current mid price of a symbol, or `0.0` when out of range.
    pub fn current_price(&self, symbol_id: u16) -> f64 {
        self.symbols
            .get(usize::from(symbol_id))
            .map(|s| s.current_price)
            .unwrap_or(0.0)
    }

    /// One GBM step: `dS = mu*S*dt + sigma*S*sqrt(dt)*dW` with a
    /// standard-normal `dW`.
    fn update_price_gbm(&mut self, symbol_id: u16) {
        let d_w = self.generate_normal();
        let symbol = &mut self.symbols[usize::from(symbol_id)];

        let s = symbol.current_price;
        let drift_component = symbol.drift * s * symbol.dt;
        let diffusion_component = symbol.volatility * s * symbol.dt.sqrt() * d_w;
        symbol.current_price = s + drift_component + diffusion_component;

        // Bounds are computed from the already-updated price, so only the
        // absolute floor below ever binds.
        let min_price = symbol.current_price * 0.5;
        let max_price = symbol.current_price * 2.0;
        if symbol.current_price < min_price {
            symbol.current_price = min_price;
        } else if symbol.current_price > max_price {
            symbol.current_price = max_price;
        }

        if symbol.current_price < MIN_PRICE {
            symbol.current_price = MIN_PRICE;
        }
    }

    /// Standard normal via the Box-Muller transform, caching the second
    /// normal of each generated pair for the next call.
    fn generate_normal(&mut self) -> f64 {
        if let Some(spare) = self.spare_normal.take() {
            return spare;
        }

        let mut u1 = self.uniform.sample(&mut self.rng);
        while u1 <= 0.0 {
            u1 = self.uniform.sample(&mut self.rng);
        }
        let u2 = self.uniform.sample(&mut self.rng);

        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;

        self.spare_normal = Some(r * theta.sin());
        r * theta.cos()
    }

    fn calculate_bid_ask(&self, symbol_id: u16) -> (f64, f64) {
        let symbol = &self.symbols[usize::from(symbol_id)];
        let mid = symbol.current_price;
        let half_spread = mid * symbol.spread_pct / 2.0;

        let bid = mid - half_spread;
        let ask = mid + half_spread;
        if bid >= ask {
            return (mid - 0.01, mid + 0.01);
        }
        (bid, ask)
    }

    /// Volume as `base_volume` scaled by a factor in `[0.5, 1.5)`,
    /// floored at [`MIN_VOLUME`].
    fn generate_volume(&mut self, symbol_id: u16) -> u32 {
        let base = self.symbols[usize::from(symbol_id)].base_volume;
        let factor = 0.5 + self.uniform.sample(&mut self.rng);
        let volume = (f64::from(base) * factor) as u32;
        volume.max(MIN_VOLUME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_parameters_within_ranges() {
        let generator = TickGenerator::new(64);
        for sym in &generator.symbols {
            assert!(sym.current_price >= INITIAL_PRICE_MIN);
            assert!(sym.current_price < INITIAL_PRICE_MAX);
            assert!(sym.volatility >= VOLATILITY_MIN && sym.volatility < VOLATILITY_MAX);
            assert!(sym.spread_pct >= SPREAD_PCT_MIN && sym.spread_pct < SPREAD_PCT_MAX);
            assert!(sym.base_volume >= BASE_VOLUME_MIN && sym.base_volume < BASE_VOLUME_MAX);
            assert_eq!(sym.drift, 0.0);
            assert_eq!(sym.dt, GBM_DT);
        }
    }

    #[test]
    fn test_sequence_numbers_start_at_one_and_increase() {
        let mut generator = TickGenerator::new(4);
        let mut header = MessageHeader::default();

        generator.generate_tick(0, &mut header);
        assert_eq!(header.sequence_number, 1);

        let mut last = header.sequence_number;
        for i in 0..1000u16 {
            generator.generate_tick(i % 4, &mut header);
            assert!(header.sequence_number > last);
            assert_eq!(header.sequence_number, last + 1);
            last = header.sequence_number;
        }
    }

    #[test]
    fn test_header_fields_stamped() {
        let mut generator = TickGenerator::new(8);
        let mut header = MessageHeader::default();
        let is_trade = generator.generate_tick(5, &mut header);

        assert_eq!(header.symbol_id, 5);
        assert!(header.timestamp_ns > 0);
        let expected = if is_trade {
            MessageType::Trade as u16
        } else {
            MessageType::Quote as u16
        };
        assert_eq!(header.msg_type, expected);
    }

    #[test]
    fn test_price_stays_at_or_above_floor() {
        let mut generator = TickGenerator::new(2);
        // Force a tiny price so the floor is exercised immediately.
        generator.symbols[0].current_price = 1.0001;
        generator.symbols[0].volatility = VOLATILITY_MAX;

        let mut header = MessageHeader::default();
        for _ in 0..10_000 {
            generator.generate_tick(0, &mut header);
            let price = generator.current_price(0);
            assert!(price >= MIN_PRICE);
            assert!(price > 0.0);
        }
    }

    #[test]
    fn test_quote_bid_below_ask() {
        let mut generator = TickGenerator::new(16);
        let mut header = MessageHeader::default();
        let mut payload = QuotePayload::default();

        for i in 0..2000u16 {
            let id = i % 16;
            generator.generate_tick(id, &mut header);
            generator.fill_quote_payload(id, &mut payload);
            assert!(
                payload.bid_price < payload.ask_price,
                "bid {} not below ask {}",
                payload.bid_price,
                payload.ask_price
            );
            assert!(payload.bid_quantity >= MIN_VOLUME);
            assert!(payload.ask_quantity >= MIN_VOLUME);
        }
    }

    #[test]
    fn test_trade_payload_matches_current_price() {
        let mut generator = TickGenerator::new(4);
        let mut header = MessageHeader::default();
        let mut payload = TradePayload::default();

        generator.generate_tick(2, &mut header);
        generator.fill_trade_payload(2, &mut payload);

        assert_eq!(payload.price, generator.current_price(2));
        assert!(payload.quantity >= MIN_VOLUME);
    }

    #[test]
    fn test_trade_share_near_thirty_percent() {
        let mut generator = TickGenerator::new(1);
        let mut header = MessageHeader::default();

        let trades = (0..20_000)
            .filter(|_| generator.generate_tick(0, &mut header))
            .count();
        let share = trades as f64 / 20_000.0;
        assert!(share > 0.25 && share < 0.35, "trade share was {}", share);
    }

    #[test]
    fn test_out_of_range_symbol_is_silent_noop() {
        let mut generator = TickGenerator::new(4);
        let mut header = MessageHeader::default();

        let is_trade = generator.generate_tick(100, &mut header);
        assert!(!is_trade);
        assert_eq!(header, MessageHeader::default());

        let mut trade = TradePayload::default();
        generator.fill_trade_payload(100, &mut trade);
        assert_eq!(trade, TradePayload::default());

        let mut quote = QuotePayload::default();
        generator.fill_quote_payload(100, &mut quote);
        assert_eq!(quote, QuotePayload::default());

        assert_eq!(generator.current_price(100), 0.0);
    }

    #[test]
    fn test_box_muller_moments() {
        let mut generator = TickGenerator::new(1);
        let samples: Vec<f64> = (0..20_000).map(|_| generator.generate_normal()).collect();

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let variance =
            samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / samples.len() as f64;

        assert!(mean.abs() < 0.05, "mean was {}", mean);
        assert!(
            variance > 0.9 && variance < 1.1,
            "variance was {}",
            variance
        );
    }

    #[test]
    fn test_volume_floor() {
        let mut generator = TickGenerator::new(1);
        generator.symbols[0].base_volume = 1;
        for _ in 0..100 {
            assert!(generator.generate_volume(0) >= MIN_VOLUME);
        }
    }
}
