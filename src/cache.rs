use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::protocol;

/// Consistent point-in-time view of one symbol's market state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MarketSnapshot {
    /// Best bid price.
    pub best_bid: f64,
    /// Best ask price.
    pub best_ask: f64,
    /// Quantity at the best bid.
    pub bid_quantity: u32,
    /// Quantity at the best ask.
    pub ask_quantity: u32,
    /// Price of the last trade.
    pub last_traded_price: f64,
    /// Quantity of the last trade.
    pub last_traded_quantity: u32,
    /// Wall clock of the most recent write, nanoseconds since the epoch.
    pub last_update_time: u64,
    /// Number of writes applied to this slot.
    pub update_count: u64,
}

/// One cache-line-aligned seqlock slot.
///
/// The sequence counter and the payload fields share the slot so a
/// reader touches a single line; the 64-byte alignment keeps writer
/// activity on one symbol from invalidating its neighbors' lines.
///
/// Every payload field is an individual atomic (floats as raw bits), so
/// reader and writer never race on non-atomic memory; the odd/even
/// sequence protocol is what makes multi-field reads consistent.
#[repr(align(64))]
#[derive(Debug)]
struct SymbolSlot {
    /// Odd while a write is in progress, even when the slot is stable.
    sequence: AtomicU64,
    best_bid: AtomicU64,
    best_ask: AtomicU64,
    bid_quantity: AtomicU32,
    ask_quantity: AtomicU32,
    last_traded_price: AtomicU64,
    last_traded_quantity: AtomicU32,
    last_update_time: AtomicU64,
    update_count: AtomicU64,
}

impl SymbolSlot {
    fn new() -> Self {
        SymbolSlot {
            sequence: AtomicU64::new(0),
            best_bid: AtomicU64::new(0),
            best_ask: AtomicU64::new(0),
            bid_quantity: AtomicU32::new(0),
            ask_quantity: AtomicU32::new(0),
            last_traded_price: AtomicU64::new(0),
            last_traded_quantity: AtomicU32::new(0),
            last_update_time: AtomicU64::new(0),
            update_count: AtomicU64::new(0),
        }
    }

    /// Opens a write epoch: the counter becomes odd and the release
    /// store orders it before the field writes that follow.
    fn begin_write(&self) -> u64 {
        let seq = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(seq + 1, Ordering::Release);
        seq
    }

    /// Closes the epoch opened by [`begin_write`](Self::begin_write):
    /// the counter returns to even, ordered after the field writes.
    fn end_write(&self, seq: u64) {
        self.sequence.store(seq + 2, Ordering::Release);
    }

    fn touch(&self) {
        self.last_update_time
            .store(protocol::timestamp_ns(), Ordering::Relaxed);
        self.update_count.store(
            self.update_count.load(Ordering::Relaxed) + 1,
            Ordering::Relaxed,
        );
    }

    fn read_snapshot(&self) -> MarketSnapshot {
        loop {
            let seq_before = self.sequence.load(Ordering::Acquire);
            if seq_before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let snapshot = MarketSnapshot {
                best_bid: f64::from_bits(self.best_bid.load(Ordering::Relaxed)),
                best_ask: f64::from_bits(self.best_ask.load(Ordering::Relaxed)),
                bid_quantity: self.bid_quantity.load(Ordering::Relaxed),
                ask_quantity: self.ask_quantity.load(Ordering::Relaxed),
                last_traded_price: f64::from_bits(self.last_traded_price.load(Ordering::Relaxed)),
                last_traded_quantity: self.last_traded_quantity.load(Ordering::Relaxed),
                last_update_time: self.last_update_time.load(Ordering::Relaxed),
                update_count: self.update_count.load(Ordering::Relaxed),
            };

            let seq_after = self.sequence.load(Ordering::Acquire);
            if seq_before == seq_after {
                return snapshot;
            }
            std::hint::spin_loop();
        }
    }
}

/// Lock-free per-symbol snapshot store.
///
/// A flat array of seqlock slots indexed by symbol id. Exactly one
/// thread may write; any number of threads may read concurrently.
/// Readers never block the writer and the writer never blocks readers;
/// a reader that races a write simply retries, and retries are bounded
/// in practice because each write epoch is a handful of stores.
///
/// The slot array is allocated once and never resized.
pub struct SymbolCache {
    slots: Vec<SymbolSlot>,
}

impl SymbolCache {
    /// Allocates a cache with `num_symbols` zeroed slots.
    pub fn new(num_symbols: usize) -> Self {
        let slots = (0..num_symbols).map(|_| SymbolSlot::new()).collect();
        log::info!(
            "Initialized symbol cache: {} slots of {} bytes",
            num_symbols,
            std::mem::size_of::<SymbolSlot>()
        );
        SymbolCache { slots }
    }

    /// Number of slots.
    pub fn num_symbols(&self) -> usize {
        self.slots.len()
    }

    /// Writes the bid side of a symbol's book under one write epoch.
    ///
    /// Pairs with [`update_ask`](Self::update_ask); the two sides are
    /// independent epochs, so a reader between them can observe one
    /// fresh and one stale side. Use
    /// [`update_quote`](Self::update_quote) for an atomic two-sided
    /// update.
    pub fn update_bid(&self, symbol_id: u16, price: f64, quantity: u32) {
        if let Some(slot) = self.slots.get(usize::from(symbol_id)) {
            let seq = slot.begin_write();
            slot.best_bid.store(price.to_bits(), Ordering::Relaxed);
            slot.bid_quantity.store(quantity, Ordering::Relaxed);
            slot.touch();
            slot.end_write(seq);
        }
    }

    /// Writes the ask side of a symbol's book under one write epoch.
    pub fn update_ask(&self, symbol_id: u16, price: f64, quantity: u32) {
        if let Some(slot) = self.slots.get(usize::from(symbol_id)) {
            let seq = slot.begin_write();
            slot.best_ask.store(price.to_bits(), Ordering::Relaxed);
            slot.ask_quantity.store(quantity, Ordering::Relaxed);
            slot.touch();
            slot.end_write(seq);
        }
    }

    /// Records a trade print under one write epoch.
    pub fn update_trade(&self, symbol_id: u16, price: f64, quantity: u32) {
        if let Some(slot) = self.slots.get(usize::from(symbol_id)) {
            let seq = slot.begin_write();
            slot.last_traded_price
                .store(price.to_bits(), Ordering::Relaxed);
            slot.last_traded_quantity.store(quantity, Ordering::Relaxed);
            slot.touch();
            slot.end_write(seq);
        }
    }

    /// Writes both sides of the book under a single write epoch, so
    /// readers always see the bid and ask from the same update.
    pub fn update_quote(
        &self,
        symbol_id: u16,
        bid_price: f64,
        bid_quantity: u32,
        ask_price: f64,
        ask_quantity: u32,
    ) {
        if let Some(slot) = self.slots.get(usize::from(symbol_id)) {
            let seq = slot.begin_write();
            slot.best_bid.store(bid_price.to_bits(), Ordering::Relaxed);
            slot.bid_quantity.store(bid_quantity, Ordering::Relaxed);
            slot.best_ask.store(ask_price.to_bits(), Ordering::Relaxed);
            slot.ask_quantity.store(ask_quantity, Ordering::Relaxed);
            slot.touch();
            slot.end_write(seq);
        }
    }

    /// Returns a consistent copy of a symbol's state, spinning past any
    /// in-progress write. Out-of-range ids return a zeroed snapshot.
    pub fn get_snapshot(&self, symbol_id: u16) -> MarketSnapshot {
        match self.slots.get(usize::from(symbol_id)) {
            Some(slot) => slot.read_snapshot(),
            None => MarketSnapshot::default(),
        }
    }

    /// Convenience batch read. Each snapshot is individually consistent;
    /// there is no atomicity across slots.
    pub fn get_snapshots(&self, symbol_ids: &[u16]) -> Vec<MarketSnapshot> {
        symbol_ids.iter().map(|&id| self.get_snapshot(id)).collect()
    }

    /// Best-effort sum of per-slot update counts; not a consistent
    /// point-in-time aggregate.
    pub fn total_updates(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| slot.update_count.load(Ordering::Relaxed))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_slot_is_cache_line_sized() {
        assert_eq!(std::mem::align_of::<SymbolSlot>(), 64);
        assert_eq!(std::mem::size_of::<SymbolSlot>(), 64);
    }

    #[test]
    fn test_fresh_cache_is_zeroed() {
        let cache = SymbolCache::new(4);
        assert_eq!(cache.num_symbols(), 4);
        assert_eq!(cache.get_snapshot(0), MarketSnapshot::default());
        assert_eq!(cache.total_updates(), 0);
    }

    #[test]
    fn test_trade_update_visible() {
        let cache = SymbolCache::new(8);
        cache.update_trade(3, 101.5, 700);

        let snap = cache.get_snapshot(3);
        assert_eq!(snap.last_traded_price, 101.5);
        assert_eq!(snap.last_traded_quantity, 700);
        assert_eq!(snap.update_count, 1);
        assert!(snap.last_update_time > 0);
        // Other slots untouched.
        assert_eq!(cache.get_snapshot(2), MarketSnapshot::default());
    }

    #[test]
    fn test_quote_update_writes_all_four_fields() {
        let cache = SymbolCache::new(2);
        cache.update_quote(1, 99.5, 1000, 100.5, 1500);

        let snap = cache.get_snapshot(1);
        assert_eq!(snap.best_bid, 99.5);
        assert_eq!(snap.bid_quantity, 1000);
        assert_eq!(snap.best_ask, 100.5);
        assert_eq!(snap.ask_quantity, 1500);
        assert_eq!(snap.update_count, 1);
    }

    #[test]
    fn test_bid_and_ask_are_independent_epochs() {
        let cache = SymbolCache::new(1);
        cache.update_bid(0, 10.0, 100);
        cache.update_ask(0, 11.0, 200);

        let snap = cache.get_snapshot(0);
        assert_eq!(snap.best_bid, 10.0);
        assert_eq!(snap.best_ask, 11.0);
        assert_eq!(snap.update_count, 2);
    }

    #[test]
    fn test_out_of_range_reads_and_writes() {
        let cache = SymbolCache::new(2);
        cache.update_trade(50, 1.0, 1);
        assert_eq!(cache.get_snapshot(50), MarketSnapshot::default());
        assert_eq!(cache.total_updates(), 0);
    }

    #[test]
    fn test_batch_snapshots() {
        let cache = SymbolCache::new(4);
        cache.update_trade(0, 5.0, 10);
        cache.update_trade(2, 7.0, 20);

        let snaps = cache.get_snapshots(&[0, 1, 2, 9]);
        assert_eq!(snaps.len(), 4);
        assert_eq!(snaps[0].last_traded_price, 5.0);
        assert_eq!(snaps[1], MarketSnapshot::default());
        assert_eq!(snaps[2].last_traded_price, 7.0);
        assert_eq!(snaps[3], MarketSnapshot::default());
    }

    #[test]
    fn test_total_updates_aggregates() {
        let cache = SymbolCache::new(3);
        cache.update_trade(0, 1.0, 1);
        cache.update_quote(1, 1.0, 1, 2.0, 1);
        cache.update_bid(2, 1.0, 1);
        cache.update_ask(2, 2.0, 1);
        assert_eq!(cache.total_updates(), 4);
    }

    /// Four readers hammer slot 0 while the writer sweeps quotes with a
    /// fixed one-unit spread; any torn read would surface as a spread
    /// other than 1.0.
    #[test]
    fn test_readers_never_observe_torn_quotes() {
        let cache = Arc::new(SymbolCache::new(1));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut observed = 0u64;
                    while !done.load(Ordering::Acquire) {
                        let snap = cache.get_snapshot(0);
                        if snap.update_count == 0 {
                            continue;
                        }
                        observed += 1;
                        let spread = snap.best_ask - snap.best_bid;
                        assert!(
                            (spread - 1.0).abs() < 0.01,
                            "torn read: bid={} ask={}",
                            snap.best_bid,
                            snap.best_ask
                        );
                    }
                    observed
                })
            })
            .collect();

        for b in 1000..11_000 {
            let bid = f64::from(b);
            cache.update_quote(0, bid, 1000, bid + 1.0, 1500);
        }
        done.store(true, Ordering::Release);

        let total_observed: u64 = readers.into_iter().map(|r| r.join().unwrap()).sum();
        assert!(total_observed > 0);

        let last = cache.get_snapshot(0);
        assert_eq!(last.best_bid, 10_999.0);
        assert_eq!(last.best_ask, 11_000.0);
        assert_eq!(last.update_count, 10_000);
    }
}
