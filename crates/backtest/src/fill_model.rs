//! Fill model for backtesting.
//!
//! Market orders take the touch; limit orders fill at their limit price when
//! the opposing quote touches it with enough size behind it.

use spread_core::{Config, ExecutionConfig, Fill, LimitPriceMode, Side, Tick, TimestampNs, Venue};

/// Configuration for the fill model.
#[derive(Debug, Clone)]
pub struct FillModelConfig {
    /// Commission per contract per leg.
    pub commission_per_contract: f64,
    /// Reference price for limit orders.
    pub limit_price_mode: LimitPriceMode,
    /// Shift applied to the reference price toward the crossing side.
    pub limit_price_offset: f64,
}

impl Default for FillModelConfig {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for FillModelConfig {
    fn from(execution: &ExecutionConfig) -> Self {
        Self {
            commission_per_contract: execution.commission_per_contract,
            limit_price_mode: execution.limit_price_mode,
            limit_price_offset: execution.limit_price_offset,
        }
    }
}

/// Fill model for simulating order execution.
#[derive(Debug, Clone)]
pub struct FillModel {
    config: FillModelConfig,
}

impl FillModel {
    /// Create a new fill model.
    pub fn new(config: FillModelConfig) -> Self {
        Self { config }
    }

    /// Create a fill model from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(FillModelConfig::from(&config.execution))
    }

    /// Commission for `qty` contracts on one leg.
    pub fn commission(&self, qty: f64) -> f64 {
        self.config.commission_per_contract * qty
    }

    /// Build a fill at an explicit price.
    pub fn fill_at(&self, ts_ns: TimestampNs, venue: Venue, side: Side, price: f64, qty: f64) -> Fill {
        Fill {
            ts_ns,
            venue,
            side,
            price,
            qty,
            commission: self.commission(qty),
        }
    }

    /// Simulate a market buy fill at the ask.
    ///
    /// Returns None if the quote is not usable.
    pub fn market_buy(&self, ts_ns: TimestampNs, tick: &Tick, qty: f64) -> Option<Fill> {
        if !tick.is_valid() {
            return None;
        }
        Some(self.fill_at(ts_ns, tick.venue, Side::Buy, tick.ask_px, qty))
    }

    /// Simulate a market sell fill at the bid.
    ///
    /// Returns None if the quote is not usable.
    pub fn market_sell(&self, ts_ns: TimestampNs, tick: &Tick, qty: f64) -> Option<Fill> {
        if !tick.is_valid() {
            return None;
        }
        Some(self.fill_at(ts_ns, tick.venue, Side::Sell, tick.bid_px, qty))
    }

    /// Simulate a market fill on either side.
    pub fn market(&self, ts_ns: TimestampNs, tick: &Tick, side: Side, qty: f64) -> Option<Fill> {
        match side {
            Side::Buy => self.market_buy(ts_ns, tick, qty),
            Side::Sell => self.market_sell(ts_ns, tick, qty),
        }
    }

    /// Limit price for an order on `side` quoted off `tick`.
    pub fn limit_price(&self, tick: &Tick, side: Side) -> f64 {
        let reference = match self.config.limit_price_mode {
            LimitPriceMode::Mid => tick.mid(),
            LimitPriceMode::Bid => tick.bid_px,
            LimitPriceMode::Ask => tick.ask_px,
        };
        reference + side.sign() * self.config.limit_price_offset
    }

    /// Simulate a limit buy fill (if possible).
    ///
    /// Fills at the limit price once the ask trades at or through it with at
    /// least `qty` offered.
    pub fn limit_buy(&self, ts_ns: TimestampNs, limit_price: f64, tick: &Tick, qty: f64) -> Option<Fill> {
        if tick.is_valid() && tick.ask_px <= limit_price && tick.ask_qty >= qty {
            Some(self.fill_at(ts_ns, tick.venue, Side::Buy, limit_price, qty))
        } else {
            None
        }
    }

    /// Simulate a limit sell fill (if possible).
    ///
    /// Fills at the limit price once the bid trades at or through it with at
    /// least `qty` bid.
    pub fn limit_sell(&self, ts_ns: TimestampNs, limit_price: f64, tick: &Tick, qty: f64) -> Option<Fill> {
        if tick.is_valid() && tick.bid_px >= limit_price && tick.bid_qty >= qty {
            Some(self.fill_at(ts_ns, tick.venue, Side::Sell, limit_price, qty))
        } else {
            None
        }
    }

    /// Simulate a limit fill on either side.
    pub fn limit(&self, ts_ns: TimestampNs, side: Side, limit_price: f64, tick: &Tick, qty: f64) -> Option<Fill> {
        match side {
            Side::Buy => self.limit_buy(ts_ns, limit_price, tick, qty),
            Side::Sell => self.limit_sell(ts_ns, limit_price, tick, qty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tick(bid: f64, ask: f64) -> Tick {
        Tick {
            ts_ns: 0,
            venue: Venue::A,
            bid_px: bid,
            bid_qty: 2.0,
            ask_px: ask,
            ask_qty: 2.0,
        }
    }

    #[test]
    fn test_market_buy() {
        let model = FillModel::new(FillModelConfig::default());
        let fill = model.market_buy(1000, &make_tick(2000.0, 2001.0), 1.0).unwrap();

        assert!((fill.price - 2001.0).abs() < 1e-10);
        assert_eq!(fill.side, Side::Buy);
        assert!((fill.commission - 0.10).abs() < 1e-10);
    }

    #[test]
    fn test_market_sell() {
        let model = FillModel::new(FillModelConfig::default());
        let fill = model.market(1000, &make_tick(2000.0, 2001.0), Side::Sell, 3.0).unwrap();

        assert!((fill.price - 2000.0).abs() < 1e-10);
        assert!((fill.commission - 0.30).abs() < 1e-10);
    }

    #[test]
    fn test_market_rejects_invalid_quote() {
        let model = FillModel::new(FillModelConfig::default());
        assert!(model.market_buy(1000, &make_tick(0.0, 2001.0), 1.0).is_none());
        assert!(model.market_sell(1000, &make_tick(2002.0, 2001.0), 1.0).is_none());
    }

    #[test]
    fn test_limit_price_modes() {
        let tick = make_tick(2000.0, 2002.0);
        let mut config = FillModelConfig::default();

        let model = FillModel::new(config.clone());
        assert!((model.limit_price(&tick, Side::Buy) - 2001.0).abs() < 1e-10);

        config.limit_price_mode = LimitPriceMode::Bid;
        config.limit_price_offset = 0.5;
        let model = FillModel::new(config.clone());
        // Offset moves a buy up and a sell down
        assert!((model.limit_price(&tick, Side::Buy) - 2000.5).abs() < 1e-10);
        assert!((model.limit_price(&tick, Side::Sell) - 1999.5).abs() < 1e-10);

        config.limit_price_mode = LimitPriceMode::Ask;
        config.limit_price_offset = 0.0;
        let model = FillModel::new(config);
        assert!((model.limit_price(&tick, Side::Sell) - 2002.0).abs() < 1e-10);
    }

    #[test]
    fn test_limit_buy_filled() {
        let model = FillModel::new(FillModelConfig::default());

        // Ask at 2001 touches a 2001.5 limit; fill is at the limit
        let fill = model.limit_buy(1000, 2001.5, &make_tick(2000.0, 2001.0), 1.0);
        assert!(fill.is_some());
        assert!((fill.unwrap().price - 2001.5).abs() < 1e-10);
    }

    #[test]
    fn test_limit_buy_not_filled() {
        let model = FillModel::new(FillModelConfig::default());

        // Limit below the ask
        assert!(model.limit_buy(1000, 2000.5, &make_tick(2000.0, 2001.0), 1.0).is_none());
        // Not enough size on the ask
        assert!(model.limit_buy(1000, 2001.0, &make_tick(2000.0, 2001.0), 5.0).is_none());
    }

    #[test]
    fn test_limit_sell() {
        let model = FillModel::new(FillModelConfig::default());
        let tick = make_tick(2000.0, 2001.0);

        assert!(model.limit(1000, Side::Sell, 2000.0, &tick, 1.0).is_some());
        assert!(model.limit(1000, Side::Sell, 2000.5, &tick, 1.0).is_none());
    }
}
