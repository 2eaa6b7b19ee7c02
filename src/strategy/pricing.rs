//! Price model.
//!
//! Ask side: override tables or tier bands, independent ±10% jitter on
//! bid and buyout, then the bid ≤ buyout correction. Buy side: a price
//! ceiling per listing and a randomized bid between the current price
//! and that ceiling.

use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::{Band, MarketSettings, PriceSource};
use crate::types::{Copper, ItemTemplate, Listing, PriceOverride, Quality};

/// Sales considered when pricing at market value.
pub const MARKET_PRICE_WINDOW: usize = 50;

/// Largest jitter applied to a base price, in percent.
const JITTER_PCT: i32 = 10;

// ---------------------------------------------------------------------------
// Ask side
// ---------------------------------------------------------------------------

/// Final prices for a new listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AskQuote {
    /// Per-unit bid after jitter and correction.
    pub unit_bid: Copper,
    /// Per-unit buyout after jitter and correction.
    pub unit_buyout: Copper,
    pub start_bid: Copper,
    pub buyout: Copper,
    /// Whether the bid had to be clamped down to the buyout.
    pub corrected: bool,
}

/// Prices before jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasePrices {
    pub buyout: Copper,
    pub bid: Copper,
    /// Upper bound on the jittered buyout, set for override items.
    pub ceiling: Option<Copper>,
}

/// Pricing rules for one market's settings.
pub struct PricingModel<'a> {
    settings: &'a MarketSettings,
}

impl<'a> PricingModel<'a> {
    pub fn new(settings: &'a MarketSettings) -> Self {
        Self { settings }
    }

    /// Reference price for band-based pricing: recent market value when
    /// enabled and known, otherwise the configured vendor price.
    pub fn reference_price(&self, template: &ItemTemplate, market_price: Option<Copper>) -> Copper {
        if self.settings.sell_at_market_price {
            if let Some(price) = market_price.filter(|p| *p > 0) {
                return price;
            }
        }
        match self.settings.sell_price_source {
            PriceSource::VendorSell => template.sell_price,
            PriceSource::VendorBuy => template.buy_price,
        }
    }

    /// Base buyout and bid before jitter.
    pub fn base_prices<R: Rng + ?Sized>(
        &self,
        template: &ItemTemplate,
        quality: Quality,
        price_override: Option<PriceOverride>,
        market_price: Option<Copper>,
        rng: &mut R,
    ) -> BasePrices {
        if let Some(o) = price_override {
            return BasePrices {
                buyout: o.avg_price,
                bid: o.min_price,
                ceiling: Some(o.ceiling()),
            };
        }

        let reference = self.reference_price(template, market_price);
        let buyout = scale_pct(reference, draw_band(rng, self.settings.price_band(quality)));
        let bid = scale_pct(buyout, draw_band(rng, self.settings.bid_band(quality)));
        BasePrices {
            buyout,
            bid,
            ceiling: None,
        }
    }

    /// Full ask computation for a stack of `stack` items.
    pub fn ask<R: Rng + ?Sized>(
        &self,
        template: &ItemTemplate,
        quality: Quality,
        price_override: Option<PriceOverride>,
        market_price: Option<Copper>,
        stack: u32,
        rng: &mut R,
    ) -> AskQuote {
        let base = self.base_prices(template, quality, price_override, market_price, rng);
        quote_from_base(base, stack, rng)
    }

    // -----------------------------------------------------------------------
    // Buy side
    // -----------------------------------------------------------------------

    /// Most this market will pay for the whole listing.
    pub fn bid_ceiling(&self, template: &ItemTemplate, quality: Quality, count: u32) -> Copper {
        let count = u64::from(count.max(1));
        let multiplier = u64::from(self.settings.multiplier(quality));
        let price_override = self.settings.override_for(template.id);
        match self.settings.buy_price_source {
            PriceSource::VendorSell => match price_override {
                Some(o) if o.ceiling() > 0 => o.ceiling().saturating_mul(count),
                _ => template
                    .sell_price
                    .saturating_mul(count)
                    .saturating_mul(multiplier),
            },
            PriceSource::VendorBuy => match price_override {
                Some(o) if o.avg_price > 0 => o.avg_price.saturating_mul(count),
                _ => template
                    .buy_price
                    .saturating_mul(count)
                    .saturating_mul(multiplier),
            },
        }
    }

    /// Decide what to do with someone else's listing.
    pub fn value_listing<R: Rng + ?Sized>(
        &self,
        listing: &Listing,
        template: &ItemTemplate,
        rng: &mut R,
    ) -> Valuation {
        if template.is_ammo() {
            return Valuation::pass(0, PassReason::Ammunition);
        }
        let Some(quality) = template.tier() else {
            return Valuation::pass(0, PassReason::UnsupportedQuality(template.quality));
        };

        let ceiling = self.bid_ceiling(template, quality, listing.count);
        let current = listing.current_price();
        if current >= ceiling {
            return Valuation::pass(ceiling, PassReason::AboveCeiling { current });
        }

        let bid = bid_between(current, ceiling, listing.min_outbid_increment(), rng.random::<f64>());
        let decision = if listing.buyout > 0 && bid >= listing.buyout {
            BidDecision::Buyout {
                price: listing.buyout,
            }
        } else {
            BidDecision::Bid { amount: bid }
        };

        debug!(
            listing = listing.id,
            current,
            ceiling,
            bid,
            buyout = listing.buyout,
            "Listing valued"
        );
        Valuation { ceiling, decision }
    }
}

/// Jitter, positivity and bid ≤ buyout correction, then stack scaling.
pub fn quote_from_base<R: Rng + ?Sized>(base: BasePrices, stack: u32, rng: &mut R) -> AskQuote {
    // Drawn independently so bid and buyout drift apart.
    let mut unit_buyout = jitter(base.buyout, rng).max(1);
    let mut unit_bid = jitter(base.bid, rng).max(1);

    if let Some(ceiling) = base.ceiling {
        unit_buyout = unit_buyout.min(ceiling.max(1));
    }

    let (bid, buyout, corrected) = enforce_bid_below_buyout(unit_bid, unit_buyout, rng);
    unit_bid = bid;
    unit_buyout = buyout;

    let stack = u64::from(stack.max(1));
    AskQuote {
        unit_bid,
        unit_buyout,
        start_bid: unit_bid.saturating_mul(stack),
        buyout: unit_buyout.saturating_mul(stack),
        corrected,
    }
}

/// Apply a uniform -10%..=+10% deviation.
pub fn jitter<R: Rng + ?Sized>(price: Copper, rng: &mut R) -> Copper {
    let deviation = rng.random_range(-JITTER_PCT..=JITTER_PCT);
    let factor = Decimal::from(100 + deviation) / dec!(100);
    to_copper(Decimal::from(price) * factor)
}

/// If the bid overtook the buyout, pull the bid down to the buyout and
/// lift the buyout by 1-5%. Returns `(bid, buyout, corrected)`.
pub fn enforce_bid_below_buyout<R: Rng + ?Sized>(
    bid: Copper,
    buyout: Copper,
    rng: &mut R,
) -> (Copper, Copper, bool) {
    if bid <= buyout {
        return (bid, buyout, false);
    }
    let inflated = scale_pct(buyout, rng.random_range(101..=105));
    (buyout, inflated.max(buyout), true)
}

/// `current + (ceiling - current) × fraction`, raised to the legal minimum outbid.
pub fn bid_between(current: Copper, ceiling: Copper, min_increment: Copper, fraction: f64) -> Copper {
    let fraction = Decimal::from_f64(fraction.clamp(0.0, 1.0)).unwrap_or_default();
    let spread = Decimal::from(ceiling.saturating_sub(current));
    let bid = current.saturating_add(to_copper(spread * fraction));
    bid.max(current.saturating_add(min_increment))
}

/// Median of a price sample; `None` when empty.
pub fn median(prices: &[Copper]) -> Option<Copper> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(sorted[mid - 1] / 2 + sorted[mid] / 2 + (sorted[mid - 1] % 2 + sorted[mid] % 2) / 2)
    } else {
        Some(sorted[mid])
    }
}

/// Uniform integer draw inside an inclusive band.
pub fn draw_band<R: Rng + ?Sized>(rng: &mut R, band: Band) -> u32 {
    let (lo, hi) = (band.min.min(band.max), band.min.max(band.max));
    rng.random_range(lo..=hi)
}

fn scale_pct(price: Copper, pct: u32) -> Copper {
    to_copper(Decimal::from(price) * Decimal::from(pct) / dec!(100))
}

fn to_copper(value: Decimal) -> Copper {
    value.floor().to_u64().unwrap_or(Copper::MAX)
}

// ---------------------------------------------------------------------------
// Valuation result
// ---------------------------------------------------------------------------

/// Why the buyer leaves a listing alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    Ammunition,
    UnsupportedQuality(u8),
    AboveCeiling { current: Copper },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidDecision {
    Buyout { price: Copper },
    Bid { amount: Copper },
    Pass(PassReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valuation {
    pub ceiling: Copper,
    pub decision: BidDecision,
}

impl Valuation {
    fn pass(ceiling: Copper, reason: PassReason) -> Self {
        Self {
            ceiling,
            decision: BidDecision::Pass(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
