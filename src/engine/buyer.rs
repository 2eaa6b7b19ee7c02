//! Buyer engine: bids on and buys out listings placed by outside sellers.

use anyhow::{Context, Result};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::MarketSettings;
use crate::market::Ports;
use crate::strategy::pricing::{BidDecision, PricingModel};
use crate::types::{Copper, Listing, ListingId, MarketId, TraderId};

/// One committed settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Bid { listing: ListingId, amount: Copper },
    Buyout { listing: ListingId, price: Copper },
}

#[derive(Debug, Clone)]
pub struct BuyReport {
    pub market: MarketId,
    pub trader: TraderId,
    /// Whether a buy attempt ran at all (drives the scheduler reset).
    pub executed: bool,
    /// Listings drawn from the eligible pool.
    pub considered: u32,
    pub passed: u32,
    pub settlements: Vec<Settlement>,
}

impl BuyReport {
    fn new(market: MarketId, trader: TraderId, executed: bool) -> Self {
        Self {
            market,
            trader,
            executed,
            considered: 0,
            passed: 0,
            settlements: Vec::new(),
        }
    }
}

pub struct BuyerEngine<'a> {
    ports: &'a Ports,
    settings: &'a MarketSettings,
    traders: &'a [TraderId],
}

impl<'a> BuyerEngine<'a> {
    pub fn new(ports: &'a Ports, settings: &'a MarketSettings, traders: &'a [TraderId]) -> Self {
        Self {
            ports,
            settings,
            traders,
        }
    }

    /// Run one buy cycle for `trader`.
    ///
    /// Draws up to `bids_per_interval` listings without replacement from
    /// the listings no bot trader owns or leads, values each and settles.
    pub async fn run_cycle<R: Rng + ?Sized>(
        &self,
        market: MarketId,
        trader: TraderId,
        rng: &mut R,
    ) -> Result<BuyReport> {
        let settings = self.settings;
        let executed = settings.buyer_enabled && settings.bids_per_interval > 0;
        let mut report = BuyReport::new(market, trader, executed);
        if !executed {
            return Ok(report);
        }

        let mut pool: Vec<ListingId> = self
            .ports
            .ledger
            .listings(market)
            .await
            .with_context(|| format!("Failed to read listings for {market}"))?
            .into_iter()
            .filter(|l| self.is_eligible(l))
            .map(|l| l.id)
            .collect();
        if pool.is_empty() {
            debug!(market = %market, trader, "No eligible listings");
            return Ok(report);
        }

        let model = PricingModel::new(settings);

        for _ in 0..settings.bids_per_interval {
            if pool.is_empty() {
                break;
            }
            let id = pool.swap_remove(rng.random_range(0..pool.len()));
            report.considered += 1;

            // The pool snapshot may be stale; re-read before acting.
            let listing = match self.ports.ledger.listing(market, id).await? {
                Some(l) if self.is_eligible(&l) => l,
                _ => {
                    report.passed += 1;
                    continue;
                }
            };

            let template = match self.ports.catalog.template(listing.item_template).await {
                Ok(Some(t)) => t,
                Ok(None) => {
                    warn!(market = %market, listing = id, item = listing.item_template, "Unknown item, skipping");
                    report.passed += 1;
                    continue;
                }
                Err(e) => {
                    warn!(market = %market, listing = id, error = %e, "Catalog lookup failed, skipping");
                    report.passed += 1;
                    continue;
                }
            };

            let valuation = model.value_listing(&listing, &template, rng);
            let settlement = match valuation.decision {
                BidDecision::Pass(reason) => {
                    debug!(market = %market, listing = id, reason = ?reason, "Passing on listing");
                    report.passed += 1;
                    continue;
                }
                BidDecision::Bid { amount } => self.place_bid(&listing, trader, amount).await?,
                BidDecision::Buyout { price } => self.buy_out(listing, trader, price).await?,
            };
            report.settlements.push(settlement);
        }

        info!(
            market = %market,
            trader,
            considered = report.considered,
            settled = report.settlements.len(),
            passed = report.passed,
            "Buy cycle complete"
        );
        Ok(report)
    }

    /// Bots never trade with each other: skip listings a bot owns or
    /// already holds the high bid on.
    fn is_eligible(&self, listing: &Listing) -> bool {
        !self.traders.contains(&listing.owner)
            && !listing.bidder.is_some_and(|b| self.traders.contains(&b))
    }

    async fn place_bid(&self, listing: &Listing, trader: TraderId, amount: Copper) -> Result<Settlement> {
        let mut mail = Vec::new();
        if listing.bidder.is_some() {
            let refund = self
                .ports
                .notifier
                .outbid_refund(listing, amount)
                .await
                .context("Failed to compose outbid refund")?;
            mail.push(refund);
        }
        self.ports
            .ledger
            .settle_bid(listing.market, listing.id, amount, trader, mail)
            .await
            .with_context(|| format!("Failed to bid on listing {}", listing.id))?;

        debug!(
            market = %listing.market,
            trader,
            listing = listing.id,
            amount,
            displaced = ?listing.bidder,
            "Bid placed"
        );
        Ok(Settlement::Bid {
            listing: listing.id,
            amount,
        })
    }

    async fn buy_out(&self, listing: Listing, trader: TraderId, price: Copper) -> Result<Settlement> {
        let notifier = &self.ports.notifier;
        let mut mail = Vec::with_capacity(3);
        if listing.bidder.is_some() {
            let refund = notifier
                .outbid_refund(&listing, price)
                .await
                .context("Failed to compose outbid refund")?;
            mail.push(refund);
        }

        let sold = Listing {
            bid: price,
            bidder: Some(trader),
            ..listing.clone()
        };
        mail.push(
            notifier
                .sale_successful(&sold, price)
                .await
                .context("Failed to compose sale mail")?,
        );
        mail.push(
            notifier
                .auction_won(&sold, trader, price)
                .await
                .context("Failed to compose won mail")?,
        );

        let sold = self
            .ports
            .ledger
            .settle_buyout(listing.market, listing.id, trader, price, mail)
            .await
            .with_context(|| format!("Failed to buy out listing {}", listing.id))?;

        debug!(market = %sold.market, trader, listing = sold.id, price, "Bought out");
        Ok(Settlement::Buyout {
            listing: sold.id,
            price,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
