//! Seller engine: creates new listings for one trader in one market.
//!
//! Capacity check → candidate prioritization → per-slot quota selection
//! → pricing → stack sizing → ledger commit.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::MarketSettings;
use crate::engine::candidates::{self, CandidateStage};
use crate::engine::quota::QuotaTracker;
use crate::market::Ports;
use crate::strategy::pricing::{median, PricingModel, MARKET_PRICE_WINDOW};
use crate::strategy::stacking::{auction_duration, stack_size};
use crate::types::{BotError, ItemId, ItemTemplate, Listing, MarketId, NewListing, TraderId};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// How a sell cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SellOutcome {
    Disabled,
    /// `max_items` is zero.
    NoCapacity,
    MarketFull { total: u32, max: u32 },
    TraderFull { own: u32, upper: u32 },
    NoCandidates,
    /// Every slot was processed or a capacity bound was reached.
    Completed,
    /// The quota tracker ran out of selectable buckets.
    Exhausted,
    /// A catalog, construction or quality failure stopped the cycle.
    Aborted(BotError),
}

#[derive(Debug, Clone)]
pub struct SellReport {
    pub market: MarketId,
    pub trader: TraderId,
    pub target: u32,
    pub stage: Option<CandidateStage>,
    pub listed: Vec<Listing>,
    pub outcome: SellOutcome,
}

impl SellReport {
    fn new(market: MarketId, trader: TraderId) -> Self {
        Self {
            market,
            trader,
            target: 0,
            stage: None,
            listed: Vec::new(),
            outcome: SellOutcome::Completed,
        }
    }

    fn finish(mut self, outcome: SellOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SellerEngine<'a> {
    ports: &'a Ports,
    settings: &'a MarketSettings,
    /// Every bot trader; used for the market-wide share.
    traders: &'a [TraderId],
}

impl<'a> SellerEngine<'a> {
    pub fn new(ports: &'a Ports, settings: &'a MarketSettings, traders: &'a [TraderId]) -> Self {
        Self {
            ports,
            settings,
            traders,
        }
    }

    /// Run one sell cycle for `trader`.
    ///
    /// Ledger errors propagate; catalog, construction and quality failures
    /// end the cycle and are reported in `SellOutcome::Aborted`.
    pub async fn run_cycle<R: Rng + ?Sized>(
        &self,
        market: MarketId,
        trader: TraderId,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<SellReport> {
        let report = SellReport::new(market, trader);
        let settings = self.settings;

        if !settings.seller_enabled {
            return Ok(report.finish(SellOutcome::Disabled));
        }
        let max = settings.max_items;
        if max == 0 {
            debug!(market = %market, trader, "Seller has no capacity configured");
            return Ok(report.finish(SellOutcome::NoCapacity));
        }

        let listings = self
            .ports
            .ledger
            .listings(market)
            .await
            .with_context(|| format!("Failed to read listings for {market}"))?;

        let mut total = listings.iter().filter(|l| self.traders.contains(&l.owner)).count() as u32;
        if total >= max {
            debug!(market = %market, total, max, "Market at capacity");
            return Ok(report.finish(SellOutcome::MarketFull { total, max }));
        }

        let n = self.traders.len().max(1) as u32;
        let upper = max.div_ceil(n);
        let lower = settings.min_items.div_ceil(n);
        let mut own = listings.iter().filter(|l| l.owner == trader).count() as u32;
        if own >= upper {
            debug!(market = %market, trader, own, upper, "Trader at its share");
            return Ok(report.finish(SellOutcome::TraderFull { own, upper }));
        }

        let target = if total < settings.min_items {
            rng.random_range(lower.saturating_sub(own)..=lower)
        } else {
            settings.items_per_cycle.min(upper - own)
        };
        let mut report = SellReport { target, ..report };
        if target == 0 {
            return Ok(report);
        }

        let templates = self
            .ports
            .catalog
            .templates()
            .await
            .context("Failed to read item catalog")?;
        let Some((stage, candidates)) =
            candidates::prioritized(settings, &templates, &listings, trader, rng)
        else {
            debug!(market = %market, trader, "No sell candidates");
            return Ok(report.finish(SellOutcome::NoCandidates));
        };
        report.stage = Some(stage);

        let by_id: HashMap<ItemId, ItemTemplate> = templates.into_iter().map(|t| (t.id, t)).collect();
        let mut quota = QuotaTracker::new(settings);
        quota.count_listings(&listings, &by_id);
        quota.fill(candidates);

        let mut held: HashMap<ItemId, u32> = HashMap::new();
        for listing in listings.iter().filter(|l| l.owner == trader) {
            *held.entry(listing.item_template).or_default() += 1;
        }

        let model = PricingModel::new(settings);
        let mut outcome = SellOutcome::Completed;

        for _ in 0..target {
            if own >= upper || total >= max {
                break;
            }
            let Some(candidate) = quota.select(rng, &held, settings.max_duplicates) else {
                outcome = SellOutcome::Exhausted;
                break;
            };

            let template = match self.ports.catalog.template(candidate.item_id).await {
                Ok(Some(t)) => t,
                Ok(None) => {
                    outcome = SellOutcome::Aborted(BotError::CatalogLookup {
                        item_id: candidate.item_id,
                    });
                    break;
                }
                Err(e) => {
                    warn!(market = %market, trader, item = candidate.item_id, error = %e, "Catalog lookup failed");
                    outcome = SellOutcome::Aborted(BotError::CatalogUnavailable {
                        item_id: candidate.item_id,
                        reason: format!("{e:#}"),
                    });
                    break;
                }
            };
            let Some(quality) = template.tier() else {
                outcome = SellOutcome::Aborted(BotError::UnsupportedQuality {
                    item_id: template.id,
                    quality: template.quality,
                });
                break;
            };

            let market_price = if settings.sell_at_market_price && candidate.price_override.is_none() {
                let recent = self
                    .ports
                    .ledger
                    .recent_sale_prices(market, template.id, MARKET_PRICE_WINDOW)
                    .await
                    .context("Failed to read sale history")?;
                median(&recent)
            } else {
                None
            };

            let stack = stack_size(rng, template.max_stack, settings.stack_cap(quality));
            let quote = model.ask(&template, quality, candidate.price_override, market_price, stack, rng);
            let expires_at = now + auction_duration(rng, settings.duration);

            let item = match self.ports.provisioner.instantiate(&template, stack, trader).await {
                Ok(item) => item,
                Err(e) => {
                    outcome = SellOutcome::Aborted(BotError::ItemConstruction {
                        item_id: template.id,
                        reason: e.to_string(),
                    });
                    break;
                }
            };

            let listing = self
                .ports
                .ledger
                .add_listing(NewListing {
                    market,
                    owner: trader,
                    item,
                    start_bid: quote.start_bid,
                    buyout: quote.buyout,
                    expires_at,
                })
                .await
                .with_context(|| format!("Failed to list item {} in {market}", template.id))?;

            debug!(
                market = %market,
                trader,
                listing = listing.id,
                item = template.id,
                name = %template.name,
                stack,
                bid = listing.start_bid,
                buyout = listing.buyout,
                corrected = quote.corrected,
                "Listing created"
            );

            own += 1;
            total += 1;
            *held.entry(template.id).or_default() += 1;
            report.listed.push(listing);
        }

        match &outcome {
            SellOutcome::Aborted(reason) => warn!(
                market = %market,
                trader,
                listed = report.listed.len(),
                reason = %reason,
                "Sell cycle aborted"
            ),
            _ => info!(
                market = %market,
                trader,
                stage = %stage,
                target,
                listed = report.listed.len(),
                "Sell cycle complete"
            ),
        }
        Ok(report.finish(outcome))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
