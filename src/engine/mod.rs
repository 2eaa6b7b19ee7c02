//! Core engine: the scheduler tick that drives selling and buying.
//!
//! `BotRunner::run_tick` walks every market in fixed order and every
//! trader in sequence, starting whichever sell and buy cycles are due.

pub mod buyer;
pub mod candidates;
pub mod quota;
pub mod scheduler;
pub mod seller;
pub mod traders;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::MarketSettings;
use crate::market::Ports;
use crate::types::{Activity, MarketId, TraderId};
use buyer::{BuyReport, BuyerEngine};
use scheduler::SchedulerClock;
use seller::{SellReport, SellerEngine};
use traders::TraderRegistry;

/// Live per-market settings, shared with the admin surface.
pub type SharedSettings = Arc<RwLock<BTreeMap<MarketId, MarketSettings>>>;

/// Everything the engines need, passed explicitly.
#[derive(Clone)]
pub struct BotContext {
    pub ports: Ports,
    pub traders: TraderRegistry,
    pub settings: SharedSettings,
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub sells: Vec<SellReport>,
    pub buys: Vec<BuyReport>,
    /// Cycles that returned an error.
    pub failures: usize,
}

impl TickReport {
    pub fn listings_created(&self) -> usize {
        self.sells.iter().map(|r| r.listed.len()).sum()
    }

    pub fn settlements(&self) -> usize {
        self.buys.iter().map(|r| r.settlements.len()).sum()
    }
}

pub struct BotRunner {
    ctx: BotContext,
    clock: SchedulerClock,
    rng: StdRng,
}

impl BotRunner {
    /// `seed` fixes the RNG for reproducible runs; otherwise it is seeded
    /// from the OS.
    pub fn new(ctx: BotContext, seed: Option<u64>, started_at: DateTime<Utc>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            ctx,
            clock: SchedulerClock::new(started_at),
            rng,
        }
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    pub fn clock(&self) -> &SchedulerClock {
        &self.clock
    }

    /// One scheduler pass over all markets and traders.
    ///
    /// A failing cycle is logged and counted; the tick moves on to the
    /// next trader.
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let trader_ids: Vec<TraderId> = self.ctx.traders.ids();

        for market in MarketId::ALL {
            let Some(settings) = self.ctx.settings.read().await.get(&market).cloned() else {
                debug!(market = %market, "No settings for market");
                continue;
            };
            let sell_interval = Duration::minutes(i64::from(settings.sell_interval_minutes));
            let buy_interval = Duration::minutes(i64::from(settings.buy_interval_minutes));

            for &trader in &trader_ids {
                if self.clock.try_start(market, trader, Activity::Sell, sell_interval, now) {
                    let engine = SellerEngine::new(&self.ctx.ports, &settings, &trader_ids);
                    match engine.run_cycle(market, trader, now, &mut self.rng).await {
                        Ok(r) => report.sells.push(r),
                        Err(e) => {
                            error!(market = %market, trader, error = %e, "Sell cycle failed");
                            report.failures += 1;
                        }
                    }
                    self.clock.finish(market, trader, Activity::Sell, now, true);
                }

                if self.clock.try_start(market, trader, Activity::Buy, buy_interval, now) {
                    let executed = settings.buyer_enabled && settings.bids_per_interval > 0;
                    let engine = BuyerEngine::new(&self.ctx.ports, &settings, &trader_ids);
                    match engine.run_cycle(market, trader, &mut self.rng).await {
                        Ok(r) => report.buys.push(r),
                        Err(e) => {
                            error!(market = %market, trader, error = %e, "Buy cycle failed");
                            report.failures += 1;
                        }
                    }
                    self.clock.finish(market, trader, Activity::Buy, now, executed);
                }
            }
        }

        if !report.sells.is_empty() || !report.buys.is_empty() {
            info!(
                sell_cycles = report.sells.len(),
                buy_cycles = report.buys.len(),
                listed = report.listings_created(),
                settled = report.settlements(),
                failures = report.failures,
                "Tick complete"
            );
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::memory::InMemoryMarket;
    use crate::types::{ItemClass, ItemTemplate, Listing};

    fn make_catalog() -> Vec<ItemTemplate> {
        (1..=30)
            .map(|id| ItemTemplate {
                id,
                name: format!("Item {id}"),
                quality: 1 + (id % 3) as u8,
                class: if id % 2 == 0 { ItemClass::TradeGoods } else { ItemClass::Armor },
                sell_price: 100,
                buy_price: 400,
                max_stack: 10,
            })
            .collect()
    }

    fn make_runner(market: Arc<InMemoryMarket>, settings: MarketSettings) -> (BotRunner, DateTime<Utc>) {
        let start = Utc::now();
        let map = MarketId::ALL.into_iter().map(|m| (m, settings.clone())).collect();
        let ctx = BotContext {
            ports: Ports::in_memory(market),
            traders: TraderRegistry::from_ids(0, &[1, 2]),
            settings: Arc::new(RwLock::new(map)),
        };
        (BotRunner::new(ctx, Some(42), start), start)
    }

    #[tokio::test]
    async fn test_nothing_due_before_first_interval() {
        let market = Arc::new(InMemoryMarket::new(make_catalog()));
        let settings = MarketSettings {
            max_items: 60,
            ..MarketSettings::default()
        };
        let (mut runner, start) = make_runner(market.clone(), settings);

        let report = runner.run_tick(start + Duration::seconds(30)).await;
        assert!(report.sells.is_empty());
        assert_eq!(market.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_tick_runs_every_market_and_trader() {
        let market = Arc::new(InMemoryMarket::new(make_catalog()));
        let settings = MarketSettings {
            max_items: 60,
            ..MarketSettings::default()
        };
        let (mut runner, start) = make_runner(market.clone(), settings);

        let report = runner.run_tick(start + Duration::minutes(1)).await;
        assert_eq!(report.sells.len(), 6);
        assert_eq!(report.failures, 0);
        assert!(report.listings_created() > 0);
        for listing in market.all_listings() {
            assert!(listing.start_bid > 0 && listing.start_bid <= listing.buyout);
        }
        for m in MarketId::ALL {
            let per_market = market.all_listings().iter().filter(|l| l.market == m).count();
            assert!(per_market <= 60);
        }
    }

    #[tokio::test]
    async fn test_buy_clock_holds_when_buyer_disabled() {
        let market = Arc::new(InMemoryMarket::new(make_catalog()));
        let (mut runner, start) = make_runner(market.clone(), MarketSettings::default());

        let now = start + Duration::minutes(1);
        let report = runner.run_tick(now).await;
        assert!(report.buys.iter().all(|b| !b.executed));
        assert_eq!(runner.clock().last_run(MarketId::Alliance, 1, Activity::Buy), start);
        assert_eq!(runner.clock().last_run(MarketId::Alliance, 1, Activity::Sell), now);
    }

    #[tokio::test]
    async fn test_settings_change_seen_next_tick() {
        let market = Arc::new(InMemoryMarket::new(make_catalog()));
        market.seed_listing(Listing {
            id: 0,
            market: MarketId::Horde,
            owner: 900,
            item_template: 1,
            item_guid: 0,
            count: 1,
            bid: 0,
            start_bid: 10,
            buyout: 0,
            bidder: None,
            expires_at: Utc::now() + Duration::hours(2),
        });
        let settings = MarketSettings {
            seller_enabled: false,
            ..MarketSettings::default()
        };
        let (mut runner, start) = make_runner(market.clone(), settings);

        let report = runner.run_tick(start + Duration::minutes(1)).await;
        assert_eq!(report.settlements(), 0);

        {
            let shared = runner.context().settings.clone();
            let mut guard = shared.write().await;
            let horde = guard.get_mut(&MarketId::Horde).unwrap();
            horde.buyer_enabled = true;
        }
        let report = runner.run_tick(start + Duration::minutes(2)).await;
        // the first trader bids; the second skips a listing a bot leads
        assert_eq!(report.settlements(), 1);
    }
}
