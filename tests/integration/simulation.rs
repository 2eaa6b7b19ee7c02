//! Multi-tick simulation against the in-memory market.
//!
//! Drives `BotRunner` through simulated hours and checks the listing
//! invariants after every tick, then exercises the edge cases the
//! engines must handle end to end.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_test::assert_ok;

use ahbot::admin::service::{AdminService, Toggle};
use ahbot::config::MarketSettings;
use ahbot::engine::buyer::BuyerEngine;
use ahbot::engine::seller::{SellOutcome, SellerEngine};
use ahbot::engine::traders::TraderRegistry;
use ahbot::engine::{BotContext, BotRunner, SharedSettings};
use ahbot::market::memory::InMemoryMarket;
use ahbot::market::{Ledger, Ports};
use ahbot::storage;
use ahbot::types::*;

use crate::mock_market::{demo_catalog, outside_listing, ScriptedMarket};

const TRADERS: [TraderId; 3] = [11, 12, 13];

fn shared(settings: MarketSettings) -> SharedSettings {
    let map: BTreeMap<MarketId, MarketSettings> =
        MarketId::ALL.into_iter().map(|m| (m, settings.clone())).collect();
    Arc::new(RwLock::new(map))
}

fn make_runner(ports: Ports, settings: SharedSettings, start: DateTime<Utc>) -> BotRunner {
    let ctx = BotContext {
        ports,
        traders: TraderRegistry::from_ids(5, &TRADERS),
        settings,
    };
    BotRunner::new(ctx, Some(7), start)
}

fn temp_settings_path() -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("ahbot_sim_settings_{}.json", uuid::Uuid::new_v4()));
    p.to_string_lossy().to_string()
}

fn assert_invariants(market: &InMemoryMarket, max_items: u32) {
    let templates: HashMap<ItemId, ItemTemplate> =
        demo_catalog().into_iter().map(|t| (t.id, t)).collect();
    let upper = max_items.div_ceil(TRADERS.len() as u32);
    let mut per_market: HashMap<MarketId, u32> = HashMap::new();
    let mut per_trader: HashMap<(MarketId, TraderId), u32> = HashMap::new();

    for listing in market.all_listings() {
        assert!(listing.start_bid > 0, "listing {} has zero start bid", listing.id);
        assert!(listing.buyout > 0);
        assert!(listing.start_bid <= listing.buyout, "listing {} bid above buyout", listing.id);
        let template = &templates[&listing.item_template];
        assert!(listing.count >= 1 && listing.count <= template.max_stack.max(1));
        assert!(template.tier().is_some());
        if TRADERS.contains(&listing.owner) {
            *per_market.entry(listing.market).or_default() += 1;
            *per_trader.entry((listing.market, listing.owner)).or_default() += 1;
        }
    }
    assert!(per_market.values().all(|&n| n <= max_items));
    assert!(per_trader.values().all(|&n| n <= upper));
}

#[tokio::test]
async fn test_simulated_hours_hold_listing_invariants() {
    let market = Arc::new(InMemoryMarket::new(demo_catalog()));
    let settings = MarketSettings {
        min_items: 30,
        max_items: 90,
        items_per_cycle: 12,
        duration: ahbot::config::DurationClass::Short,
        ..MarketSettings::default()
    };
    let start = Utc::now();
    let mut runner = make_runner(Ports::in_memory(market.clone()), shared(settings), start);

    let mut listed = 0;
    for minute in 1..=180 {
        let now = start + Duration::minutes(minute);
        market.sweep_expired(now);
        let report = runner.run_tick(now).await;
        assert_eq!(report.failures, 0);
        listed += report.listings_created();
        assert_invariants(&market, 90);
    }
    assert!(listed > 90, "short auctions should be relisted, got {listed}");
}

#[tokio::test]
async fn test_min_items_fill_first_cycle() {
    let market = Arc::new(InMemoryMarket::new(demo_catalog()));
    let settings = MarketSettings {
        min_items: 30,
        max_items: 90,
        ..MarketSettings::default()
    };
    let start = Utc::now();
    let mut runner = make_runner(Ports::in_memory(market.clone()), shared(settings), start);

    let report = runner.run_tick(start + Duration::minutes(1)).await;
    // below min_items: each trader lists at most its share of the minimum
    for sell in &report.sells {
        assert!(sell.target <= 10);
        assert!(sell.listed.len() <= 10);
    }
}

#[tokio::test]
async fn test_trader_at_share_lists_nothing() {
    let market = Arc::new(InMemoryMarket::new(demo_catalog()));
    for _ in 0..25 {
        market.seed_listing(outside_listing(MarketId::Alliance, 1, 1010, 50, 100));
    }
    let before = market.mutation_count();
    let settings = MarketSettings {
        max_items: 100,
        ..MarketSettings::default()
    };
    let ports = Ports::in_memory(market.clone());
    let traders = [1, 2, 3, 4];
    let engine = SellerEngine::new(&ports, &settings, &traders);
    let mut rng = StdRng::seed_from_u64(1);

    let report = assert_ok!(engine.run_cycle(MarketId::Alliance, 1, Utc::now(), &mut rng).await);
    assert_eq!(report.outcome, SellOutcome::TraderFull { own: 25, upper: 25 });
    assert!(report.listed.is_empty());
    assert_eq!(market.mutation_count(), before);
}

#[tokio::test]
async fn test_buyer_never_draws_past_pool() {
    let market = Arc::new(InMemoryMarket::new(demo_catalog()));
    market.seed_listing(outside_listing(MarketId::Horde, 900, 1010, 10, 0));
    market.seed_listing(outside_listing(MarketId::Horde, 901, 1011, 10, 0));
    // bot-owned listings are not in the pool
    market.seed_listing(outside_listing(MarketId::Horde, 12, 1012, 10, 0));

    let settings = MarketSettings {
        buyer_enabled: true,
        bids_per_interval: 3,
        ..MarketSettings::default()
    };
    let ports = Ports::in_memory(market.clone());
    let engine = BuyerEngine::new(&ports, &settings, &TRADERS);
    let mut rng = StdRng::seed_from_u64(3);

    let report = assert_ok!(engine.run_cycle(MarketId::Horde, 11, &mut rng).await);
    assert!(report.executed);
    assert_eq!(report.considered, 2);
    assert!(report.settlements.len() <= 2);
    assert_eq!(report.settlements.len() as u32 + report.passed, 2);
}

fn buyer_settings() -> MarketSettings {
    MarketSettings {
        buyer_enabled: true,
        bids_per_interval: 1,
        ..MarketSettings::default()
    }
}

/// An outside listing already carrying a player's bid of 500.
fn contested_listing(buyout: Copper) -> Listing {
    let mut listing = outside_listing(MarketId::Horde, 900, 1051, 100, buyout);
    listing.bid = 500;
    listing.bidder = Some(950);
    listing
}

#[tokio::test]
async fn test_refused_bid_keeps_previous_bidder_and_sends_nothing() {
    let scripted = ScriptedMarket::new(Arc::new(InMemoryMarket::new(demo_catalog())));
    let listing = scripted.inner().seed_listing(contested_listing(0));
    scripted.fail_settlements();

    let settings = buyer_settings();
    let ports = scripted.clone().ports();
    let engine = BuyerEngine::new(&ports, &settings, &TRADERS);
    let mut rng = StdRng::seed_from_u64(21);

    assert!(engine.run_cycle(MarketId::Horde, 11, &mut rng).await.is_err());
    assert_eq!(scripted.inner().all_listings(), vec![listing]);
    let kept = &scripted.inner().all_listings()[0];
    assert_eq!(kept.bid, 500);
    assert_eq!(kept.bidder, Some(950));
    assert!(scripted.inner().mail().is_empty());
    assert_eq!(scripted.inner().mutation_count(), 0);
}

#[tokio::test]
async fn test_refused_buyout_keeps_listing_and_sends_nothing() {
    let scripted = ScriptedMarket::new(Arc::new(InMemoryMarket::new(demo_catalog())));
    // any legal outbid reaches the buyout
    let listing = scripted.inner().seed_listing(contested_listing(525));
    scripted.fail_settlements();

    let settings = buyer_settings();
    let ports = scripted.clone().ports();
    let engine = BuyerEngine::new(&ports, &settings, &TRADERS);
    let mut rng = StdRng::seed_from_u64(22);

    assert!(engine.run_cycle(MarketId::Horde, 11, &mut rng).await.is_err());
    assert_eq!(scripted.inner().all_listings(), vec![listing]);
    assert!(scripted.inner().mail().is_empty());
    let sales = assert_ok!(scripted.inner().recent_sale_prices(MarketId::Horde, 1051, 5).await);
    assert!(sales.is_empty());
}

#[tokio::test]
async fn test_accepted_buyout_commits_sale_and_mail_together() {
    let market = Arc::new(InMemoryMarket::new(demo_catalog()));
    let listing = market.seed_listing(contested_listing(525));

    let settings = buyer_settings();
    let ports = Ports::in_memory(market.clone());
    let engine = BuyerEngine::new(&ports, &settings, &TRADERS);
    let mut rng = StdRng::seed_from_u64(22);

    let report = assert_ok!(engine.run_cycle(MarketId::Horde, 11, &mut rng).await);
    assert_eq!(report.settlements.len(), 1);
    assert!(market.all_listings().is_empty());
    assert_eq!(
        market.mail(),
        vec![
            Mail::OutbidRefund { listing: listing.id, bidder: 950, refund: 500, new_amount: 525 },
            Mail::SaleSuccessful { listing: listing.id, seller: 900, price: 525 },
            Mail::AuctionWon { listing: listing.id, winner: 11, price: 525 },
        ]
    );
    let sales = assert_ok!(market.recent_sale_prices(MarketId::Horde, 1051, 5).await);
    assert_eq!(sales, vec![525]);
}

#[tokio::test]
async fn test_no_candidates_leaves_ledger_untouched() {
    let market = Arc::new(InMemoryMarket::new(demo_catalog()));
    let mut settings = MarketSettings {
        max_items: 50,
        ..MarketSettings::default()
    };
    settings.disabled_items = demo_catalog().into_iter().map(|t| t.id).collect();
    let start = Utc::now();
    let mut runner = make_runner(Ports::in_memory(market.clone()), shared(settings), start);

    let report = runner.run_tick(start + Duration::minutes(1)).await;
    assert_eq!(report.sells.len(), MarketId::ALL.len() * TRADERS.len());
    assert!(report.sells.iter().all(|s| s.outcome == SellOutcome::NoCandidates));
    assert_eq!(market.mutation_count(), 0);
}

#[tokio::test]
async fn test_ledger_read_failure_is_counted_and_clock_moves_on() {
    let scripted = ScriptedMarket::new(Arc::new(InMemoryMarket::new(demo_catalog())));
    scripted.fail_reads("ledger offline");
    let settings = MarketSettings {
        max_items: 30,
        ..MarketSettings::default()
    };
    let start = Utc::now();
    let mut runner = make_runner(scripted.clone().ports(), shared(settings), start);

    let first = start + Duration::minutes(1);
    let report = runner.run_tick(first).await;
    assert_eq!(report.failures, MarketId::ALL.len() * TRADERS.len());
    assert!(report.sells.is_empty());

    // sell clocks were reset, so nothing is due half a minute later
    let report = runner.run_tick(first + Duration::seconds(30)).await;
    assert_eq!(report.failures, 0);
    assert_eq!(scripted.inner().mutation_count(), 0);
}

#[tokio::test]
async fn test_commit_failure_keeps_earlier_listings() {
    let scripted = ScriptedMarket::new(Arc::new(InMemoryMarket::new(demo_catalog())));
    scripted.fail_commits_after(3);
    let settings = MarketSettings {
        max_items: 60,
        ..MarketSettings::default()
    };
    let ports = scripted.clone().ports();
    let engine = SellerEngine::new(&ports, &settings, &TRADERS);
    let mut rng = StdRng::seed_from_u64(9);

    let result = engine.run_cycle(MarketId::Neutral, 11, Utc::now(), &mut rng).await;
    assert!(result.is_err());
    let listings = scripted.inner().all_listings();
    assert_eq!(listings.len(), 3);
    assert!(listings.iter().all(|l| l.owner == 11 && l.market == MarketId::Neutral));
}

#[tokio::test]
async fn test_market_price_mode_uses_recent_sales() {
    let catalog = vec![ItemTemplate {
        id: 4306,
        name: "Silk Cloth".into(),
        quality: 1,
        class: ItemClass::TradeGoods,
        sell_price: 150,
        buy_price: 600,
        max_stack: 1,
    }];
    let market = Arc::new(InMemoryMarket::new(catalog));
    for price in [1000, 1000, 1000, 5, 900_000] {
        market.record_sale(MarketId::Alliance, 4306, price);
    }

    let mut settings = MarketSettings {
        max_items: 10,
        sell_at_market_price: true,
        ..MarketSettings::default()
    };
    settings.price_bands[1] = ahbot::config::Band::new(100, 100);
    settings.percentages.trade_goods = [0, 100, 0, 0, 0, 0, 0];
    settings.percentages.equipment = [0; 7];
    let ports = Ports::in_memory(market.clone());
    let engine = SellerEngine::new(&ports, &settings, &TRADERS);
    let mut rng = StdRng::seed_from_u64(21);

    let report = assert_ok!(engine.run_cycle(MarketId::Alliance, 11, Utc::now(), &mut rng).await);
    assert!(!report.listed.is_empty());
    for listing in &report.listed {
        // median 1000, ±10% jitter, at most +5% from the bid correction
        assert!((900..=1155).contains(&listing.buyout), "buyout {}", listing.buyout);
        assert!(listing.start_bid <= listing.buyout);
    }
}

#[tokio::test]
async fn test_admin_toggle_applies_next_tick_and_persists() {
    let market = Arc::new(InMemoryMarket::new(demo_catalog()));
    let settings = shared(MarketSettings {
        max_items: 30,
        ..MarketSettings::default()
    });
    let path = temp_settings_path();
    let ports = Ports::in_memory(market.clone());
    let admin = AdminService::new(settings.clone(), ports.clone(), TRADERS.to_vec(), path.clone());
    let start = Utc::now();
    let mut runner = make_runner(ports, settings, start);

    assert_ok!(admin.set_toggle(Toggle::Seller, false).await);
    let report = runner.run_tick(start + Duration::minutes(1)).await;
    assert_eq!(report.listings_created(), 0);
    assert!(report.sells.iter().all(|s| s.outcome == SellOutcome::Disabled));

    let saved = storage::load_settings(Some(&path)).unwrap().unwrap();
    assert!(saved.values().all(|s| !s.seller_enabled));
    assert_eq!(saved, admin.snapshot().await);

    assert_ok!(admin.set_toggle(Toggle::Seller, true).await);
    let report = runner.run_tick(start + Duration::minutes(2)).await;
    assert!(report.listings_created() > 0);

    storage::delete_settings(Some(&path)).unwrap();
}

#[tokio::test]
async fn test_admin_expire_then_sweep_frees_capacity() {
    let market = Arc::new(InMemoryMarket::new(demo_catalog()));
    let settings = shared(MarketSettings {
        max_items: 30,
        ..MarketSettings::default()
    });
    let path = temp_settings_path();
    let ports = Ports::in_memory(market.clone());
    let admin = AdminService::new(settings.clone(), ports.clone(), TRADERS.to_vec(), path);
    let start = Utc::now();
    let mut runner = make_runner(ports, settings, start);

    runner.run_tick(start + Duration::minutes(1)).await;
    let outside = market.seed_listing(outside_listing(MarketId::Horde, 900, 1010, 10, 20));
    let bot_listings = market
        .all_listings()
        .iter()
        .filter(|l| l.market == MarketId::Horde && TRADERS.contains(&l.owner))
        .count();
    assert!(bot_listings > 0);

    let now = start + Duration::minutes(2);
    let expired = assert_ok!(admin.expire_listings(MarketId::Horde, None, now).await);
    assert_eq!(expired, bot_listings);
    market.sweep_expired(now);

    let remaining: Vec<Listing> = market
        .all_listings()
        .into_iter()
        .filter(|l| l.market == MarketId::Horde)
        .collect();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, outside.id);
}

#[tokio::test]
async fn test_trader_resolution_from_account() {
    let market = InMemoryMarket::new(demo_catalog());
    market.register_account(5, vec![13, 11, 12]);

    let registry = assert_ok!(TraderRegistry::resolve(5, &[], &market).await);
    assert_eq!(registry.ids(), vec![11, 12, 13]);

    let err = TraderRegistry::resolve(5, &[11, 99], &market).await.unwrap_err();
    assert!(err.to_string().contains("99"));
}
