//! Scripted market for integration testing.
//!
//! Wraps the in-memory market and lets a test make ledger reads fail,
//! cut off commits after a given number, or refuse settlements, without
//! touching engine code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use ahbot::market::memory::InMemoryMarket;
use ahbot::market::{Ledger, Ports};
use ahbot::types::*;

/// A ledger whose failures are controlled from test code.
pub struct ScriptedMarket {
    inner: Arc<InMemoryMarket>,
    /// If set, every read returns this error.
    read_error: Mutex<Option<String>>,
    /// Commits still allowed before `add_listing` starts failing.
    commits_left: Mutex<Option<usize>>,
    /// If set, every bid and buyout settlement is refused.
    refuse_settlements: Mutex<bool>,
}

impl ScriptedMarket {
    pub fn new(inner: Arc<InMemoryMarket>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            read_error: Mutex::new(None),
            commits_left: Mutex::new(None),
            refuse_settlements: Mutex::new(false),
        })
    }

    pub fn inner(&self) -> &InMemoryMarket {
        &self.inner
    }

    /// Force all subsequent reads to return an error.
    pub fn fail_reads(&self, msg: &str) {
        *self.read_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Let `n` more listings commit, then refuse the rest.
    pub fn fail_commits_after(&self, n: usize) {
        *self.commits_left.lock().unwrap() = Some(n);
    }

    /// Refuse every subsequent bid and buyout settlement.
    pub fn fail_settlements(&self) {
        *self.refuse_settlements.lock().unwrap() = true;
    }

    /// Ports with this ledger and the inner market for everything else.
    pub fn ports(self: Arc<Self>) -> Ports {
        let inner = self.inner.clone();
        Ports {
            ledger: self,
            catalog: inner.clone(),
            provisioner: inner.clone(),
            notifier: inner,
        }
    }

    fn check_settlement(&self) -> Result<()> {
        if *self.refuse_settlements.lock().unwrap() {
            return Err(anyhow!("settlement refused"));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<()> {
        match self.read_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Ledger for ScriptedMarket {
    async fn listings(&self, market: MarketId) -> Result<Vec<Listing>> {
        self.check_read()?;
        self.inner.listings(market).await
    }

    async fn listings_by_owner(&self, market: MarketId, owner: TraderId) -> Result<Vec<Listing>> {
        self.check_read()?;
        self.inner.listings_by_owner(market, owner).await
    }

    async fn listing(&self, market: MarketId, id: ListingId) -> Result<Option<Listing>> {
        self.check_read()?;
        self.inner.listing(market, id).await
    }

    async fn add_listing(&self, listing: NewListing) -> Result<Listing> {
        {
            let mut left = self.commits_left.lock().unwrap();
            match left.as_mut() {
                Some(0) => return Err(anyhow!("ledger commit refused")),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner.add_listing(listing).await
    }

    async fn settle_bid(
        &self,
        market: MarketId,
        id: ListingId,
        amount: Copper,
        bidder: TraderId,
        mail: Vec<Mail>,
    ) -> Result<()> {
        self.check_settlement()?;
        self.inner.settle_bid(market, id, amount, bidder, mail).await
    }

    async fn settle_buyout(
        &self,
        market: MarketId,
        id: ListingId,
        buyer: TraderId,
        price: Copper,
        mail: Vec<Mail>,
    ) -> Result<Listing> {
        self.check_settlement()?;
        self.inner.settle_buyout(market, id, buyer, price, mail).await
    }

    async fn expire_listing(&self, market: MarketId, id: ListingId, at: DateTime<Utc>) -> Result<()> {
        self.inner.expire_listing(market, id, at).await
    }

    async fn recent_sale_prices(
        &self,
        market: MarketId,
        item: ItemId,
        limit: usize,
    ) -> Result<Vec<Copper>> {
        self.check_read()?;
        self.inner.recent_sale_prices(market, item, limit).await
    }
}

/// A small catalog spanning every supported tier and both categories,
/// plus one ammunition item.
pub fn demo_catalog() -> Vec<ItemTemplate> {
    let mut items = Vec::new();
    for quality in 0u8..=6 {
        for n in 0..4u32 {
            let id = 1000 + u32::from(quality) * 10 + n;
            let trade_good = n % 2 == 0;
            items.push(ItemTemplate {
                id,
                name: format!("Item {id}"),
                quality,
                class: if trade_good { ItemClass::TradeGoods } else { ItemClass::Weapon },
                sell_price: 25 * (u64::from(quality) + 1),
                buy_price: 100 * (u64::from(quality) + 1),
                max_stack: if trade_good { 20 } else { 1 },
            });
        }
    }
    items.push(ItemTemplate {
        id: 2512,
        name: "Rough Arrow".into(),
        quality: 1,
        class: ItemClass::Projectile,
        sell_price: 1,
        buy_price: 10,
        max_stack: 200,
    });
    items
}

/// A listing owned by someone outside the bot.
pub fn outside_listing(market: MarketId, owner: TraderId, item: ItemId, start_bid: Copper, buyout: Copper) -> Listing {
    Listing {
        id: 0,
        market,
        owner,
        item_template: item,
        item_guid: 0,
        count: 1,
        bid: 0,
        start_bid,
        buyout,
        bidder: None,
        expires_at: Utc::now() + chrono::Duration::hours(12),
    }
}
