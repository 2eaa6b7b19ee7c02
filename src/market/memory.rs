//! In-memory marketplace.
//!
//! Implements every consumed interface over a single mutex-guarded
//! state, so each call is trivially atomic. Used by the binary when no
//! game server is attached, and by the tests.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{AccountDirectory, Catalog, ItemProvisioner, Ledger, Notifier};
use crate::types::{
    Copper, ItemId, ItemRecord, ItemTemplate, Listing, ListingId, Mail, MarketId, NewListing, TraderId,
};

#[derive(Default)]
struct State {
    templates: BTreeMap<ItemId, ItemTemplate>,
    listings: BTreeMap<(MarketId, ListingId), Listing>,
    sales: HashMap<(MarketId, ItemId), Vec<Copper>>,
    accounts: HashMap<u32, Vec<TraderId>>,
    mail: Vec<Mail>,
    next_listing: ListingId,
    next_item: u64,
    broken_items: HashSet<ItemId>,
    mutations: u64,
}

/// A self-contained marketplace held in memory.
#[derive(Default)]
pub struct InMemoryMarket {
    state: Mutex<State>,
}

impl InMemoryMarket {
    pub fn new(templates: Vec<ItemTemplate>) -> Self {
        let market = Self::default();
        {
            let mut state = market.lock();
            state.templates = templates.into_iter().map(|t| (t.id, t)).collect();
            state.next_listing = 1;
            state.next_item = 1;
        }
        market
    }

    /// Load a catalog from a JSON array of item templates.
    pub fn from_catalog_file(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog from {path}"))?;
        let templates: Vec<ItemTemplate> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse catalog from {path}"))?;
        Ok(Self::new(templates))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a panicking test; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bind characters to an account.
    pub fn register_account(&self, account: u32, characters: Vec<TraderId>) {
        self.lock().accounts.insert(account, characters);
    }

    /// Make item instantiation fail for a template.
    pub fn break_item(&self, item: ItemId) {
        self.lock().broken_items.insert(item);
    }

    /// Insert a listing directly, bypassing the seller (player listings).
    pub fn seed_listing(&self, mut listing: Listing) -> Listing {
        let mut state = self.lock();
        if listing.id == 0 {
            listing.id = state.next_listing;
        }
        state.next_listing = state.next_listing.max(listing.id + 1);
        state.listings.insert((listing.market, listing.id), listing.clone());
        listing
    }

    pub fn record_sale(&self, market: MarketId, item: ItemId, unit_price: Copper) {
        self.lock().sales.entry((market, item)).or_default().insert(0, unit_price);
    }

    /// Drop listings whose expiry has passed. Returns how many went.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let before = state.listings.len();
        state.listings.retain(|_, l| !l.is_expired(now));
        let removed = before - state.listings.len();
        if removed > 0 {
            state.mutations += 1;
        }
        removed
    }

    pub fn mail(&self) -> Vec<Mail> {
        self.lock().mail.clone()
    }

    pub fn all_listings(&self) -> Vec<Listing> {
        self.lock().listings.values().cloned().collect()
    }

    /// Number of committed ledger mutations so far.
    pub fn mutation_count(&self) -> u64 {
        self.lock().mutations
    }
}

#[async_trait]
impl Ledger for InMemoryMarket {
    async fn listings(&self, market: MarketId) -> Result<Vec<Listing>> {
        Ok(self
            .lock()
            .listings
            .values()
            .filter(|l| l.market == market)
            .cloned()
            .collect())
    }

    async fn listings_by_owner(&self, market: MarketId, owner: TraderId) -> Result<Vec<Listing>> {
        Ok(self
            .lock()
            .listings
            .values()
            .filter(|l| l.market == market && l.owner == owner)
            .cloned()
            .collect())
    }

    async fn listing(&self, market: MarketId, id: ListingId) -> Result<Option<Listing>> {
        Ok(self.lock().listings.get(&(market, id)).cloned())
    }

    async fn add_listing(&self, new: NewListing) -> Result<Listing> {
        let mut state = self.lock();
        if new.start_bid == 0 || (new.buyout > 0 && new.start_bid > new.buyout) {
            bail!(
                "Rejected listing with start bid {} and buyout {}",
                new.start_bid,
                new.buyout
            );
        }
        let id = state.next_listing;
        state.next_listing += 1;
        let listing = Listing {
            id,
            market: new.market,
            owner: new.owner,
            item_template: new.item.template,
            item_guid: new.item.guid,
            count: new.item.count,
            bid: 0,
            start_bid: new.start_bid,
            buyout: new.buyout,
            bidder: None,
            expires_at: new.expires_at,
        };
        state.listings.insert((new.market, id), listing.clone());
        state.mutations += 1;
        debug!(market = %new.market, listing = id, "Listing committed");
        Ok(listing)
    }

    async fn settle_bid(
        &self,
        market: MarketId,
        id: ListingId,
        amount: Copper,
        bidder: TraderId,
        mail: Vec<Mail>,
    ) -> Result<()> {
        let mut state = self.lock();
        let listing = state
            .listings
            .get_mut(&(market, id))
            .ok_or_else(|| anyhow!("Listing {id} not found in {market}"))?;
        if amount <= listing.bid {
            bail!("Bid {amount} does not beat {} on listing {id}", listing.bid);
        }
        listing.bid = amount;
        listing.bidder = Some(bidder);
        state.mail.extend(mail);
        state.mutations += 1;
        Ok(())
    }

    async fn settle_buyout(
        &self,
        market: MarketId,
        id: ListingId,
        buyer: TraderId,
        price: Copper,
        mail: Vec<Mail>,
    ) -> Result<Listing> {
        let mut state = self.lock();
        let mut sold = state
            .listings
            .remove(&(market, id))
            .ok_or_else(|| anyhow!("Listing {id} not found in {market}"))?;
        sold.bid = price;
        sold.bidder = Some(buyer);
        let unit = price / u64::from(sold.count.max(1));
        state
            .sales
            .entry((market, sold.item_template))
            .or_default()
            .insert(0, unit);
        state.mail.extend(mail);
        state.mutations += 1;
        Ok(sold)
    }

    async fn expire_listing(&self, market: MarketId, id: ListingId, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        let listing = state
            .listings
            .get_mut(&(market, id))
            .ok_or_else(|| anyhow!("Listing {id} not found in {market}"))?;
        listing.expires_at = at;
        state.mutations += 1;
        Ok(())
    }

    async fn recent_sale_prices(
        &self,
        market: MarketId,
        item: ItemId,
        limit: usize,
    ) -> Result<Vec<Copper>> {
        Ok(self
            .lock()
            .sales
            .get(&(market, item))
            .map(|p| p.iter().take(limit).copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Catalog for InMemoryMarket {
    async fn template(&self, id: ItemId) -> Result<Option<ItemTemplate>> {
        Ok(self.lock().templates.get(&id).cloned())
    }

    async fn templates(&self) -> Result<Vec<ItemTemplate>> {
        Ok(self.lock().templates.values().cloned().collect())
    }
}

#[async_trait]
impl ItemProvisioner for InMemoryMarket {
    async fn instantiate(
        &self,
        template: &ItemTemplate,
        count: u32,
        _owner: TraderId,
    ) -> Result<ItemRecord> {
        let mut state = self.lock();
        if state.broken_items.contains(&template.id) {
            bail!("Item template {} cannot be instantiated", template.id);
        }
        let guid = state.next_item;
        state.next_item += 1;
        Ok(ItemRecord {
            guid,
            template: template.id,
            count,
        })
    }
}

#[async_trait]
impl Notifier for InMemoryMarket {
    async fn outbid_refund(&self, listing: &Listing, new_amount: Copper) -> Result<Mail> {
        let bidder = listing
            .bidder
            .ok_or_else(|| anyhow!("Listing {} has no bidder to refund", listing.id))?;
        Ok(Mail::OutbidRefund {
            listing: listing.id,
            bidder,
            refund: listing.bid,
            new_amount,
        })
    }

    async fn sale_successful(&self, listing: &Listing, price: Copper) -> Result<Mail> {
        Ok(Mail::SaleSuccessful {
            listing: listing.id,
            seller: listing.owner,
            price,
        })
    }

    async fn auction_won(&self, listing: &Listing, winner: TraderId, price: Copper) -> Result<Mail> {
        Ok(Mail::AuctionWon {
            listing: listing.id,
            winner,
            price,
        })
    }
}

#[async_trait]
impl AccountDirectory for InMemoryMarket {
    async fn characters(&self, account: u32) -> Result<Vec<TraderId>> {
        Ok(self.lock().accounts.get(&account).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
