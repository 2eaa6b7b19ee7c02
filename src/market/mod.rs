//! Marketplace integrations.
//!
//! Defines the narrow interfaces the engines consume and provides an
//! in-memory implementation of all of them:
//! - `Ledger`: live listings and atomic settlements
//! - `Catalog`: item template metadata
//! - `ItemProvisioner`: item instances for new listings
//! - `Notifier`: composes outbid, sale and won mail
//! - `AccountDirectory`: characters bound to the bot account

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::types::{
    Copper, ItemId, ItemRecord, ItemTemplate, Listing, ListingId, Mail, MarketId, NewListing, TraderId,
};

/// The marketplace ledger.
///
/// Every mutating call is a single atomic commit: either the listing
/// record and its index entry both change, or neither does.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All live listings in a market.
    async fn listings(&self, market: MarketId) -> Result<Vec<Listing>>;

    /// Live listings owned by one trader.
    async fn listings_by_owner(&self, market: MarketId, owner: TraderId) -> Result<Vec<Listing>>;

    /// Fetch a listing by id, if it still exists.
    async fn listing(&self, market: MarketId, id: ListingId) -> Result<Option<Listing>>;

    /// Commit a new listing together with its item instance.
    async fn add_listing(&self, listing: NewListing) -> Result<Listing>;

    /// Record a new highest bid and queue its mail in one commit.
    ///
    /// Fails without any change when the listing is gone or `amount` does
    /// not beat its current bid.
    async fn settle_bid(
        &self,
        market: MarketId,
        id: ListingId,
        amount: Copper,
        bidder: TraderId,
        mail: Vec<Mail>,
    ) -> Result<()>;

    /// Remove a bought-out listing, record the sale and queue its mail in
    /// one commit. Returns the listing as sold.
    async fn settle_buyout(
        &self,
        market: MarketId,
        id: ListingId,
        buyer: TraderId,
        price: Copper,
        mail: Vec<Mail>,
    ) -> Result<Listing>;

    /// Move a listing's expiry to `at`.
    async fn expire_listing(&self, market: MarketId, id: ListingId, at: DateTime<Utc>) -> Result<()>;

    /// Per-unit prices of recent completed sales, newest first.
    async fn recent_sale_prices(
        &self,
        market: MarketId,
        item: ItemId,
        limit: usize,
    ) -> Result<Vec<Copper>>;
}

/// Item template metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn template(&self, id: ItemId) -> Result<Option<ItemTemplate>>;

    async fn templates(&self) -> Result<Vec<ItemTemplate>>;
}

/// Creates item instances for new listings. The instance is persisted
/// as part of `Ledger::add_listing`.
#[async_trait]
pub trait ItemProvisioner: Send + Sync {
    async fn instantiate(
        &self,
        template: &ItemTemplate,
        count: u32,
        owner: TraderId,
    ) -> Result<ItemRecord>;
}

/// Mail composition. Nothing is sent here: the composed mail travels
/// with the ledger settlement and is committed with it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Refund for the listing's current bidder, displaced by `new_amount`.
    async fn outbid_refund(&self, listing: &Listing, new_amount: Copper) -> Result<Mail>;

    /// Payment to the seller.
    async fn sale_successful(&self, listing: &Listing, price: Copper) -> Result<Mail>;

    /// Item delivery to the winner.
    async fn auction_won(&self, listing: &Listing, winner: TraderId, price: Copper) -> Result<Mail>;
}

/// Character lookup for trader identity resolution.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn characters(&self, account: u32) -> Result<Vec<TraderId>>;
}

/// The collaborators one engine invocation needs.
#[derive(Clone)]
pub struct Ports {
    pub ledger: Arc<dyn Ledger>,
    pub catalog: Arc<dyn Catalog>,
    pub provisioner: Arc<dyn ItemProvisioner>,
    pub notifier: Arc<dyn Notifier>,
}

impl Ports {
    /// Wire every port to the same in-memory market.
    pub fn in_memory(market: Arc<memory::InMemoryMarket>) -> Self {
        Self {
            ledger: market.clone(),
            catalog: market.clone(),
            provisioner: market.clone(),
            notifier: market,
        }
    }
}
