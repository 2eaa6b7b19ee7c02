//! Administrative operations on the live market settings.
//!
//! Every mutation validates the new settings, persists the full settings
//! map, and only then swaps it into memory. A rejected or unpersisted
//! change leaves the running bot untouched.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{Band, MarketSettings, QuotaPercentages};
use crate::engine::SharedSettings;
use crate::market::Ports;
use crate::storage;
use crate::types::{BotError, Bucket, MarketId, Quality, TraderId};

/// Which feature toggle to flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toggle {
    Buyer,
    Seller,
    MarketPrice,
}

pub struct AdminService {
    settings: SharedSettings,
    ports: Ports,
    traders: Vec<TraderId>,
    store_path: String,
    /// Serializes read-modify-persist-swap sequences.
    write_lock: Mutex<()>,
}

impl AdminService {
    pub fn new(settings: SharedSettings, ports: Ports, traders: Vec<TraderId>, store_path: String) -> Self {
        Self {
            settings,
            ports,
            traders,
            store_path,
            write_lock: Mutex::new(()),
        }
    }

    /// Current settings of every market.
    pub async fn snapshot(&self) -> BTreeMap<MarketId, MarketSettings> {
        self.settings.read().await.clone()
    }

    pub async fn market(&self, market: MarketId) -> MarketSettings {
        self.settings
            .read()
            .await
            .get(&market)
            .cloned()
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Flip a feature toggle on every market.
    pub async fn set_toggle(&self, toggle: Toggle, enabled: bool) -> Result<()> {
        self.update(&MarketId::ALL, |s| match toggle {
            Toggle::Buyer => s.buyer_enabled = enabled,
            Toggle::Seller => s.seller_enabled = enabled,
            Toggle::MarketPrice => s.sell_at_market_price = enabled,
        })
        .await?;
        info!(toggle = ?toggle, enabled, "Toggle changed on all markets");
        Ok(())
    }

    pub async fn set_item_counts(&self, market: MarketId, min_items: u32, max_items: u32) -> Result<()> {
        self.update(&[market], |s| {
            s.min_items = min_items;
            s.max_items = max_items;
        })
        .await?;
        info!(market = %market, min_items, max_items, "Item counts changed");
        Ok(())
    }

    /// Set all 14 bucket percentages: trade goods grey..yellow, then
    /// equipment grey..yellow. They must sum to 100.
    pub async fn set_percentages(&self, market: MarketId, values: [u32; Bucket::COUNT]) -> Result<()> {
        self.update(&[market], |s| {
            s.percentages = QuotaPercentages::from_admin_order(values);
        })
        .await?;
        info!(market = %market, values = ?values, "Quota percentages changed");
        Ok(())
    }

    pub async fn set_price_band(&self, market: MarketId, quality: Quality, band: Band) -> Result<()> {
        self.update(&[market], |s| {
            s.price_bands[quality.index()] = band;
        })
        .await?;
        info!(market = %market, quality = %quality, min = band.min, max = band.max, "Price band changed");
        Ok(())
    }

    pub async fn set_bid_band(&self, market: MarketId, quality: Quality, band: Band) -> Result<()> {
        self.update(&[market], |s| {
            s.bid_bands[quality.index()] = band;
        })
        .await?;
        info!(market = %market, quality = %quality, min = band.min, max = band.max, "Bid band changed");
        Ok(())
    }

    pub async fn set_max_stack(&self, market: MarketId, quality: Quality, value: u32) -> Result<()> {
        self.update(&[market], |s| {
            s.max_stack[quality.index()] = value;
        })
        .await?;
        info!(market = %market, quality = %quality, value, "Stack cap changed");
        Ok(())
    }

    pub async fn set_buyer_multiplier(&self, market: MarketId, quality: Quality, value: u32) -> Result<()> {
        self.update(&[market], |s| {
            s.buyer_multiplier[quality.index()] = value;
        })
        .await?;
        info!(market = %market, quality = %quality, value, "Buyer multiplier changed");
        Ok(())
    }

    pub async fn set_bid_interval(&self, market: MarketId, minutes: u32) -> Result<()> {
        self.update(&[market], |s| {
            s.buy_interval_minutes = minutes;
        })
        .await?;
        info!(market = %market, minutes, "Bid interval changed");
        Ok(())
    }

    pub async fn set_bids_per_interval(&self, market: MarketId, count: u32) -> Result<()> {
        self.update(&[market], |s| {
            s.bids_per_interval = count;
        })
        .await?;
        info!(market = %market, count, "Bids per interval changed");
        Ok(())
    }

    /// Force-expire bot listings in a market, optionally only one trader's.
    /// Returns how many listings were expired.
    pub async fn expire_listings(
        &self,
        market: MarketId,
        trader: Option<TraderId>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if let Some(t) = trader {
            if !self.traders.contains(&t) {
                return Err(BotError::Validation(format!("{t} is not a bot trader")).into());
            }
        }

        let listings = self
            .ports
            .ledger
            .listings(market)
            .await
            .with_context(|| format!("Failed to read listings for {market}"))?;
        let mut expired = 0;
        for listing in listings
            .iter()
            .filter(|l| self.traders.contains(&l.owner))
            .filter(|l| trader.map_or(true, |t| l.owner == t))
        {
            self.ports
                .ledger
                .expire_listing(market, listing.id, now)
                .await
                .with_context(|| format!("Failed to expire listing {}", listing.id))?;
            expired += 1;
        }

        info!(market = %market, trader = ?trader, expired, "Bot listings expired");
        Ok(expired)
    }

    // -----------------------------------------------------------------------
    // Validate → persist → swap
    // -----------------------------------------------------------------------

    async fn update<F>(&self, markets: &[MarketId], mutate: F) -> Result<()>
    where
        F: Fn(&mut MarketSettings),
    {
        let _guard = self.write_lock.lock().await;

        let mut next = self.settings.read().await.clone();
        for market in markets {
            let settings = next.entry(*market).or_default();
            mutate(settings);
            settings.validate()?;
        }

        storage::save_settings(&next, Some(&self.store_path))?;
        *self.settings.write().await = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
