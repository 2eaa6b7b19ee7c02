//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Per-market trading settings live in `[markets.<name>]` blocks; any
//! field left out falls back to the stock values below. Secrets (the
//! admin token) are referenced by env-var name and resolved at runtime.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use crate::types::{BotError, Bucket, ItemCategory, ItemId, MarketId, PriceOverride, Quality, TraderId};

/// Per-tier table, indexed by `Quality::index`.
pub type TierTable<T> = [T; Quality::COUNT];

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bot: BotConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub markets: BTreeMap<MarketId, MarketSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub name: String,
    /// Account the trader characters are bound to. Zero means "use the
    /// `traders` list as given".
    #[serde(default)]
    pub account: u32,
    /// Explicit trader character ids. Empty means every character of `account`.
    #[serde(default)]
    pub traders: Vec<TraderId>,
    pub tick_interval_secs: u64,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
    pub catalog_path: String,
}

fn default_settings_path() -> String {
    "ahbot_settings.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub enabled: bool,
    pub port: u16,
    /// Env var holding the token mutating admin calls must present.
    #[serde(default)]
    pub token_env: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8087,
            token_env: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Market settings
// ---------------------------------------------------------------------------

/// Inclusive percentage band `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub min: u32,
    pub max: u32,
}

impl Band {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn validate(&self, what: &str) -> Result<(), BotError> {
        if self.max == 0 || self.min > self.max {
            return Err(BotError::Validation(format!(
                "{what} band must satisfy 0 < min <= max, got {}..{}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Which vendor price is used as the reference price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    VendorSell,
    VendorBuy,
}

/// Auction duration band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationClass {
    /// 10 to 50 minutes.
    Short,
    /// 1 to 23 hours.
    Medium,
    /// 1 to 3 days.
    Long,
}

/// Share of `max_items` reserved for each quota bucket, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPercentages {
    pub equipment: TierTable<u32>,
    pub trade_goods: TierTable<u32>,
}

impl QuotaPercentages {
    pub fn get(&self, bucket: Bucket) -> u32 {
        match bucket.category {
            ItemCategory::Equipment => self.equipment[bucket.quality.index()],
            ItemCategory::TradeGood => self.trade_goods[bucket.quality.index()],
        }
    }

    pub fn total(&self) -> u32 {
        self.equipment.iter().chain(self.trade_goods.iter()).sum()
    }

    /// Build from the 14-value admin form: trade goods grey..yellow,
    /// then equipment grey..yellow.
    pub fn from_admin_order(values: [u32; Bucket::COUNT]) -> Self {
        let mut trade_goods = [0; Quality::COUNT];
        let mut equipment = [0; Quality::COUNT];
        trade_goods.copy_from_slice(&values[..Quality::COUNT]);
        equipment.copy_from_slice(&values[Quality::COUNT..]);
        Self { equipment, trade_goods }
    }
}

impl Default for QuotaPercentages {
    fn default() -> Self {
        Self {
            equipment: [0, 10, 30, 8, 2, 0, 0],
            trade_goods: [0, 27, 12, 10, 1, 0, 0],
        }
    }
}

/// Live trading settings for one market. Mutated by the admin surface
/// and persisted by `storage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub seller_enabled: bool,
    pub buyer_enabled: bool,
    /// Price from recent sales before falling back to vendor prices.
    pub sell_at_market_price: bool,
    pub min_items: u32,
    pub max_items: u32,
    pub items_per_cycle: u32,
    pub percentages: QuotaPercentages,
    pub price_bands: TierTable<Band>,
    pub bid_bands: TierTable<Band>,
    /// Stack cap per tier; zero means "item's own max stack".
    pub max_stack: TierTable<u32>,
    pub buyer_multiplier: TierTable<u32>,
    /// Stacks of one template a trader may hold; zero disables the check.
    pub max_duplicates: u32,
    pub sell_interval_minutes: u32,
    pub buy_interval_minutes: u32,
    pub bids_per_interval: u32,
    pub duration: DurationClass,
    pub sell_price_source: PriceSource,
    pub buy_price_source: PriceSource,
    #[serde(with = "override_list")]
    pub price_overrides: BTreeMap<ItemId, PriceOverride>,
    pub disabled_items: BTreeSet<ItemId>,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            seller_enabled: true,
            buyer_enabled: false,
            sell_at_market_price: false,
            min_items: 0,
            max_items: 0,
            items_per_cycle: 200,
            percentages: QuotaPercentages::default(),
            price_bands: [
                Band::new(100, 150),
                Band::new(150, 250),
                Band::new(800, 1400),
                Band::new(1250, 1750),
                Band::new(2250, 4550),
                Band::new(3250, 5550),
                Band::new(5250, 6550),
            ],
            bid_bands: [Band::new(70, 100); Quality::COUNT],
            max_stack: [0; Quality::COUNT],
            buyer_multiplier: [1, 3, 5, 12, 15, 20, 22],
            max_duplicates: 0,
            sell_interval_minutes: 1,
            buy_interval_minutes: 1,
            bids_per_interval: 1,
            duration: DurationClass::Medium,
            sell_price_source: PriceSource::VendorSell,
            buy_price_source: PriceSource::VendorSell,
            price_overrides: BTreeMap::new(),
            disabled_items: BTreeSet::new(),
        }
    }
}

impl MarketSettings {
    /// Configured maximum live listings for a bucket.
    pub fn quota_maximum(&self, bucket: Bucket) -> u32 {
        (u64::from(self.max_items) * u64::from(self.percentages.get(bucket)) / 100) as u32
    }

    pub fn price_band(&self, quality: Quality) -> Band {
        self.price_bands[quality.index()]
    }

    pub fn bid_band(&self, quality: Quality) -> Band {
        self.bid_bands[quality.index()]
    }

    pub fn stack_cap(&self, quality: Quality) -> u32 {
        self.max_stack[quality.index()]
    }

    pub fn multiplier(&self, quality: Quality) -> u32 {
        self.buyer_multiplier[quality.index()]
    }

    pub fn override_for(&self, item: ItemId) -> Option<PriceOverride> {
        self.price_overrides.get(&item).copied()
    }

    /// Check every cross-field rule the admin surface enforces.
    pub fn validate(&self) -> Result<(), BotError> {
        if self.min_items > self.max_items {
            return Err(BotError::Validation(format!(
                "min_items ({}) exceeds max_items ({})",
                self.min_items, self.max_items
            )));
        }
        let total = self.percentages.total();
        if total != 100 {
            return Err(BotError::Validation(format!(
                "quota percentages must sum to 100, got {total}"
            )));
        }
        for quality in Quality::ALL {
            self.price_band(quality).validate(&format!("{quality} price"))?;
            self.bid_band(quality).validate(&format!("{quality} bid price"))?;
        }
        Ok(())
    }
}

/// Serialize the override table as a list, since TOML keys cannot be integers.
mod override_list {
    use super::*;
    use serde::{Deserializer, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Entry {
        item: ItemId,
        avg_price: u64,
        min_price: u64,
    }

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<ItemId, PriceOverride>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let entries: Vec<Entry> = map
            .iter()
            .map(|(item, o)| Entry {
                item: *item,
                avg_price: o.avg_price,
                min_price: o.min_price,
            })
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<ItemId, PriceOverride>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|e| {
                (
                    e.item,
                    PriceOverride {
                        avg_price: e.avg_price,
                        min_price: e.min_price,
                    },
                )
            })
            .collect())
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(contents)?;
        // Markets not mentioned still exist with stock settings.
        for market in MarketId::ALL {
            config.markets.entry(market).or_default();
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
