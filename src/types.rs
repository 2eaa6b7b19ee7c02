//! Shared types for the AHBOT trading bot.
//!
//! These types form the data model used across all modules.
//! Market, engine, strategy and admin modules depend on them
//! without depending on each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Character id of a bot-controlled trader.
pub type TraderId = u32;

/// Item template id (the catalog key).
pub type ItemId = u32;

/// Listing id inside the ledger.
pub type ListingId = u64;

/// Money in the game's smallest unit (copper).
pub type Copper = u64;

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// One faction-scoped marketplace instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketId {
    Alliance,
    Horde,
    Neutral,
}

impl MarketId {
    /// All markets, in the order the runner visits them.
    pub const ALL: [MarketId; 3] = [MarketId::Alliance, MarketId::Horde, MarketId::Neutral];

    /// The auction house id the game server uses for this market.
    pub fn house_id(&self) -> u32 {
        match self {
            MarketId::Alliance => 2,
            MarketId::Horde => 6,
            MarketId::Neutral => 7,
        }
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketId::Alliance => write!(f, "alliance"),
            MarketId::Horde => write!(f, "horde"),
            MarketId::Neutral => write!(f, "neutral"),
        }
    }
}

impl std::str::FromStr for MarketId {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alliance" | "2" => Ok(MarketId::Alliance),
            "horde" | "6" => Ok(MarketId::Horde),
            "neutral" | "7" => Ok(MarketId::Neutral),
            other => Err(BotError::UnknownMarket(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Quality tiers and categories
// ---------------------------------------------------------------------------

/// Item quality rank, used for quota bucketing and pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Poor,
    Normal,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Artifact,
}

impl Quality {
    /// Number of supported tiers.
    pub const COUNT: usize = 7;

    /// Tiers in ascending order.
    pub const ALL: [Quality; 7] = [
        Quality::Poor,
        Quality::Normal,
        Quality::Uncommon,
        Quality::Rare,
        Quality::Epic,
        Quality::Legendary,
        Quality::Artifact,
    ];

    /// Map the catalog's raw quality value to a supported tier.
    /// Anything above Artifact (heirlooms and beyond) is unsupported.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Colour name used by the admin surface.
    pub fn color(&self) -> &'static str {
        match self {
            Quality::Poor => "grey",
            Quality::Normal => "white",
            Quality::Uncommon => "green",
            Quality::Rare => "blue",
            Quality::Epic => "purple",
            Quality::Legendary => "orange",
            Quality::Artifact => "yellow",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.color())
    }
}

impl std::str::FromStr for Quality {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Quality::ALL
            .iter()
            .copied()
            .find(|q| q.color() == lower || format!("{q:?}").to_lowercase() == lower)
            .ok_or_else(|| BotError::Validation(format!("unknown quality: {s}")))
    }
}

/// Equipment vs. trade-good classification within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Equipment,
    TradeGood,
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemCategory::Equipment => write!(f, "equipment"),
            ItemCategory::TradeGood => write!(f, "trade_good"),
        }
    }
}

/// A (tier, category) quota bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bucket {
    pub quality: Quality,
    pub category: ItemCategory,
}

impl Bucket {
    pub const COUNT: usize = Quality::COUNT * 2;

    pub fn new(quality: Quality, category: ItemCategory) -> Self {
        Self { quality, category }
    }

    /// Every bucket in selection priority order: ascending tier,
    /// equipment before trade goods within a tier.
    pub fn priority_order() -> impl Iterator<Item = Bucket> {
        Quality::ALL.into_iter().flat_map(|q| {
            [
                Bucket::new(q, ItemCategory::Equipment),
                Bucket::new(q, ItemCategory::TradeGood),
            ]
        })
    }

    /// Position of this bucket in `priority_order`.
    pub fn index(&self) -> usize {
        self.quality.index() * 2
            + match self.category {
                ItemCategory::Equipment => 0,
                ItemCategory::TradeGood => 1,
            }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.quality, self.category)
    }
}

// ---------------------------------------------------------------------------
// Catalog items
// ---------------------------------------------------------------------------

/// Item class as stored in the game's item template table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemClass {
    Consumable,
    Container,
    Weapon,
    Gem,
    Armor,
    Reagent,
    Projectile,
    TradeGoods,
    Generic,
    Recipe,
    Money,
    Quiver,
    Quest,
    Key,
    Permanent,
    Miscellaneous,
    Glyph,
}

/// Catalog metadata for one item template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub id: ItemId,
    pub name: String,
    /// Raw quality value; see `Quality::from_raw`.
    pub quality: u8,
    pub class: ItemClass,
    /// Price a vendor pays for the item.
    pub sell_price: Copper,
    /// Price a vendor charges for the item.
    pub buy_price: Copper,
    pub max_stack: u32,
}

impl ItemTemplate {
    pub fn tier(&self) -> Option<Quality> {
        Quality::from_raw(self.quality)
    }

    pub fn category(&self) -> ItemCategory {
        match self.class {
            ItemClass::TradeGoods => ItemCategory::TradeGood,
            _ => ItemCategory::Equipment,
        }
    }

    /// Quota bucket for this template, if its quality is supported.
    pub fn bucket(&self) -> Option<Bucket> {
        self.tier().map(|q| Bucket::new(q, self.category()))
    }

    pub fn is_ammo(&self) -> bool {
        self.class == ItemClass::Projectile
    }

    pub fn is_stackable(&self) -> bool {
        self.max_stack > 1
    }
}

/// An authoritative price pair that bypasses the band-based formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOverride {
    pub avg_price: Copper,
    pub min_price: Copper,
}

impl PriceOverride {
    /// Estimated maximum price: `avg + (avg - min)`.
    pub fn ceiling(&self) -> Copper {
        self.avg_price
            .saturating_add(self.avg_price.saturating_sub(self.min_price))
    }
}

/// An item eligible to be listed, already placed in its quota bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemCandidate {
    pub item_id: ItemId,
    pub quality: Quality,
    pub category: ItemCategory,
    pub price_override: Option<PriceOverride>,
}

impl ItemCandidate {
    pub fn from_template(template: &ItemTemplate, price_override: Option<PriceOverride>) -> Option<Self> {
        let quality = template.tier()?;
        Some(Self {
            item_id: template.id,
            quality,
            category: template.category(),
            price_override,
        })
    }

    pub fn bucket(&self) -> Bucket {
        Bucket::new(self.quality, self.category)
    }
}

/// A freshly instantiated item, not yet committed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub guid: u64,
    pub template: ItemId,
    pub count: u32,
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// An active sell order in the marketplace ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub market: MarketId,
    pub owner: TraderId,
    pub item_template: ItemId,
    pub item_guid: u64,
    pub count: u32,
    /// Current highest bid; zero when nobody has bid yet.
    pub bid: Copper,
    pub start_bid: Copper,
    /// Zero means the listing has no buyout.
    pub buyout: Copper,
    pub bidder: Option<TraderId>,
    pub expires_at: DateTime<Utc>,
}

impl Listing {
    /// Price a new bid has to beat.
    pub fn current_price(&self) -> Copper {
        if self.bid > 0 {
            self.bid
        } else {
            self.start_bid
        }
    }

    /// Minimum legal outbid increment: 5% of the current bid, at least 1.
    pub fn min_outbid_increment(&self) -> Copper {
        (self.bid.saturating_mul(5) / 100).max(1)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A listing about to be committed by a seller.
#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    pub market: MarketId,
    pub owner: TraderId,
    pub item: ItemRecord,
    pub start_bid: Copper,
    pub buyout: Copper,
    pub expires_at: DateTime<Utc>,
}

/// Mail composed for a settlement. It is committed together with the
/// ledger change it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mail {
    OutbidRefund {
        listing: ListingId,
        bidder: TraderId,
        refund: Copper,
        new_amount: Copper,
    },
    SaleSuccessful {
        listing: ListingId,
        seller: TraderId,
        price: Copper,
    },
    AuctionWon {
        listing: ListingId,
        winner: TraderId,
        price: Copper,
    },
}

// ---------------------------------------------------------------------------
// Traders
// ---------------------------------------------------------------------------

/// A bot-controlled trader identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trader {
    pub id: TraderId,
    pub account: u32,
}

/// Which cycle a scheduler clock drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Sell,
    Buy,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Sell => write!(f, "sell"),
            Activity::Buy => write!(f, "buy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for AHBOT.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No selectable candidate in any quota bucket")]
    CandidateExhausted,

    #[error("Catalog has no template for item {item_id}")]
    CatalogLookup { item_id: ItemId },

    #[error("Catalog lookup for item {item_id} failed: {reason}")]
    CatalogUnavailable { item_id: ItemId, reason: String },

    #[error("Could not create item {item_id}: {reason}")]
    ItemConstruction { item_id: ItemId, reason: String },

    #[error("Quality {quality} not supported for item {item_id}")]
    UnsupportedQuality { item_id: ItemId, quality: u8 },

    #[error("Invalid value: {0}")]
    Validation(String),

    #[error("Unknown market: {0}")]
    UnknownMarket(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
