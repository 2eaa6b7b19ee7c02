//! Candidate prioritization for the sell cycle.
//!
//! Four stages, tried in order; the first non-empty one fills the quota
//! bins. Each stage is shuffled on its own.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::fmt;

use crate::config::MarketSettings;
use crate::types::{ItemCandidate, ItemId, ItemTemplate, Listing, TraderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStage {
    /// Override items this trader has not listed yet.
    UnlistedOverrides,
    /// Every override item.
    Overrides,
    /// Catalog items nobody currently lists.
    UnlistedCatalog,
    /// Every remaining catalog item.
    Catalog,
}

impl fmt::Display for CandidateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateStage::UnlistedOverrides => write!(f, "unlisted_overrides"),
            CandidateStage::Overrides => write!(f, "overrides"),
            CandidateStage::UnlistedCatalog => write!(f, "unlisted_catalog"),
            CandidateStage::Catalog => write!(f, "catalog"),
        }
    }
}

/// Build the candidate list for one trader's sell cycle.
///
/// Returns `None` when every stage is empty.
pub fn prioritized<R: Rng + ?Sized>(
    settings: &MarketSettings,
    templates: &[ItemTemplate],
    market_listings: &[Listing],
    trader: TraderId,
    rng: &mut R,
) -> Option<(CandidateStage, Vec<ItemCandidate>)> {
    let listed_by_trader: HashSet<ItemId> = market_listings
        .iter()
        .filter(|l| l.owner == trader)
        .map(|l| l.item_template)
        .collect();
    let listed_by_anyone: HashSet<ItemId> =
        market_listings.iter().map(|l| l.item_template).collect();

    let (overrides, regular): (Vec<&ItemTemplate>, Vec<&ItemTemplate>) = templates
        .iter()
        .filter(|t| !settings.disabled_items.contains(&t.id))
        .partition(|t| settings.price_overrides.contains_key(&t.id));

    let to_candidates = |items: &[&ItemTemplate], skip: Option<&HashSet<ItemId>>| -> Vec<ItemCandidate> {
        items
            .iter()
            .filter(|t| skip.map_or(true, |s| !s.contains(&t.id)))
            .filter_map(|t| ItemCandidate::from_template(t, settings.override_for(t.id)))
            .collect()
    };

    let stages = [
        (CandidateStage::UnlistedOverrides, &overrides, Some(&listed_by_trader)),
        (CandidateStage::Overrides, &overrides, None),
        (CandidateStage::UnlistedCatalog, &regular, Some(&listed_by_anyone)),
        (CandidateStage::Catalog, &regular, None),
    ];

    for (stage, items, skip) in stages {
        let mut candidates = to_candidates(items.as_slice(), skip);
        if !candidates.is_empty() {
            candidates.shuffle(rng);
            return Some((stage, candidates));
        }
    }
    None
}
