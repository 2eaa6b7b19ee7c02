//! Quota tracker: live listing counts per (tier, category) bucket.
//!
//! One ordered table of 14 rows drives both the quota check and the
//! selection order. Each row holds the candidate bin for its bucket, the
//! live count and the configured maximum.

use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

use crate::config::MarketSettings;
use crate::types::{Bucket, ItemCandidate, ItemId, ItemTemplate, Listing};

/// Upper bound on scan passes per selection.
pub const LOOP_BREAKER: usize = 32;

/// One bucket's row.
#[derive(Debug, Clone)]
pub struct QuotaRow {
    pub bucket: Bucket,
    pub bin: Vec<ItemCandidate>,
    pub count: u32,
    pub maximum: u32,
}

impl QuotaRow {
    pub fn is_selectable(&self) -> bool {
        !self.bin.is_empty() && self.count < self.maximum
    }
}

#[derive(Debug, Clone)]
pub struct QuotaTracker {
    rows: Vec<QuotaRow>,
}

impl QuotaTracker {
    /// Empty bins, zero counts, maxima from `settings`.
    pub fn new(settings: &MarketSettings) -> Self {
        let rows = Bucket::priority_order()
            .map(|bucket| QuotaRow {
                bucket,
                bin: Vec::new(),
                count: 0,
                maximum: settings.quota_maximum(bucket),
            })
            .collect();
        Self { rows }
    }

    /// Seed counts from every live listing in the market. Listings whose
    /// template is unknown or of unsupported quality are not counted.
    pub fn count_listings(&mut self, listings: &[Listing], templates: &HashMap<ItemId, ItemTemplate>) {
        for listing in listings {
            if let Some(bucket) = templates
                .get(&listing.item_template)
                .and_then(ItemTemplate::bucket)
            {
                self.rows[bucket.index()].count += 1;
            }
        }
    }

    /// Place candidates into their bucket bins.
    pub fn fill(&mut self, candidates: impl IntoIterator<Item = ItemCandidate>) {
        for candidate in candidates {
            let idx = candidate.bucket().index();
            self.rows[idx].bin.push(candidate);
        }
    }

    pub fn row(&self, bucket: Bucket) -> &QuotaRow {
        &self.rows[bucket.index()]
    }

    pub fn rows(&self) -> &[QuotaRow] {
        &self.rows
    }

    pub fn is_selectable(&self, bucket: Bucket) -> bool {
        self.row(bucket).is_selectable()
    }

    /// Whether any bucket can still take an item.
    pub fn any_selectable(&self) -> bool {
        self.rows.iter().any(QuotaRow::is_selectable)
    }

    /// Pick the next item to list.
    ///
    /// Scans buckets in priority order and draws one item uniformly from
    /// the first selectable bucket. When `max_duplicates > 0`, a draw the
    /// trader already holds `max_duplicates` stacks of is rejected and the
    /// scan moves on. The winner's bucket count is incremented.
    pub fn select<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        held: &HashMap<ItemId, u32>,
        max_duplicates: u32,
    ) -> Option<ItemCandidate> {
        for pass in 0..LOOP_BREAKER {
            let mut saw_selectable = false;
            for row in self.rows.iter_mut() {
                if !row.is_selectable() {
                    continue;
                }
                saw_selectable = true;

                let drawn = &row.bin[rng.random_range(0..row.bin.len())];
                if max_duplicates > 0 && held.get(&drawn.item_id).copied().unwrap_or(0) >= max_duplicates {
                    debug!(item = drawn.item_id, bucket = %row.bucket, "Duplicate rejected");
                    continue;
                }

                row.count += 1;
                return Some(drawn.clone());
            }
            if !saw_selectable {
                debug!(pass, "No selectable bucket");
                return None;
            }
        }
        debug!(passes = LOOP_BREAKER, "Selection loop breaker hit");
        None
    }
}
