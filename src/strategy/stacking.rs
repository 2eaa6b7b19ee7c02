//! Stack sizing and auction duration draws.

use chrono::Duration;
use rand::Rng;

use crate::config::DurationClass;

/// Stack count for a new listing.
///
/// `tier_cap` is the per-tier cap from settings; zero means "no tier cap".
/// The result always lies in `1..=min(item_max, tier_cap or item_max)`.
pub fn stack_size<R: Rng + ?Sized>(rng: &mut R, item_max: u32, tier_cap: u32) -> u32 {
    if item_max <= 1 {
        return 1;
    }
    match tier_cap {
        0 => rng.random_range(1..=item_max),
        1 => 1,
        cap => preferred_multiple(rng, item_max).min(cap).max(1),
    }
}

/// Favour round stacks of 5, 4 or 3 when the item's max stack divides evenly.
fn preferred_multiple<R: Rng + ?Sized>(rng: &mut R, item_max: u32) -> u32 {
    let draw = if item_max % 5 == 0 {
        rng.random_range(1..=4) * 5
    } else if item_max % 4 == 0 {
        rng.random_range(1..=4) * 4
    } else if item_max % 3 == 0 {
        rng.random_range(1..=3) * 3
    } else {
        rng.random_range(1..=item_max)
    };
    draw.min(item_max)
}

/// Auction run time for a duration class.
pub fn auction_duration<R: Rng + ?Sized>(rng: &mut R, class: DurationClass) -> Duration {
    match class {
        DurationClass::Short => Duration::minutes(10 * rng.random_range(1..=5)),
        DurationClass::Medium => Duration::hours(rng.random_range(1..=23)),
        DurationClass::Long => Duration::days(rng.random_range(1..=3)),
    }
}
