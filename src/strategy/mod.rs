//! Strategy: what to ask, what to pay, how much to stack.
//!
//! Pure decision logic. Nothing here touches the ledger; the engines feed
//! in templates, settings and an injected RNG and act on the results.

pub mod pricing;
pub mod stacking;

pub use pricing::{AskQuote, BidDecision, PassReason, PricingModel, Valuation};
pub use stacking::{auction_duration, stack_size};
