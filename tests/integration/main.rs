//! Integration test crate.

mod mock_market;
mod simulation;
