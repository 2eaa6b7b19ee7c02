//! Scheduler clock: one timer per (market, trader, activity).
//!
//! A clock goes IDLE → DUE once its interval has elapsed since the last
//! run, DUE → RUNNING when the runner starts the cycle, and back to IDLE
//! when the cycle finishes. Sell clocks always reset on finish; buy clocks
//! only reset when a buy attempt actually ran.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::types::{Activity, MarketId, TraderId};

/// Observable state of one clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Due,
    Running,
}

type ClockKey = (MarketId, TraderId, Activity);

#[derive(Debug, Clone, Copy)]
struct Clock {
    last_run: DateTime<Utc>,
    running: bool,
}

/// All clocks of one bot process.
#[derive(Debug, Clone)]
pub struct SchedulerClock {
    started_at: DateTime<Utc>,
    clocks: HashMap<ClockKey, Clock>,
}

impl SchedulerClock {
    /// Clocks not yet seen count their first interval from `started_at`.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            clocks: HashMap::new(),
        }
    }

    fn clock(&self, key: &ClockKey) -> Clock {
        self.clocks.get(key).copied().unwrap_or(Clock {
            last_run: self.started_at,
            running: false,
        })
    }

    /// When the clock last reset.
    pub fn last_run(&self, market: MarketId, trader: TraderId, activity: Activity) -> DateTime<Utc> {
        self.clock(&(market, trader, activity)).last_run
    }

    pub fn state(
        &self,
        market: MarketId,
        trader: TraderId,
        activity: Activity,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> ClockState {
        let clock = self.clock(&(market, trader, activity));
        if clock.running {
            ClockState::Running
        } else if now - clock.last_run >= interval {
            ClockState::Due
        } else {
            ClockState::Idle
        }
    }

    /// Move a DUE clock to RUNNING. Refuses when the clock is not due or
    /// the sibling activity of the same market and trader is running.
    pub fn try_start(
        &mut self,
        market: MarketId,
        trader: TraderId,
        activity: Activity,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        if self.state(market, trader, activity, interval, now) != ClockState::Due {
            return false;
        }
        let sibling = match activity {
            Activity::Sell => Activity::Buy,
            Activity::Buy => Activity::Sell,
        };
        if self.clock(&(market, trader, sibling)).running {
            debug!(market = %market, trader, activity = %activity, "Sibling activity running, deferring");
            return false;
        }

        let mut clock = self.clock(&(market, trader, activity));
        clock.running = true;
        self.clocks.insert((market, trader, activity), clock);
        true
    }

    /// Return a RUNNING clock to IDLE.
    ///
    /// `executed` tells a buy clock whether an attempt ran; sell clocks
    /// ignore it and always reset.
    pub fn finish(
        &mut self,
        market: MarketId,
        trader: TraderId,
        activity: Activity,
        now: DateTime<Utc>,
        executed: bool,
    ) {
        let mut clock = self.clock(&(market, trader, activity));
        clock.running = false;
        if activity == Activity::Sell || executed {
            clock.last_run = now;
        }
        self.clocks.insert((market, trader, activity), clock);
    }
}
