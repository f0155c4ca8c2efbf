use {
    crate::{config::PLANNER, domain::Range, domain::SeriesKey, utils::Timestamp},
    serde::{Deserialize, Serialize},
};

/// How the chart is being driven; only historical browsing may fetch forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartMode {
    #[default]
    Historical,
    Live,
    Replay,
}

impl ChartMode {
    pub fn allows_forward_fetch(self) -> bool {
        matches!(self, ChartMode::Historical)
    }
}

/// Bars still off-screen on either side of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleBars {
    pub before: i64,
    pub after: i64,
}

/// Chooses which window of a series to load, in bucket units, bounded by the
/// series onboarding time and the current (still forming) bucket.
#[derive(Debug, Clone)]
pub struct RangePlanner {
    key: SeriesKey,
    onboard: Timestamp,
    now: Timestamp,
}

impl RangePlanner {
    pub fn new(key: &SeriesKey, onboard: Timestamp, now: Timestamp) -> Self {
        let now = key.align(now);
        Self {
            key: key.clone(),
            onboard: key.align(onboard).min(now),
            now,
        }
    }

    pub fn onboard(&self) -> Timestamp {
        self.onboard
    }

    /// Start of the bucket still forming.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    fn back(&self, ts: Timestamp, buckets: i64) -> Timestamp {
        self.key.step(ts, -buckets).max(self.onboard)
    }

    fn forward(&self, ts: Timestamp, buckets: i64) -> Timestamp {
        self.key.step(ts, buckets).min(self.now)
    }

    fn latest_window(&self) -> Range {
        Range::ordered(self.back(self.now, PLANNER.full_window), self.now)
    }

    fn earliest_window(&self) -> Range {
        Range::ordered(self.onboard, self.forward(self.onboard, PLANNER.full_window))
    }

    /// Window to load when a chart opens, optionally centred on `anchor`.
    pub fn initial_range(&self, anchor: Option<Timestamp>) -> Range {
        let Some(anchor) = anchor.map(|a| self.key.align(a)) else {
            return self.latest_window();
        };
        if anchor >= self.now {
            return self.latest_window();
        }
        if anchor <= self.onboard {
            return self.earliest_window();
        }

        let to_now = self.key.buckets_between(anchor, self.now);
        let to_onboard = self.key.buckets_between(anchor, self.onboard);

        if to_now < PLANNER.half_window && to_onboard < PLANNER.half_window {
            Range::ordered(self.onboard, self.now)
        } else if to_now < PLANNER.edge_threshold {
            self.latest_window()
        } else if to_onboard < PLANNER.edge_threshold {
            self.earliest_window()
        } else {
            Range::ordered(
                self.back(anchor, PLANNER.half_window),
                self.forward(anchor, PLANNER.half_window),
            )
        }
    }

    /// More history or more future when the viewport nears either loaded edge.
    /// History wins when both edges are close.
    pub fn viewport_range(
        &self,
        bars: VisibleBars,
        first_loaded: Timestamp,
        last_loaded: Timestamp,
        mode: ChartMode,
    ) -> Option<Range> {
        let loaded_to = self.key.step(last_loaded, 1);

        if bars.before < PLANNER.edge_threshold && self.key.align(first_loaded) > self.onboard {
            return Some(Range::ordered(
                self.back(first_loaded, PLANNER.full_window),
                loaded_to,
            ));
        }

        let can_go_forward = mode.allows_forward_fetch()
            && self.key.buckets_between(last_loaded, self.now) >= PLANNER.min_forward_buckets;
        if bars.after < PLANNER.edge_threshold && can_go_forward {
            return Some(Range::ordered(
                first_loaded,
                self.forward(last_loaded, PLANNER.full_window),
            ));
        }

        None
    }

    /// Next forward window while replaying, or `None` once the data reaches now.
    pub fn replay_range(&self, last_loaded: Timestamp, replay_cursor: Timestamp) -> Option<Range> {
        if self.is_future_reached(last_loaded) {
            return None;
        }
        let cursor = self.key.align(replay_cursor);
        if self.key.buckets_between(cursor, last_loaded) >= PLANNER.edge_threshold {
            return None;
        }
        Some(Range::ordered(
            self.key.step(cursor, 1).min(self.now),
            self.forward(cursor, PLANNER.half_window),
        ))
    }

    /// Whether `ts` is within one bucket of now.
    pub fn is_future_reached(&self, ts: Timestamp) -> bool {
        self.key.buckets_between(self.key.align(ts), self.now) <= 1
    }
}
