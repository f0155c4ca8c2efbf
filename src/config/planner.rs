/// Window sizes, in buckets, used when deciding what to load around the chart.
pub struct PlannerConfig {
    /// Width of a window pinned to either end of the series.
    pub full_window: i64,
    /// Half-width of a window centred on an anchor time.
    pub half_window: i64,
    /// Remaining visible bars that trigger loading more.
    pub edge_threshold: i64,
    /// Forward fetches need at least this many buckets between the last loaded candle and now.
    pub min_forward_buckets: i64,
}

pub const PLANNER: PlannerConfig = PlannerConfig {
    full_window: 3000,
    half_window: 1500,
    edge_threshold: 750,
    min_forward_buckets: 2,
};
