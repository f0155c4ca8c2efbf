mod maths_utils;
mod perf;
mod time_utils;

pub use time_utils::{
    AppInstant, TimeUtils, Timestamp, add_units, align_to_bucket, diff_in_units,
    epoch_ms_to_utc, epoch_ms_to_utc_minutes, format_duration, now_timestamp_ms,
    start_of_parent,
};

pub(crate) use maths_utils::{finite_min_max, nz};
