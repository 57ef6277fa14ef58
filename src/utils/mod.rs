mod maths_utils;
mod perf;
pub mod time_utils;

pub use time_utils::{TimeUtils, epoch_ms_to_utc, format_duration, now_timestamp_ms};

pub(crate) use maths_utils::{mean, mean_and_sample_stddev, percent_change};
