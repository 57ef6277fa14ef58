//! Shared value types used by configuration and the analysis pipeline.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use std::time::Duration;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::utils::TimeUtils;

/// A candle interval. Declaration order is duration order, so `Ord` sorts shortest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter, EnumString,
)]
pub enum Interval {
    #[strum(to_string = "1m")]
    M1,
    #[strum(to_string = "3m")]
    M3,
    #[strum(to_string = "5m")]
    M5,
    #[strum(to_string = "15m")]
    M15,
    #[strum(to_string = "30m")]
    M30,
    #[strum(to_string = "1h")]
    H1,
    #[strum(to_string = "2h")]
    H2,
    #[strum(to_string = "4h")]
    H4,
    #[strum(to_string = "6h")]
    H6,
    #[strum(to_string = "8h")]
    H8,
    #[strum(to_string = "12h")]
    H12,
    #[strum(to_string = "1d")]
    D1,
    #[strum(to_string = "3d")]
    D3,
    #[strum(to_string = "1w")]
    W1,
}

impl Interval {
    pub const fn duration_ms(self) -> i64 {
        use TimeUtils as T;
        match self {
            Self::M1 => T::MS_IN_MIN,
            Self::M3 => T::MS_IN_3_MIN,
            Self::M5 => T::MS_IN_5_MIN,
            Self::M15 => T::MS_IN_15_MIN,
            Self::M30 => T::MS_IN_30_MIN,
            Self::H1 => T::MS_IN_H,
            Self::H2 => T::MS_IN_2_H,
            Self::H4 => T::MS_IN_4_H,
            Self::H6 => T::MS_IN_6_H,
            Self::H8 => T::MS_IN_8_H,
            Self::H12 => T::MS_IN_12_H,
            Self::D1 => T::MS_IN_D,
            Self::D3 => T::MS_IN_3_D,
            Self::W1 => T::MS_IN_W,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_millis(self.duration_ms() as u64)
    }

    pub fn from_ms(ms: i64) -> Option<Self> {
        Self::iter().find(|i| i.duration_ms() == ms)
    }

    /// How many candles of this width fit in a 365-day year. Used to annualise volatility.
    pub fn periods_per_year(self) -> f64 {
        TimeUtils::MS_IN_YEAR as f64 / self.duration_ms() as f64
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Interval::from_str(&raw)
            .map_err(|_| serde::de::Error::custom(format!("unknown interval key '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_round_trips_through_display_and_parse() {
        for interval in Interval::iter() {
            let parsed: Interval = interval.to_string().parse().unwrap();
            assert_eq!(parsed, interval);
        }
        assert!("7m".parse::<Interval>().is_err());
    }

    #[test]
    fn ordering_follows_duration() {
        let mut all: Vec<Interval> = Interval::iter().collect();
        all.sort();
        assert!(all.windows(2).all(|w| w[0].duration_ms() < w[1].duration_ms()));
        assert_eq!(Interval::from_ms(TimeUtils::MS_IN_4_H), Some(Interval::H4));
        assert_eq!(Interval::from_ms(42), None);
    }

    #[test]
    fn periods_per_year_for_daily_candles() {
        assert!((Interval::D1.periods_per_year() - 365.0).abs() < 1e-9);
    }
}
