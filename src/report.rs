//! Operator-facing status table.

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::config::Interval;
use crate::models::{MarketState, TrendClass};
use crate::utils::{epoch_ms_to_utc, format_duration};

#[derive(Debug, Tabled)]
pub struct StateRow {
    #[tabled(rename = "Symbol")]
    pub symbol: String,
    #[tabled(rename = "Price")]
    pub price: String,
    #[tabled(rename = "24h %")]
    pub change_24h: String,
    #[tabled(rename = "Timeframes")]
    pub timeframes: String,
    #[tabled(rename = "Trend")]
    pub trend: String,
    #[tabled(rename = "Strength")]
    pub strength: String,
    #[tabled(rename = "Valid")]
    pub valid: String,
    #[tabled(rename = "Volatility")]
    pub volatility: String,
    #[tabled(rename = "Last tick")]
    pub last_tick: String,
}

impl StateRow {
    pub fn from_state(state: &MarketState, now_ms: i64) -> Self {
        let timeframes = state
            .metrics
            .keys()
            .map(|interval: &Interval| {
                let class = state
                    .timeframe_signals
                    .get(interval)
                    .map(|s| match s.trend.classification {
                        TrendClass::Bullish => "+",
                        TrendClass::Bearish => "-",
                        TrendClass::Neutral => "=",
                    })
                    .unwrap_or("·");
                format!("{}:{}", interval, class)
            })
            .collect::<Vec<_>>()
            .join(" ");

        let (trend, strength, valid, volatility) = match &state.latest_signal {
            Some(s) => (
                s.overall_trend.to_string(),
                format!("{:+.2}", s.overall_strength),
                if s.is_valid { "yes" } else { "no" }.to_string(),
                format!("{:?}", s.volatility_profile),
            ),
            None => ("-".into(), "-".into(), "-".into(), "-".into()),
        };

        Self {
            symbol: state.symbol.clone(),
            price: if state.price > 0.0 {
                format!("{:.6}", state.price)
            } else {
                "-".to_string()
            },
            change_24h: state
                .ticker
                .map(|t| format!("{:+.2}", t.price_change_percent))
                .unwrap_or_else(|| "-".to_string()),
            timeframes,
            trend,
            strength,
            valid,
            volatility,
            last_tick: state
                .last_tick_ms
                .map(|t| format!("{} ({} ago)", epoch_ms_to_utc(t), format_duration(now_ms - t)))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub fn render_status_table<'a, I>(states: I, now_ms: i64) -> String
where
    I: IntoIterator<Item = &'a MarketState>,
{
    let rows: Vec<StateRow> = states
        .into_iter()
        .map(|s| StateRow::from_state(s, now_ms))
        .collect();
    if rows.is_empty() {
        return "(no symbols)".to_string();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}
