use serde::{Deserialize, Serialize};

use crate::config::Interval;

/// The unit of scheduling: one symbol polled at one interval.
#[derive(Serialize, Deserialize, Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct SymbolInterval {
    pub symbol: String,
    pub interval: Interval,
}

impl SymbolInterval {
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
        }
    }

    // The name we pass into the Binance API (not necessarily display name)
    pub(crate) fn bn_name(&self) -> &str {
        &self.symbol
    }
}

impl std::fmt::Display for SymbolInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}
