// Domain types and value objects
mod candle;
mod symbol_interval;
mod ticker;

pub use candle::{Candle, CandleType};
pub use symbol_interval::SymbolInterval;
pub use ticker::{Tick, Ticker};
