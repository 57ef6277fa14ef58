mod alerts;
mod core;
pub(crate) mod scheduler;
mod status;
mod store;

pub use alerts::{ALERT_CHANNEL_CAPACITY, AlertBus, AlertDispatcher, DispatchOutcome};
pub use core::MarketEngine;
pub use scheduler::poll_period;
pub use status::{EngineStatus, StreamStatus};
pub use store::{MarketStateStore, TimeframeUpdate};
