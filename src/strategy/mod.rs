// Trade decision module
pub mod gate;

pub use gate::{GateConfig, MarketView, TradeDecisionGate, Veto};
