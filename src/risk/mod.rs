// Risk management module
pub mod events;
pub mod monitor;

pub use events::{analyze_events, EventStats, SuspicionRules, SuspiciousPattern};
pub use monitor::{EventWindowMonitor, NoRiskMonitor, RiskMonitor};
