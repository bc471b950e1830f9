// Technical indicators module
// Moving averages and basic statistics used by the condition analyzer

pub mod moving_average;
pub mod statistics;

pub use moving_average::{calculate_ewm, calculate_sma};
pub use statistics::{mean, std_dev};
