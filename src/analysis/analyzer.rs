use super::anomaly::{AnomalyModel, IsolationForest};
use crate::execution::RollingMarketHistory;
use crate::indicators::{calculate_ewm, std_dev};
use crate::models::{MarketCondition, Trend};
use std::collections::VecDeque;

/// Samples needed before volatility, trend and anomaly are computed
pub const MIN_ANALYSIS_SAMPLES: usize = 20;
pub const VOLATILITY_WINDOW: usize = 20;
pub const ANOMALY_WINDOW: usize = 20;
pub const SHORT_EMA_SPAN: usize = 7;
pub const LONG_EMA_SPAN: usize = 20;

pub const DEFAULT_CONDITION_CAPACITY: usize = 100;

/// Bounded FIFO of past market conditions, used for rolling means
#[derive(Debug, Clone)]
pub struct ConditionHistory {
    conditions: VecDeque<MarketCondition>,
    capacity: usize,
}

impl ConditionHistory {
    /// Capacity is raised to at least the volatility window
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(VOLATILITY_WINDOW);
        Self {
            conditions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, condition: MarketCondition) {
        self.conditions.push_back(condition);
        while self.conditions.len() > self.capacity {
            self.conditions.pop_front();
        }
    }

    /// Volatilities of all stored conditions, oldest first
    pub fn volatilities(&self) -> Vec<f64> {
        self.conditions.iter().map(|c| c.volatility).collect()
    }

    pub fn latest(&self) -> Option<&MarketCondition> {
        self.conditions.back()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ConditionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CONDITION_CAPACITY)
    }
}

/// Derives volatility, trend and anomaly score from the rolling history
///
/// Low-data policy: with fewer than 20 samples every derived field is a
/// fixed value (volatility `0`, trend `Neutral`, anomaly `0`), never an error.
pub struct MarketConditionAnalyzer {
    anomaly_model: Box<dyn AnomalyModel>,
}

impl MarketConditionAnalyzer {
    pub fn new(anomaly_model: Box<dyn AnomalyModel>) -> Self {
        Self { anomaly_model }
    }

    /// Analyze the latest sample in `history`
    ///
    /// `history` must already contain the sample being analyzed. Returns
    /// `None` only when the history is empty.
    pub fn analyze(&self, history: &RollingMarketHistory) -> Option<MarketCondition> {
        let current = *history.latest()?;
        let prices = history.prices();
        let enough = prices.len() >= MIN_ANALYSIS_SAMPLES;

        let volatility = if enough {
            std_dev(&prices[prices.len() - VOLATILITY_WINDOW..]).unwrap_or(0.0)
        } else {
            0.0
        };

        let trend = if enough {
            Self::detect_trend(&prices)
        } else {
            Trend::Neutral
        };

        let anomaly_score = if enough {
            self.anomaly_score(history)
        } else {
            0.0
        };

        Some(MarketCondition {
            price: current.price,
            volume: current.volume,
            volatility,
            trend,
            anomaly_score,
            timestamp: current.timestamp,
        })
    }

    /// Analyze and append the result to `conditions`
    pub fn analyze_and_record(
        &self,
        history: &RollingMarketHistory,
        conditions: &mut ConditionHistory,
    ) -> Option<MarketCondition> {
        let condition = self.analyze(history)?;
        conditions.push(condition.clone());
        Some(condition)
    }

    fn detect_trend(prices: &[f64]) -> Trend {
        match (
            calculate_ewm(prices, SHORT_EMA_SPAN),
            calculate_ewm(prices, LONG_EMA_SPAN),
        ) {
            (Some(short), Some(long)) if short > long => Trend::Bullish,
            (Some(_), Some(_)) => Trend::Bearish,
            _ => Trend::Neutral,
        }
    }

    fn anomaly_score(&self, history: &RollingMarketHistory) -> f64 {
        let points: Vec<[f64; 2]> = history
            .window(ANOMALY_WINDOW)
            .iter()
            .map(|s| [s.price, s.volume])
            .collect();

        match self.anomaly_model.score(&points) {
            Ok(scores) => scores.last().copied().unwrap_or(0.0),
            Err(e) => {
                tracing::warn!(
                    model = self.anomaly_model.name(),
                    "Anomaly detection failed, treating sample as normal: {}",
                    e
                );
                0.0
            }
        }
    }
}

impl Default for MarketConditionAnalyzer {
    fn default() -> Self {
        Self::new(Box::new(IsolationForest::default()))
    }
}
