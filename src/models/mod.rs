use crate::error::SampleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One market observation: price and volume at a point in time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(price: f64, volume: f64) -> Self {
        Self {
            price,
            volume,
            timestamp: Utc::now(),
        }
    }

    pub fn at(price: f64, volume: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            price,
            volume,
            timestamp,
        }
    }

    /// Ingestion invariant: price finite and positive, volume finite and non-negative
    pub fn validate(&self) -> Result<(), SampleError> {
        if !(self.price.is_finite() && self.price > 0.0) {
            return Err(SampleError::InvalidPrice(self.price));
        }
        if !(self.volume.is_finite() && self.volume >= 0.0) {
            return Err(SampleError::InvalidVolume(self.volume));
        }
        Ok(())
    }
}

/// Direction derived from the short/long EMA crossover
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

/// Snapshot of derived market state, one per ingested sample
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketCondition {
    pub price: f64,
    pub volume: f64,
    pub volatility: f64,
    pub trend: Trend,
    pub anomaly_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// One-step price forecast with a [0, 1] quality measure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForecastResult {
    pub predicted_price: f64,
    pub confidence: f64,
}

/// Trading action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

/// Output of the decision gate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeSignal {
    pub action: TradeAction,
    pub confidence: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

impl TradeSignal {
    pub fn hold(price: f64, timestamp: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            action: TradeAction::Hold,
            confidence: 0.0,
            price,
            timestamp,
            reason: reason.into(),
        }
    }

    pub fn is_hold(&self) -> bool {
        self.action == TradeAction::Hold
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// What gets handed to the ledger client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeIntent {
    pub id: Uuid,
    pub side: TradeSide,
    pub price: f64,
    pub amount: f64,
    pub gas_limit: u64,
    pub created_at: DateTime<Utc>,
}

/// Kind of on-chain event observed in the monitored pool
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChainEventKind {
    Swap,
    Transfer,
    Other,
}

/// An on-chain event delivered by the external pool watcher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainEvent {
    pub kind: ChainEventKind,
    pub tx_hash: String,
    pub from: Option<String>,
    pub value: Option<f64>,
    pub block: u64,
    pub observed_at: DateTime<Utc>,
}
