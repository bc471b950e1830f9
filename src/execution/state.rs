use chrono::{DateTime, Duration, Utc};

/// Mutable trading state read by the gate and updated by the executor
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub last_trade_time: Option<DateTime<Utc>>,
    pub cooldown: Duration,
    pub min_confidence: f64,
    pub trading_enabled: bool,
    pub trades_executed: u64,
}

impl EngineState {
    pub fn new(cooldown: Duration, min_confidence: f64) -> Self {
        Self {
            last_trade_time: None,
            cooldown,
            min_confidence,
            trading_enabled: true,
            trades_executed: 0,
        }
    }

    /// True while `now` is inside the cooldown window of the last trade
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_remaining(now).is_some()
    }

    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_trade_time?;
        let elapsed = now - last;
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }

    /// Record a confirmed trade
    pub fn record_trade(&mut self, at: DateTime<Utc>) {
        self.last_trade_time = Some(at);
        self.trades_executed += 1;
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new(Duration::minutes(5), 0.7)
    }
}
