use crate::execution::EngineState;
use crate::indicators::{calculate_sma, mean};
use crate::models::{ForecastResult, MarketCondition, TradeAction, TradeSignal, Trend};
use chrono::{DateTime, Utc};
use std::fmt;

/// Thresholds for the signal conjunction
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub price_move_threshold: f64, // Predicted price must exceed current * this
    pub volume_multiplier: f64,    // Multiple of average volume
    pub volatility_window: usize,  // Conditions averaged for the volatility baseline
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            price_move_threshold: 1.02,
            volume_multiplier: 1.5,
            volatility_window: 20,
        }
    }
}

/// Why the gate held, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Veto {
    Cooldown,
    LowConfidence,
    RiskFlag,
    PriceSignal,
    VolumeSignal,
    TrendSignal,
    VolatilitySignal,
}

impl Veto {
    pub fn as_str(&self) -> &'static str {
        match self {
            Veto::Cooldown => "cooldown",
            Veto::LowConfidence => "low confidence",
            Veto::RiskFlag => "risk flag",
            Veto::PriceSignal => "price signal",
            Veto::VolumeSignal => "volume signal",
            Veto::TrendSignal => "trend signal",
            Veto::VolatilitySignal => "volatility signal",
        }
    }
}

impl fmt::Display for Veto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything market-derived the gate looks at for one decision
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub condition: &'a MarketCondition,
    pub forecast: &'a ForecastResult,
    /// Volumes of the rolling history, current sample included
    pub recent_volumes: &'a [f64],
    /// Volatilities of the condition history, current condition included
    pub recent_volatilities: &'a [f64],
}

/// Multi-signal trade gate
///
/// Pure function of its inputs. Checks run in a fixed order and the first
/// failing one becomes the hold reason:
/// 1. cooldown
/// 2. forecast confidence below `min_confidence`
/// 3. external risk flag
/// 4. price, volume, trend and volatility signals (all must pass)
#[derive(Debug, Clone, Default)]
pub struct TradeDecisionGate {
    config: GateConfig,
}

impl TradeDecisionGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        view: &MarketView<'_>,
        state: &EngineState,
        risk_flag: bool,
        now: DateTime<Utc>,
    ) -> TradeSignal {
        let veto = Self::veto_chain(view, state, risk_flag, now)
            .or_else(|| self.entry_signals(view));

        match veto {
            Some(veto) => TradeSignal::hold(view.condition.price, now, veto.as_str()),
            None => TradeSignal {
                action: TradeAction::Buy,
                confidence: view.forecast.confidence,
                price: view.condition.price,
                timestamp: now,
                reason: "all entry signals aligned".to_string(),
            },
        }
    }

    /// Checks shared by every trade direction
    ///
    /// An exit (sell) rule set would run after this chain, exactly like
    /// [`TradeDecisionGate::entry_signals`] does.
    fn veto_chain(
        view: &MarketView<'_>,
        state: &EngineState,
        risk_flag: bool,
        now: DateTime<Utc>,
    ) -> Option<Veto> {
        if state.in_cooldown(now) {
            return Some(Veto::Cooldown);
        }
        if view.forecast.confidence < state.min_confidence {
            return Some(Veto::LowConfidence);
        }
        if risk_flag {
            return Some(Veto::RiskFlag);
        }
        None
    }

    /// Buy-side conjunction; returns the first signal that does not hold
    fn entry_signals(&self, view: &MarketView<'_>) -> Option<Veto> {
        let condition = view.condition;

        let price_signal = view.forecast.predicted_price
            > condition.price * self.config.price_move_threshold;
        if !price_signal {
            return Some(Veto::PriceSignal);
        }

        let volume_signal = mean(view.recent_volumes)
            .map(|avg| condition.volume > avg * self.config.volume_multiplier)
            .unwrap_or(false);
        if !volume_signal {
            return Some(Veto::VolumeSignal);
        }

        if condition.trend != Trend::Bullish {
            return Some(Veto::TrendSignal);
        }

        let window = self.config.volatility_window.min(view.recent_volatilities.len());
        let volatility_signal = calculate_sma(view.recent_volatilities, window)
            .map(|baseline| condition.volatility < baseline)
            .unwrap_or(false);
        if !volatility_signal {
            return Some(Veto::VolatilitySignal);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn favorable_condition() -> MarketCondition {
        MarketCondition {
            price: 1.0,
            volume: 500.0,
            volatility: 0.01,
            trend: Trend::Bullish,
            anomaly_score: 0.1,
            timestamp: Utc::now(),
        }
    }

    fn favorable_forecast() -> ForecastResult {
        ForecastResult {
            predicted_price: 1.05,
            confidence: 0.9,
        }
    }

    const VOLUMES: [f64; 5] = [100.0, 100.0, 100.0, 100.0, 500.0]; // mean 180
    const VOLATILITIES: [f64; 4] = [0.05, 0.05, 0.05, 0.01]; // mean 0.04

    fn state() -> EngineState {
        EngineState::new(Duration::seconds(300), 0.7)
    }

    fn evaluate(
        condition: &MarketCondition,
        forecast: &ForecastResult,
        state: &EngineState,
        risk_flag: bool,
        now: DateTime<Utc>,
    ) -> TradeSignal {
        let view = MarketView {
            condition,
            forecast,
            recent_volumes: &VOLUMES,
            recent_volatilities: &VOLATILITIES,
        };
        TradeDecisionGate::default().evaluate(&view, state, risk_flag, now)
    }

    #[test]
    fn test_buy_when_all_signals_align() {
        let now = Utc::now();
        let signal = evaluate(&favorable_condition(), &favorable_forecast(), &state(), false, now);

        assert_eq!(signal.action, TradeAction::Buy);
        assert_eq!(signal.confidence, 0.9);
        assert_eq!(signal.price, 1.0);
        assert_eq!(signal.timestamp, now);
    }

    #[test]
    fn test_cooldown_blocks_favorable_signals() {
        let now = Utc::now();
        let mut state = state();
        state.last_trade_time = Some(now - Duration::seconds(1));

        let signal = evaluate(&favorable_condition(), &favorable_forecast(), &state, false, now);
        assert_eq!(signal.action, TradeAction::Hold);
        assert_eq!(signal.reason, "cooldown");
    }

    #[test]
    fn test_cooldown_expires() {
        let now = Utc::now();
        let mut state = state();
        state.last_trade_time = Some(now - Duration::seconds(300));

        let signal = evaluate(&favorable_condition(), &favorable_forecast(), &state, false, now);
        assert_eq!(signal.action, TradeAction::Buy);
    }

    #[test]
    fn test_low_confidence() {
        let forecast = ForecastResult {
            confidence: 0.5,
            ..favorable_forecast()
        };
        let signal = evaluate(&favorable_condition(), &forecast, &state(), false, Utc::now());
        assert_eq!(signal.reason, "low confidence");
    }

    #[test]
    fn test_risk_flag() {
        let signal = evaluate(
            &favorable_condition(),
            &favorable_forecast(),
            &state(),
            true,
            Utc::now(),
        );
        assert_eq!(signal.action, TradeAction::Hold);
        assert_eq!(signal.reason, "risk flag");
    }

    #[test]
    fn test_veto_order_cooldown_before_confidence_and_risk() {
        let now = Utc::now();
        let mut state = state();
        state.last_trade_time = Some(now);
        let forecast = ForecastResult {
            confidence: 0.1,
            ..favorable_forecast()
        };

        let signal = evaluate(&favorable_condition(), &forecast, &state, true, now);
        assert_eq!(signal.reason, "cooldown");

        state.last_trade_time = None;
        let signal = evaluate(&favorable_condition(), &forecast, &state, true, now);
        assert_eq!(signal.reason, "low confidence");
    }

    #[test]
    fn test_price_signal_needs_two_percent() {
        let forecast = ForecastResult {
            predicted_price: 1.02,
            ..favorable_forecast()
        };
        let signal = evaluate(&favorable_condition(), &forecast, &state(), false, Utc::now());
        assert_eq!(signal.reason, "price signal");
    }

    #[test]
    fn test_volume_signal() {
        let condition = MarketCondition {
            volume: 200.0, // below 1.5 * 180
            ..favorable_condition()
        };
        let signal = evaluate(&condition, &favorable_forecast(), &state(), false, Utc::now());
        assert_eq!(signal.reason, "volume signal");
    }

    #[test]
    fn test_trend_signal() {
        for trend in [Trend::Bearish, Trend::Neutral] {
            let condition = MarketCondition {
                trend,
                ..favorable_condition()
            };
            let signal = evaluate(&condition, &favorable_forecast(), &state(), false, Utc::now());
            assert_eq!(signal.reason, "trend signal");
        }
    }

    #[test]
    fn test_volatility_signal() {
        let condition = MarketCondition {
            volatility: 0.04,
            ..favorable_condition()
        };
        let signal = evaluate(&condition, &favorable_forecast(), &state(), false, Utc::now());
        assert_eq!(signal.reason, "volatility signal");
    }

    #[test]
    fn test_first_failing_signal_wins() {
        let condition = MarketCondition {
            volume: 1.0,
            trend: Trend::Bearish,
            volatility: 1.0,
            ..favorable_condition()
        };
        let signal = evaluate(&condition, &favorable_forecast(), &state(), false, Utc::now());
        assert_eq!(signal.reason, "volume signal");
    }

    #[test]
    fn test_empty_histories_hold() {
        let condition = favorable_condition();
        let forecast = favorable_forecast();
        let view = MarketView {
            condition: &condition,
            forecast: &forecast,
            recent_volumes: &[],
            recent_volatilities: &[],
        };
        let signal = TradeDecisionGate::default().evaluate(&view, &state(), false, Utc::now());
        assert_eq!(signal.reason, "volume signal");
    }

    #[test]
    fn test_idempotent() {
        let now = Utc::now();
        let condition = favorable_condition();
        let forecast = favorable_forecast();
        let state = state();

        let first = evaluate(&condition, &forecast, &state, false, now);
        for _ in 0..10 {
            assert_eq!(evaluate(&condition, &forecast, &state, false, now), first);
        }
    }
}
