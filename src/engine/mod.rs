// Evaluation cycle and the two trigger loops
use crate::analysis::forecast::NO_ATTEMPT_CONFIDENCE;
use crate::analysis::{ConditionHistory, MarketConditionAnalyzer, PriceForecaster};
use crate::api::MarketSampler;
use crate::config::Settings;
use crate::error::SampleError;
use crate::execution::{
    EngineState, ExecutionOutcome, ExecutorConfig, LedgerClient, RollingMarketHistory,
    TradeExecutor,
};
use crate::models::{ChainEvent, ChainEventKind, ForecastResult, MarketCondition, Sample, Trend};
use crate::risk::RiskMonitor;
use crate::strategy::{GateConfig, MarketView, TradeDecisionGate};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What started an evaluation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Poll,
    SwapEvent,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Poll => f.write_str("poll"),
            Trigger::SwapEvent => f.write_str("swap event"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    SamplerFailed { error: String },
    Rejected(SampleError),
    Evaluated {
        condition: MarketCondition,
        forecast: ForecastResult,
        risk_flag: bool,
        execution: ExecutionOutcome,
    },
}

impl CycleOutcome {
    pub fn execution(&self) -> Option<&ExecutionOutcome> {
        match self {
            CycleOutcome::Evaluated { execution, .. } => Some(execution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub history_capacity: usize,
    pub condition_history_capacity: usize,
    pub poll_interval: Duration,
    pub sampler_backoff: Duration,
    pub gate: GateConfig,
    pub executor: ExecutorConfig,
    pub initial_state: EngineState,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::from(&Settings::default())
    }
}

impl From<&Settings> for EngineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            history_capacity: settings.engine.history_capacity,
            condition_history_capacity: settings.engine.condition_history_capacity,
            poll_interval: Duration::from_secs(settings.engine.poll_interval_secs),
            sampler_backoff: Duration::from_secs(settings.engine.sampler_backoff_secs),
            gate: settings.gate_config(),
            executor: settings.executor_config(),
            initial_state: settings.engine_state(),
        }
    }
}

/// Market data guarded separately from the execution lock
struct MarketState {
    history: RollingMarketHistory,
    conditions: ConditionHistory,
}

/// Everything the decision needs, copied out of `MarketState`
struct MarketSnapshot {
    condition: MarketCondition,
    prices: Vec<f64>,
    volumes: Vec<f64>,
    volatilities: Vec<f64>,
}

pub struct Engine {
    market: Mutex<MarketState>,
    analyzer: MarketConditionAnalyzer,
    forecaster: PriceForecaster,
    gate: TradeDecisionGate,
    executor: TradeExecutor,
    sampler: Arc<dyn MarketSampler>,
    risk: Arc<dyn RiskMonitor>,
    poll_interval: Duration,
    sampler_backoff: Duration,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        sampler: Arc<dyn MarketSampler>,
        risk: Arc<dyn RiskMonitor>,
        ledger: Arc<dyn LedgerClient>,
    ) -> Self {
        let state = Arc::new(Mutex::new(config.initial_state));
        Self {
            market: Mutex::new(MarketState {
                history: RollingMarketHistory::new(config.history_capacity),
                conditions: ConditionHistory::new(config.condition_history_capacity),
            }),
            analyzer: MarketConditionAnalyzer::default(),
            forecaster: PriceForecaster::default(),
            gate: TradeDecisionGate::new(config.gate),
            executor: TradeExecutor::new(state, ledger, config.executor),
            sampler,
            risk,
            poll_interval: config.poll_interval,
            sampler_backoff: config.sampler_backoff,
        }
    }

    /// Swap the statistical models
    pub fn with_models(
        mut self,
        analyzer: MarketConditionAnalyzer,
        forecaster: PriceForecaster,
    ) -> Self {
        self.analyzer = analyzer;
        self.forecaster = forecaster;
        self
    }

    pub fn executor(&self) -> &TradeExecutor {
        &self.executor
    }

    pub async fn history_len(&self) -> usize {
        self.market.lock().await.history.len()
    }

    /// One full evaluation: sample, ingest, forecast, decide, execute
    pub async fn run_cycle(&self, trigger: Trigger) -> CycleOutcome {
        let sample = match self.sampler.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                tracing::error!(%trigger, "✗ Failed to sample market: {:#}", e);
                return CycleOutcome::SamplerFailed {
                    error: e.to_string(),
                };
            }
        };

        if let Err(e) = sample.validate() {
            tracing::warn!(%trigger, "Rejected market sample: {}", e);
            return CycleOutcome::Rejected(e);
        }

        let snapshot = self.ingest(sample).await;
        let condition = snapshot.condition;

        // Forecast runs on the snapshot, outside every lock
        let forecast = self
            .forecaster
            .forecast(&snapshot.prices)
            .unwrap_or(ForecastResult {
                predicted_price: condition.price,
                confidence: NO_ATTEMPT_CONFIDENCE,
            });

        let risk_flag = match self.risk.suspicious_activity().await {
            Ok(flag) => flag,
            Err(e) => {
                tracing::warn!("Risk monitor unavailable, assuming no risk: {:#}", e);
                false
            }
        };

        tracing::info!(
            %trigger,
            price = condition.price,
            volume = condition.volume,
            volatility = condition.volatility,
            trend = ?condition.trend,
            anomaly = condition.anomaly_score,
            predicted = forecast.predicted_price,
            confidence = forecast.confidence,
            "📊 Market evaluated"
        );

        let view = MarketView {
            condition: &condition,
            forecast: &forecast,
            recent_volumes: &snapshot.volumes,
            recent_volatilities: &snapshot.volatilities,
        };
        let execution = self
            .executor
            .decide_and_execute(|state, now| self.gate.evaluate(&view, state, risk_flag, now))
            .await;

        CycleOutcome::Evaluated {
            condition,
            forecast,
            risk_flag,
            execution,
        }
    }

    async fn ingest(&self, sample: Sample) -> MarketSnapshot {
        let mut market = self.market.lock().await;
        let MarketState {
            history,
            conditions,
        } = &mut *market;

        history.push(sample);
        // History is non-empty after the push
        let condition = self
            .analyzer
            .analyze_and_record(history, conditions)
            .unwrap_or_else(|| MarketCondition {
                price: sample.price,
                volume: sample.volume,
                volatility: 0.0,
                trend: Trend::Neutral,
                anomaly_score: 0.0,
                timestamp: sample.timestamp,
            });

        MarketSnapshot {
            condition,
            prices: history.prices(),
            volumes: history.volumes(),
            volatilities: conditions.volatilities(),
        }
    }

    /// Run the poll and event loops until `shutdown` is cancelled
    pub async fn run(
        self: Arc<Self>,
        events: mpsc::Receiver<ChainEvent>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(
            "🚀 Engine started (poll every {}s, backoff {}s)",
            self.poll_interval.as_secs(),
            self.sampler_backoff.as_secs()
        );

        let poll = tokio::spawn(self.clone().poll_loop(shutdown.clone()));
        let watch = tokio::spawn(self.clone().event_loop(events, shutdown.clone()));

        shutdown.cancelled().await;
        tracing::info!("🛑 Shutdown requested, waiting for loops to stop");

        for (name, handle) in [("poll", poll), ("event", watch)] {
            if let Err(e) = handle.await {
                tracing::error!("{} loop terminated abnormally: {}", name, e);
            }
        }

        let state = self.executor.state_snapshot().await;
        tracing::info!("Engine stopped after {} trades", state.trades_executed);
    }

    async fn poll_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Retry after the backoff instead of waiting for the next tick
            while let Some(CycleOutcome::SamplerFailed { .. }) =
                self.guarded_cycle(Trigger::Poll).await
            {
                tracing::info!(
                    "Backing off {}s before next sample",
                    self.sampler_backoff.as_secs()
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = sleep(self.sampler_backoff) => {}
                }
            }
        }
    }

    async fn event_loop(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ChainEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                tracing::warn!("Chain event stream closed, polling only");
                break;
            };

            self.risk.observe(&event);

            if event.kind == ChainEventKind::Swap {
                tracing::info!(
                    tx = %event.tx_hash,
                    block = event.block,
                    "🔔 Swap detected, evaluating"
                );
                self.guarded_cycle(Trigger::SwapEvent).await;
            }
        }
    }

    /// Run one cycle in its own task so a panicking model cannot end a loop
    async fn guarded_cycle(self: &Arc<Self>, trigger: Trigger) -> Option<CycleOutcome> {
        let engine = Arc::clone(self);
        match tokio::spawn(async move { engine.run_cycle(trigger).await }).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(%trigger, "✗ Evaluation cycle aborted, continuing: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{DropReason, PaperLedger};
    use crate::risk::NoRiskMonitor;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct FixedSampler(StdMutex<Vec<anyhow::Result<Sample>>>);

    impl FixedSampler {
        fn new(mut script: Vec<anyhow::Result<Sample>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self(StdMutex::new(script)))
        }
    }

    #[async_trait]
    impl MarketSampler for FixedSampler {
        async fn sample(&self) -> anyhow::Result<Sample> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(Sample::new(1.0, 100.0)))
        }
    }

    struct FailingRisk;

    #[async_trait]
    impl RiskMonitor for FailingRisk {
        async fn suspicious_activity(&self) -> anyhow::Result<bool> {
            anyhow::bail!("monitor offline")
        }
    }

    fn engine(sampler: Arc<dyn MarketSampler>, risk: Arc<dyn RiskMonitor>) -> Engine {
        Engine::new(EngineConfig::default(), sampler, risk, Arc::new(PaperLedger))
    }

    #[tokio::test]
    async fn test_first_cycle_holds_on_low_confidence() {
        let engine = engine(FixedSampler::new(vec![]), Arc::new(NoRiskMonitor));

        let outcome = engine.run_cycle(Trigger::Poll).await;
        match outcome {
            CycleOutcome::Evaluated {
                condition,
                forecast,
                execution,
                ..
            } => {
                assert_eq!(condition.volatility, 0.0);
                assert_eq!(forecast.confidence, 0.5);
                assert_eq!(
                    execution,
                    ExecutionOutcome::Held {
                        reason: "low confidence".to_string()
                    }
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(engine.history_len().await, 1);
    }

    #[tokio::test]
    async fn test_sampler_error_is_reported() {
        let sampler = FixedSampler::new(vec![Err(anyhow::anyhow!("connection refused"))]);
        let engine = engine(sampler, Arc::new(NoRiskMonitor));

        let outcome = engine.run_cycle(Trigger::Poll).await;
        assert!(matches!(outcome, CycleOutcome::SamplerFailed { .. }));
        assert_eq!(engine.history_len().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_sample_is_not_ingested() {
        let sampler = FixedSampler::new(vec![Ok(Sample::new(-1.0, 10.0))]);
        let engine = engine(sampler, Arc::new(NoRiskMonitor));

        let outcome = engine.run_cycle(Trigger::Poll).await;
        assert_eq!(outcome, CycleOutcome::Rejected(SampleError::InvalidPrice(-1.0)));
        assert_eq!(engine.history_len().await, 0);
    }

    #[tokio::test]
    async fn test_risk_error_treated_as_no_risk() {
        let engine = engine(FixedSampler::new(vec![]), Arc::new(FailingRisk));

        let outcome = engine.run_cycle(Trigger::Poll).await;
        assert!(matches!(
            outcome,
            CycleOutcome::Evaluated {
                risk_flag: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_swap_event_triggers_cycle() {
        let config = EngineConfig {
            poll_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let engine = Arc::new(Engine::new(
            config,
            FixedSampler::new(vec![]),
            Arc::new(NoRiskMonitor),
            Arc::new(PaperLedger),
        ));
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(engine.clone().run(rx, shutdown.clone()));

        let event = |kind| ChainEvent {
            kind,
            tx_hash: "0x1".to_string(),
            from: None,
            value: None,
            block: 1,
            observed_at: chrono::Utc::now(),
        };
        tx.send(event(ChainEventKind::Transfer)).await.unwrap();
        tx.send(event(ChainEventKind::Swap)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // One immediate poll tick plus the swap; the transfer only feeds the risk monitor
        assert_eq!(engine.history_len().await, 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let engine = Arc::new(engine(FixedSampler::new(vec![]), Arc::new(NoRiskMonitor)));
        let (_tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(engine.clone().run(rx, shutdown.clone()));
        // First interval tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("engine stops")
            .unwrap();
        assert_eq!(engine.history_len().await, 1);
    }
}
