use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::execution::ledger::{LedgerClient, TxHandle, TxStatus};
use crate::execution::EngineState;
use crate::models::{TradeAction, TradeIntent, TradeSide, TradeSignal};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub confirm_timeout: Duration,
    pub trade_amount: f64,
    pub gas_limit: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(120),
            trade_amount: 0.1,
            gas_limit: 2_000_000,
        }
    }
}

/// Why an approved signal never reached the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A concurrent evaluation (decision or execution) holds the lock
    InFlight,
    TradingDisabled,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Gate decided to hold
    Held { reason: String },
    Dropped(DropReason),
    SubmitFailed { error: String },
    ConfirmFailed { tx: TxHandle, error: String },
    TimedOut { tx: TxHandle },
    /// Mined but reverted on-chain
    Reverted { tx: TxHandle },
    Confirmed { tx: TxHandle },
}

impl ExecutionOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ExecutionOutcome::Confirmed { .. })
    }
}

/// Serializes trade decisions and submissions
///
/// The `EngineState` mutex is the execution lock: it is taken without
/// waiting, held across ledger I/O and released on every return path when
/// the guard drops. A caller that finds it taken has its signal dropped.
pub struct TradeExecutor {
    state: Arc<Mutex<EngineState>>,
    ledger: Arc<dyn LedgerClient>,
    config: ExecutorConfig,
}

impl TradeExecutor {
    pub fn new(
        state: Arc<Mutex<EngineState>>,
        ledger: Arc<dyn LedgerClient>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            state,
            ledger,
            config,
        }
    }

    /// Decide and, if approved, execute in one critical section
    ///
    /// `decide` sees the locked state and the decision time; the cooldown it
    /// reads cannot change before the submission finishes.
    pub async fn decide_and_execute<F>(&self, decide: F) -> ExecutionOutcome
    where
        F: FnOnce(&EngineState, DateTime<Utc>) -> TradeSignal,
    {
        let Some(mut state) = self.try_acquire() else {
            return ExecutionOutcome::Dropped(DropReason::InFlight);
        };

        let signal = decide(&state, Utc::now());
        if signal.is_hold() {
            tracing::info!(price = signal.price, "  Hold: {}", signal.reason);
            return ExecutionOutcome::Held {
                reason: signal.reason,
            };
        }

        self.execute_locked(&mut state, signal).await
    }

    /// Execute a signal approved elsewhere
    ///
    /// The cooldown is checked again under the lock so that a stale approval
    /// cannot trade inside the window of a newer confirmed trade.
    pub async fn execute(&self, signal: TradeSignal) -> ExecutionOutcome {
        if signal.is_hold() {
            return ExecutionOutcome::Held {
                reason: signal.reason,
            };
        }

        let Some(mut state) = self.try_acquire() else {
            return ExecutionOutcome::Dropped(DropReason::InFlight);
        };

        if let Some(remaining) = state.cooldown_remaining(Utc::now()) {
            tracing::info!(
                "  Dropping {:?} signal: cooldown active for another {}s",
                signal.action,
                remaining.num_seconds()
            );
            return ExecutionOutcome::Dropped(DropReason::Cooldown);
        }

        self.execute_locked(&mut state, signal).await
    }

    /// Copy of the current state; waits for any in-flight execution
    pub async fn state_snapshot(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    pub async fn set_trading_enabled(&self, enabled: bool) {
        self.state.lock().await.trading_enabled = enabled;
        tracing::info!("Trading {}", if enabled { "enabled" } else { "disabled" });
    }

    fn try_acquire(&self) -> Option<MutexGuard<'_, EngineState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::info!("  Another evaluation holds the execution lock, dropping trigger");
                None
            }
        }
    }

    async fn execute_locked(
        &self,
        state: &mut EngineState,
        signal: TradeSignal,
    ) -> ExecutionOutcome {
        if !state.trading_enabled {
            tracing::warn!("  Trading is currently disabled, dropping {:?} signal", signal.action);
            return ExecutionOutcome::Dropped(DropReason::TradingDisabled);
        }

        let intent = self.build_intent(&signal);
        tracing::info!(
            intent_id = %intent.id,
            confidence = signal.confidence,
            "  Submitting {:?} @ ${:.6} ({})",
            intent.side,
            intent.price,
            signal.reason
        );

        let tx = match self.ledger.submit(&intent).await {
            Ok(tx) => tx,
            Err(e) => {
                // No retry: a resubmission could duplicate the trade
                tracing::error!(intent_id = %intent.id, "  ✗ Trade submission failed: {:#}", e);
                return ExecutionOutcome::SubmitFailed {
                    error: e.to_string(),
                };
            }
        };

        let timeout = self.config.confirm_timeout;
        match tokio::time::timeout(timeout, self.ledger.confirm(&tx, timeout)).await {
            Err(_) => {
                tracing::warn!(
                    %tx,
                    "  ✗ Confirmation timed out after {:?}, abandoning",
                    timeout
                );
                ExecutionOutcome::TimedOut { tx }
            }
            Ok(Err(e)) => {
                tracing::error!(%tx, "  ✗ Confirmation failed: {:#}", e);
                ExecutionOutcome::ConfirmFailed {
                    tx,
                    error: e.to_string(),
                }
            }
            Ok(Ok(TxStatus::Failed)) => {
                tracing::error!(%tx, "  ✗ Trade reverted on-chain, cooldown not started");
                ExecutionOutcome::Reverted { tx }
            }
            Ok(Ok(TxStatus::Success)) => {
                state.record_trade(Utc::now());
                tracing::info!(
                    %tx,
                    trades_executed = state.trades_executed,
                    "  ✓ Trade executed successfully"
                );
                ExecutionOutcome::Confirmed { tx }
            }
        }
    }

    fn build_intent(&self, signal: &TradeSignal) -> TradeIntent {
        let side = match signal.action {
            TradeAction::Sell => TradeSide::Sell,
            _ => TradeSide::Buy,
        };

        TradeIntent {
            id: Uuid::new_v4(),
            side,
            price: signal.price,
            amount: self.config.trade_amount,
            gas_limit: self.config.gas_limit,
            created_at: Utc::now(),
        }
    }
}
