use crate::models::{TradeIntent, TradeSide};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Opaque reference to a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHandle(pub String);

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final on-chain status of a confirmed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failed,
}

/// External ledger capability
///
/// Implementations own signing, nonces and RPC details. The executor never
/// retries either call.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Build, sign and broadcast a transaction for `intent`
    async fn submit(&self, intent: &TradeIntent) -> anyhow::Result<TxHandle>;

    /// Wait for the receipt of `handle`; callers also enforce `timeout`
    async fn confirm(&self, handle: &TxHandle, timeout: Duration) -> anyhow::Result<TxStatus>;
}

/// Dry-run ledger: logs what would be sent and confirms immediately
#[derive(Debug, Clone, Default)]
pub struct PaperLedger;

#[async_trait]
impl LedgerClient for PaperLedger {
    async fn submit(&self, intent: &TradeIntent) -> anyhow::Result<TxHandle> {
        let side = match intent.side {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        };
        tracing::info!(
            "  → Would {} {:.4} @ ${:.6} (gas limit {})",
            side,
            intent.amount,
            intent.price,
            intent.gas_limit
        );
        Ok(TxHandle(format!("paper-{}", intent.id)))
    }

    async fn confirm(&self, handle: &TxHandle, _timeout: Duration) -> anyhow::Result<TxStatus> {
        tracing::debug!(tx = %handle, "Paper transaction confirmed");
        Ok(TxStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_paper_ledger_round_trip() {
        let ledger = PaperLedger;
        let intent = TradeIntent {
            id: Uuid::new_v4(),
            side: TradeSide::Buy,
            price: 1.25,
            amount: 0.1,
            gas_limit: 2_000_000,
            created_at: Utc::now(),
        };

        let handle = tokio_test::assert_ok!(ledger.submit(&intent).await);
        assert_eq!(handle.0, format!("paper-{}", intent.id));

        let status = ledger.confirm(&handle, Duration::from_secs(1)).await.unwrap();
        assert_eq!(status, TxStatus::Success);
    }
}
