// Rolling market state, engine state and trade execution
pub mod executor;
pub mod history;
pub mod ledger;
pub mod state;

pub use executor::{DropReason, ExecutionOutcome, ExecutorConfig, TradeExecutor};
pub use history::{RollingMarketHistory, DEFAULT_HISTORY_CAPACITY};
pub use ledger::{LedgerClient, PaperLedger, TxHandle, TxStatus};
pub use state::EngineState;
