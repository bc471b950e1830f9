// Market condition analysis and price forecasting
pub mod analyzer;
pub mod anomaly;
pub mod forecast;

pub use analyzer::{ConditionHistory, MarketConditionAnalyzer};
pub use anomaly::{AnomalyModel, IsolationForest};
pub use forecast::{DifferencedAutoRegressive, ForecastModel, ModelForecast, PriceForecaster};
